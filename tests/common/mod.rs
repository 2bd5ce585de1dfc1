use fsm_envoy::{Context, Event, TransitionRule};
use tracing_subscriber::EnvFilter;

/// Routes `tracing` output through the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn sample_rule() -> TransitionRule {
    TransitionRule::new([
        ("state0", "event01", "state1"),
        ("state0", "event02", "state2"),
        ("state0", "event03", "state3"),
        ("state2", "event24", "state4"),
        ("state2", "event25", "state5"),
        ("state5", "event56", "state6"),
        ("state5", "event57", "state7"),
    ])
}

/// An action that always emits `code`. An empty code emits nothing.
pub fn emit<D: 'static>(code: &'static str) -> impl Fn(&mut dyn Context<D>, &Event) -> Option<Event> + 'static {
    move |_, _| Event::new(code)
}
