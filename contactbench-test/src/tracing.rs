use tracing_subscriber::EnvFilter;

const CRATE_NAMES: &[&str] = &["contactbench", "contactbench_test"];

/// Initialize the logger for benchmark integration tests.
///
/// Logs go to the output captured by the Rust test runner, so they only show for failing tests.
/// `contactbench` and the stub service log at DEBUG, which includes the per-request failure
/// warnings and the phase start and finish lines. Everything else, such as axum and hyper, is
/// limited to ERROR.
///
/// # Example
///
/// ```
/// contactbench_test::tracing::init();
/// ```
pub fn init() {
    let mut env_filter = EnvFilter::new("ERROR");

    for name in CRATE_NAMES {
        if let Ok(directive) = format!("{name}=DEBUG").parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}
