use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `debug` or
/// `gopkgdriver::harvest=trace`.
pub const LOG_ENV: &str = "GOPACKAGESDRIVER_LOG";

/// Installs a stderr subscriber. Stdout carries the JSON response, so
/// nothing may log there.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}
