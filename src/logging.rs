use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Errors if one is already set,
/// callers that may race (tests, multiple bins) use `init().ok()`.
pub fn init() -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}
