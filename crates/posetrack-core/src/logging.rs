use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Installs a global subscriber filtered by `RUST_LOG`. Returns `false` when
/// another subscriber was already installed.
pub fn init_logging(format: LogFormat) -> bool {
    let builder = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env());
    let result = match format {
        LogFormat::Plain => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.is_ok()
}
