use crate::config::LogConfig;
use sloggers::Config;

/// Build a root logger from `config`. Call once per process; pass the resulting
/// `slog::Logger` down into a `Context` and clone it per connection with `.new(o!(...))`.
pub fn init_logger(config: &LogConfig) -> Result<slog::Logger, LoggingError> {
    let built = config.build().map_err(LoggingError::Config)?;
    built.build_logger().map_err(LoggingError::Build)
}

#[derive(Debug)]
pub enum LoggingError {
    Config(serdeconv::Error),
    Build(sloggers::Error),
}

impl std::fmt::Display for LoggingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoggingError::Config(e) => write!(f, "invalid logging config: {}", e),
            LoggingError::Build(e) => write!(f, "failed to build logger: {}", e),
        }
    }
}

impl std::error::Error for LoggingError {}
