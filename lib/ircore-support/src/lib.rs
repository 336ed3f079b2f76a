//! Ambient support shared by the IRC core: structured logging and its configuration.
//!
//! Kept as its own crate because it carries no IRC-specific knowledge and other
//! consumers of the core (drivers, test harnesses) may want the same logging setup
//! without pulling in the protocol implementation.

pub mod config;
pub mod logging;

pub use config::LogConfig;
pub use logging::init_logger;
