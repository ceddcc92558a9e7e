//! Logging utilities.
//!
//! Logger initialization lives here. Library code only uses the `log` facade;
//! installing `env_logger` is left to the binary.

mod init;

pub use init::{init_logging, LoggingConfig};
