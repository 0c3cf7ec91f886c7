//! # Configuration System
//!
//! TOML-based configuration for the transport and its logging.
//!
//! ## Example Configuration
//!
//! ```toml
//! [transport]
//! receive_buffer_size = 128
//! wait_poll_interval = "10ms"
//! close_status_check = "strict"
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

mod error;
mod loader;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::{CloseStatusCheck, Config, LogFormat, LogLevel, LoggingConfig, TransportConfig};
pub use validation::{
    BasicValidator, ValidationError, ValidationResult, ValidationSeverity, Validator,
    MAX_RECEIVE_BUFFER_SIZE,
};
