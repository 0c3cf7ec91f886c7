//! Configuration validation system.

use super::types::Config;

/// Largest accepted receive buffer.
pub const MAX_RECEIVE_BUFFER_SIZE: usize = 1024 * 1024;

/// Receive buffers below this size turn most messages into fragment runs.
const SMALL_RECEIVE_BUFFER_SIZE: usize = 16;

/// A single validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// Error message.
    pub message: String,
    /// Severity level.
    pub severity: ValidationSeverity,
}

impl ValidationError {
    /// Create a new error.
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Error,
        }
    }

    /// Create a new warning.
    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Warning,
        }
    }
}

/// Severity of validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Error - configuration is invalid.
    Error,
    /// Warning - configuration may have issues.
    Warning,
}

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Create a new empty (valid) result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error to the result.
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Check if the validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self
            .errors
            .iter()
            .any(|e| e.severity == ValidationSeverity::Error)
    }

    /// Get all validation issues, warnings included.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Get only errors (not warnings).
    #[must_use]
    pub fn errors_only(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Error)
            .collect()
    }

    /// Get only warnings.
    #[must_use]
    pub fn warnings(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Warning)
            .collect()
    }
}

/// Trait for configuration validators.
pub trait Validator: std::fmt::Debug + Send + Sync {
    /// Validate a configuration and return any errors.
    fn validate(&self, config: &Config) -> ValidationResult;
}

/// Built-in validator for transport limits.
#[derive(Debug, Default)]
pub struct BasicValidator;

impl BasicValidator {
    /// Create a new basic validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for BasicValidator {
    fn validate(&self, config: &Config) -> ValidationResult {
        let mut result = ValidationResult::new();
        let transport = &config.transport;

        if transport.receive_buffer_size == 0 {
            result.add_error(ValidationError::error(
                "transport.receive_buffer_size",
                "Receive buffer size cannot be 0",
            ));
        } else if transport.receive_buffer_size > MAX_RECEIVE_BUFFER_SIZE {
            result.add_error(ValidationError::error(
                "transport.receive_buffer_size",
                format!(
                    "Receive buffer size {} exceeds maximum of {MAX_RECEIVE_BUFFER_SIZE}",
                    transport.receive_buffer_size
                ),
            ));
        } else if transport.receive_buffer_size < SMALL_RECEIVE_BUFFER_SIZE {
            result.add_error(ValidationError::warning(
                "transport.receive_buffer_size",
                format!(
                    "Receive buffer size {} is very small; most messages will be fragmented",
                    transport.receive_buffer_size
                ),
            ));
        }

        if transport.wait_poll_interval.is_zero() {
            result.add_error(ValidationError::error(
                "transport.wait_poll_interval",
                "Wait poll interval cannot be 0",
            ));
        }

        result
    }
}
