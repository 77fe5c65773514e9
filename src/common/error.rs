//! Error types for ctrltest
//!
//! Fatal errors carry enough context (step, point) for the CLI to tell the
//! operator exactly where a run stopped. Assertion failures are not errors;
//! they are reported through [`crate::engine::RunOutcome`].

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ctrltest
#[derive(Error, Debug)]
pub enum Error {
    // === Expression Errors ===
    #[error("Cannot resolve '{token}' in expression '{expression}': not a point alias or a number")]
    UnresolvedOperand { expression: String, token: String },

    #[error("Invalid expression '{expression}': {reason}")]
    Expression { expression: String, reason: String },

    // === Device Errors ===
    #[error("Failed to read point '{point}': {message}")]
    DeviceRead { point: String, message: String },

    #[error("Device rejected write to '{point}': {message}")]
    DeviceWrite { point: String, message: String },

    // === Gateway Errors ===
    #[error("Device gateway '{name}' not found. Searched: {searched}")]
    GatewayNotFound { name: String, searched: String },

    #[error("Device gateway failed to start: {0}")]
    GatewayStartFailed(String),

    #[error("Device gateway exited unexpectedly")]
    GatewayCrashed,

    #[error("Gateway protocol error: {0}")]
    GatewayProtocol(String),

    #[error("Gateway request '{command}' failed: {message}")]
    GatewayRequestFailed { command: String, message: String },

    #[error("Gateway request '{command}' timed out after {secs} seconds")]
    GatewayTimeout { command: String, secs: u64 },

    // === Script Errors ===
    #[error("Invalid wake condition on '{variable}': {reason}")]
    ConditionConfig { variable: String, reason: String },

    #[error("Test script error: {0}")]
    Script(String),

    #[error("Step {step} does not exist (script has steps 1..={last})")]
    StepNotFound { step: usize, last: usize },

    #[error("Step {step}, point '{variable}': {source}")]
    StepFailed {
        step: usize,
        variable: String,
        #[source]
        source: Box<Error>,
    },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid expression error
    pub fn expression(expression: &str, reason: impl Into<String>) -> Self {
        Self::Expression {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a device read error
    pub fn device_read(point: &str, message: impl ToString) -> Self {
        Self::DeviceRead {
            point: point.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a device write error
    pub fn device_write(point: &str, message: impl ToString) -> Self {
        Self::DeviceWrite {
            point: point.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a gateway not found error with search paths
    pub fn gateway_not_found<S: AsRef<str>>(name: &str, paths: &[S]) -> Self {
        Self::GatewayNotFound {
            name: name.to_string(),
            searched: paths.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(", "),
        }
    }

    /// Create a gateway request failed error
    pub fn gateway_request_failed(command: &str, message: &str) -> Self {
        Self::GatewayRequestFailed {
            command: command.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a malformed wake condition error
    pub fn condition_config(variable: &str, reason: impl Into<String>) -> Self {
        Self::ConditionConfig {
            variable: variable.to_string(),
            reason: reason.into(),
        }
    }

    /// Attach the step and point that were being processed
    pub fn in_step(self, step: usize, variable: &str) -> Self {
        match self {
            // Already located, keep the innermost context
            located @ Self::StepFailed { .. } => located,
            other => Self::StepFailed {
                step,
                variable: variable.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Whether the error came from device I/O (read or write)
    pub fn is_device_io(&self) -> bool {
        match self {
            Self::DeviceRead { .. } | Self::DeviceWrite { .. } => true,
            Self::StepFailed { source, .. } => source.is_device_io(),
            _ => false,
        }
    }
}
