//! Layered error definitions
//!
//! Categorized by source: config / subscription / emission

use std::sync::Arc;

use thiserror::Error;

use crate::EmitResult;

/// Error payload carried by `try_emit_error` and `Subscriber::on_error`.
///
/// Shared behind an `Arc` so one error can be handed to every subscriber.
pub type SignalError = Arc<dyn std::error::Error + Send + Sync>;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Subscription Errors =====
    /// A unicast sink already has its one subscriber
    #[error("unicast sink allows only a single subscriber")]
    UnicastAlreadySubscribed,

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Wrap into a shareable signal payload
    pub fn into_signal(self) -> SignalError {
        Arc::new(self)
    }
}

/// Returned by the retrying emitters when they give up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("emission failed with {result} after {attempts} attempt(s)")]
pub struct EmissionError {
    /// Last result observed from the sink
    pub result: EmitResult,
    /// Number of `try_emit_*` calls made
    pub attempts: u32,
}

impl EmissionError {
    pub fn new(result: EmitResult, attempts: u32) -> Self {
        Self { result, attempts }
    }
}
