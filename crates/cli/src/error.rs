//! Error types for CLI operations.

use dispatcher::DispatcherError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    /// A configured sink could not be built
    #[error("Failed to build sink '{name}'")]
    SinkBuild {
        name: String,
        #[source]
        source: DispatcherError,
    },

    /// A producer thread panicked while emitting
    #[error("Producer {index} for sink '{sink}' panicked")]
    ProducerPanicked { sink: String, index: usize },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    pub fn sink_build(name: impl Into<String>, source: DispatcherError) -> Self {
        Self::SinkBuild {
            name: name.into(),
            source,
        }
    }

    pub fn producer_panicked(sink: impl Into<String>, index: usize) -> Self {
        Self::ProducerPanicked {
            sink: sink.into(),
            index,
        }
    }
}
