//! Gateway error types.

use thiserror::Error;

/// Errors raised by the completion gateway.
///
/// Callers can distinguish an unknown config id from a provider rejection
/// from a malformed envelope; only `test_connection` collapses these into a
/// boolean. Error messages never carry the API key.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The referenced configuration id does not exist.
    #[error("no provider config with id {0}")]
    ConfigNotFound(String),

    /// Non-2xx provider response, transport failure, or timeout.
    /// `status` is `None` for the transport class.
    #[error("provider error: {message}")]
    Provider {
        status: Option<u16>,
        message: String,
    },

    /// A 2xx response whose body does not match the expected envelope.
    #[error("malformed provider response: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Provider {
            status: None,
            message: err.to_string(),
        }
    }
}
