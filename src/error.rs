use thiserror::Error;

/// Generic text shown for a response body that is not JSON.
pub const DECODE_FAILURE_MESSAGE: &str = "response was not valid JSON";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsoleError {
    /// The draft cannot be sent yet. Nothing was transmitted.
    #[error("{0}")]
    Validation(String),

    #[error("request failed: {0}")]
    Transport(String),

    /// Non-2xx status. `message` is the backend `detail` text when present.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("response was not valid JSON")]
    Decode,
}

impl ConsoleError {
    pub fn api_fallback(status: u16, status_text: &str) -> Self {
        Self::Api {
            status,
            message: format!("API error: {status} {status_text}"),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
