use thiserror::Error;

/// Errors that can arise while encoding or decoding VDA5050 messages.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to serialize VDA5050 message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("malformed topic: {0}")]
    InvalidTopic(String),

    #[error("action parameters must be a JSON object, got: {0}")]
    NonObjectActionParameters(serde_json::Value),
}
