use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}
