use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskwireError {
    #[error("WebSocket connection error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP stream error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("not connected: no open bidirectional channel")]
    NotConnected,

    #[error("connection closed unexpectedly")]
    ConnectionClosed,

    #[error("maximum reconnection attempts ({0}) exceeded")]
    ReconnectExhausted(u32),

    #[error("invalid message format: {0}")]
    InvalidMessage(String),

    #[error("endpoint rejected stream request: HTTP {0}")]
    StreamRejected(u16),

    #[error("metrics server error: {0}")]
    MetricsError(String),
}
