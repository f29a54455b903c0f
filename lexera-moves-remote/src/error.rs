use thiserror::Error;

/// Why a realtime feed connection ended.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("WebSocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Server error: {0}")]
    Server(String),
}
