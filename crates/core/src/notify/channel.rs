use crate::domain::alert::ChannelKind;
use thiserror::Error;

/// Why a single delivery attempt failed. Captured into a Failed
/// notification record; never propagated across channels or alerts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("channel not configured: {0}")]
    NotConfigured(&'static str),
    #[error("messaging session not ready")]
    NotReady,
    #[error("destination rejected: {0}")]
    InvalidDestination(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("transport: {0}")]
    Transport(String),
}

/// One delivery mechanism (Telegram bot, WhatsApp bridge). `send` blocks
/// only for the duration of a single bounded network call.
#[async_trait::async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn send(&self, destination: &str, message: &str) -> Result<(), SendError>;
}
