use crate::config::Settings;
use crate::domain::alert::ChannelKind;
use crate::notify::channel::{NotificationChannel, SendError};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const SEND_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    description: Option<String>,
}

/// Telegram Bot API client. The destination is an opaque chat id handed
/// to `sendMessage`; messages use HTML parse mode.
pub struct TelegramChannel {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl TelegramChannel {
    pub fn from_settings(settings: &Settings) -> Result<Self, SendError> {
        let api_base =
            std::env::var("TELEGRAM_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        if settings.telegram_bot_token.is_none() {
            tracing::warn!("TELEGRAM_BOT_TOKEN not set; telegram notifications will fail");
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .build()
            .map_err(|e| SendError::Transport(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            api_base,
            token: settings.telegram_bot_token.clone(),
        })
    }
}

#[async_trait::async_trait]
impl NotificationChannel for TelegramChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    async fn send(&self, destination: &str, message: &str) -> Result<(), SendError> {
        let token = self
            .token
            .as_deref()
            .ok_or(SendError::NotConfigured("TELEGRAM_BOT_TOKEN"))?;
        if destination.trim().is_empty() {
            return Err(SendError::InvalidDestination("empty chat id".into()));
        }

        let url = format!("{}/bot{token}/sendMessage", self.api_base);
        let res = self
            .http
            .post(url)
            .json(&json!({
                "chat_id": destination,
                "text": message,
                "parse_mode": "HTML",
            }))
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = res.status();
        let body: BotApiResponse = res
            .json()
            .await
            .map_err(|e| SendError::Transport(format!("bot API response unreadable: {e}")))?;

        if body.ok {
            return Ok(());
        }

        let description = body.description.unwrap_or_else(|| format!("HTTP {status}"));
        match status.as_u16() {
            401 | 403 => Err(SendError::Unauthorized(description)),
            400 => Err(SendError::InvalidDestination(description)),
            _ => Err(SendError::Transport(description)),
        }
    }
}
