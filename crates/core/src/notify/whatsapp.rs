use crate::config::Settings;
use crate::domain::alert::ChannelKind;
use crate::notify::channel::{NotificationChannel, SendError};
use serde::Deserialize;
use serde_json::json;
use std::sync::RwLock;
use std::time::Duration;

const SEND_TIMEOUT_SECS: u64 = 10;

/// WhatsApp delivery goes through an out-of-process bridge that owns the
/// authenticated session (paired once via QR scan, an operational concern
/// outside the dispatch path). The session state is explicit so `send`
/// can fail fast instead of blocking on an unpaired bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Pairing,
    Ready,
}

impl SessionState {
    fn parse(s: &str) -> Self {
        match s {
            "ready" => SessionState::Ready,
            "pairing" => SessionState::Pairing,
            _ => SessionState::Disconnected,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BridgeStatus {
    state: String,
}

pub struct WhatsAppChannel {
    http: reqwest::Client,
    bridge_url: Option<String>,
    session: RwLock<SessionState>,
}

impl WhatsAppChannel {
    pub fn from_settings(settings: &Settings) -> Result<Self, SendError> {
        if settings.whatsapp_bridge_url.is_none() {
            tracing::warn!("WHATSAPP_BRIDGE_URL not set; whatsapp notifications will fail");
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .build()
            .map_err(|e| SendError::Transport(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            bridge_url: settings.whatsapp_bridge_url.clone(),
            session: RwLock::new(SessionState::Disconnected),
        })
    }

    pub fn is_ready(&self) -> bool {
        self.session
            .read()
            .map(|s| *s == SessionState::Ready)
            .unwrap_or(false)
    }

    pub fn session_state(&self) -> SessionState {
        self.session
            .read()
            .map(|s| *s)
            .unwrap_or(SessionState::Disconnected)
    }

    #[cfg(test)]
    pub(crate) fn set_session_state(&self, state: SessionState) {
        if let Ok(mut s) = self.session.write() {
            *s = state;
        }
    }

    /// Polls the bridge for its session state. Best effort: a transport
    /// failure marks the session disconnected rather than erroring out.
    pub async fn sync_session(&self) -> SessionState {
        let state = match self.query_bridge_state().await {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(error = %err, "whatsapp bridge status check failed");
                SessionState::Disconnected
            }
        };
        if let Ok(mut s) = self.session.write() {
            *s = state;
        }
        state
    }

    async fn query_bridge_state(&self) -> Result<SessionState, SendError> {
        let bridge = self
            .bridge_url
            .as_deref()
            .ok_or(SendError::NotConfigured("WHATSAPP_BRIDGE_URL"))?;
        let status: BridgeStatus = self
            .http
            .get(format!("{}/status", bridge.trim_end_matches('/')))
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| SendError::Transport(format!("bridge status unreadable: {e}")))?;
        Ok(SessionState::parse(&status.state))
    }
}

/// Country code included, no plus sign or separators.
fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

#[async_trait::async_trait]
impl NotificationChannel for WhatsAppChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Whatsapp
    }

    async fn send(&self, destination: &str, message: &str) -> Result<(), SendError> {
        let bridge = self
            .bridge_url
            .as_deref()
            .ok_or(SendError::NotConfigured("WHATSAPP_BRIDGE_URL"))?;
        if !self.is_ready() {
            return Err(SendError::NotReady);
        }

        let number = normalize_phone(destination);
        if number.is_empty() {
            return Err(SendError::InvalidDestination(format!(
                "no digits in phone number {destination:?}"
            )));
        }

        let res = self
            .http
            .post(format!("{}/send", bridge.trim_end_matches('/')))
            .json(&json!({ "to": number, "message": message }))
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let detail = res.text().await.unwrap_or_default();
            return Err(SendError::Transport(format!("bridge HTTP {status}: {detail}")));
        }
        Ok(())
    }
}
