pub mod alerts;
pub mod domain;
pub mod ingest;
pub mod notify;
pub mod storage;

pub mod config {
    use anyhow::Context;
    use chrono::FixedOffset;

    /// Jakarta time. Daily alert times and chart labels are interpreted
    /// in this offset unless TZ_OFFSET_HOURS overrides it.
    const DEFAULT_TZ_OFFSET_HOURS: i32 = 7;

    pub fn display_offset() -> anyhow::Result<FixedOffset> {
        let hours = std::env::var("TZ_OFFSET_HOURS")
            .ok()
            .and_then(|s| s.parse::<i32>().ok())
            .unwrap_or(DEFAULT_TZ_OFFSET_HOURS);
        FixedOffset::east_opt(hours * 3600)
            .with_context(|| format!("invalid TZ_OFFSET_HOURS: {hours}"))
    }

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub telegram_bot_token: Option<String>,
        pub whatsapp_bridge_url: Option<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
                whatsapp_bridge_url: std::env::var("WHATSAPP_BRIDGE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }
    }
}
