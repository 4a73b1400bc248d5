// src/config.rs
use std::env;
use std::time::Duration;
use tracing::warn;

/// Runtime settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub tg_token: String,
    pub admin_ids: Vec<i64>,
    pub ozon_client_id: String,
    pub ozon_api_key: String,
    pub heartbeat_threshold: Duration,
    pub heartbeat_chat_id: Option<i64>,
    pub monitor_offer_ids: Vec<String>,
    pub monitor_product_ids: Vec<i64>,
    pub poll_period: Duration,
}

fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            match part.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!("⚙️ Ignoring non-numeric id in list: '{}'", part);
                    None
                }
            }
        })
        .collect()
}

fn parse_offer_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

impl Settings {
    /// Reads all settings from the environment. A missing `TG_TOKEN` is the
    /// only fatal condition; everything else has a default or degrades with
    /// a warning at the call site.
    pub fn from_env() -> Result<Self, String> {
        let tg_token = env::var("TG_TOKEN").unwrap_or_default();
        if tg_token.trim().is_empty() {
            return Err("TG_TOKEN is not set".to_string());
        }

        let admin_ids = parse_id_list(&env::var("ADMIN_IDS").unwrap_or_default());

        let heartbeat_minutes = env::var("HEARTBEAT_MINUTES")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .unwrap_or(30)
            .max(1);

        let heartbeat_chat_id = env::var("HEARTBEAT_CHAT_ID")
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok());

        let poll_period_sec = env::var("POLL_PERIOD_SEC")
            .unwrap_or_else(|_| "300".to_string())
            .parse::<u64>()
            .unwrap_or(300)
            .max(10);

        Ok(Self {
            tg_token,
            admin_ids,
            ozon_client_id: env::var("OZON_CLIENT_ID").unwrap_or_default(),
            ozon_api_key: env::var("OZON_API_KEY").unwrap_or_default(),
            heartbeat_threshold: Duration::from_secs(heartbeat_minutes * 60),
            heartbeat_chat_id,
            monitor_offer_ids: parse_offer_list(
                &env::var("MONITOR_OFFER_IDS").unwrap_or_default(),
            ),
            monitor_product_ids: parse_id_list(
                &env::var("MONITOR_PRODUCT_IDS").unwrap_or_default(),
            ),
            poll_period: Duration::from_secs(poll_period_sec),
        })
    }

    pub fn ozon_configured(&self) -> bool {
        !self.ozon_client_id.trim().is_empty() && !self.ozon_api_key.trim().is_empty()
    }
}
