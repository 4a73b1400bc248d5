// src/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed price snapshot for a product offer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceRecord {
    pub offer_id: String,
    pub product_id: i64,
    pub buyer_price: i64,
    pub old_price: i64,
    pub discount_percent: i64,
}

/// Emitted by the change detector when a stored price differs from the
/// freshly observed one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEvent {
    pub offer_id: String,
    pub old_price: i64,
    pub new_price: i64,
}

/// Product identity as returned by the vendor listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductRef {
    #[serde(default)]
    pub offer_id: String,
    #[serde(default)]
    pub product_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeartbeatStatus {
    Ok,
    Warn,
    Silent,
}

impl HeartbeatStatus {
    pub fn label(&self) -> &'static str {
        match self {
            HeartbeatStatus::Ok => "OK",
            HeartbeatStatus::Warn => "WARN",
            HeartbeatStatus::Silent => "SILENT",
        }
    }
}

/// Snapshot of the heartbeat state, used by the `/health` command.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: HeartbeatStatus,
    pub last_activity: DateTime<Utc>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_alert_at: Option<DateTime<Utc>>,
}
