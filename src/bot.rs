// src/bot.rs
//
// Inbound command handling over Telegram long polling.

use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::state::MonitorState;
use crate::telegram::Message;
use crate::types::HeartbeatStatus;

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);
const PRICES_COMMAND_LIMIT: usize = 10;

fn start_text() -> String {
    "👋 Hi! I watch Ozon seller prices.\n\
    Commands:\n\
    /ping — check that I'm alive\n\
    /prices — current prices for the first 10 monitored products\n\
    /health — heartbeat and last poll cycle status"
        .to_string()
}

fn fallback_text() -> String {
    "Unknown command. Try /ping, /prices or /health.".to_string()
}

async fn health_text(state: &MonitorState) -> String {
    let snapshot = {
        let hb = state.heartbeat.lock().await;
        hb.snapshot(Utc::now())
    };
    let tracked = {
        let detector = state.prices.lock().await;
        detector.tracked_offers()
    };

    let emoji = match snapshot.status {
        HeartbeatStatus::Ok => "✅",
        HeartbeatStatus::Warn => "⚠️",
        HeartbeatStatus::Silent => "🚨",
    };

    format!(
        "{} <b>Status: {}</b>\n\
        Last activity: {}\n\
        Last completed cycle: {}\n\
        Last silence alert: {}\n\
        Poll period: {}s\n\
        Tracked offers: {}",
        emoji,
        snapshot.status.label(),
        snapshot.last_activity.format("%Y-%m-%d %H:%M:%S UTC"),
        snapshot
            .last_cycle_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string()),
        snapshot
            .last_alert_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string()),
        state.settings.poll_period.as_secs(),
        tracked,
    )
}

async fn prices_text(state: &MonitorState) -> String {
    if !state.settings.ozon_configured() {
        return "Ozon API is not configured. Set OZON_CLIENT_ID and OZON_API_KEY.".to_string();
    }

    let products = state.ozon.list_products().await;
    if products.is_empty() {
        return "Ozon API request failed, try again later.".to_string();
    }

    let offer_ids: Vec<String> = products
        .iter()
        .filter(|p| !p.offer_id.is_empty())
        .take(PRICES_COMMAND_LIMIT)
        .map(|p| p.offer_id.clone())
        .collect();

    let records = state.ozon.product_prices(&offer_ids, &[]).await;
    if records.is_empty() {
        return "No price data available right now.".to_string();
    }

    let mut lines = vec![format!("Prices (first {}):", records.len())];
    for r in records.iter().take(PRICES_COMMAND_LIMIT) {
        if r.old_price > 0 {
            lines.push(format!(
                "{}: {} (was {}, -{}%)",
                r.offer_id, r.buyer_price, r.old_price, r.discount_percent
            ));
        } else {
            lines.push(format!("{}: {}", r.offer_id, r.buyer_price));
        }
    }
    lines.join("\n")
}

async fn handle_message(state: &MonitorState, message: &Message) {
    let chat_id = message.chat.id;
    let text = message.text.as_deref().unwrap_or("").trim();
    let command = text.split_whitespace().next().unwrap_or("");

    let reply = match command {
        "/start" => start_text(),
        "/ping" => "pong ✅".to_string(),
        "/prices" => prices_text(state).await,
        "/health" | "/monitor" => health_text(state).await,
        _ => fallback_text(),
    };

    state.telegram.notify(&[chat_id], &reply).await;

    let mut hb = state.heartbeat.lock().await;
    hb.touch("inbound_message");
}

/// The command loop: long-poll getUpdates and dispatch each message.
/// Exits only on the shutdown signal.
pub async fn run_bot_service(state: MonitorState, mut shutdown: watch::Receiver<bool>) {
    info!("🤖 Bot command loop started");
    let mut offset: i64 = 0;

    loop {
        let poll = tokio::select! {
            result = state.telegram.get_updates(offset) => result,
            _ = shutdown.changed() => {
                info!("🤖 Bot command loop shutting down");
                return;
            }
        };

        let updates = match poll {
            Ok(updates) => updates,
            Err(e) => {
                error!("🤖 getUpdates failed: {}. Retrying in {}s", e, POLL_ERROR_BACKOFF.as_secs());
                tokio::select! {
                    _ = sleep(POLL_ERROR_BACKOFF) => continue,
                    _ = shutdown.changed() => {
                        info!("🤖 Bot command loop shutting down");
                        return;
                    }
                }
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            if message.text.is_none() {
                warn!("🤖 Ignoring non-text message in chat {}", message.chat.id);
                continue;
            }
            handle_message(&state, &message).await;
        }
    }
}
