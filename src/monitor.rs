// src/monitor.rs
//
// The poll scheduler: fetch -> normalize -> diff -> notify -> heartbeat.
// One cycle per poll period; a failed cycle logs, skips the heartbeat touch
// and retries after a short backoff so silence detection can still fire
// during a sustained vendor outage.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::state::MonitorState;
use crate::types::{ChangeEvent, PriceRecord, ProductRef};

const FAILURE_BACKOFF: Duration = Duration::from_secs(60);

/// Applies the configured allow-lists. Empty lists mean "monitor everything".
fn filter_watched(state: &MonitorState, products: Vec<ProductRef>) -> Vec<ProductRef> {
    let offers = &state.settings.monitor_offer_ids;
    let product_ids = &state.settings.monitor_product_ids;
    if offers.is_empty() && product_ids.is_empty() {
        return products;
    }
    products
        .into_iter()
        .filter(|p| offers.contains(&p.offer_id) || product_ids.contains(&p.product_id))
        .collect()
}

pub fn build_change_message(events: &[ChangeEvent]) -> String {
    let mut lines = Vec::with_capacity(events.len() + 1);
    lines.push(format!("💰 <b>Price changes detected ({})</b>", events.len()));
    for event in events {
        let arrow = if event.new_price > event.old_price {
            "🔺"
        } else {
            "🔻"
        };
        lines.push(format!(
            "{} {}: {} → {}",
            arrow, event.offer_id, event.old_price, event.new_price
        ));
    }
    lines.join("\n")
}

/// Runs one complete poll cycle. Returns the detected changes, or an error
/// string describing why the cycle was abandoned.
pub async fn run_poll_cycle(state: &MonitorState) -> Result<Vec<ChangeEvent>, String> {
    let products = state.ozon.list_products().await;
    if products.is_empty() {
        return Err("product listing unavailable or empty".to_string());
    }

    let watched = filter_watched(state, products);
    if watched.is_empty() {
        return Err("no products match the configured watch lists".to_string());
    }

    // Offers are priced by offer_id; listings without one fall back to
    // their numeric product_id.
    let mut offer_ids: Vec<String> = Vec::new();
    let mut product_ids: Vec<i64> = Vec::new();
    for p in &watched {
        if !p.offer_id.is_empty() {
            offer_ids.push(p.offer_id.clone());
        } else if p.product_id > 0 {
            product_ids.push(p.product_id);
        }
    }

    let records: Vec<PriceRecord> = state.ozon.product_prices(&offer_ids, &product_ids).await;
    if records.is_empty() {
        return Err("price fetch returned no usable records".to_string());
    }

    let observations: Vec<(String, i64)> = records
        .iter()
        .map(|r| (r.offer_id.clone(), r.buyer_price))
        .collect();

    let events = {
        let mut detector = state.prices.lock().await;
        detector.detect(&observations)
    };

    if !events.is_empty() {
        info!("[MONITOR] {} price change(s) detected", events.len());
        let message = build_change_message(&events);
        if state.settings.admin_ids.is_empty() {
            warn!("[MONITOR] Changes detected but ADMIN_IDS is empty, nobody to notify");
        } else {
            state
                .telegram
                .notify(&state.settings.admin_ids, &message)
                .await;
        }
    }

    let mut hb = state.heartbeat.lock().await;
    hb.mark_cycle();

    Ok(events)
}

/// The monitor service loop. Exits only on the shutdown signal.
pub async fn run_price_monitor_service(state: MonitorState, mut shutdown: watch::Receiver<bool>) {
    if !state.settings.ozon_configured() {
        warn!("[MONITOR] OZON_CLIENT_ID / OZON_API_KEY not set, price monitoring disabled");
        return;
    }

    info!(
        "[MONITOR] Service started. Poll period: {}s, watched offers: {}, watched products: {}",
        state.settings.poll_period.as_secs(),
        state.settings.monitor_offer_ids.len(),
        state.settings.monitor_product_ids.len(),
    );

    loop {
        let delay = match run_poll_cycle(&state).await {
            Ok(events) => {
                info!(
                    "[MONITOR] Cycle complete, {} change(s). Next poll in {}s",
                    events.len(),
                    state.settings.poll_period.as_secs()
                );
                state.settings.poll_period
            }
            Err(e) => {
                error!(
                    "[MONITOR] Cycle failed: {}. Retrying in {}s",
                    e,
                    FAILURE_BACKOFF.as_secs()
                );
                FAILURE_BACKOFF
            }
        };

        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown.changed() => {
                info!("[MONITOR] Service shutting down");
                return;
            }
        }
    }
}
