// src/heartbeat.rs
//
// Dead-man style liveness tracking for the polling loops. Anything that
// proves the process is doing useful work calls `touch`; a watcher task
// classifies the silence and pages the configured chat when it grows past
// the threshold.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::state::MonitorState;
use crate::types::{HealthSnapshot, HeartbeatStatus};

const WATCHER_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct HeartbeatTracker {
    last_activity: DateTime<Utc>,
    last_cycle_at: Option<DateTime<Utc>>,
    last_alert_at: Option<DateTime<Utc>>,
    threshold: ChronoDuration,
}

impl HeartbeatTracker {
    pub fn new(threshold: Duration) -> Self {
        Self {
            last_activity: Utc::now(),
            last_cycle_at: None,
            last_alert_at: None,
            threshold: ChronoDuration::from_std(threshold)
                .unwrap_or_else(|_| ChronoDuration::minutes(30)),
        }
    }

    /// Records activity. `last_activity` never moves backwards, so stale
    /// callers cannot shrink the liveness window.
    pub fn touch(&mut self, reason: &str) {
        let now = Utc::now();
        if now > self.last_activity {
            self.last_activity = now;
        }
        tracing::debug!("[HEARTBEAT] touch ({})", reason);
    }

    /// Marks one completed poll cycle (also counts as activity).
    pub fn mark_cycle(&mut self) {
        self.touch("poll_cycle");
        self.last_cycle_at = Some(Utc::now());
    }

    pub fn mark_alert(&mut self) {
        self.last_alert_at = Some(Utc::now());
    }

    pub fn status(&self, now: DateTime<Utc>) -> HeartbeatStatus {
        let silence = now - self.last_activity;
        if silence <= self.threshold {
            HeartbeatStatus::Ok
        } else if silence <= self.threshold * 2 {
            HeartbeatStatus::Warn
        } else {
            HeartbeatStatus::Silent
        }
    }

    pub fn is_silent_past_threshold(&self, now: DateTime<Utc>) -> bool {
        now - self.last_activity > self.threshold
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> HealthSnapshot {
        HealthSnapshot {
            status: self.status(now),
            last_activity: self.last_activity,
            last_cycle_at: self.last_cycle_at,
            last_alert_at: self.last_alert_at,
        }
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn last_cycle_at(&self) -> Option<DateTime<Utc>> {
        self.last_cycle_at
    }
}

/// One watcher evaluation. When the silence window is exceeded it sends a
/// single alert, then touches the tracker so the next alert can only fire
/// after a full silence window elapses again. Returns true when silence
/// was detected.
pub async fn evaluate_heartbeat(state: &MonitorState) -> bool {
    let threshold_mins = state.settings.heartbeat_threshold.as_secs() / 60;

    let now = Utc::now();
    let silent = {
        let hb = state.heartbeat.lock().await;
        hb.is_silent_past_threshold(now)
    };
    if !silent {
        return false;
    }

    let Some(chat_id) = state.settings.heartbeat_chat_id else {
        warn!("[HEARTBEAT] Silence past threshold but HEARTBEAT_CHAT_ID is not set");
        let mut hb = state.heartbeat.lock().await;
        hb.touch("heartbeat_alert_skipped");
        return true;
    };

    let (last_activity, last_cycle) = {
        let hb = state.heartbeat.lock().await;
        (hb.last_activity(), hb.last_cycle_at())
    };
    let message = format!(
        "🚨 <b>Monitor silent</b>\n\
        No activity for over {} minutes.\n\
        Last activity: {}\n\
        Last completed cycle: {}",
        threshold_mins,
        last_activity.format("%Y-%m-%d %H:%M:%S UTC"),
        last_cycle
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string()),
    );

    if let Err(e) = state.telegram.send_message(chat_id, &message).await {
        // Delivery failure must not kill the watcher; the touch below
        // still throttles the next attempt to one silence window.
        error!("[HEARTBEAT] Failed to deliver silence alert: {}", e);
    } else {
        info!("[HEARTBEAT] Silence alert sent to chat {}", chat_id);
    }

    let mut hb = state.heartbeat.lock().await;
    hb.mark_alert();
    hb.touch("heartbeat_alert");
    true
}

/// Watcher loop. Checks the silence window every 60 seconds.
pub async fn run_heartbeat_watcher(state: MonitorState, mut shutdown: watch::Receiver<bool>) {
    info!(
        "[HEARTBEAT] Watcher started. Threshold: {}m, check every {}s",
        state.settings.heartbeat_threshold.as_secs() / 60,
        WATCHER_INTERVAL.as_secs()
    );

    let mut ticker = interval(WATCHER_INTERVAL);
    ticker.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                info!("[HEARTBEAT] Watcher shutting down");
                return;
            }
        }

        evaluate_heartbeat(&state).await;
    }
}
