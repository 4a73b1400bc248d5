// src/state.rs
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::change_detector::ChangeDetector;
use crate::config::Settings;
use crate::heartbeat::HeartbeatTracker;
use crate::ozon_client::OzonClient;
use crate::telegram::TelegramClient;

/// All shared state, built once in `main` and handed to every loop.
///
/// The loops run on a multi-threaded runtime, so the mutable pieces sit
/// behind async mutexes instead of relying on cooperative scheduling.
#[derive(Clone)]
pub struct MonitorState {
    pub settings: Arc<Settings>,
    pub ozon: Arc<OzonClient>,
    pub telegram: Arc<TelegramClient>,
    pub prices: Arc<Mutex<ChangeDetector>>,
    pub heartbeat: Arc<Mutex<HeartbeatTracker>>,
}

impl MonitorState {
    pub fn new(settings: Settings) -> Self {
        let ozon = OzonClient::new(&settings.ozon_client_id, &settings.ozon_api_key);
        let telegram = TelegramClient::new(&settings.tg_token);
        let heartbeat = HeartbeatTracker::new(settings.heartbeat_threshold);

        Self {
            settings: Arc::new(settings),
            ozon: Arc::new(ozon),
            telegram: Arc::new(telegram),
            prices: Arc::new(Mutex::new(ChangeDetector::new())),
            heartbeat: Arc::new(Mutex::new(heartbeat)),
        }
    }

    /// Variant for tests that point the clients at mock servers.
    pub fn with_clients(settings: Settings, ozon: OzonClient, telegram: TelegramClient) -> Self {
        let heartbeat = HeartbeatTracker::new(settings.heartbeat_threshold);
        Self {
            settings: Arc::new(settings),
            ozon: Arc::new(ozon),
            telegram: Arc::new(telegram),
            prices: Arc::new(Mutex::new(ChangeDetector::new())),
            heartbeat: Arc::new(Mutex::new(heartbeat)),
        }
    }
}
