// src/main.rs
use dotenv::dotenv;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ozon_price_monitor::bot::run_bot_service;
use ozon_price_monitor::config::Settings;
use ozon_price_monitor::heartbeat::run_heartbeat_watcher;
use ozon_price_monitor::monitor::run_price_monitor_service;
use ozon_price_monitor::state::MonitorState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ozon_price_monitor=info,info")),
        )
        .init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("❌ Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    info!("⚙️  Configuration:");
    info!("   👤 Admin recipients: {}", settings.admin_ids.len());
    info!("   🛒 Ozon API configured: {}", settings.ozon_configured());
    info!("   ⏱️ Poll period: {}s", settings.poll_period.as_secs());
    info!(
        "   ❤️ Heartbeat threshold: {}m (alert chat: {})",
        settings.heartbeat_threshold.as_secs() / 60,
        settings
            .heartbeat_chat_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "not set".to_string()),
    );
    info!(
        "   👀 Watch lists: {} offer(s), {} product(s)",
        settings.monitor_offer_ids.len(),
        settings.monitor_product_ids.len()
    );

    let state = MonitorState::new(settings);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let monitor_handle = tokio::spawn(run_price_monitor_service(
        state.clone(),
        shutdown_rx.clone(),
    ));
    let heartbeat_handle = tokio::spawn(run_heartbeat_watcher(state.clone(), shutdown_rx.clone()));
    let bot_handle = tokio::spawn(run_bot_service(state, shutdown_rx));

    info!("✅ Ozon price monitor ready. Commands: /start /ping /prices /health");

    tokio::signal::ctrl_c().await?;
    info!("🛑 Ctrl-C received, shutting down...");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(monitor_handle, heartbeat_handle, bot_handle);
    info!("👋 Shutdown complete");
    Ok(())
}
