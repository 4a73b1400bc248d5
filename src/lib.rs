// src/lib.rs
pub mod bot;
pub mod change_detector;
pub mod config;
pub mod heartbeat;
pub mod monitor;
pub mod normalizer;
pub mod ozon_client;
pub mod state;
pub mod telegram;
pub mod types;
