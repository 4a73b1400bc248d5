// src/telegram.rs
use futures::future::join_all;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

/// Hard Telegram limit is 4096; stay under it with headroom for separators.
pub const MAX_MESSAGE_LEN: usize = 4000;

const LONG_POLL_SECONDS: u64 = 30;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("telegram request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("telegram API returned status {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    #[serde(default)]
    result: Vec<Update>,
}

pub struct TelegramClient {
    client: HttpClient,
    base_url: String,
    token: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self::with_base_url(token, "https://api.telegram.org")
    }

    pub fn with_base_url(token: &str, base_url: &str) -> Self {
        Self {
            // Long polling holds the connection open for LONG_POLL_SECONDS,
            // so the client timeout must sit above it.
            client: HttpClient::builder()
                .timeout(Duration::from_secs(LONG_POLL_SECONDS + 60))
                .build()
                .unwrap_or_else(|_| HttpClient::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// Sends one HTML-formatted message to a single chat.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TelegramError::Api {
                status: status.as_u16(),
                body,
            });
        }

        debug!("📱 Message sent to chat {}", chat_id);
        Ok(())
    }

    /// Delivers `text` to every recipient, chunked to the message limit.
    /// Recipients are delivered concurrently; a failure for one is logged
    /// and does not block the others. Chunks within one chat stay
    /// sequential so they arrive in order.
    pub async fn notify(&self, recipients: &[i64], text: &str) {
        let chunks = chunk_message(text, MAX_MESSAGE_LEN);
        let chunks = &chunks;

        let deliveries = recipients.iter().map(|&chat_id| async move {
            for chunk in chunks {
                if let Err(e) = self.send_message(chat_id, chunk).await {
                    error!("📱 Delivery to chat {} failed: {}", chat_id, e);
                    break;
                }
            }
        });
        join_all(deliveries).await;

        info!(
            "📱 Notification fan-out complete: {} chunk(s) to {} recipient(s)",
            chunks.len(),
            recipients.len()
        );
    }

    /// Long-polls for new updates past `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError> {
        let payload = json!({
            "offset": offset,
            "timeout": LONG_POLL_SECONDS,
            "allowed_updates": ["message"],
        });

        let response = self
            .client
            .post(self.method_url("getUpdates"))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TelegramError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let updates: UpdatesResponse = response.json().await?;
        Ok(updates.result)
    }
}

/// Greedily packs whole lines into chunks of at most `limit` characters.
/// A single line longer than the limit is hard-split rather than dropped.
pub fn chunk_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if line.len() > limit {
            // Flush what we have, then split the oversized line itself.
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let mut rest = line;
            while rest.len() > limit {
                let mut cut = limit;
                while !rest.is_char_boundary(cut) {
                    cut -= 1;
                }
                chunks.push(rest[..cut].to_string());
                rest = &rest[cut..];
            }
            current = rest.to_string();
            continue;
        }

        let needed = if current.is_empty() {
            line.len()
        } else {
            current.len() + 1 + line.len()
        };
        if needed > limit {
            chunks.push(std::mem::take(&mut current));
            current = line.to_string();
        } else {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_short_text_is_single_chunk() {
        let chunks = chunk_message("hello\nworld", 4000);
        assert_eq!(chunks, vec!["hello\nworld".to_string()]);
    }

    #[test]
    fn test_chunk_large_text_preserves_lines() {
        // ~10,000 characters of line-delimited text
        let lines: Vec<String> = (0..250).map(|i| format!("offer-{:04}: {:>30}", i, i * 7)).collect();
        let text = lines.join("\n");
        assert!(text.len() >= 10_000);

        let chunks = chunk_message(&text, 4000);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.len() <= 4000));

        let reassembled: Vec<&str> = chunks.iter().flat_map(|c| c.lines()).collect();
        let original: Vec<&str> = text.lines().collect();
        assert_eq!(reassembled, original);
    }

    #[test]
    fn test_chunk_oversized_single_line_is_split() {
        let text = "x".repeat(9000);
        let chunks = chunk_message(&text, 4000);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= 4000));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_chunk_empty_text() {
        assert!(chunk_message("", 4000).is_empty());
    }
}
