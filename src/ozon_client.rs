// src/ozon_client.rs
//
// Thin client for the Ozon seller API. Failures never propagate to the
// scheduler: a non-200 response or a transport error is logged and the
// caller gets an empty collection back.

use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::normalizer::normalize_price;
use crate::types::{PriceRecord, ProductRef};

const DEFAULT_BASE_URL: &str = "https://api-seller.ozon.ru";
const LIST_PAGE_LIMIT: usize = 1000;
const PRICE_BATCH_LIMIT: usize = 90;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct OzonClient {
    client: HttpClient,
    base_url: String,
    client_id: String,
    api_key: String,
}

impl OzonClient {
    pub fn new(client_id: &str, api_key: &str) -> Self {
        Self::with_base_url(client_id, api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client_id: &str, api_key: &str, base_url: &str) -> Self {
        Self {
            client: HttpClient::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| HttpClient::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn post_json(&self, path: &str, body: &Value) -> Option<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = match self
            .client
            .post(&url)
            .header("Client-Id", &self.client_id)
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                error!("[OZON] Request to {} failed: {}", path, e);
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let err_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!("[OZON] {} returned status {}: {}", path, status, err_body);
            return None;
        }

        match response.json::<Value>().await {
            Ok(value) => Some(value),
            Err(e) => {
                error!("[OZON] Failed to decode {} response: {}", path, e);
                None
            }
        }
    }

    /// Fetches the full product listing, following the `last_id` cursor.
    /// Returns an empty vec on any failure.
    pub async fn list_products(&self) -> Vec<ProductRef> {
        let mut items: Vec<ProductRef> = Vec::new();
        let mut last_id = String::new();

        loop {
            let body = json!({
                "filter": {"visibility": "ALL"},
                "last_id": last_id,
                "limit": LIST_PAGE_LIMIT,
            });

            let Some(data) = self.post_json("/v3/product/list", &body).await else {
                return Vec::new();
            };

            let result = data.get("result").cloned().unwrap_or(Value::Null);
            let chunk: Vec<ProductRef> = result
                .get("items")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|item| serde_json::from_value(item.clone()).ok())
                        .collect()
                })
                .unwrap_or_default();

            if chunk.is_empty() {
                break;
            }
            let full_page = chunk.len() == LIST_PAGE_LIMIT;
            items.extend(chunk);

            last_id = result
                .get("last_id")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            if last_id.is_empty() && !full_page {
                break;
            }
            if last_id.is_empty() {
                // Full page without a cursor would loop on the same offset
                // forever, so stop here.
                warn!("[OZON] Full listing page without last_id cursor, stopping pagination");
                break;
            }
        }

        debug!("[OZON] Listed {} products", items.len());
        items
    }

    /// Fetches normalized price records for the given identifiers, batching
    /// requests to the vendor's limit. Records without a positive buyer
    /// price are dropped (unknown price, not a free item).
    pub async fn product_prices(
        &self,
        offer_ids: &[String],
        product_ids: &[i64],
    ) -> Vec<PriceRecord> {
        let mut records: Vec<PriceRecord> = Vec::new();

        let batches = batch_identifiers(offer_ids, product_ids, PRICE_BATCH_LIMIT);
        for (offers, products) in batches {
            let body = json!({
                "filter": {
                    "offer_id": offers,
                    "product_id": products,
                    "visibility": "ALL",
                },
                "limit": PRICE_BATCH_LIMIT,
                "cursor": "",
            });

            let Some(data) = self.post_json("/v5/product/info/prices", &body).await else {
                return Vec::new();
            };

            let items = data
                .get("items")
                .or_else(|| data.get("result").and_then(|r| r.get("items")))
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();

            for item in &items {
                let product_id = item.get("product_id").and_then(|v| v.as_i64()).unwrap_or(0);
                // An empty offer_id falls back to the numeric product id so
                // the record still keys into the price state.
                let offer_id = item
                    .get("offer_id")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| product_id.to_string());

                let empty = Value::Null;
                let price_block = item.get("price").unwrap_or(&empty);
                let normalized = normalize_price(price_block);
                if normalized.buyer_price <= 0 {
                    debug!("[OZON] Skipping {} - no usable price", offer_id);
                    continue;
                }

                records.push(PriceRecord {
                    offer_id,
                    product_id,
                    buyer_price: normalized.buyer_price,
                    old_price: normalized.old_price,
                    discount_percent: normalized.discount_percent,
                });
            }
        }

        debug!("[OZON] Fetched {} price records", records.len());
        records
    }
}

/// Splits offer and product identifier lists into aligned request batches of
/// at most `limit` identifiers each. Offer ids are consumed first.
fn batch_identifiers(
    offer_ids: &[String],
    product_ids: &[i64],
    limit: usize,
) -> Vec<(Vec<String>, Vec<i64>)> {
    let mut batches = Vec::new();
    for chunk in offer_ids.chunks(limit) {
        batches.push((chunk.to_vec(), Vec::new()));
    }
    for chunk in product_ids.chunks(limit) {
        batches.push((Vec::new(), chunk.to_vec()));
    }
    if batches.is_empty() {
        batches.push((Vec::new(), Vec::new()));
    }
    batches
}
