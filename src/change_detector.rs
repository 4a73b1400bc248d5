// src/change_detector.rs
use std::collections::HashMap;
use tracing::debug;

use crate::types::ChangeEvent;

/// Per-offer memory of the last observed buyer price.
///
/// Entries are created on first observation and overwritten on change;
/// offers that disappear from the catalog keep their last price for the
/// lifetime of the process.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    previous: HashMap<String, i64>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares fresh observations against stored state.
    ///
    /// First observation of an offer stores the price and emits nothing.
    /// A stored price that differs (strict integer inequality) emits one
    /// event and the stored value is replaced. Events come out in the
    /// iteration order of `observations`.
    pub fn detect(&mut self, observations: &[(String, i64)]) -> Vec<ChangeEvent> {
        let mut events = Vec::new();

        for (offer_id, price) in observations {
            match self.previous.get(offer_id) {
                None => {
                    debug!("[DETECTOR] First observation of {}: {}", offer_id, price);
                    self.previous.insert(offer_id.clone(), *price);
                }
                Some(last) if last != price => {
                    events.push(ChangeEvent {
                        offer_id: offer_id.clone(),
                        old_price: *last,
                        new_price: *price,
                    });
                    self.previous.insert(offer_id.clone(), *price);
                }
                Some(_) => {}
            }
        }

        events
    }

    pub fn tracked_offers(&self) -> usize {
        self.previous.len()
    }

    pub fn last_price(&self, offer_id: &str) -> Option<i64> {
        self.previous.get(offer_id).copied()
    }
}
