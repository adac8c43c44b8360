//! Deduplicator: selects the strictly-new events of a fetched batch.
//!
//! The watermark is a timestamp cursor: an event created at or before it has
//! already been delivered. Within a batch, the first occurrence of an
//! identifier (in provider order) wins, and the result is sorted oldest →
//! newest with ties kept in provider order.

use std::collections::HashSet;

use repowatch_core::types::{RawEvent, Watermark};

/// Return the unseen subset of `raw`, ordered oldest → newest.
pub fn filter(watermark: Option<&Watermark>, raw: Vec<RawEvent>) -> Vec<RawEvent> {
    let mut seen = HashSet::with_capacity(raw.len());
    let mut fresh: Vec<RawEvent> = raw
        .into_iter()
        .filter(|e| !watermark.is_some_and(|w| w.covers(e.created_at)))
        .filter(|e| seen.insert(e.id.clone()))
        .collect();
    // Stable: equal timestamps keep provider order.
    fresh.sort_by_key(|e| e.created_at);
    fresh
}

/// Watermark after delivering `delivered`: the max of the current one and
/// the newest delivered event. Never moves backwards.
pub fn advance(current: Option<Watermark>, delivered: &[RawEvent]) -> Option<Watermark> {
    let newest = delivered.iter().map(|e| Watermark(e.created_at)).max();
    current.max(newest)
}
