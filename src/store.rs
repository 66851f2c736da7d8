use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;

use crate::{
    error::StoreError,
    models::{ClickEvent, ShortUrlRecord},
};

/// A record together with its click log. Kept in one map slot so that a
/// sweep removes both at once.
#[derive(Debug, Clone)]
struct Slot {
    record: ShortUrlRecord,
    clicks: Vec<ClickEvent>,
}

/// Thread-safe in-memory store mapping shortcode -> link record + clicks.
///
/// Backed by a DashMap so reads are concurrent and writes only lock one
/// shard. A shortcode stays taken until the sweep removes its record, even
/// after the record has expired; lookups hide expired records on their own.
#[derive(Clone, Debug, Default)]
pub struct LinkStore {
    inner: Arc<DashMap<String, Slot>>,
}

impl LinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record with an empty click log, unless its shortcode is
    /// already held by a resident record.
    pub fn create(&self, record: ShortUrlRecord) -> Result<(), StoreError> {
        match self.inner.entry(record.shortcode.clone()) {
            Entry::Occupied(_) => Err(StoreError::ShortcodeTaken(record.shortcode)),
            Entry::Vacant(slot) => {
                tracing::info!(
                    shortcode = %record.shortcode,
                    original_url = %record.original_url,
                    expires_at = %record.expires_at,
                    "Short URL created"
                );
                slot.insert(Slot {
                    record,
                    clicks: Vec::new(),
                });
                Ok(())
            }
        }
    }

    /// Look up a live record as of now.
    pub fn lookup(&self, shortcode: &str) -> Option<ShortUrlRecord> {
        self.lookup_at(shortcode, Utc::now())
    }

    /// Look up a record that is still live at `now`. Unknown and expired
    /// codes are indistinguishable to the caller.
    pub fn lookup_at(&self, shortcode: &str, now: DateTime<Utc>) -> Option<ShortUrlRecord> {
        let Some(slot) = self.inner.get(shortcode) else {
            tracing::warn!(shortcode, "Short URL not found");
            return None;
        };

        if !slot.record.is_live_at(now) {
            tracing::warn!(shortcode, expires_at = %slot.record.expires_at, "Short URL expired");
            return None;
        }

        Some(slot.record.clone())
    }

    /// `true` iff no resident record holds this exact code, expired or not.
    pub fn is_shortcode_available(&self, shortcode: &str) -> bool {
        !self.inner.contains_key(shortcode)
    }

    /// Append a click to the code's log. An unknown code is logged and
    /// otherwise ignored so the redirect never fails on it.
    pub fn add_click(&self, shortcode: &str, click: ClickEvent) {
        match self.inner.get_mut(shortcode) {
            Some(mut slot) => {
                tracing::info!(
                    shortcode,
                    referrer = %click.referrer,
                    ip = %click.ip,
                    "Click recorded"
                );
                slot.clicks.push(click);
            }
            None => {
                tracing::error!(shortcode, "Cannot add click - shortcode not found");
            }
        }
    }

    /// Full click log in insertion order; empty for unknown codes.
    pub fn get_clicks(&self, shortcode: &str) -> Vec<ClickEvent> {
        self.inner
            .get(shortcode)
            .map(|slot| slot.clicks.clone())
            .unwrap_or_default()
    }

    /// Every live record with its click count, newest first.
    pub fn list_active(&self, now: DateTime<Utc>) -> Vec<(ShortUrlRecord, usize)> {
        let mut links: Vec<(ShortUrlRecord, usize)> = self
            .inner
            .iter()
            .filter(|slot| slot.record.is_live_at(now))
            .map(|slot| (slot.record.clone(), slot.clicks.len()))
            .collect();
        links.sort_by(|a, b| b.0.created_at.cmp(&a.0.created_at));
        links
    }

    /// Remove every record whose expiry is strictly before `now`, along
    /// with its click log. Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.inner.retain(|_, slot| {
            let keep = slot.record.expires_at >= now;
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            tracing::info!(count = removed, "Cleaned up expired URLs");
        }
        removed
    }

    /// Number of resident records, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}
