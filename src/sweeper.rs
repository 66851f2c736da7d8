use chrono::Utc;
use std::time::Duration;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::store::LinkStore;

/// Spawn the background task that purges expired links every `every`.
/// The first sweep happens one full interval after startup.
pub fn spawn(store: LinkStore, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval() fires immediately; skip that tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = store.sweep(Utc::now());
            tracing::debug!(removed, remaining = store.len(), "Sweep finished");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShortUrlRecord;

    #[tokio::test(start_paused = true)]
    async fn purges_expired_links_on_each_tick() {
        let store = LinkStore::new();
        let long_ago = Utc::now() - chrono::Duration::hours(1);
        store
            .create(ShortUrlRecord::new("https://a.example", "dead01", long_ago, 1))
            .unwrap();
        store
            .create(ShortUrlRecord::new("https://b.example", "live01", Utc::now(), 600))
            .unwrap();

        let handle = spawn(store.clone(), Duration::from_secs(300));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!store.is_shortcode_available("dead01"), "no sweep before first interval");

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(store.is_shortcode_available("dead01"));
        assert!(!store.is_shortcode_available("live01"));

        handle.abort();
    }
}
