use crate::domain::booking::ItemRef;
use crate::domain::presence::{Heartbeat, PresenceMap};
use chrono::{Duration, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};

const UPDATE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
pub struct PresenceUpdate {
    pub item: ItemRef,
    pub viewers: usize,
}

/// Live "N people are looking at this" counts.
pub struct PresenceTracker {
    map: RwLock<PresenceMap>,
    ttl: Duration,
    updates: broadcast::Sender<PresenceUpdate>,
}

impl PresenceTracker {
    pub fn new(ttl_secs: i64) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            map: RwLock::new(PresenceMap::new()),
            ttl: Duration::seconds(ttl_secs),
            updates,
        }
    }

    /// Merges a heartbeat and returns the item's current viewer count.
    /// Accepted heartbeats are published to subscribers. Timestamps from
    /// the future are clamped to now.
    pub async fn heartbeat(&self, mut heartbeat: Heartbeat) -> usize {
        let now = Utc::now();
        heartbeat.seen_at = heartbeat.seen_at.min(now);
        let mut map = self.map.write().await;
        let changed = map.merge(&heartbeat);
        map.prune(now, self.ttl);
        let viewers = map.viewer_count(&heartbeat.item, now, self.ttl);
        drop(map);

        if changed {
            // No subscribers is fine.
            let _ = self.updates.send(PresenceUpdate {
                item: heartbeat.item,
                viewers,
            });
        }
        viewers
    }

    pub async fn viewers(&self, item: &ItemRef) -> usize {
        self.map
            .read()
            .await
            .viewer_count(item, Utc::now(), self.ttl)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresenceUpdate> {
        self.updates.subscribe()
    }
}
