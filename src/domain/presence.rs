use super::booking::ItemRef;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Viewers not heard from within this many seconds stop counting.
pub const DEFAULT_PRESENCE_TTL_SECS: i64 = 60;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Heartbeat {
    pub item: ItemRef,
    pub viewer_id: String,
    pub seen_at: DateTime<Utc>,
    /// A viewer closing the page sends a final heartbeat with `leaving` set.
    #[serde(default)]
    pub leaving: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Mark {
    seen_at: DateTime<Utc>,
    present: bool,
}

/// Last-write-wins map of who is looking at which item.
#[derive(Debug, Default, Clone)]
pub struct PresenceMap {
    items: HashMap<ItemRef, HashMap<String, Mark>>,
}

impl PresenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a heartbeat. Returns `true` if it changed the map; stale
    /// heartbeats (older than what is already recorded) are dropped. On a
    /// timestamp tie a departure beats an arrival.
    pub fn merge(&mut self, heartbeat: &Heartbeat) -> bool {
        let viewers = self.items.entry(heartbeat.item.clone()).or_default();
        let incoming = Mark {
            seen_at: heartbeat.seen_at,
            present: !heartbeat.leaving,
        };
        match viewers.get(&heartbeat.viewer_id) {
            Some(current)
                if current.seen_at > incoming.seen_at
                    || (current.seen_at == incoming.seen_at
                        && (incoming.present || !current.present)) =>
            {
                false
            }
            _ => {
                viewers.insert(heartbeat.viewer_id.clone(), incoming);
                true
            }
        }
    }

    pub fn viewer_count(&self, item: &ItemRef, now: DateTime<Utc>, ttl: Duration) -> usize {
        self.items
            .get(item)
            .map(|viewers| {
                viewers
                    .values()
                    .filter(|m| m.present && now - m.seen_at <= ttl)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Drops marks older than `ttl`, including departure marks.
    pub fn prune(&mut self, now: DateTime<Utc>, ttl: Duration) {
        for viewers in self.items.values_mut() {
            viewers.retain(|_, m| now - m.seen_at <= ttl);
        }
        self.items.retain(|_, viewers| !viewers.is_empty());
    }
}
