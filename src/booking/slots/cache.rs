// Availability snapshot cache
//
// Read-mostly memoization of per (staff, date) snapshots with a TTL. Writers
// invalidate only the keys they touched. Every invalidation draws a new
// generation from one counter; a reader that started building a snapshot
// before the key was invalidated holds an older generation and its insert is
// dropped. Expired entries and invalidation records are pruned on write, so
// both maps only hold keys touched within the last TTL.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::booking::slots::AvailabilitySnapshot;
use crate::booking::types::StaffId;

pub type SnapshotKey = (StaffId, NaiveDate);

#[derive(Debug, Clone)]
struct CachedSnapshot {
    snapshot: Arc<AvailabilitySnapshot>,
    loaded_at: Instant,
}

impl CachedSnapshot {
    fn is_stale(&self, ttl: Duration) -> bool {
        self.loaded_at.elapsed() > ttl
    }
}

#[derive(Debug, Clone, Copy)]
struct Invalidation {
    generation: u64,
    at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<SnapshotKey, CachedSnapshot>,
    invalidations: HashMap<SnapshotKey, Invalidation>,
    generation: u64,
    /// Highest generation among pruned invalidation records
    pruned_floor: u64,
}

impl CacheState {
    /// Generation of the key's latest invalidation. Keys whose record was
    /// pruned report the floor, which can only reject more inserts.
    fn invalidated_at(&self, key: &SnapshotKey) -> u64 {
        self.invalidations
            .get(key)
            .map(|i| i.generation)
            .unwrap_or(self.pruned_floor)
    }

    fn prune(&mut self, ttl: Duration) {
        self.entries.retain(|_, cached| !cached.is_stale(ttl));

        let mut floor = self.pruned_floor;
        self.invalidations.retain(|_, invalidation| {
            let keep = invalidation.at.elapsed() <= ttl;
            if !keep {
                floor = floor.max(invalidation.generation);
            }
            keep
        });
        self.pruned_floor = floor;
    }
}

/// TTL cache of availability snapshots with per-key invalidation
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    state: Arc<RwLock<CacheState>>,
    ttl: Duration,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(CacheState::default())),
            ttl,
        }
    }

    /// Fresh snapshot for the key, if any
    pub async fn get(&self, key: &SnapshotKey) -> Option<Arc<AvailabilitySnapshot>> {
        let state = self.state.read().await;
        state
            .entries
            .get(key)
            .filter(|cached| !cached.is_stale(self.ttl))
            .map(|cached| Arc::clone(&cached.snapshot))
    }

    /// Generation to hand back to `insert_if_current` after loading
    pub async fn version(&self, _key: &SnapshotKey) -> u64 {
        self.state.read().await.generation
    }

    /// Store a snapshot unless the key was invalidated after `version` was read.
    /// Returns whether the snapshot was stored.
    pub async fn insert_if_current(
        &self,
        key: SnapshotKey,
        version: u64,
        snapshot: Arc<AvailabilitySnapshot>,
    ) -> bool {
        let mut state = self.state.write().await;
        state.prune(self.ttl);

        if state.invalidated_at(&key) > version {
            tracing::debug!(staff_id = key.0, date = %key.1, "Discarding snapshot built before invalidation");
            return false;
        }

        state.entries.insert(
            key,
            CachedSnapshot {
                snapshot,
                loaded_at: Instant::now(),
            },
        );
        true
    }

    /// Drop one key and record its invalidation under a new generation
    pub async fn invalidate(&self, key: SnapshotKey) {
        let mut state = self.state.write().await;
        state.prune(self.ttl);

        state.generation += 1;
        let generation = state.generation;
        state.entries.remove(&key);
        state.invalidations.insert(
            key,
            Invalidation {
                generation,
                at: Instant::now(),
            },
        );
        tracing::debug!(staff_id = key.0, date = %key.1, "Invalidated availability snapshot");
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
