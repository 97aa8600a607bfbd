//! In-memory idempotency store.

use std::time::Duration;

use axum::body::Bytes;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

/// Response stored for replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
enum EntryState {
    Pending,
    Completed(CachedResponse),
}

#[derive(Debug, Clone)]
struct Entry {
    state: EntryState,
    /// Pending: when processing started. Completed: when it finished.
    created_at: Instant,
}

/// Result of a read-only lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit(CachedResponse),
    InProgress,
    Miss,
}

/// What an existing live entry holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExistingEntry {
    Completed(CachedResponse),
    InProgress,
}

/// Result of trying to claim a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    /// The caller now owns the key and must `complete` or `abandon` it.
    Started,
    /// A live entry already exists.
    Existing(ExistingEntry),
    /// The store is full; proceed without idempotency protection.
    Bypassed,
}

/// Store statistics for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct IdempotencyStats {
    pub total_entries: usize,
    pub pending: usize,
    pub completed: usize,
    pub max_entries: usize,
    pub ttl_secs: u64,
}

/// `(scope, key)` → response map with TTL and a capacity ceiling.
///
/// The scope is built by the caller from the route and the tenant.
pub struct IdempotencyStore {
    entries: DashMap<(String, String), Entry>,
    ttl: Duration,
    max_entries: usize,
}

impl IdempotencyStore {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
        }
    }

    fn is_expired(&self, entry: &Entry) -> bool {
        entry.created_at.elapsed() >= self.ttl
    }

    fn scoped(scope: &str, key: &str) -> (String, String) {
        (scope.to_string(), key.to_string())
    }

    pub fn check(&self, scope: &str, key: &str) -> Lookup {
        match self.entries.get(&Self::scoped(scope, key)) {
            Some(entry) if !self.is_expired(&entry) => match &entry.state {
                EntryState::Pending => Lookup::InProgress,
                EntryState::Completed(response) => Lookup::Hit(response.clone()),
            },
            _ => Lookup::Miss,
        }
    }

    /// Atomically move a key from MISS to PENDING.
    ///
    /// New keys are refused once the store holds `max_entries`. A new key that
    /// raced past the ceiling is removed again and reported as `Bypassed`.
    pub fn begin_pending(&self, scope: &str, key: &str) -> BeginOutcome {
        // len() takes every shard lock; it must run before entry() holds one.
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&Self::scoped(scope, key)) {
            return BeginOutcome::Bypassed;
        }

        let outcome = match self.entries.entry(Self::scoped(scope, key)) {
            MapEntry::Occupied(mut occupied) => {
                if self.is_expired(occupied.get()) {
                    occupied.insert(Entry {
                        state: EntryState::Pending,
                        created_at: Instant::now(),
                    });
                    return BeginOutcome::Started;
                }
                match &occupied.get().state {
                    EntryState::Pending => BeginOutcome::Existing(ExistingEntry::InProgress),
                    EntryState::Completed(response) => {
                        BeginOutcome::Existing(ExistingEntry::Completed(response.clone()))
                    }
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry {
                    state: EntryState::Pending,
                    created_at: Instant::now(),
                });
                BeginOutcome::Started
            }
        };
        if outcome != BeginOutcome::Started {
            return outcome;
        }

        if self.entries.len() > self.max_entries {
            self.abandon(scope, key);
            return BeginOutcome::Bypassed;
        }
        BeginOutcome::Started
    }

    /// Store the final response. The TTL counts from now.
    pub fn complete(&self, scope: &str, key: &str, response: CachedResponse) {
        self.entries.insert(
            Self::scoped(scope, key),
            Entry {
                state: EntryState::Completed(response),
                created_at: Instant::now(),
            },
        );
    }

    /// Release a pending key. Completed entries are left alone.
    pub fn abandon(&self, scope: &str, key: &str) {
        self.entries
            .remove_if(&Self::scoped(scope, key), |_, entry| {
                matches!(entry.state, EntryState::Pending)
            });
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.created_at.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> IdempotencyStats {
        let mut pending = 0;
        let mut completed = 0;
        for entry in self.entries.iter() {
            match entry.state {
                EntryState::Pending => pending += 1,
                EntryState::Completed(_) => completed += 1,
            }
        }
        IdempotencyStats {
            total_entries: pending + completed,
            pending,
            completed,
            max_entries: self.max_entries,
            ttl_secs: self.ttl.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTE: &str = "/api/gateway/eway/generate";

    fn response(body: &'static str) -> CachedResponse {
        CachedResponse {
            status: 200,
            content_type: Some("application/json".into()),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    fn store() -> IdempotencyStore {
        IdempotencyStore::new(Duration::from_secs(24 * 3600), 100)
    }

    #[test]
    fn test_pending_complete_hit() {
        let store = store();
        assert_eq!(store.check(ROUTE, "k1"), Lookup::Miss);
        assert_eq!(store.begin_pending(ROUTE, "k1"), BeginOutcome::Started);
        assert_eq!(store.check(ROUTE, "k1"), Lookup::InProgress);
        assert_eq!(
            store.begin_pending(ROUTE, "k1"),
            BeginOutcome::Existing(ExistingEntry::InProgress)
        );

        store.complete(ROUTE, "k1", response(r#"{"ok":true}"#));
        assert_eq!(store.check(ROUTE, "k1"), Lookup::Hit(response(r#"{"ok":true}"#)));
    }

    #[test]
    fn test_abandon_returns_to_miss() {
        let store = store();
        store.begin_pending(ROUTE, "k1");
        store.abandon(ROUTE, "k1");
        assert_eq!(store.check(ROUTE, "k1"), Lookup::Miss);
        assert_eq!(store.begin_pending(ROUTE, "k1"), BeginOutcome::Started);
    }

    #[test]
    fn test_abandon_keeps_completed() {
        let store = store();
        store.begin_pending(ROUTE, "k1");
        store.complete(ROUTE, "k1", response("{}"));
        store.abandon(ROUTE, "k1");
        assert!(matches!(store.check(ROUTE, "k1"), Lookup::Hit(_)));
    }

    #[test]
    fn test_keys_are_route_scoped() {
        let store = store();
        store.begin_pending(ROUTE, "k1");
        store.complete(ROUTE, "k1", response("{}"));
        assert_eq!(store.check("/api/gateway/eway/cancel", "k1"), Lookup::Miss);
    }

    #[test]
    fn test_capacity_bypasses_new_keys() {
        let store = IdempotencyStore::new(Duration::from_secs(60), 2);
        assert_eq!(store.begin_pending(ROUTE, "a"), BeginOutcome::Started);
        assert_eq!(store.begin_pending(ROUTE, "b"), BeginOutcome::Started);
        assert_eq!(store.begin_pending(ROUTE, "c"), BeginOutcome::Bypassed);
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.begin_pending(ROUTE, "a"),
            BeginOutcome::Existing(ExistingEntry::InProgress)
        );
    }

    #[test]
    fn test_concurrent_new_keys_respect_capacity() {
        let store = std::sync::Arc::new(IdempotencyStore::new(Duration::from_secs(60), 8));
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let store = store.clone();
                scope.spawn(move || {
                    for n in 0..50 {
                        store.begin_pending(ROUTE, &format!("w{}-{}", worker, n));
                    }
                });
            }
        });
        assert!(store.len() <= 8);
        assert!(!store.is_empty());
    }

    #[test]
    fn test_tenant_scopes_do_not_collide() {
        let store = store();
        let scope_a = format!("{}#mine-a", ROUTE);
        let scope_b = format!("{}#mine-b", ROUTE);
        store.begin_pending(&scope_a, "same-key");
        store.complete(&scope_a, "same-key", response("{}"));
        assert_eq!(store.begin_pending(&scope_b, "same-key"), BeginOutcome::Started);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_and_sweep() {
        let ttl = Duration::from_secs(24 * 3600);
        let store = IdempotencyStore::new(ttl, 100);
        store.begin_pending(ROUTE, "k1");
        store.complete(ROUTE, "k1", response("{}"));

        tokio::time::advance(ttl - Duration::from_secs(1)).await;
        assert!(matches!(store.check(ROUTE, "k1"), Lookup::Hit(_)));
        assert_eq!(store.sweep_expired(), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.check(ROUTE, "k1"), Lookup::Miss);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_can_be_reclaimed() {
        let store = IdempotencyStore::new(Duration::from_secs(10), 100);
        store.begin_pending(ROUTE, "k1");
        store.complete(ROUTE, "k1", response("{}"));
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.begin_pending(ROUTE, "k1"), BeginOutcome::Started);
    }

    #[test]
    fn test_stats() {
        let store = store();
        store.begin_pending(ROUTE, "a");
        store.begin_pending(ROUTE, "b");
        store.complete(ROUTE, "b", response("{}"));
        let stats = store.stats();
        assert_eq!((stats.pending, stats.completed, stats.total_entries), (1, 1, 2));
        assert_eq!(stats.ttl_secs, 86_400);
    }
}
