// src/store/memory.rs
//! In-process store with the same read semantics as the Redis layout.
//! Used by tests and by the `memory` backend for local runs without Redis.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use super::{finite_score, ItemMeta, MetadataJoiner, RankedEntry, RankingReader, META_FIELDS};
use crate::error::{TrendError, TrendResult};

#[derive(Debug, Default)]
struct Inner {
    // window -> (id -> score)
    rankings: HashMap<String, HashMap<String, f64>>,
    // id -> (field -> value)
    meta: HashMap<String, HashMap<String, String>>,
    join_delays: HashMap<String, Duration>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Set the score of `id` in `window` (ZADD).
    pub fn set_score(&self, window: &str, id: &str, score: f64) {
        self.write()
            .rankings
            .entry(window.to_string())
            .or_default()
            .insert(id.to_string(), score);
    }

    /// Add `delta` to the score of `id` in `window` (ZINCRBY), the way the aggregator does.
    pub fn incr_score(&self, window: &str, id: &str, delta: f64) -> f64 {
        let mut inner = self.write();
        let score = inner
            .rankings
            .entry(window.to_string())
            .or_default()
            .entry(id.to_string())
            .or_insert(0.0);
        *score += delta;
        *score
    }

    /// Write one metadata field (HSET).
    pub fn set_field(&self, id: &str, field: &str, value: &str) {
        self.write()
            .meta
            .entry(id.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    /// Simulate the store going away (or coming back).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make metadata lookups for `id` take `delay` before answering.
    pub fn set_join_delay(&self, id: &str, delay: Duration) {
        self.write().join_delays.insert(id.to_string(), delay);
    }

    fn check_available(&self) -> TrendResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TrendError::StoreUnavailable(
                "memory store marked unavailable".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RankingReader for MemoryStore {
    async fn read_top(&self, window: &str, size: usize) -> TrendResult<Vec<RankedEntry>> {
        self.check_available()?;
        let inner = self.read();
        let Some(set) = inner.rankings.get(window) else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<RankedEntry> = set
            .iter()
            .map(|(id, score)| RankedEntry::new(id.clone(), finite_score(*score)))
            .collect();
        // Reverse range order: score desc, then member desc for ties.
        entries.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.id.cmp(&a.id))
        });
        entries.truncate(size);
        Ok(entries)
    }
}

#[async_trait::async_trait]
impl MetadataJoiner for MemoryStore {
    async fn join(&self, id: &str) -> TrendResult<ItemMeta> {
        let delay = self.read().join_delays.get(id).copied();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.check_available()?;

        let inner = self.read();
        let Some(fields) = inner.meta.get(id) else {
            return Ok(ItemMeta::default());
        };
        let values = META_FIELDS
            .iter()
            .map(|f| fields.get(*f).cloned())
            .collect();
        Ok(ItemMeta::from_values(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_top_orders_desc_and_truncates() {
        let s = MemoryStore::new();
        s.set_score("5m", "a", 1.0);
        s.set_score("5m", "b", 3.0);
        s.set_score("5m", "c", 2.0);

        let top = s.read_top("5m", 2).await.unwrap();
        let ids: Vec<_> = top.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn ties_follow_reverse_member_order() {
        let s = MemoryStore::new();
        s.set_score("5m", "b", 5.0);
        s.set_score("5m", "c", 5.0);
        s.set_score("5m", "a", 9.0);

        let top = s.read_top("5m", 10).await.unwrap();
        let ids: Vec<_> = top.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn incr_accumulates_like_zincrby() {
        let s = MemoryStore::new();
        s.incr_score("5m", "x", 1.0);
        assert_eq!(s.incr_score("5m", "x", 1.0), 2.0);
    }

    #[tokio::test]
    async fn missing_hash_yields_empty_meta() {
        let s = MemoryStore::new();
        s.set_field("a", "title", "Hello");
        assert_eq!(s.join("zzz").await.unwrap(), ItemMeta::default());

        let m = s.join("a").await.unwrap();
        assert_eq!(m.title.as_deref(), Some("Hello"));
        assert!(m.sentiment.is_none());
    }

    #[tokio::test]
    async fn unavailable_fails_both_reads() {
        let s = MemoryStore::new();
        s.set_unavailable(true);
        assert!(matches!(
            s.read_top("5m", 5).await,
            Err(TrendError::StoreUnavailable(_))
        ));
        assert!(matches!(
            s.join("a").await,
            Err(TrendError::StoreUnavailable(_))
        ));
    }
}
