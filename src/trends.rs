//! trends.rs: top-N retrieval, a ranked-set read plus a per-item metadata join.

use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::{TrendError, TrendResult};
use crate::store::{ItemMeta, MetadataJoiner, RankedEntry, RankingReader};

pub const DEFAULT_WINDOW: &str = "5m";
pub const DEFAULT_SIZE: usize = 20;
pub const MAX_SIZE: usize = 100;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("trends_requests_total", "Top-N pipeline invocations.");
        describe_counter!(
            "trends_store_errors_total",
            "Pipeline runs that failed because the store was unavailable."
        );
        describe_histogram!("trends_fetch_ms", "Top-N pipeline latency in milliseconds.");
    });
}

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendItem {
    pub id: String,
    pub title: Option<String>,
    pub score: f64,
    pub sentiment: Option<String>,
    #[serde(rename = "topicId")]
    pub topic_id: Option<String>,
}

impl TrendItem {
    pub fn from_parts(entry: RankedEntry, meta: ItemMeta) -> Self {
        Self {
            id: entry.id,
            title: meta.title,
            score: entry.score,
            sentiment: meta.sentiment,
            topic_id: meta.topic_id,
        }
    }
}

/// Defaults and bounds applied to caller-supplied parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendLimits {
    pub default_window: String,
    pub default_size: usize,
    pub max_size: usize,
}

impl Default for TrendLimits {
    fn default() -> Self {
        Self {
            default_window: DEFAULT_WINDOW.to_string(),
            default_size: DEFAULT_SIZE,
            max_size: MAX_SIZE,
        }
    }
}

impl TrendLimits {
    /// Absent or blank window falls back to the default label. Anything else is used verbatim.
    pub fn normalize_window<'a>(&'a self, window: Option<&'a str>) -> &'a str {
        match window {
            Some(w) if !w.trim().is_empty() => w,
            _ => &self.default_window,
        }
    }

    /// Non-positive sizes get the default, everything else is capped at `max_size`.
    pub fn clamp_size(&self, requested: i64) -> usize {
        if requested <= 0 {
            return self.default_size;
        }
        usize::try_from(requested)
            .unwrap_or(usize::MAX)
            .min(self.max_size)
    }
}

/// Composes a ranking reader and a metadata joiner into "current top N".
#[derive(Clone)]
pub struct TrendService {
    ranking: Arc<dyn RankingReader>,
    meta: Arc<dyn MetadataJoiner>,
    limits: TrendLimits,
}

impl TrendService {
    pub fn new(
        ranking: Arc<dyn RankingReader>,
        meta: Arc<dyn MetadataJoiner>,
        limits: TrendLimits,
    ) -> Self {
        Self {
            ranking,
            meta,
            limits,
        }
    }

    /// Convenience for stores that implement both halves (Redis, memory).
    pub fn from_store<S>(store: Arc<S>, limits: TrendLimits) -> Self
    where
        S: RankingReader + MetadataJoiner + 'static,
    {
        Self::new(store.clone(), store, limits)
    }

    pub fn limits(&self) -> &TrendLimits {
        &self.limits
    }

    /// Read the top entries of `window` and attach metadata to each.
    ///
    /// Joins run concurrently but results are recombined positionally, so the
    /// output order is exactly the ranking order. Dropping the returned future
    /// cancels every in-flight lookup.
    pub async fn get_top_trends(
        &self,
        window: Option<&str>,
        requested_size: i64,
    ) -> TrendResult<Vec<TrendItem>> {
        ensure_metrics_described();
        counter!("trends_requests_total").increment(1);

        let window = self.limits.normalize_window(window);
        let size = self.limits.clamp_size(requested_size);
        let started = Instant::now();

        let res = self.fetch(window, size).await;
        histogram!("trends_fetch_ms").record(started.elapsed().as_secs_f64() * 1000.0);

        match &res {
            Ok(items) => {
                tracing::debug!(target: "trends", window, size, returned = items.len(), "top trends read");
            }
            Err(e) => {
                counter!("trends_store_errors_total").increment(1);
                tracing::warn!(target: "trends", window, size, error = %e, "top trends read failed");
            }
        }
        res
    }

    async fn fetch(&self, window: &str, size: usize) -> TrendResult<Vec<TrendItem>> {
        let ranked = self.ranking.read_top(window, size).await?;
        let joins = ranked.into_iter().map(|entry| async move {
            let meta = self.meta.join(&entry.id).await?;
            Ok::<_, TrendError>(TrendItem::from_parts(entry, meta))
        });
        try_join_all(joins).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn clamp_size_rules() {
        let l = TrendLimits::default();
        assert_eq!(l.clamp_size(0), 20);
        assert_eq!(l.clamp_size(-5), 20);
        assert_eq!(l.clamp_size(i64::MIN), 20);
        assert_eq!(l.clamp_size(10), 10);
        assert_eq!(l.clamp_size(100), 100);
        assert_eq!(l.clamp_size(500), 100);
        assert_eq!(l.clamp_size(i64::MAX), 100);
    }

    #[test]
    fn window_defaulting() {
        let l = TrendLimits::default();
        assert_eq!(l.normalize_window(None), "5m");
        assert_eq!(l.normalize_window(Some("")), "5m");
        assert_eq!(l.normalize_window(Some("   ")), "5m");
        assert_eq!(l.normalize_window(Some("1h")), "1h");
        // Labels are opaque, not validated.
        assert_eq!(l.normalize_window(Some("whatever")), "whatever");
    }

    #[test]
    fn item_serializes_with_camel_case_topic_and_nulls() {
        let item = TrendItem {
            id: "a".into(),
            title: None,
            score: 1.5,
            sentiment: Some("pos".into()),
            topic_id: None,
        };
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "id": "a", "title": null, "score": 1.5, "sentiment": "pos", "topicId": null
            })
        );
    }

    #[tokio::test]
    async fn missing_metadata_keeps_entry() {
        let store = Arc::new(MemoryStore::new());
        store.set_score("5m", "known", 2.0);
        store.set_score("5m", "orphan", 1.0);
        store.set_field("known", "title", "Known item");
        store.set_field("known", "topic_id", "t_misc");

        let svc = TrendService::from_store(store, TrendLimits::default());
        let items = svc.get_top_trends(Some("5m"), 20).await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title.as_deref(), Some("Known item"));
        assert!(items[0].sentiment.is_none());
        assert_eq!(items[1].id, "orphan");
        assert_eq!(items[1].score, 1.0);
        assert!(items[1].title.is_none() && items[1].sentiment.is_none() && items[1].topic_id.is_none());
    }
}
