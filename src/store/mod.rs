// src/store/mod.rs
//! Read-only access to the ranked sets and item metadata written by the aggregator.
//!
//! Key layout is a contract with the producer and must not change:
//! - ranking: `trend:zset:global:<window>` (sorted set, member = item id)
//! - metadata: `trend:hash:item:<id>` (hash with `title`, `sentiment`, `topic_id`)

pub mod memory;
pub mod redis_store;

use crate::error::TrendResult;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

pub const FIELD_TITLE: &str = "title";
pub const FIELD_SENTIMENT: &str = "sentiment";
pub const FIELD_TOPIC_ID: &str = "topic_id";

/// Fields requested from every metadata hash, in this order.
pub const META_FIELDS: [&str; 3] = [FIELD_TITLE, FIELD_SENTIMENT, FIELD_TOPIC_ID];

pub fn ranking_key(window: &str) -> String {
    format!("trend:zset:global:{window}")
}

pub fn item_meta_key(id: &str) -> String {
    format!("trend:hash:item:{id}")
}

/// One member of a ranked set as returned by a reverse range read.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub id: String,
    pub score: f64,
}

impl RankedEntry {
    pub fn new(id: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// Metadata for one item. Any field the producer never wrote stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemMeta {
    pub title: Option<String>,
    pub sentiment: Option<String>,
    pub topic_id: Option<String>,
}

impl ItemMeta {
    /// Build from the positional values of a `[title, sentiment, topic_id]` lookup.
    pub fn from_values(mut values: Vec<Option<String>>) -> Self {
        values.resize(META_FIELDS.len(), None);
        let mut it = values.into_iter();
        Self {
            title: it.next().flatten(),
            sentiment: it.next().flatten(),
            topic_id: it.next().flatten(),
        }
    }
}

/// Reads the top entries of a window's ranked set.
///
/// `size` is already clamped by the caller; implementations return at most
/// `size` entries ordered by score descending, and an empty vec for an
/// unknown window.
#[async_trait::async_trait]
pub trait RankingReader: Send + Sync {
    async fn read_top(&self, window: &str, size: usize) -> TrendResult<Vec<RankedEntry>>;
}

/// Looks up the metadata hash of a single item.
///
/// A missing hash is not an error; it yields `ItemMeta::default()`.
#[async_trait::async_trait]
pub trait MetadataJoiner: Send + Sync {
    async fn join(&self, id: &str) -> TrendResult<ItemMeta>;
}

/// Scores that cannot be parsed count as zero.
pub(crate) fn parse_score(raw: &str) -> f64 {
    raw.trim().parse::<f64>().map_or(0.0, finite_score)
}

/// JSON has no infinities: `+inf`/`-inf` members pin to the largest finite
/// values so they still sort first/last and serialize as numbers.
pub(crate) fn finite_score(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(f64::MIN, f64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_producer_layout() {
        assert_eq!(ranking_key("5m"), "trend:zset:global:5m");
        assert_eq!(ranking_key("1h"), "trend:zset:global:1h");
        assert_eq!(item_meta_key("abc"), "trend:hash:item:abc");
    }

    #[test]
    fn malformed_scores_become_zero() {
        assert_eq!(parse_score("3.5"), 3.5);
        assert_eq!(parse_score(" 2 "), 2.0);
        assert_eq!(parse_score("not-a-number"), 0.0);
        assert_eq!(parse_score(""), 0.0);
        assert_eq!(parse_score("nan"), 0.0);
    }

    #[test]
    fn infinite_scores_stay_finite() {
        assert_eq!(parse_score("inf"), f64::MAX);
        assert_eq!(parse_score("+inf"), f64::MAX);
        assert_eq!(parse_score("-inf"), f64::MIN);
        assert_eq!(finite_score(f64::NAN), 0.0);
    }

    #[test]
    fn meta_from_short_or_empty_values() {
        let m = ItemMeta::from_values(vec![Some("t".into())]);
        assert_eq!(m.title.as_deref(), Some("t"));
        assert!(m.sentiment.is_none());
        assert!(m.topic_id.is_none());

        assert_eq!(ItemMeta::from_values(vec![]), ItemMeta::default());
    }
}
