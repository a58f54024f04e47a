// src/store/redis_store.rs
use std::future::Future;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::Value;
use tokio::sync::OnceCell;

use super::{
    item_meta_key, parse_score, ranking_key, ItemMeta, MetadataJoiner, RankedEntry,
    RankingReader, META_FIELDS,
};
use crate::error::{TrendError, TrendResult};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Redis-backed reader. The connection is opened on first use and shared by
/// every request and stream afterwards; the manager reconnects on its own.
/// Each command is bounded by `timeout`.
pub struct RedisStore {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    timeout: Duration,
}

impl RedisStore {
    /// Only the URL is checked here. An unreachable server surfaces later as
    /// `StoreUnavailable` on the call that needs it, and the next call retries.
    pub fn new(url: &str, timeout: Duration) -> TrendResult<Self> {
        let client = redis::Client::open(url)?;
        tracing::info!(target: "trends", url = %redact(url), ?timeout, "redis store configured");
        Ok(Self {
            client,
            conn: OnceCell::new(),
            timeout,
        })
    }

    async fn conn(&self) -> TrendResult<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| bounded(self.timeout, ConnectionManager::new(self.client.clone())))
            .await?;
        Ok(conn.clone())
    }
}

async fn bounded<T, F>(timeout: Duration, fut: F) -> TrendResult<T>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res.map_err(TrendError::from),
        Err(_) => Err(TrendError::StoreUnavailable(format!(
            "redis call timed out after {} ms",
            timeout.as_millis()
        ))),
    }
}

// Strip credentials before logging a connection URL.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            format!("{}://***@{}", &url[..scheme], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}

// Bytes are decoded lossily: a bad byte in one field must not fail the read.
fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::BulkString(b) => Some(String::from_utf8_lossy(b).into_owned()),
        Value::SimpleString(s) => Some(s.clone()),
        Value::VerbatimString { text, .. } => Some(text.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Double(d) => Some(d.to_string()),
        _ => None,
    }
}

fn ranked_entry(member: &Value, score: &Value) -> Option<RankedEntry> {
    let id = value_to_string(member).filter(|id| !id.is_empty())?;
    let score = value_to_string(score).map_or(0.0, |s| parse_score(&s));
    Some(RankedEntry { id, score })
}

/// Decode a `ZREVRANGE .. WITHSCORES` reply.
///
/// RESP2 answers with a flat `[member, score, ...]` array, RESP3 with
/// `[[member, score], ...]`. Anything else reads as an empty ranking.
pub(crate) fn decode_ranked(reply: &Value) -> Vec<RankedEntry> {
    let Value::Array(items) = reply else {
        return Vec::new();
    };
    let nested = !items.is_empty() && items.iter().all(|v| matches!(v, Value::Array(_)));
    if nested {
        items
            .iter()
            .filter_map(|pair| match pair {
                Value::Array(p) if p.len() == 2 => ranked_entry(&p[0], &p[1]),
                _ => None,
            })
            .collect()
    } else {
        items
            .chunks_exact(2)
            .filter_map(|c| ranked_entry(&c[0], &c[1]))
            .collect()
    }
}

/// Decode an `HMGET key title sentiment topic_id` reply. `Nil` slots stay absent.
pub(crate) fn decode_meta(reply: &Value) -> ItemMeta {
    match reply {
        Value::Array(values) => ItemMeta::from_values(values.iter().map(value_to_string).collect()),
        _ => ItemMeta::default(),
    }
}

#[async_trait::async_trait]
impl RankingReader for RedisStore {
    async fn read_top(&self, window: &str, size: usize) -> TrendResult<Vec<RankedEntry>> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let key = ranking_key(window);
        let stop = size as isize - 1;
        let mut conn = self.conn().await?;

        let reply: TrendResult<Value> = bounded(
            self.timeout,
            redis::cmd("ZREVRANGE")
                .arg(&key)
                .arg(0)
                .arg(stop)
                .arg("WITHSCORES")
                .query_async(&mut conn),
        )
        .await;

        match reply {
            Ok(reply) => Ok(decode_ranked(&reply)),
            Err(TrendError::MalformedRecord(e)) => {
                tracing::warn!(target: "trends", key = %key, error = %e, "ranking key unreadable, treating as empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait::async_trait]
impl MetadataJoiner for RedisStore {
    async fn join(&self, id: &str) -> TrendResult<ItemMeta> {
        let key = item_meta_key(id);
        let mut conn = self.conn().await?;
        let reply: TrendResult<Value> = bounded(
            self.timeout,
            redis::cmd("HMGET")
                .arg(&key)
                .arg(META_FIELDS.to_vec())
                .query_async(&mut conn),
        )
        .await;

        match reply {
            Ok(reply) => Ok(decode_meta(&reply)),
            Err(TrendError::MalformedRecord(e)) => {
                tracing::warn!(target: "trends", key = %key, error = %e, "metadata unreadable, leaving fields absent");
                Ok(ItemMeta::default())
            }
            Err(e) => Err(e),
        }
    }
}
