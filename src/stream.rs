// src/stream.rs
//! Live leaderboard feed: re-run the top-N pipeline on a fixed cadence and
//! emit each snapshot as a labelled event.
//!
//! The stream is pull-driven. Nothing is fetched while the consumer is not
//! polling, and the ticker skips missed ticks, so a slow subscriber gets the
//! newest snapshot instead of a backlog. Dropping the stream stops the ticker
//! and cancels whatever pipeline call is in flight.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::error::TrendResult;
use crate::trends::{TrendItem, TrendService};

pub const RANK_UPDATE_EVENT: &str = "rankUpdate";
pub const FALLBACK_PAYLOAD: &str = "[]";
pub const DEFAULT_TICK: Duration = Duration::from_secs(5);

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("trends_stream_ticks_total", "Snapshots emitted to subscribers.");
        describe_counter!(
            "trends_stream_skipped_ticks_total",
            "Ticks dropped because the store was unavailable."
        );
        describe_counter!(
            "trends_stream_fallback_total",
            "Ticks whose snapshot failed to encode and were sent as an empty list."
        );
        describe_gauge!("trends_stream_subscribers", "Open live-feed subscriptions.");
        describe_gauge!(
            "trends_stream_last_tick_ts",
            "Unix ts of the last emitted snapshot."
        );
    });
}

/// One outbound feed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendEvent {
    pub event: &'static str,
    pub data: String,
}

impl TrendEvent {
    pub fn rank_update(data: String) -> Self {
        Self {
            event: RANK_UPDATE_EVENT,
            data,
        }
    }
}

/// Turns a snapshot into the text payload of an event.
pub trait SnapshotEncoder: Send + Sync {
    fn encode(&self, items: &[TrendItem]) -> TrendResult<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl SnapshotEncoder for JsonEncoder {
    fn encode(&self, items: &[TrendItem]) -> TrendResult<String> {
        Ok(serde_json::to_string(items)?)
    }
}

/// Encode one tick. Failures never leave this function: the tick becomes `[]`.
pub fn encode_or_fallback(encoder: &dyn SnapshotEncoder, items: &[TrendItem]) -> String {
    match encoder.encode(items) {
        Ok(json) => json,
        Err(e) => {
            counter!("trends_stream_fallback_total").increment(1);
            tracing::warn!(target: "trends", error = %e, items = items.len(), "snapshot encode failed, sending empty list");
            FALLBACK_PAYLOAD.to_string()
        }
    }
}

/// What a tick does when the pipeline itself fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    /// Emit nothing for this tick and wait for the next one.
    #[default]
    SkipTick,
    /// Emit the empty-list payload for this tick.
    EmitEmpty,
}

#[derive(Clone)]
pub struct TrendStreamer {
    service: TrendService,
    encoder: Arc<dyn SnapshotEncoder>,
    tick: Duration,
    on_store_error: StoreFailurePolicy,
}

impl TrendStreamer {
    pub fn new(service: TrendService, tick: Duration) -> Self {
        Self {
            service,
            encoder: Arc::new(JsonEncoder),
            tick,
            on_store_error: StoreFailurePolicy::default(),
        }
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn SnapshotEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_store_failure_policy(mut self, policy: StoreFailurePolicy) -> Self {
        self.on_store_error = policy;
        self
    }

    /// Open a subscription. The first snapshot arrives one tick after the
    /// first poll, then one per tick until the stream is dropped.
    pub fn stream(
        &self,
        window: Option<String>,
        requested_size: i64,
    ) -> impl Stream<Item = TrendEvent> + Send + 'static {
        ensure_metrics_described();

        let limits = self.service.limits();
        let window = limits.normalize_window(window.as_deref()).to_string();
        let size = limits.clamp_size(requested_size);

        let sub = Subscription {
            service: self.service.clone(),
            encoder: self.encoder.clone(),
            on_store_error: self.on_store_error,
            period: self.tick,
            ticker: None,
            seq: 0,
            _guard: SubscriberGuard::open(&window, size),
            window,
            size: size as i64,
        };

        futures::stream::unfold(sub, |mut sub| async move {
            let event = sub.next_event().await;
            Some((event, sub))
        })
    }
}

struct Subscription {
    service: TrendService,
    encoder: Arc<dyn SnapshotEncoder>,
    on_store_error: StoreFailurePolicy,
    period: Duration,
    ticker: Option<Interval>,
    seq: u64,
    window: String,
    size: i64,
    _guard: SubscriberGuard,
}

impl Subscription {
    // Waits for ticks until one produces an event.
    async fn next_event(&mut self) -> TrendEvent {
        let period = self.period;
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut t = tokio::time::interval_at(Instant::now() + period, period);
            t.set_missed_tick_behavior(MissedTickBehavior::Skip);
            t
        });

        loop {
            ticker.tick().await;
            self.seq += 1;

            let data = match self
                .service
                .get_top_trends(Some(&self.window), self.size)
                .await
            {
                Ok(items) => encode_or_fallback(self.encoder.as_ref(), &items),
                Err(e) => {
                    tracing::warn!(target: "trends", window = %self.window, seq = self.seq, error = %e, policy = ?self.on_store_error, "stream tick failed");
                    match self.on_store_error {
                        StoreFailurePolicy::SkipTick => {
                            counter!("trends_stream_skipped_ticks_total").increment(1);
                            continue;
                        }
                        StoreFailurePolicy::EmitEmpty => FALLBACK_PAYLOAD.to_string(),
                    }
                }
            };

            counter!("trends_stream_ticks_total").increment(1);
            gauge!("trends_stream_last_tick_ts").set(chrono::Utc::now().timestamp() as f64);
            return TrendEvent::rank_update(data);
        }
    }
}

// Tracks the open-subscription gauge; closing happens on drop, i.e. on disconnect.
struct SubscriberGuard {
    window: String,
}

impl SubscriberGuard {
    fn open(window: &str, size: usize) -> Self {
        gauge!("trends_stream_subscribers").increment(1.0);
        tracing::info!(target: "trends", window, size, "stream subscription opened");
        Self {
            window: window.to_string(),
        }
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        gauge!("trends_stream_subscribers").decrement(1.0);
        tracing::info!(target: "trends", window = %self.window, "stream subscription closed");
    }
}
