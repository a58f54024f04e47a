use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tower_http::cors::CorsLayer;

use crate::error::TrendError;
use crate::stream::TrendStreamer;
use crate::trends::{TrendItem, TrendService};

#[derive(Clone)]
pub struct AppState {
    pub service: TrendService,
    pub streamer: TrendStreamer,
    pub keep_alive: Duration,
}

impl AppState {
    pub fn new(service: TrendService, streamer: TrendStreamer, keep_alive: Duration) -> Self {
        Self {
            service,
            streamer,
            keep_alive,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/trends/global", get(global_trends))
        .route("/api/trends/stream", get(stream_trends))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Trend(#[from] TrendError),
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Trend(TrendError::StoreUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Trend(TrendError::MalformedRecord(_) | TrendError::Serialization(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(ErrorBody {
            code: status.as_u16(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct TrendQuery {
    window: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    size: Option<i64>,
}

// `?size=` binds like a missing parameter rather than a parse failure.
fn empty_as_none<'de, D>(de: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(de)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse::<i64>().map(Some).map_err(de::Error::custom),
    }
}

impl TrendQuery {
    // Missing size behaves like any non-positive size: the configured default.
    fn size(&self) -> i64 {
        self.size.unwrap_or(0)
    }
}

async fn global_trends(
    State(state): State<AppState>,
    Query(q): Query<TrendQuery>,
) -> ApiResult<Json<Vec<TrendItem>>> {
    let items = state
        .service
        .get_top_trends(q.window.as_deref(), q.size())
        .await?;
    Ok(Json(items))
}

async fn stream_trends(
    State(state): State<AppState>,
    Query(q): Query<TrendQuery>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let size = q.size();
    let events = state
        .streamer
        .stream(q.window, size)
        .map(|ev| Ok::<_, Infallible>(SseEvent::default().event(ev.event).data(ev.data)));

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(state.keep_alive)
            .text("keep-alive"),
    )
}
