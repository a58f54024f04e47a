//! Trend feed binary entrypoint.
//! Boots the Axum HTTP server with the one-shot and live leaderboard routes.

use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    trend_feed::enable_dev_tracing();

    let router = trend_feed::app().await?;
    Ok(router.into())
}
