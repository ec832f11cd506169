use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use std::sync::Arc;

type ReadinessProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Router for the admin listener: `/health` always answers ok, `/ready`
/// answers ok only while `is_ready` returns true.
pub fn admin_router<F>(is_ready: F) -> Router
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let probe: ReadinessProbe = Arc::new(is_ready);

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(probe)
}

async fn health() -> &'static str {
    "ok\n"
}

async fn ready(State(is_ready): State<ReadinessProbe>) -> (StatusCode, &'static str) {
    match is_ready() {
        true => (StatusCode::OK, "ok\n"),
        false => (StatusCode::SERVICE_UNAVAILABLE, "not ready\n"),
    }
}
