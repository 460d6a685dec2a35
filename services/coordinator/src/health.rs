use axum::{routing::get, Json, Router};
use fedround_core::{is_live, is_ready};

pub fn routes<S: Clone + Send + Sync + 'static>(service: String) -> Router<S> {
    Router::new()
        .route("/live", get(|| async { Json(serde_json::json!({"live": is_live()})) }))
        .route("/ready", get(|| async { Json(serde_json::json!({"ready": is_ready()})) }))
        .route("/status", get(move || async move {
            Json(serde_json::json!({
                "service": service,
                "live": is_live(),
                "ready": is_ready(),
            }))
        }))
}
