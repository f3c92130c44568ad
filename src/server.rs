//! Liveness listener.
//!
//! Not part of the sync data path: the process binds this port so external
//! probes can tell it is alive, and `/healthz` additionally exposes the
//! connection state and the most recent cycle report.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

use crate::sync::SyncStatus;

pub fn router(status: Arc<SyncStatus>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(status)
}

async fn index_handler() -> &'static str {
    "portal-sync is running\n"
}

async fn healthz_handler(State(status): State<Arc<SyncStatus>>) -> Json<serde_json::Value> {
    let connection = status.connection().await;
    let last_cycle = status.last_cycle().await;
    Json(serde_json::json!({
        "connection": connection,
        "last_cycle": last_cycle,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn index_answers_liveness_probe() {
        let app = router(Arc::new(SyncStatus::default()));
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn healthz_reports_connection_state() {
        let app = router(Arc::new(SyncStatus::default()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["connection"], "disconnected");
        assert!(json["last_cycle"].is_null());
    }
}
