//! # Session Metrics Endpoint
//!
//! `GET /metrics/{client_id}` returns one session's optimization figures.
//! An unknown client id is a defined 404, never a crash: session entries are
//! removed once draining completes, so a finished session looks the same as
//! one that never existed.

use crate::error::AppError;
use crate::state::AppState;
use actix_web::{web, HttpResponse};

pub async fn session_metrics(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let client_id = path.into_inner();

    match state.registry.metrics_snapshot(&client_id) {
        Some(snapshot) => Ok(HttpResponse::Ok().json(snapshot)),
        None => Err(AppError::NotFound(format!(
            "no session for client id '{}'",
            client_id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{http::StatusCode, test, App};

    #[actix_web::test]
    async fn test_known_session_returns_snapshot() {
        let state = AppState::new(AppConfig::default());
        let handle = state.registry.insert("alice").unwrap();
        handle.metrics.record_ingested(10.0);
        handle.metrics.record_processed(3.0);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/metrics/{client_id}", web::get().to(session_metrics)),
        )
        .await;

        let req = test::TestRequest::get().uri("/metrics/alice").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["total_audio_seconds"], 10.0);
        assert_eq!(body["processed_audio_seconds"], 3.0);
        assert_eq!(body["optimization_percentage"], 70.0);
        assert_eq!(body["seconds_saved"], 7.0);
        assert!(body["session_duration"].is_number());
    }

    #[actix_web::test]
    async fn test_unknown_session_is_404() {
        let state = AppState::new(AppConfig::default());

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/metrics/{client_id}", web::get().to(session_metrics)),
        )
        .await;

        let req = test::TestRequest::get().uri("/metrics/nobody").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
