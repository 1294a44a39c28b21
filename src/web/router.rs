//! Web application router and middleware setup.

use crate::web::config::WebConfig;
use crate::web::{handlers, websocket, AppState};
use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the axum application with all routes and middleware.
pub fn create_app(config: &WebConfig, state: AppState) -> Router {
    let mut app = Router::new()
        .route("/", get(handlers::index))
        .route("/api/health", get(handlers::health_check))
        // Readings
        .route(
            "/readings",
            get(handlers::list_readings).post(handlers::ingest_reading),
        )
        .route("/readings/latest", get(websocket::websocket_handler))
        .route("/readings/stream", get(handlers::feed_stream))
        // Actuator
        .route("/response_system", get(handlers::actuator_status))
        .route("/response_system/:command", get(handlers::actuator_command))
        .with_state(state);

    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readings::ReadingStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn app() -> Router {
        let store = ReadingStore::in_memory("readings").await.unwrap();
        let config = WebConfig::default();
        let state = AppState::new(config.feed_service(store), &config);
        create_app(&config, state)
    }

    #[tokio::test]
    async fn index_lists_endpoints() {
        let response = app()
            .await
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let response = app()
            .await
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
