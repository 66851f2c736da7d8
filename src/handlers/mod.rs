pub mod health;
pub mod redirect;
pub mod shorturls;

use crate::{error::ApiError, AppState};
use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// GET /
/// Send browsers that land on the API root to the frontend.
pub async fn index(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, state.config.frontend_url.clone())],
    )
        .into_response()
}

/// Router fallback for anything that matched no route.
pub async fn not_found(method: Method, uri: Uri) -> ApiError {
    tracing::warn!(%method, %uri, "Route not found");
    ApiError::not_found("Route not found")
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{build_router, config::AppConfig, AppState};
    use axum::{
        body::Body,
        http::{header, Request},
        response::Response,
        Router,
    };
    use std::sync::Arc;

    pub fn test_app() -> (Router, Arc<AppState>) {
        test_app_with(AppConfig::default())
    }

    pub fn test_app_with(config: AppConfig) -> (Router, Arc<AppState>) {
        let state = Arc::new(AppState::new(config));
        (build_router(state.clone()), state)
    }

    pub fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
