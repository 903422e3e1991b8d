//! Cross-origin access for browser front-ends hosted elsewhere.

use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};

/// Any origin may call the API. Any request header is allowed, which covers
/// `content-type` and the test-mode clock header.
#[must_use]
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
        routing,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::clock::TEST_NOW_HEADER;

    fn app() -> Router {
        Router::new()
            .route("/api/healthz", routing::get(|| async { "ok" }))
            .route("/api/pastes", routing::post(|| async { StatusCode::CREATED }))
            .layer(cors_layer())
    }

    #[tokio::test]
    async fn test_get_from_foreign_origin_is_allowed() {
        let response = app()
            .oneshot(
                Request::get("/api/healthz")
                    .header(header::ORIGIN, "https://frontend.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }

    #[tokio::test]
    async fn test_preflight_allows_post_with_clock_header() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/pastes")
                    .header(header::ORIGIN, "https://frontend.example")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .header(
                        header::ACCESS_CONTROL_REQUEST_HEADERS,
                        format!("content-type,{TEST_NOW_HEADER}"),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "*");
        let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS]
            .to_str()
            .unwrap();
        assert!(methods.contains("POST"), "{methods}");
    }
}
