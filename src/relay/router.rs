use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::HeaderValue;
use axum::routing::post;
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::SharedState;

pub const CLASSIFY_PATH: &str = "/api/classify";

/// Build the relay router. Every response, errors included, carries the CORS headers.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route(
            CLASSIFY_PATH,
            post(handlers::classify).options(handlers::preflight),
        )
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use axum::response::Response;
    use mockito::{Matcher, Server};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::relay::{AppState, KeyPolicy, RelayConfig};

    fn router(upstream_url: &str, key_policy: KeyPolicy) -> Router {
        build_router(Arc::new(AppState::new(RelayConfig::new(upstream_url, key_policy))))
    }

    fn post_json(body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(CLASSIFY_PATH)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn assert_cors(response: &Response) {
        let headers = response.headers();
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], "POST, OPTIONS");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
    }

    #[tokio::test]
    async fn missing_key_is_rejected_before_upstream() {
        let mut upstream = Server::new_async().await;
        let mock = upstream.mock("POST", Matcher::Any).expect(0).create_async().await;

        let app = router(&format!("{}/v1/messages", upstream.url()), KeyPolicy::CallerSupplied);
        let response = app.oneshot(post_json(json!({"prompt": "hi"}))).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_cors(&response);
        assert_eq!(json_body(response).await, json!({"error": "API key is required"}));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_prompt_is_rejected() {
        let app = router("http://127.0.0.1:9/v1/messages", KeyPolicy::CallerSupplied);
        let response = app
            .oneshot(post_json(json!({"apiKey": "k", "prompt": "  "})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, json!({"error": "Prompt is required"}));
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let app = router("http://127.0.0.1:9/v1/messages", KeyPolicy::CallerSupplied);
        let request = Request::builder()
            .method(Method::POST)
            .uri(CLASSIFY_PATH)
            .body(Body::from("not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_cors(&response);
    }

    #[tokio::test]
    async fn success_is_relayed_verbatim() {
        let reply = json!({
            "id": "msg_01",
            "type": "message",
            "content": [{"type": "text", "text": "{\"intent\":\"greet\"}"}],
            "usage": {"input_tokens": 3, "output_tokens": 4}
        });

        let mut upstream = Server::new_async().await;
        let mock = upstream
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "caller-key")
            .match_header("anthropic-version", "2023-06-01")
            .match_body(Matcher::Json(json!({
                "model": crate::llm::models::MODEL,
                "max_tokens": crate::llm::models::MAX_TOKENS,
                "messages": [{"role": "user", "content": "classify me"}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(reply.to_string())
            .create_async()
            .await;

        let app = router(&format!("{}/v1/messages", upstream.url()), KeyPolicy::CallerSupplied);
        let response = app
            .oneshot(post_json(json!({"prompt": "classify me", "apiKey": "caller-key"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_cors(&response);
        assert_eq!(json_body(response).await, reply);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn success_body_keeps_upstream_bytes() {
        let raw = r#"{"type":"message","id":"msg_1","content":[{"type":"text","text":"hi"}],"usage":{"output_tokens":1.0e2}}"#;

        let mut upstream = Server::new_async().await;
        upstream
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(raw)
            .create_async()
            .await;

        let app = router(&format!("{}/v1/messages", upstream.url()), KeyPolicy::CallerSupplied);
        let response = app
            .oneshot(post_json(json!({"prompt": "p", "apiKey": "k"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/json");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], raw.as_bytes());
    }

    #[tokio::test]
    async fn upstream_error_status_and_body_are_mirrored() {
        let mut upstream = Server::new_async().await;
        upstream
            .mock("POST", "/v1/messages")
            .with_status(429)
            .with_body("rate_limit_error: slow down")
            .create_async()
            .await;

        let app = router(&format!("{}/v1/messages", upstream.url()), KeyPolicy::CallerSupplied);
        let response = app
            .oneshot(post_json(json!({"prompt": "p", "apiKey": "k"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_cors(&response);
        assert_eq!(
            json_body(response).await,
            json!({"error": "rate_limit_error: slow down"})
        );
    }

    #[tokio::test]
    async fn malformed_upstream_body_is_a_500() {
        let mut upstream = Server::new_async().await;
        upstream
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let app = router(&format!("{}/v1/messages", upstream.url()), KeyPolicy::CallerSupplied);
        let response = app
            .oneshot(post_json(json!({"prompt": "p", "apiKey": "k"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body, json!({"error": "Malformed response from upstream provider"}));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_500() {
        let app = router("http://127.0.0.1:9/v1/messages", KeyPolicy::CallerSupplied);
        let response = app
            .oneshot(post_json(json!({"prompt": "p", "apiKey": "k"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_cors(&response);
        assert_eq!(
            json_body(response).await,
            json!({"error": "Failed to reach upstream provider"})
        );
    }

    #[tokio::test]
    async fn server_held_key_replaces_caller_key() {
        let mut upstream = Server::new_async().await;
        let mock = upstream
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "server-key")
            .with_status(200)
            .with_body(r#"{"content":[]}"#)
            .create_async()
            .await;

        let app = router(
            &format!("{}/v1/messages", upstream.url()),
            KeyPolicy::ServerHeld(Some("server-key".to_string())),
        );
        let response = app
            .oneshot(post_json(json!({"prompt": "p", "apiKey": "caller-key"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_held_policy_without_key_is_a_500() {
        let app = router("http://127.0.0.1:9/v1/messages", KeyPolicy::ServerHeld(None));
        let response = app.oneshot(post_json(json!({"prompt": "p"}))).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            json!({"error": "Server API key is not configured"})
        );
    }

    #[tokio::test]
    async fn preflight_succeeds_with_cors_headers() {
        let app = router("http://127.0.0.1:9/v1/messages", KeyPolicy::CallerSupplied);
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri(CLASSIFY_PATH)
            .header("origin", "https://example.com")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_cors(&response);
    }

    #[tokio::test]
    async fn other_methods_are_not_allowed() {
        let app = router("http://127.0.0.1:9/v1/messages", KeyPolicy::CallerSupplied);
        let request = Request::builder()
            .method(Method::GET)
            .uri(CLASSIFY_PATH)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_cors(&response);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let app = router("http://127.0.0.1:9/v1/messages", KeyPolicy::CallerSupplied);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/elsewhere")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_cors(&response);
    }
}
