use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use ollama_openai_proxy::config::{AppConfig, BackendConfig};
use ollama_openai_proxy::routing::dispatch_request;
use ollama_openai_proxy::state::AppState;
use serde_json::{json, Value};

fn build_state(base_url: String) -> Arc<AppState> {
    let config = AppConfig {
        backend: BackendConfig::new(base_url, vec![]),
        ..AppConfig::default()
    };
    Arc::new(AppState::from_config(config).expect("build state"))
}

async fn spawn_backend(app: Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock backend");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), server)
}

fn sse_frame(content: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
        })
    )
}

fn sse_response(chunks: Vec<Result<Bytes, std::io::Error>>) -> axum::response::Response {
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(futures_util::stream::iter(chunks)),
    )
        .into_response()
}

fn chat_request(body: &Value, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json");
    if let Some(value) = authorization {
        builder = builder.header("authorization", value);
    }
    builder
        .body(Body::from(serde_json::to_vec(body).expect("serialize request")))
        .expect("build request")
}

fn ndjson_records(body: &[u8]) -> Vec<Value> {
    assert!(body.is_empty() || body.ends_with(b"\n"));
    body.split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice(line).expect("record is JSON"))
        .collect()
}

#[tokio::test]
async fn test_stream_two_deltas_then_sentinel() {
    let seen_request = Arc::new(Mutex::new(None::<(Option<String>, Value)>));
    let capture = Arc::clone(&seen_request);
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let capture = Arc::clone(&capture);
            async move {
                let auth = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                *capture.lock().unwrap() = Some((auth, body));
                let raw = format!("{}{}data: [DONE]\n\n", sse_frame("He"), sse_frame("llo"));
                sse_response(vec![Ok(Bytes::from(raw))])
            }
        }),
    );
    let (base_url, server) = spawn_backend(app).await;

    let request = chat_request(
        &json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true
        }),
        Some("Bearer sk-test"),
    );
    let response = dispatch_request(build_state(base_url), None, request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/x-ndjson"
    );

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let records = ndjson_records(&body);
    assert_eq!(
        records,
        vec![
            json!({"model": "m", "message": {"role": "assistant", "content": "He"}}),
            json!({"model": "m", "message": {"role": "assistant", "content": "llo"}}),
        ]
    );

    let (auth, forwarded) = seen_request.lock().unwrap().clone().expect("backend called");
    assert_eq!(auth.as_deref(), Some("Bearer sk-test"));
    assert_eq!(
        forwarded,
        json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true
        })
    );

    server.abort();
}

#[tokio::test]
async fn test_stream_split_frames_and_noise() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            let raw = format!(
                ": keepalive\n\n{}undefined:1\n{}data: {{\"choices\":[{{\"delta\":{{}},\"finish_reason\":\"stop\"}}]}}\n\ndata: [DONE]\n\n{}",
                sse_frame("a"),
                sse_frame("b"),
                sse_frame("after-sentinel")
            );
            let bytes = raw.into_bytes();
            let chunks = bytes
                .chunks(7)
                .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
                .collect();
            sse_response(chunks)
        }),
    );
    let (base_url, server) = spawn_backend(app).await;

    let request = chat_request(
        &json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]}),
        None,
    );
    let response = dispatch_request(build_state(base_url), None, request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let contents: Vec<String> = ndjson_records(&body)
        .iter()
        .map(|record| record["message"]["content"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(contents, vec!["a", "b", ""]);

    server.abort();
}

#[tokio::test]
async fn test_backend_error_before_stream_is_enveloped() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}})),
            )
        }),
    );
    let (base_url, server) = spawn_backend(app).await;

    let request = chat_request(
        &json!({"model": "m", "messages": [], "stream": true}),
        Some("Bearer wrong"),
    );
    let response = dispatch_request(build_state(base_url), None, request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let payload: Value = serde_json::from_slice(&body).expect("json envelope");
    assert_eq!(payload, json!({"error": "Incorrect API key provided"}));

    server.abort();
}

#[tokio::test]
async fn test_unreachable_backend_is_500() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let request = chat_request(
        &json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]}),
        None,
    );
    let response = dispatch_request(build_state(format!("http://{addr}")), None, request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let payload: Value = serde_json::from_slice(&body).expect("json envelope");
    assert!(payload["error"].is_string());
}

#[tokio::test]
async fn test_mid_stream_failure_ends_body_without_error_record() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            // The pause lets the first frame reach the wire before the body fails.
            let frames = futures_util::stream::unfold(0_u8, |step| async move {
                match step {
                    0 => Some((Ok(Bytes::from(sse_frame("partial"))), 1)),
                    1 => {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        let err = std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            "backend crashed",
                        );
                        Some((Err(err), 2))
                    }
                    _ => None,
                }
            });
            (
                [(header::CONTENT_TYPE, "text/event-stream")],
                Body::from_stream(frames),
            )
        }),
    );
    let (base_url, server) = spawn_backend(app).await;

    let request = chat_request(
        &json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]}),
        None,
    );
    let response = dispatch_request(build_state(base_url), None, request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("client body ends cleanly");
    let records = ndjson_records(&body);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["message"]["content"], "partial");
    assert!(records[0].get("error").is_none());

    server.abort();
}

#[tokio::test]
async fn test_non_streaming_chat() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["stream"], false);
            Json(json!({
                "id": "chatcmpl-2",
                "object": "chat.completion",
                "created": 1_687_882_411,
                "model": "gpt-4o-mini",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "pong"},
                    "finish_reason": "stop"
                }]
            }))
        }),
    );
    let (base_url, server) = spawn_backend(app).await;

    let request = chat_request(
        &json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": "ping"}],
            "stream": false,
            "options": {"temperature": 0.2}
        }),
        None,
    );
    let response = dispatch_request(build_state(base_url), None, request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let payload: Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(
        payload,
        json!({
            "model": "gpt-4o-mini",
            "created_at": "2023-06-27T16:13:31Z",
            "message": {"role": "assistant", "content": "pong"},
            "done": true
        })
    );

    server.abort();
}

#[tokio::test]
async fn test_invalid_chat_body_is_400() {
    let state = build_state("http://127.0.0.1:9".to_string());
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .body(Body::from("{\"messages\": []}"))
        .expect("build request");
    let response = dispatch_request(state, None, request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let payload: Value = serde_json::from_slice(&body).expect("json envelope");
    assert!(payload["error"].as_str().unwrap().contains("model"));
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let state = build_state("http://127.0.0.1:9".to_string());
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .body(Body::from(vec![b' '; 3 * 1024 * 1024]))
        .expect("build request");
    let response = dispatch_request(state, None, request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
