//! Common test utilities.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use ssehub::{build_app, default_plugins, AppState};
use ssehub_core::{PluginPayload, ServerConfig};
use ssehub_terminal::testing::ScriptedExecutor;
use ssehub_terminal::Executor;

/// How long a test waits for a frame.
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a test app backed by `executor`.
pub fn test_app(executor: Arc<dyn Executor>) -> (AppState, Router) {
    let config = ServerConfig::default();
    let plugins = default_plugins(&config, executor);
    let state = AppState::new(config, plugins).unwrap();
    let app = build_app(state.clone());
    (state, app)
}

/// Create a test app with scripted programs.
pub fn scripted_app(executor: ScriptedExecutor) -> (AppState, Router, Arc<ScriptedExecutor>) {
    let executor = Arc::new(executor);
    let (state, app) = test_app(Arc::clone(&executor) as Arc<dyn Executor>);
    (state, app, executor)
}

/// Send one request through the app.
pub async fn call(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

/// `GET /stream` with an event-stream accept header.
pub fn stream_request(key: Option<&str>) -> Request<Body> {
    let mut builder = Request::get("/stream")
        .header("accept", "text/event-stream")
        .header("user-agent", "ssehub-tests");
    if let Some(key) = key {
        builder = builder.header("last-event-id", key);
    }
    builder.body(Body::empty()).unwrap()
}

/// `POST` a JSON body on behalf of session `key`.
pub fn post_json(uri: &str, key: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .header("last-event-id", key)
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// `GET` on behalf of session `key`.
pub fn get_as(uri: &str, key: &str) -> Request<Body> {
    Request::get(uri)
        .header("last-event-id", key)
        .body(Body::empty())
        .unwrap()
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// One parsed SSE frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub id: Option<String>,
    pub retry: Option<String>,
    pub data: String,
}

impl SseFrame {
    fn parse(raw: &str) -> Self {
        let mut frame = SseFrame::default();
        let mut data = Vec::new();
        for line in raw.lines() {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.strip_prefix(' ').unwrap_or(value).to_string();
            match name {
                "event" => frame.event = Some(value),
                "id" => frame.id = Some(value),
                "retry" => frame.retry = Some(value),
                "data" => data.push(value),
                _ => {}
            }
        }
        frame.data = data.join("\n");
        frame
    }

    fn is_comment(&self) -> bool {
        self.event.is_none() && self.id.is_none() && self.retry.is_none() && self.data.is_empty()
    }

    /// Decode the data as a plugin payload.
    pub fn payload(&self) -> PluginPayload {
        serde_json::from_str(&self.data).unwrap()
    }
}

/// Reads SSE frames off a streaming response body.
pub struct SseReader {
    body: Body,
    buffer: String,
}

impl SseReader {
    pub fn new(response: Response<Body>) -> Self {
        Self {
            body: response.into_body(),
            buffer: String::new(),
        }
    }

    /// Next frame, or `None` once the stream has ended.
    pub async fn next_frame(&mut self) -> Option<SseFrame> {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let raw: String = self.buffer.drain(..end + 2).collect();
                let frame = SseFrame::parse(&raw);
                if frame.is_comment() {
                    continue;
                }
                return Some(frame);
            }

            let next = tokio::time::timeout(FRAME_TIMEOUT, self.body.frame())
                .await
                .expect("timed out waiting for an SSE frame");
            match next {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        self.buffer.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Some(Err(e)) => panic!("stream error: {e}"),
                None => return None,
            }
        }
    }

    /// Next frame, which must exist.
    pub async fn expect_frame(&mut self) -> SseFrame {
        self.next_frame().await.expect("stream ended")
    }

    /// Next frame with the given event name, as a plugin payload.
    pub async fn expect_payload(&mut self, event: &str) -> PluginPayload {
        let frame = self.expect_frame().await;
        assert_eq!(frame.event.as_deref(), Some(event), "unexpected frame {frame:?}");
        frame.payload()
    }
}

/// Open a stream and consume its establish frame. Returns the session key.
pub async fn open_stream(app: &Router, key: Option<&str>) -> (String, SseReader) {
    let response = call(app, stream_request(key)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let mut reader = SseReader::new(response);
    let establish = reader.expect_frame().await;
    assert_eq!(establish.event.as_deref(), Some("establish"));
    (establish.data, reader)
}
