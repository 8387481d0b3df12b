//! The event stream endpoints and the application router.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::header::ACCEPT,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, instrument};

use ssehub_core::{Event, SessionInfo};
use ssehub_session::{accepts_event_stream, EventStream};

use crate::error::ApiResult;
use crate::state::{client_info, last_event_id, peer_addr, AppState};

/// Build the application router: stream endpoints plus every plugin's routes.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/stream", get(open_stream))
        .route("/stream/sources", get(list_sources))
        .route("/stream/sources/count", get(count_sources))
        .merge(state.runtime.routes())
        .with_state(state)
}

/// Open an event stream.
///
/// The first frame is always `establish`, carrying the session key as both
/// `id` and `data`. The stream then runs until the client disconnects or the
/// session is closed.
#[instrument(skip_all)]
async fn open_stream(State(state): State<AppState>, request: Request) -> ApiResult<Response> {
    let headers = request.headers();
    accepts_event_stream(headers.get(ACCEPT).and_then(|value| value.to_str().ok()))?;

    let requested = last_event_id(headers);
    let client = client_info(headers, peer_addr(request.extensions()));
    let (session, events) = state.registry.open(requested, client);
    let attached = state.runtime.attach(&state.registry, &session);
    debug!(
        "Session {} streaming with {} plugin instances",
        session.key(),
        attached
    );

    let stream = EventStream::new(Arc::clone(&state.registry), session, events)
        .map(|event| Ok::<_, Infallible>(sse_event(&event)));
    let keep_alive = KeepAlive::new().interval(state.config.server.keep_alive());

    Ok(Sse::new(stream).keep_alive(keep_alive).into_response())
}

/// Render an event as an SSE frame. Carriage returns become line breaks.
fn sse_event(event: &Event) -> SseEvent {
    let data = event.data.replace("\r\n", "\n").replace('\r', "\n");
    let mut frame = SseEvent::default().event(&event.event).data(data);
    if let Some(id) = event.id.as_deref().filter(|id| !id.contains('\0')) {
        frame = frame.id(id);
    }
    if let Some(retry_ms) = event.retry_ms {
        frame = frame.retry(Duration::from_millis(retry_ms));
    }
    frame
}

#[derive(Debug, Serialize)]
struct SourcesResponse {
    data: Vec<SessionInfo>,
}

#[derive(Debug, Serialize)]
struct CountResponse {
    count: usize,
}

#[instrument(skip_all)]
async fn list_sources(State(state): State<AppState>) -> Json<SourcesResponse> {
    Json(SourcesResponse {
        data: state.registry.list(),
    })
}

#[instrument(skip_all)]
async fn count_sources(State(state): State<AppState>) -> Json<CountResponse> {
    Json(CountResponse {
        count: state.registry.len(),
    })
}
