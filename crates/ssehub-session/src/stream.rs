//! The event stream written to an open connection.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::WaitForCancellationFutureOwned;
use tracing::debug;

use ssehub_core::{Error, Event, Result};

use crate::registry::SessionRegistry;
use crate::session::Session;

/// MIME type of server-sent events.
pub const EVENT_STREAM_MIME: &str = "text/event-stream";

/// Check that a request's `Accept` header allows an event stream.
pub fn accepts_event_stream(accept: Option<&str>) -> Result<()> {
    let accepted = accept.is_some_and(|accept| {
        accept.split(',').any(|range| {
            let mime = range.split(';').next().unwrap_or_default().trim();
            mime.eq_ignore_ascii_case(EVENT_STREAM_MIME)
        })
    });
    if accepted {
        Ok(())
    } else {
        Err(Error::BadRequest(format!(
            "Accept header must include {EVENT_STREAM_MIME}"
        )))
    }
}

/// Events of one session, in order, starting with the `establish` event.
///
/// The stream ends when the session is cancelled. Dropping it, whether the
/// stream ended or the client went away, closes the session: plugin
/// instances are disposed and the registry entry is removed.
pub struct EventStream {
    establish: Option<Event>,
    events: mpsc::Receiver<Event>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    finished: bool,
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("session", self.session.key())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl EventStream {
    /// Wrap a registered session's queue.
    pub fn new(
        registry: Arc<SessionRegistry>,
        session: Arc<Session>,
        events: mpsc::Receiver<Event>,
    ) -> Self {
        let establish = Event::establish(session.key(), registry.settings().retry_ms);
        let cancelled = Box::pin(session.cancellation().clone().cancelled_owned());
        Self {
            establish: Some(establish),
            events,
            cancelled,
            finished: false,
            session,
            registry,
        }
    }

    /// The session being streamed.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if let Some(establish) = this.establish.take() {
            return Poll::Ready(Some(establish));
        }
        if this.cancelled.as_mut().poll(cx).is_ready() {
            this.finished = true;
            return Poll::Ready(None);
        }
        match this.events.poll_recv(cx) {
            Poll::Ready(Some(event)) => Poll::Ready(Some(event)),
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        debug!("Event stream for session {} ended", self.session.key());
        self.registry.teardown(&self.session);
    }
}
