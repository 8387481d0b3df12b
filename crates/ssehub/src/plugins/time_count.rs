//! A counter that ticks on an interval and is pushed to subscribed sessions.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::Query,
    http::StatusCode,
    routing::get,
    Router,
};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use ssehub_core::{Event, Result, SessionKey, TimeCountSettings};
use ssehub_session::{PluginInstance, PluginRequest, Session, SessionRegistry};

use crate::error::ApiResult;
use crate::plugin::{decode_payload, dispatch, Plugin};
use crate::state::{AppState, CurrentSession};

/// Plugin name.
pub const NAME: &str = "time_count";

/// Event name of counter updates.
pub const EVENT: &str = "timecount";

#[derive(Debug, Default)]
struct Counter {
    count: u64,
    subscribers: HashSet<SessionKey>,
}

/// Pushes a shared, ever-increasing counter to the sessions that ask for it.
#[derive(Debug)]
pub struct TimeCountPlugin {
    counter: Arc<RwLock<Counter>>,
    interval: Duration,
}

impl TimeCountPlugin {
    /// Create the plugin.
    pub fn new(settings: &TimeCountSettings) -> Self {
        Self {
            counter: Arc::new(RwLock::new(Counter::default())),
            interval: settings.interval().max(Duration::from_millis(1)),
        }
    }

    /// Current counter value.
    pub fn count(&self) -> u64 {
        self.counter.read().count
    }

    /// Number of subscribed sessions.
    pub fn subscriber_count(&self) -> usize {
        self.counter.read().subscribers.len()
    }

    fn tick(&self) -> (u64, Vec<SessionKey>) {
        let mut counter = self.counter.write();
        counter.count += 1;
        (counter.count, counter.subscribers.iter().cloned().collect())
    }
}

#[async_trait]
impl Plugin for TimeCountPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn routes(&self) -> Router<AppState> {
        Router::new().route("/timecount", get(toggle_subscription))
    }

    fn instantiate(
        &self,
        _registry: &Arc<SessionRegistry>,
        session: &Arc<Session>,
    ) -> Option<Arc<dyn PluginInstance>> {
        Some(Arc::new(TimeCountInstance {
            key: session.key().clone(),
            counter: Arc::clone(&self.counter),
        }))
    }

    async fn run(self: Arc<Self>, registry: Arc<SessionRegistry>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let (count, subscribers) = self.tick();
            if subscribers.is_empty() {
                continue;
            }
            let delivered = registry
                .multicast(&subscribers, Event::new(EVENT, count.to_string()))
                .await;
            trace!("Time count {} delivered to {} sessions", count, delivered);
        }

        info!("Time count stopped at {}", self.count());
    }
}

#[derive(Debug, Deserialize)]
struct TimeCountQuery {
    enable: Option<String>,
}

async fn toggle_subscription(
    CurrentSession(session): CurrentSession,
    Query(query): Query<TimeCountQuery>,
) -> ApiResult<StatusCode> {
    let enable = query.enable.as_deref() != Some("off");
    dispatch(&session, NAME, PluginRequest::Payload(json!({ "enable": enable }))).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct Toggle {
    enable: bool,
}

struct TimeCountInstance {
    key: SessionKey,
    counter: Arc<RwLock<Counter>>,
}

impl TimeCountInstance {
    fn unsubscribe(&self) {
        if self.counter.write().subscribers.remove(&self.key) {
            debug!("Session {} unsubscribed from time count", self.key);
        }
    }
}

#[async_trait]
impl PluginInstance for TimeCountInstance {
    async fn handle(&self, session: &Arc<Session>, request: PluginRequest) -> Result<()> {
        let enable = match request {
            PluginRequest::Payload(payload) => decode_payload::<Toggle>(payload)?.enable,
            PluginRequest::Cancel => false,
        };

        if !enable {
            self.unsubscribe();
            return Ok(());
        }

        let count = {
            let mut counter = self.counter.write();
            counter.subscribers.insert(self.key.clone());
            counter.count
        };
        debug!("Session {} subscribed to time count at {}", self.key, count);
        session.send(Event::new(EVENT, count.to_string())).await
    }

    fn dispose(&self) {
        self.unsubscribe();
    }
}
