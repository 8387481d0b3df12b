//! The plugin capability interface and the runtime that owns the plugins.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use ssehub_core::{Error, Event, PluginPayload, Result};
use ssehub_session::{PluginInstance, PluginRequest, Session, SessionRegistry};
use ssehub_terminal::FrameSink;

use crate::state::AppState;

/// A named feature contributing HTTP routes, per-session instances and an
/// optional background task.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Unique plugin name. Instances are stored on sessions under it.
    fn name(&self) -> &'static str;

    /// Routes this plugin serves.
    fn routes(&self) -> Router<AppState>;

    /// Create this plugin's state for a newly opened session, if it keeps any.
    fn instantiate(
        &self,
        registry: &Arc<SessionRegistry>,
        session: &Arc<Session>,
    ) -> Option<Arc<dyn PluginInstance>>;

    /// Plugin-wide background work. Returns when `shutdown` fires.
    async fn run(self: Arc<Self>, _registry: Arc<SessionRegistry>, _shutdown: CancellationToken) {}
}

/// The set of plugins a server runs, in registration order.
pub struct PluginRuntime {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl std::fmt::Debug for PluginRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRuntime")
            .field("plugins", &self.names())
            .finish()
    }
}

impl PluginRuntime {
    /// Register plugins. Fails on a repeated name.
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for plugin in &plugins {
            if !seen.insert(plugin.name()) {
                return Err(Error::DuplicatePlugin(plugin.name().to_string()));
            }
        }
        Ok(Self { plugins })
    }

    /// Plugin names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|plugin| plugin.name()).collect()
    }

    /// Routes of every plugin, merged.
    pub fn routes(&self) -> Router<AppState> {
        self.plugins
            .iter()
            .fold(Router::new(), |router, plugin| router.merge(plugin.routes()))
    }

    /// Spawn each plugin's background task.
    pub fn start(
        &self,
        registry: &Arc<SessionRegistry>,
        shutdown: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        self.plugins
            .iter()
            .map(|plugin| {
                info!("Starting plugin '{}'", plugin.name());
                tokio::spawn(Arc::clone(plugin).run(Arc::clone(registry), shutdown.clone()))
            })
            .collect()
    }

    /// Create every plugin's instance for a new session, in registration
    /// order. Returns the number of instances attached.
    pub fn attach(&self, registry: &Arc<SessionRegistry>, session: &Arc<Session>) -> usize {
        let mut attached = 0;
        for plugin in &self.plugins {
            if let Some(instance) = plugin.instantiate(registry, session) {
                debug!(
                    "Attached plugin '{}' to session {}",
                    plugin.name(),
                    session.key()
                );
                session.attach_instance(plugin.name(), instance);
                attached += 1;
            }
        }
        attached
    }
}

/// Route a request to a session's instance of `plugin`.
pub async fn dispatch(session: &Arc<Session>, plugin: &str, request: PluginRequest) -> Result<()> {
    let instance = session.instance(plugin).ok_or_else(|| {
        Error::BadRequest(format!(
            "plugin '{plugin}' is not active for session {}",
            session.key()
        ))
    })?;
    instance.handle(session, request).await
}

/// Parse a JSON request body.
pub fn parse_body(body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body).map_err(|e| Error::BadRequest(format!("invalid JSON body: {e}")))
}

/// Decode a request payload into the shape a plugin expects.
pub fn decode_payload<T: DeserializeOwned>(payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| Error::BadRequest(format!("invalid payload: {e}")))
}

/// [`FrameSink`] delivering payloads to a session as events of one name.
///
/// A session that cannot keep up is torn down.
pub struct SessionSink {
    event: &'static str,
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
}

impl std::fmt::Debug for SessionSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSink")
            .field("event", &self.event)
            .field("session", self.session.key())
            .finish_non_exhaustive()
    }
}

impl SessionSink {
    /// Create a sink for `session`.
    pub fn new(
        event: &'static str,
        registry: Arc<SessionRegistry>,
        session: Arc<Session>,
    ) -> Self {
        Self {
            event,
            session,
            registry,
        }
    }
}

#[async_trait]
impl FrameSink for SessionSink {
    async fn emit(&self, payload: PluginPayload) -> Result<()> {
        let event = Event::from_payload(self.event, &payload)?;
        let result = self.session.send(event).await;
        if matches!(result, Err(Error::SlowConsumer(_))) {
            self.registry.teardown(&self.session);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssehub_core::{ClientInfo, SessionKey};

    struct Named(&'static str);

    #[async_trait]
    impl Plugin for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn routes(&self) -> Router<AppState> {
            Router::new()
        }

        fn instantiate(
            &self,
            _registry: &Arc<SessionRegistry>,
            _session: &Arc<Session>,
        ) -> Option<Arc<dyn PluginInstance>> {
            None
        }
    }

    #[test]
    fn test_duplicate_plugin_rejected() {
        let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(Named("a")), Arc::new(Named("a"))];
        let err = PluginRuntime::new(plugins).unwrap_err();
        assert!(matches!(err, Error::DuplicatePlugin(name) if name == "a"));
    }

    #[test]
    fn test_names_keep_registration_order() {
        let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(Named("b")), Arc::new(Named("a"))];
        let runtime = PluginRuntime::new(plugins).unwrap();
        assert_eq!(runtime.names(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_dispatch_without_instance_is_bad_request() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, _events) = registry.open(None, ClientInfo::default());
        let err = dispatch(&session, "missing", PluginRequest::Cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(
            parse_body(br#"{"input":"ls"}"#).unwrap(),
            serde_json::json!({ "input": "ls" })
        );
        assert!(matches!(parse_body(b"{nope"), Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_decode_payload_shape_error() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Shape {
            input: String,
        }
        let err = decode_payload::<Shape>(serde_json::json!({"input": 5})).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_session_sink_wraps_payload() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, mut events) =
            registry.open(Some(SessionKey::from("k")), ClientInfo::default());
        let sink = SessionSink::new("terminal", Arc::clone(&registry), session);

        sink.emit(PluginPayload::eof("$ ").with_id(3)).await.unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.event, "terminal");
        let payload: PluginPayload = serde_json::from_str(&event.data).unwrap();
        assert_eq!(payload, PluginPayload::eof("$ ").with_id(3));
    }
}
