//! A client's event stream session.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ssehub_core::{ClientInfo, Error, Event, Result, SessionInfo, SessionKey, StreamSettings};

use crate::instance::PluginInstance;

/// One logical client bound to one live event stream.
///
/// Many tasks may send to a session; only its [`EventStream`](crate::EventStream)
/// reads the queue, so delivery is FIFO.
pub struct Session {
    /// Resumption key
    key: SessionKey,

    /// Who opened the stream
    client: ClientInfo,

    /// When the stream was accepted
    connected_at: DateTime<Utc>,

    /// Outbound queue
    queue: mpsc::Sender<Event>,

    /// Fires when the session ends, for whatever reason
    cancel: CancellationToken,

    /// Longest a send may wait for queue room
    delivery_timeout: Duration,

    /// Plugin instances in creation order
    instances: Mutex<Vec<(String, Arc<dyn PluginInstance>)>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("client", &self.client)
            .field("closed", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session and the receiving end of its queue.
    pub fn new(
        key: SessionKey,
        client: ClientInfo,
        settings: &StreamSettings,
    ) -> (Self, mpsc::Receiver<Event>) {
        let (queue, events) = mpsc::channel(settings.queue_capacity.max(1));
        let session = Self {
            key,
            client,
            connected_at: Utc::now(),
            queue,
            cancel: CancellationToken::new(),
            delivery_timeout: settings.delivery_timeout(),
            instances: Mutex::new(Vec::new()),
        };
        (session, events)
    }

    /// Get the session key.
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Get the client metadata.
    pub fn client(&self) -> &ClientInfo {
        &self.client
    }

    /// Get the time the stream was accepted.
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Public description of the session.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.key.clone(),
            client_ip: self.client.client_ip.clone(),
            user_agent: self.client.user_agent.clone(),
            connected_at: self.connected_at,
        }
    }

    /// Token cancelled when the session ends. Work scoped to the session
    /// should use a child of it.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the session has ended.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Queue an event for delivery.
    ///
    /// Waits for queue room for at most the delivery timeout. On timeout the
    /// session is cancelled and [`Error::SlowConsumer`] is returned; a session
    /// that is already closed yields [`Error::SessionClosed`].
    pub async fn send(&self, event: Event) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }

        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::SessionClosed),
            sent = tokio::time::timeout(self.delivery_timeout, self.queue.send(event)) => sent,
        };

        match sent {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::SessionClosed),
            Err(_) => {
                warn!(
                    "Session {} did not drain its queue within {:?}, closing",
                    self.key, self.delivery_timeout
                );
                self.cancel.cancel();
                Err(Error::SlowConsumer(self.key.clone()))
            }
        }
    }

    /// Store a plugin instance under its plugin name.
    pub fn attach_instance(&self, name: impl Into<String>, instance: Arc<dyn PluginInstance>) {
        self.instances.lock().push((name.into(), instance));
    }

    /// Look up a plugin instance by plugin name.
    pub fn instance(&self, name: &str) -> Option<Arc<dyn PluginInstance>> {
        self.instances
            .lock()
            .iter()
            .find(|(plugin, _)| plugin == name)
            .map(|(_, instance)| Arc::clone(instance))
    }

    /// Number of attached plugin instances.
    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }

    /// End the session: cancel it and dispose its plugin instances in reverse
    /// creation order. Safe to call more than once.
    pub fn close(&self) {
        self.cancel.cancel();

        let instances = std::mem::take(&mut *self.instances.lock());
        for (name, instance) in instances.into_iter().rev() {
            debug!("Disposing plugin instance '{}' of session {}", name, self.key);
            instance.dispose();
        }
    }
}
