//! Session registry for coordinating all open event streams.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info};

use ssehub_core::{
    ClientInfo, Error, Event, KeyGenerator, Result, SessionInfo, SessionKey, StreamSettings,
};

use crate::session::Session;

/// Keyed store of live sessions.
///
/// Safe to use from connection handlers, plugin tasks and shutdown at once.
/// Scans take the read lock only long enough to copy out the session list;
/// delivery happens outside the lock.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionKey, Arc<Session>>>,
    keys: KeyGenerator,
    settings: StreamSettings,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl SessionRegistry {
    /// Create an empty registry with default stream settings.
    pub fn new() -> Self {
        Self::with_settings(StreamSettings::default())
    }

    /// Create an empty registry with custom stream settings.
    pub fn with_settings(settings: StreamSettings) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            keys: KeyGenerator::new(),
            settings,
        }
    }

    /// Stream settings sessions are created with.
    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    /// Create and register a session.
    ///
    /// The requested key is used when no live session holds it; otherwise, or
    /// when none was requested, fresh keys are generated until one is free.
    pub fn open(
        &self,
        requested: Option<SessionKey>,
        client: ClientInfo,
    ) -> (Arc<Session>, mpsc::Receiver<Event>) {
        let mut sessions = self.sessions.write();

        let key = match requested {
            Some(key) if !sessions.contains_key(&key) => key,
            Some(key) => {
                debug!("Session key {} already in use, generating a new one", key);
                self.free_key(&sessions)
            }
            None => self.free_key(&sessions),
        };

        let (session, events) = Session::new(key.clone(), client, &self.settings);
        let session = Arc::new(session);
        sessions.insert(key, Arc::clone(&session));

        info!(
            "Opened session {} for {} ({} live)",
            session.key(),
            session.client().client_ip,
            sessions.len()
        );
        (session, events)
    }

    fn free_key(&self, sessions: &HashMap<SessionKey, Arc<Session>>) -> SessionKey {
        loop {
            let key = self.keys.generate();
            if !sessions.contains_key(&key) {
                return key;
            }
        }
    }

    /// Get a session by key.
    pub fn get(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.sessions.read().get(key).cloned()
    }

    /// Get a session by key, failing with [`Error::SessionNotFound`].
    pub fn require(&self, key: &SessionKey) -> Result<Arc<Session>> {
        self.get(key)
            .ok_or_else(|| Error::SessionNotFound(key.clone()))
    }

    /// Remove whatever session is registered under `key`.
    pub fn remove(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.sessions.write().remove(key)
    }

    /// Remove `session` if it is still the one registered under its key.
    pub fn remove_session(&self, session: &Arc<Session>) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get(session.key()) {
            Some(current) if Arc::ptr_eq(current, session) => {
                sessions.remove(session.key());
                true
            }
            _ => false,
        }
    }

    /// Visit every live session until `f` returns `false`.
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<Session>) -> bool,
    {
        for session in self.snapshot() {
            if !f(&session) {
                break;
            }
        }
    }

    /// Remove every session, handing each to `f`.
    pub fn range_and_remove<F>(&self, mut f: F)
    where
        F: FnMut(Arc<Session>),
    {
        let drained: Vec<_> = self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in drained {
            f(session);
        }
    }

    /// Copy of the live session list.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Close `session` and drop it from the registry.
    pub fn teardown(&self, session: &Arc<Session>) {
        session.close();
        if self.remove_session(session) {
            info!("Closed session {} ({} live)", session.key(), self.len());
        }
    }

    /// Deliver an event to every live session.
    ///
    /// Deliveries run concurrently; a session that times out is torn down in
    /// the same pass. Returns the number of sessions that accepted the event.
    pub async fn broadcast(&self, event: Event) -> usize {
        self.deliver(self.snapshot(), event).await
    }

    /// Deliver an event to the listed sessions that are still live.
    pub async fn multicast(&self, keys: &[SessionKey], event: Event) -> usize {
        let targets: Vec<_> = {
            let sessions = self.sessions.read();
            keys.iter().filter_map(|key| sessions.get(key).cloned()).collect()
        };
        self.deliver(targets, event).await
    }

    async fn deliver(&self, targets: Vec<Arc<Session>>, event: Event) -> usize {
        let results = join_all(targets.iter().map(|session| session.send(event.clone()))).await;

        let mut delivered = 0;
        for (session, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!("Dropping session {} after failed delivery: {}", session.key(), e);
                    self.teardown(session);
                }
            }
        }
        delivered
    }

    /// Deliver an event to one session. A missing key is not an error.
    pub async fn send(&self, key: &SessionKey, event: Event) -> Result<()> {
        let Some(session) = self.get(key) else {
            debug!("No session {} to send to", key);
            return Ok(());
        };

        let result = session.send(event).await;
        if let Err(e) = &result {
            if e.is_disconnect() {
                self.teardown(&session);
            }
        }
        result
    }

    /// Cooperatively close one session. Returns whether it was live.
    pub fn close(&self, key: &SessionKey) -> bool {
        match self.get(key) {
            Some(session) => {
                self.teardown(&session);
                true
            }
            None => false,
        }
    }

    /// Close every session, as on shutdown.
    pub fn close_all(&self) {
        let mut closed = 0;
        self.range_and_remove(|session| {
            session.close();
            closed += 1;
        });
        if closed > 0 {
            info!("Closed {} sessions", closed);
        }
    }

    /// Get the number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Describe the live sessions, oldest first.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<_> = self.snapshot().iter().map(|s| s.info()).collect();
        infos.sort_by_key(|info| info.connected_at);
        infos
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
