//! Shared application state and request extractors.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header::USER_AGENT, request::Parts, HeaderMap},
};

use ssehub_core::{ClientInfo, Result, ServerConfig, SessionKey};
use ssehub_session::{Session, SessionRegistry};

use crate::error::ApiError;
use crate::plugin::{Plugin, PluginRuntime};

/// Header carrying the session key on reconnects and plugin requests.
pub const LAST_EVENT_ID: &str = "last-event-id";

/// State shared by every handler.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Live sessions
    pub registry: Arc<SessionRegistry>,
    /// Registered plugins
    pub runtime: Arc<PluginRuntime>,
    /// Loaded configuration
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Build state from a configuration and the plugins to run.
    pub fn new(config: ServerConfig, plugins: Vec<Arc<dyn Plugin>>) -> Result<Self> {
        let runtime = PluginRuntime::new(plugins)?;
        let registry = SessionRegistry::with_settings(config.stream.clone());
        Ok(Self {
            registry: Arc::new(registry),
            runtime: Arc::new(runtime),
            config: Arc::new(config),
        })
    }
}

/// Session key named by the `Last-Event-ID` header, if it is usable.
pub fn last_event_id(headers: &HeaderMap) -> Option<SessionKey> {
    headers
        .get(LAST_EVENT_ID)
        .and_then(|value| value.to_str().ok())
        .and_then(SessionKey::parse)
}

/// Client address and user agent of a request.
///
/// The address is the first `X-Forwarded-For` hop, then `X-Real-IP`, then
/// the peer address.
pub fn client_info(headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientInfo {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let forwarded = header("x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let client_ip = forwarded
        .or_else(|| header("x-real-ip"))
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_default();

    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    ClientInfo::new(client_ip, user_agent)
}

/// Peer address recorded by the server, when it serves with connect info.
pub fn peer_addr(extensions: &axum::http::Extensions) -> Option<SocketAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// The live session named by the request's `Last-Event-ID` header.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Arc<Session>);

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let key = last_event_id(&parts.headers)
            .ok_or_else(|| ApiError::bad_request("missing Last-Event-ID header"))?;
        Ok(Self(state.registry.require(&key)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let peer: SocketAddr = "192.168.1.9:4000".parse().unwrap();
        let info = client_info(
            &headers(&[
                ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
                ("x-real-ip", "198.51.100.2"),
                ("user-agent", "curl/8.0"),
            ]),
            Some(peer),
        );
        assert_eq!(info.client_ip, "203.0.113.7");
        assert_eq!(info.user_agent, "curl/8.0");
    }

    #[test]
    fn test_client_ip_falls_back() {
        let peer: SocketAddr = "192.168.1.9:4000".parse().unwrap();
        let info = client_info(&headers(&[("x-real-ip", "198.51.100.2")]), Some(peer));
        assert_eq!(info.client_ip, "198.51.100.2");

        let info = client_info(&HeaderMap::new(), Some(peer));
        assert_eq!(info.client_ip, "192.168.1.9");

        let info = client_info(&HeaderMap::new(), None);
        assert_eq!(info.client_ip, "");
    }

    #[test]
    fn test_last_event_id() {
        assert_eq!(
            last_event_id(&headers(&[("last-event-id", "abc")])),
            Some(SessionKey::from("abc"))
        );
        assert_eq!(last_event_id(&HeaderMap::new()), None);
    }
}
