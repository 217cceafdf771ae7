pub mod states;

use crate::core::config::ChannelConfig;
use crate::core::ws_transport::WsConnector;
use crate::manager::events::Identity;
use crate::manager::ConnectionManager;
use crate::traits::*;
use states::*;
use std::sync::Arc;
use tracing::debug;

/// Type-state builder for ConnectionManager
///
/// The URL and identity are required and enforced by the type system.
/// Everything else falls back to `ChannelConfig::default()` and the
/// WebSocket connector.
pub struct ConnectionManagerBuilder<U, I>
where
    U: UrlState,
    I: IdentityState,
{
    _state: TypeState<U, I>,
    url: Option<String>,
    identity: Option<Identity>,
    config: ChannelConfig,
    connector: Option<Arc<dyn Connector>>,
    headers: Vec<(String, String)>,
}

impl ConnectionManagerBuilder<NoUrl, NoIdentity> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            url: None,
            identity: None,
            config: ChannelConfig::default(),
            connector: None,
            headers: Vec::new(),
        }
    }
}

impl Default for ConnectionManagerBuilder<NoUrl, NoIdentity> {
    fn default() -> Self {
        Self::new()
    }
}

// URL setting
impl<I> ConnectionManagerBuilder<NoUrl, I>
where
    I: IdentityState,
{
    pub fn url(self, url: impl Into<String>) -> ConnectionManagerBuilder<HasUrl, I> {
        ConnectionManagerBuilder {
            _state: TypeState::new(),
            url: Some(url.into()),
            identity: self.identity,
            config: self.config,
            connector: self.connector,
            headers: self.headers,
        }
    }
}

// Identity setting
impl<U> ConnectionManagerBuilder<U, NoIdentity>
where
    U: UrlState,
{
    pub fn identity(self, identity: Identity) -> ConnectionManagerBuilder<U, HasIdentity> {
        ConnectionManagerBuilder {
            _state: TypeState::new(),
            url: self.url,
            identity: Some(identity),
            config: self.config,
            connector: self.connector,
            headers: self.headers,
        }
    }
}

// Optional settings, available in any state
impl<U, I> ConnectionManagerBuilder<U, I>
where
    U: UrlState,
    I: IdentityState,
{
    pub fn config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the WebSocket transport (tests, alternative transports)
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Extra handshake header for the default WebSocket connector
    ///
    /// Ignored when a custom connector is supplied with `connector()`.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl ConnectionManagerBuilder<HasUrl, HasIdentity> {
    /// Validate the configuration and create the manager
    ///
    /// The manager starts `Disconnected`; nothing is opened until `connect()`.
    pub fn build(self) -> Result<ConnectionManager> {
        let url = self
            .url
            .ok_or_else(|| ChannelError::Configuration("URL not set".to_string()))?;
        let identity = self
            .identity
            .ok_or_else(|| ChannelError::Configuration("identity not set".to_string()))?;

        if url.trim().is_empty() {
            return Err(ChannelError::Configuration("URL is empty".to_string()));
        }
        if identity.user_id.trim().is_empty() {
            return Err(ChannelError::Configuration("user id is empty".to_string()));
        }

        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => {
                if !self.headers.is_empty() {
                    debug!(
                        ignored = self.headers.len(),
                        "Custom connector supplied, handshake headers not applied"
                    );
                }
                connector
            }
            None => Arc::new(default_connector(&identity, self.headers)),
        };

        debug!(url = %url, identity = %identity.user_id, "Building connection manager");
        ConnectionManager::new(url, identity, self.config, connector)
    }
}

/// WebSocket connector carrying the session's credentials
fn default_connector(identity: &Identity, headers: Vec<(String, String)>) -> WsConnector {
    let mut connector = WsConnector::new().with_header("X-User-Id", identity.user_id.clone());
    if let Some(token) = &identity.token {
        connector = connector.with_header("Authorization", format!("Bearer {}", token));
    }
    for (name, value) in headers {
        connector = connector.with_header(name, value);
    }
    connector
}
