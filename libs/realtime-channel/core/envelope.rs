//! Envelope wire format
//!
//! Every frame exchanged with the server is one JSON object:
//!
//! ```text
//! {"type":"comment_added","scope":{"kind":"workspace","id":"w1"},"payload":{..},"timestamp":1700000000000}
//! ```
//!
//! `scope` is optional and never interpreted by the client. `timestamp` is
//! epoch milliseconds.

use crate::traits::{Result, WsMessage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved type for heartbeat probes
pub const PING: &str = "ping";
/// Reserved type for heartbeat replies
pub const PONG: &str = "pong";
/// Presence: identity came online
pub const USER_ONLINE: &str = "user_online";
/// Presence: identity went offline
pub const USER_OFFLINE: &str = "user_offline";
/// Presence: full snapshot of online identities
pub const ONLINE_USERS: &str = "online_users";
/// Synthesized locally when reconnection gives up
pub const CONNECTION_FAILED: &str = "connection_failed";

/// Audience descriptor for server-side fan-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    Workspace { id: String },
    FileCollaborators { id: String },
    Users { ids: Vec<String> },
    Global,
}

impl Scope {
    pub fn workspace(id: impl Into<String>) -> Self {
        Scope::Workspace { id: id.into() }
    }

    pub fn file_collaborators(id: impl Into<String>) -> Self {
        Scope::FileCollaborators { id: id.into() }
    }

    pub fn users<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Scope::Users {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

/// Typed, scoped unit of data exchanged over the channel
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<Scope>,
    #[serde(default)]
    payload: Value,
    #[serde(
        rename = "timestamp",
        with = "chrono::serde::ts_milliseconds",
        default = "Utc::now"
    )]
    sent_at: DateTime<Utc>,
}

impl Envelope {
    /// Build an outbound envelope stamped with the current time
    pub fn new(event_type: impl Into<String>, scope: Scope, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            scope: Some(scope),
            payload,
            sent_at: Utc::now(),
        }
    }

    /// Build an envelope without a scope (heartbeat and local events)
    pub fn unscoped(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            scope: None,
            payload,
            sent_at: Utc::now(),
        }
    }

    pub(crate) fn ping() -> Self {
        Self::unscoped(PING, Value::Null)
    }

    pub(crate) fn pong() -> Self {
        Self::unscoped(PONG, Value::Null)
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn sent_at(&self) -> DateTime<Utc> {
        self.sent_at
    }

    /// `ping` and `pong` belong to the heartbeat and are never routed
    pub fn is_heartbeat(&self) -> bool {
        self.event_type == PING || self.event_type == PONG
    }

    /// Serialize into a text frame
    pub fn encode(&self) -> Result<WsMessage> {
        Ok(WsMessage::Text(serde_json::to_string(self)?))
    }

    /// Parse a text or binary frame
    pub fn decode(message: &WsMessage) -> Result<Self> {
        Ok(serde_json::from_slice(message.as_bytes())?)
    }
}
