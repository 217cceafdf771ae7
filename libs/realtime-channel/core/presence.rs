//! Online identity set derived from inbound presence envelopes
//!
//! Entries are never expired locally; the server announces staleness with
//! `user_offline` (or a fresh `online_users` snapshot).

use crate::core::envelope::{Envelope, ONLINE_USERS, USER_OFFLINE, USER_ONLINE};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Field in presence payloads holding the identity
const IDENTITY_FIELD: &str = "userId";
/// Field in `online_users` payloads holding the identity list
const SNAPSHOT_FIELD: &str = "users";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub identity: String,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct PresenceTracker {
    online: RwLock<HashMap<String, PresenceEntry>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this envelope type feeds the tracker
    pub fn is_presence_type(event_type: &str) -> bool {
        matches!(event_type, USER_ONLINE | USER_OFFLINE | ONLINE_USERS)
    }

    /// Apply a presence envelope; returns false if it was ignored
    pub fn apply(&self, envelope: &Envelope) -> bool {
        match envelope.event_type() {
            USER_ONLINE => match identity_of(envelope) {
                Some(identity) => {
                    debug!(identity, "Presence online");
                    self.online.write().insert(
                        identity.to_string(),
                        PresenceEntry {
                            identity: identity.to_string(),
                            last_seen_at: envelope.sent_at(),
                        },
                    );
                    true
                }
                None => missing_identity(envelope),
            },
            USER_OFFLINE => match identity_of(envelope) {
                Some(identity) => {
                    debug!(identity, "Presence offline");
                    self.online.write().remove(identity);
                    true
                }
                None => missing_identity(envelope),
            },
            ONLINE_USERS => {
                let Some(users) = envelope.payload()[SNAPSHOT_FIELD].as_array() else {
                    return missing_identity(envelope);
                };

                let seen_at = envelope.sent_at();
                let snapshot: HashMap<String, PresenceEntry> = users
                    .iter()
                    .filter_map(|u| u.as_str())
                    .map(|identity| {
                        (
                            identity.to_string(),
                            PresenceEntry {
                                identity: identity.to_string(),
                                last_seen_at: seen_at,
                            },
                        )
                    })
                    .collect();

                debug!(count = snapshot.len(), "Presence snapshot");
                *self.online.write() = snapshot;
                true
            }
            _ => false,
        }
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.online.read().contains_key(identity)
    }

    pub fn online_count(&self) -> usize {
        self.online.read().len()
    }

    /// Sorted list of online identities
    pub fn online_identities(&self) -> Vec<String> {
        let mut identities: Vec<String> = self.online.read().keys().cloned().collect();
        identities.sort();
        identities
    }

    pub fn entry(&self, identity: &str) -> Option<PresenceEntry> {
        self.online.read().get(identity).cloned()
    }
}

fn identity_of(envelope: &Envelope) -> Option<&str> {
    envelope.payload()[IDENTITY_FIELD].as_str()
}

fn missing_identity(envelope: &Envelope) -> bool {
    warn!(
        event_type = envelope.event_type(),
        "Presence envelope without identity, ignoring"
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn presence(event_type: &str, payload: serde_json::Value) -> Envelope {
        Envelope::unscoped(event_type, payload)
    }

    #[test]
    fn test_online_then_offline() {
        let tracker = PresenceTracker::new();

        assert!(tracker.apply(&presence(USER_ONLINE, json!({"userId": "ana"}))));
        assert!(tracker.apply(&presence(USER_ONLINE, json!({"userId": "bo"}))));
        assert!(tracker.is_online("ana"));
        assert_eq!(tracker.online_count(), 2);

        assert!(tracker.apply(&presence(USER_OFFLINE, json!({"userId": "ana"}))));
        assert!(!tracker.is_online("ana"));
        assert_eq!(tracker.online_identities(), vec!["bo"]);
    }

    #[test]
    fn test_repeated_online_refreshes_last_seen() {
        let tracker = PresenceTracker::new();
        let first = presence(USER_ONLINE, json!({"userId": "ana"}));
        tracker.apply(&first);

        let later: Envelope = serde_json::from_value(json!({
            "type": USER_ONLINE,
            "payload": {"userId": "ana"},
            "timestamp": first.sent_at().timestamp_millis() + 5_000,
        }))
        .unwrap();
        tracker.apply(&later);

        assert_eq!(tracker.online_count(), 1);
        assert_eq!(tracker.entry("ana").unwrap().last_seen_at, later.sent_at());
    }

    #[test]
    fn test_snapshot_replaces_set() {
        let tracker = PresenceTracker::new();
        tracker.apply(&presence(USER_ONLINE, json!({"userId": "stale"})));

        assert!(tracker.apply(&presence(ONLINE_USERS, json!({"users": ["c", "a", "b"]}))));
        assert!(!tracker.is_online("stale"));
        assert_eq!(tracker.online_identities(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_ignores_malformed_and_foreign_envelopes() {
        let tracker = PresenceTracker::new();
        assert!(!tracker.apply(&presence(USER_ONLINE, json!({"name": "ana"}))));
        assert!(!tracker.apply(&presence(ONLINE_USERS, json!({"users": "ana"}))));
        assert!(!tracker.apply(&presence("comment_added", json!({"userId": "ana"}))));
        assert_eq!(tracker.online_count(), 0);

        assert!(PresenceTracker::is_presence_type(USER_OFFLINE));
        assert!(!PresenceTracker::is_presence_type("comment_added"));
    }

    #[test]
    fn test_offline_for_unknown_identity_is_harmless() {
        let tracker = PresenceTracker::new();
        assert!(tracker.apply(&presence(USER_OFFLINE, json!({"userId": "ghost"}))));
        assert_eq!(tracker.online_count(), 0);
    }
}
