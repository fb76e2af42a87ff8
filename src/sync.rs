use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::classifier::IdentityUpdate;
use crate::error::PipelineError;
use crate::event::JournalEvent;
use crate::store::EventStore;

pub const RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Messages exchanged over the realtime connection. Unknown tags
/// deserialize into the no-op variant instead of failing the receive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum WireMessage {
    Log { log: JournalEvent },
    SyncLogs {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_user_id: Option<String>,
        logs: Vec<JournalEvent>,
    },
    /// Identity side channel; not an event and never stored.
    UpdateMyDetails {
        user_id: String,
        player_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<String>,
        timezone: String,
    },
    Registered,
    UserOnline { user_id: String },
    UserOffline { user_id: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Rebuilt from server push notifications; held in memory only.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerPresence {
    pub is_online: bool,
}

/// The point-to-point send primitive the host's transport implements.
pub trait Transport: Send {
    fn send(&mut self, message: &WireMessage) -> Result<(), PipelineError>;
}

#[derive(Debug, PartialEq, Eq)]
pub enum InboundOutcome {
    Ignored,
    /// The host should refresh profile, peer list, and pending requests.
    Registered,
    StoreUpdated { accepted: usize },
    PresenceChanged { user_id: String, online: bool },
}

/// Interprets inbound peer messages against the event store and tracks
/// connection state. Outbound sends are fire-and-forget.
pub struct SyncHandler<T: Transport> {
    local_user_id: String,
    state: ConnectionState,
    last_error: Option<String>,
    transport: Option<T>,
    confirmed_friends: HashSet<String>,
    presence: HashMap<String, PeerPresence>,
    reconnect_timer: Option<JoinHandle<()>>,
    reconnect_sender: Option<mpsc::UnboundedSender<()>>,
}

impl<T: Transport> SyncHandler<T> {
    pub fn new(local_user_id: impl Into<String>) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            state: ConnectionState::Disconnected,
            last_error: None,
            transport: None,
            confirmed_friends: HashSet::new(),
            presence: HashMap::new(),
            reconnect_timer: None,
            reconnect_sender: None,
        }
    }

    /// Channel the reconnect timer fires into.
    pub fn set_reconnect_channel(&mut self, sender: mpsc::UnboundedSender<()>) {
        self.reconnect_sender = Some(sender);
    }

    pub fn set_confirmed_friends(&mut self, friend_ids: impl IntoIterator<Item = String>) {
        self.confirmed_friends = friend_ids.into_iter().collect();
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn peer_presence(&self, user_id: &str) -> PeerPresence {
        self.presence.get(user_id).copied().unwrap_or_default()
    }

    pub fn begin_connect(&mut self) {
        self.clear_reconnect_timer();
        self.state = ConnectionState::Connecting;
    }

    pub fn connection_established(&mut self, transport: T) {
        self.clear_reconnect_timer();
        self.transport = Some(transport);
        self.state = ConnectionState::Connected;
        self.last_error = None;
    }

    pub fn connection_failed(&mut self, error: &str) {
        self.transport = None;
        self.state = ConnectionState::Disconnected;
        self.last_error = Some(error.to_string());
        self.arm_reconnect_timer();
    }

    /// Apply one inbound message. Store mutations all route through
    /// [`EventStore::merge`].
    pub fn apply_inbound(
        &mut self,
        message: WireMessage,
        store: &mut EventStore,
    ) -> InboundOutcome {
        match message {
            WireMessage::Registered => InboundOutcome::Registered,
            WireMessage::Log { log } => {
                if !self.is_trusted_owner(&log.owner_id) {
                    tracing::debug!(
                        owner_id = %log.owner_id,
                        "Dropping event from non-friend owner"
                    );
                    return InboundOutcome::Ignored;
                }
                let accepted = store.merge(vec![log]);
                InboundOutcome::StoreUpdated { accepted }
            }
            WireMessage::SyncLogs { logs, .. } => {
                let accepted = store.merge(logs);
                InboundOutcome::StoreUpdated { accepted }
            }
            WireMessage::UserOnline { user_id } => {
                self.presence
                    .insert(user_id.clone(), PeerPresence { is_online: true });
                self.push_stored_events_to_peer(&user_id, store);
                InboundOutcome::PresenceChanged {
                    user_id,
                    online: true,
                }
            }
            WireMessage::UserOffline { user_id } => {
                self.presence
                    .insert(user_id.clone(), PeerPresence { is_online: false });
                InboundOutcome::PresenceChanged {
                    user_id,
                    online: false,
                }
            }
            WireMessage::UpdateMyDetails { .. } | WireMessage::Unknown => InboundOutcome::Ignored,
        }
    }

    pub fn push_local_event(&mut self, event: &JournalEvent) {
        if self.state != ConnectionState::Connected {
            return;
        }
        self.send_or_disconnect(&WireMessage::Log { log: event.clone() });
    }

    pub fn push_identity_update(&mut self, update: &IdentityUpdate, timezone: &str) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let message = WireMessage::UpdateMyDetails {
            user_id: self.local_user_id.clone(),
            player_name: update.player_name.clone(),
            player_id: update.player_id.clone(),
            timezone: timezone.to_string(),
        };
        self.send_or_disconnect(&message);
    }

    pub fn shutdown(&mut self) {
        self.clear_reconnect_timer();
        self.transport = None;
        self.state = ConnectionState::Disconnected;
    }

    fn is_trusted_owner(&self, owner_id: &str) -> bool {
        owner_id == self.local_user_id || self.confirmed_friends.contains(owner_id)
    }

    // Full stored batch; no delta sync is attempted.
    fn push_stored_events_to_peer(&mut self, user_id: &str, store: &EventStore) {
        if store.is_empty() || self.state != ConnectionState::Connected {
            return;
        }
        let message = WireMessage::SyncLogs {
            target_user_id: Some(user_id.to_string()),
            logs: store.events().to_vec(),
        };
        self.send_or_disconnect(&message);
    }

    fn send_or_disconnect(&mut self, message: &WireMessage) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if let Err(error) = transport.send(message) {
            tracing::warn!(send_error = %error, "Transport send failed; reconnect armed");
            self.connection_failed(&error.to_string());
        }
    }

    fn arm_reconnect_timer(&mut self) {
        self.clear_reconnect_timer();
        let Some(sender) = self.reconnect_sender.clone() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        self.reconnect_timer = Some(runtime.spawn(async move {
            tokio::time::sleep(RECONNECT_DELAY).await;
            if sender.send(()).is_err() {
                tracing::debug!("Reconnect receiver dropped before timer fired");
            }
        }));
    }

    fn clear_reconnect_timer(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }
}

impl<T: Transport> Drop for SyncHandler<T> {
    fn drop(&mut self) {
        self.clear_reconnect_timer();
    }
}
