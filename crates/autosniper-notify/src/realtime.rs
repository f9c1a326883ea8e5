//! Registry of live real-time sessions per user.
//!
//! The transport (e.g. a WebSocket handler) registers a session with
//! [`ConnectionRegistry::connect`] and forwards whatever arrives on the
//! returned receiver. Delivery is at most once per session. Each session has
//! a bounded queue; a session whose receiver is gone or whose queue is full is
//! pruned on the next send.

use crate::event::NotificationEvent;
use autosniper_core::UserId;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Opaque identity of one live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(Uuid);

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Events buffered per session before it counts as stalled.
pub const SESSION_QUEUE_CAPACITY: usize = 64;

type Sessions = HashMap<SessionHandle, Sender<NotificationEvent>>;

/// Process-wide map from user to that user's live sessions.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<UserId, Sessions>>,
    capacity: usize,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::with_capacity(SESSION_QUEUE_CAPACITY)
    }
}

impl ConnectionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry whose sessions buffer `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a new session for `user_id`.
    pub async fn connect(
        &self,
        user_id: &UserId,
    ) -> (SessionHandle, Receiver<NotificationEvent>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let handle = SessionHandle(Uuid::new_v4());

        self.connections
            .write()
            .await
            .entry(user_id.clone())
            .or_default()
            .insert(handle, tx);

        tracing::info!(user_id = %user_id, session = %handle, "real-time session connected");
        (handle, rx)
    }

    /// Remove a session. Unknown handles are ignored.
    pub async fn disconnect(&self, user_id: &UserId, handle: SessionHandle) {
        let mut connections = self.connections.write().await;
        if let Some(sessions) = connections.get_mut(user_id) {
            sessions.remove(&handle);
            if sessions.is_empty() {
                connections.remove(user_id);
            }
        }
        tracing::info!(user_id = %user_id, session = %handle, "real-time session disconnected");
    }

    /// Number of live sessions for `user_id`.
    pub async fn session_count(&self, user_id: &UserId) -> usize {
        self.connections
            .read()
            .await
            .get(user_id)
            .map_or(0, HashMap::len)
    }

    /// Deliver `event` to every live session of `user_id`.
    ///
    /// Returns how many sessions accepted the event. Sessions that are closed
    /// or full are removed without affecting delivery to the others.
    pub async fn send_to_user(&self, user_id: &UserId, event: &NotificationEvent) -> usize {
        let mut failed = Vec::new();
        let mut delivered = 0;

        {
            let connections = self.connections.read().await;
            let Some(sessions) = connections.get(user_id) else {
                return 0;
            };
            for (handle, tx) in sessions {
                match tx.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            user_id = %user_id,
                            session = %handle,
                            "real-time session stalled"
                        );
                        failed.push(*handle);
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::warn!(
                            user_id = %user_id,
                            session = %handle,
                            "real-time send failed"
                        );
                        failed.push(*handle);
                    }
                }
            }
        }

        if !failed.is_empty() {
            let mut connections = self.connections.write().await;
            if let Some(sessions) = connections.get_mut(user_id) {
                for handle in &failed {
                    sessions.remove(handle);
                }
                if sessions.is_empty() {
                    connections.remove(user_id);
                }
            }
        }

        delivered
    }
}
