//! Per-connection player record

use std::fmt;

use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::net::protocol::ServerMsg;

/// Outbound messages buffered per player before the writer drains them
pub const OUTBOX_CAPACITY: usize = 16;

/// Unique player identifier, one per accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a player's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Connected,
    Waiting,
    Matched,
    MoveSubmitted,
    Disconnected,
}

/// Cloneable, non-owning view of a player used by the queue and sessions
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    pub id: PlayerId,
    pub name: String,
    outbox: mpsc::Sender<ServerMsg>,
}

impl PlayerHandle {
    pub fn new(id: PlayerId, name: impl Into<String>, outbox: mpsc::Sender<ServerMsg>) -> Self {
        Self {
            id,
            name: name.into(),
            outbox,
        }
    }

    /// Queue a message for this player's connection without blocking.
    /// Returns false if the connection is gone or its outbox is full.
    pub fn send(&self, msg: ServerMsg) -> bool {
        match self.outbox.try_send(msg) {
            Ok(()) => true,
            Err(e) => {
                warn!(player_id = %self.id, error = %e, "Dropping outbound message");
                false
            }
        }
    }
}

/// Player owned by its connection handler
#[derive(Debug)]
pub struct Player {
    handle: PlayerHandle,
    status: PlayerStatus,
}

impl Player {
    pub fn new(name: impl Into<String>, outbox: mpsc::Sender<ServerMsg>) -> Self {
        Self {
            handle: PlayerHandle::new(PlayerId::new(), name, outbox),
            status: PlayerStatus::Connected,
        }
    }

    pub fn id(&self) -> PlayerId {
        self.handle.id
    }

    pub fn name(&self) -> &str {
        &self.handle.name
    }

    pub fn handle(&self) -> &PlayerHandle {
        &self.handle
    }

    pub fn status(&self) -> PlayerStatus {
        self.status
    }

    pub fn set_status(&mut self, status: PlayerStatus) {
        self.status = status;
    }
}
