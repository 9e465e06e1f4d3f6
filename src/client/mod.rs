//! Player-side protocol: network task and local state machine

pub mod connection;
pub mod controller;

use std::io;

pub use connection::{ClientConnection, Connector, ReconnectPolicy, TcpConnector};
pub use controller::{ClientController, ClientState, RoundOutcome, UiUpdate};

use crate::game::outcome::Choice;
use crate::net::protocol::ServerEvent;

/// Errors surfaced by the client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect: {0}")]
    Connect(#[from] io::Error),

    #[error("could not reach the server after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("a move cannot be sent while {0:?}")]
    MoveNotAllowed(ClientState),

    #[error("network task is gone")]
    ChannelClosed,
}

/// Events from the network task to the interactive loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Connected and handshake sent
    Connected,
    Server(ServerEvent),
    /// Transport dropped before the round finished
    ConnectionLost,
    /// About to retry; `attempt` counts from 1
    Reconnecting { attempt: u32, max_attempts: u32 },
    /// Every attempt failed; the network task has stopped
    ConnectionFailed { attempts: u32 },
}

/// Commands from the interactive loop to the network task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Move(Choice),
    /// Start over with a fresh connection and queue entry
    PlayAgain,
    Quit,
}
