//! Matchmaking - FIFO queue and session creation

pub mod queue;
pub mod service;

pub use queue::{MatchmakingQueue, QueueError, QueuedPlayer};
pub use service::{Departure, MatchmakingService};
