//! Matchmaking queue implementation

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::game::player::{PlayerHandle, PlayerId};

/// Player in the matchmaking queue
#[derive(Debug, Clone)]
pub struct QueuedPlayer {
    pub player: PlayerHandle,
    pub queued_at: Instant,
}

impl QueuedPlayer {
    pub fn new(player: PlayerHandle) -> Self {
        Self {
            player,
            queued_at: Instant::now(),
        }
    }

    pub fn id(&self) -> PlayerId {
        self.player.id
    }

    /// How long this player has been waiting
    pub fn wait_time(&self) -> Duration {
        self.queued_at.elapsed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("player is already waiting for a match")]
    AlreadyQueued,

    #[error("player is already in a match")]
    AlreadyMatched,
}

/// FIFO pool of waiting players
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    queue: VecDeque<QueuedPlayer>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a player; a player is never queued twice
    pub fn enqueue(&mut self, player: QueuedPlayer) -> Result<(), QueueError> {
        if self.contains(&player.id()) {
            return Err(QueueError::AlreadyQueued);
        }
        self.queue.push_back(player);
        Ok(())
    }

    /// Remove a player from the queue
    pub fn dequeue(&mut self, player_id: PlayerId) -> Option<QueuedPlayer> {
        let pos = self.queue.iter().position(|p| p.id() == player_id)?;
        self.queue.remove(pos)
    }

    pub fn contains(&self, player_id: &PlayerId) -> bool {
        self.queue.iter().any(|p| &p.id() == player_id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take the two longest-waiting players together, if there are two
    pub fn try_form_pair(&mut self) -> Option<(QueuedPlayer, QueuedPlayer)> {
        if self.queue.len() < 2 {
            return None;
        }
        let first = self.queue.pop_front()?;
        let second = self.queue.pop_front()?;
        Some((first, second))
    }
}
