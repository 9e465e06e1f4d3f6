//! Matchmaking service - pairs queued players into sessions

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use crate::game::player::{PlayerHandle, PlayerId};
use crate::game::session::{Session, SessionId, SessionRegistry};

use super::queue::{MatchmakingQueue, QueueError, QueuedPlayer};

/// What happened to a player that left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// Removed from the waiting queue, no session was created
    LeftQueue,
    /// Was in a session, which was aborted
    AbortedSession,
    /// Session already finished, nothing to undo
    AfterSession,
    NotFound,
}

/// Matchmaking service
pub struct MatchmakingService {
    queue: Mutex<MatchmakingQueue>,
    registry: Arc<SessionRegistry>,
    /// Map of player -> current session
    player_sessions: Arc<DashMap<PlayerId, SessionId>>,
    round_time: Duration,
}

impl MatchmakingService {
    pub fn new(registry: Arc<SessionRegistry>, round_time: Duration) -> Self {
        Self {
            queue: Mutex::new(MatchmakingQueue::new()),
            registry,
            player_sessions: Arc::new(DashMap::new()),
            round_time,
        }
    }

    /// Join the queue. If a partner is already waiting the two oldest
    /// entries are paired immediately and the new session is returned.
    pub fn join_queue(&self, player: PlayerHandle) -> Result<Option<Arc<Session>>, QueueError> {
        let player_id = player.id;

        if self.player_sessions.contains_key(&player_id) {
            return Err(QueueError::AlreadyMatched);
        }

        let session = {
            let mut queue = self.queue.lock();
            queue.enqueue(QueuedPlayer::new(player))?;

            info!(player_id = %player_id, queue_size = queue.len(), "Player joined matchmaking queue");

            // Registered and announced while the queue lock is held, so a
            // concurrent leave() sees the player either queued or in an
            // announced session.
            let session = match queue.try_form_pair() {
                Some((first, second)) => self.create_session(first, second),
                None => None,
            };
            if let Some(session) = &session {
                session.announce();
            }
            session
        };

        if let Some(session) = &session {
            self.spawn_round(session.clone());
        }

        Ok(session)
    }

    /// Remove a player that disconnected, wherever they are
    pub fn leave(&self, player_id: PlayerId) -> Departure {
        {
            let mut queue = self.queue.lock();
            if queue.dequeue(player_id).is_some() {
                info!(player_id = %player_id, queue_size = queue.len(), "Player left matchmaking queue");
                return Departure::LeftQueue;
            }
        }

        match self.session_for(player_id) {
            Some(session) => {
                if session.disconnect(player_id) {
                    Departure::AbortedSession
                } else {
                    Departure::AfterSession
                }
            }
            None => Departure::NotFound,
        }
    }

    /// The player's current session, if they are matched
    pub fn session_for(&self, player_id: PlayerId) -> Option<Arc<Session>> {
        let session_id = *self.player_sessions.get(&player_id)?;
        self.registry.get(&session_id)
    }

    pub fn queue_size(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_in_queue(&self, player_id: &PlayerId) -> bool {
        self.queue.lock().contains(player_id)
    }

    fn create_session(&self, first: QueuedPlayer, second: QueuedPlayer) -> Option<Arc<Session>> {
        let session_id = Uuid::new_v4();
        let (first_id, second_id) = (first.id(), second.id());
        let first_wait = first.wait_time();

        let session = match Session::new(session_id, first.player, second.player, self.round_time) {
            Ok(session) => Arc::new(session),
            Err(e) => {
                error!(error = %e, "Failed to create session");
                return None;
            }
        };

        self.registry.insert(session.clone());
        self.player_sessions.insert(first_id, session_id);
        self.player_sessions.insert(second_id, session_id);

        info!(
            session_id = %session_id,
            first = %first_id,
            second = %second_id,
            first_wait_ms = first_wait.as_millis() as u64,
            "Created new session"
        );

        Some(session)
    }

    /// Arm the round deadline and dispose of the session once it ends
    fn spawn_round(&self, session: Arc<Session>) {
        let registry = self.registry.clone();
        let player_sessions = self.player_sessions.clone();

        tokio::spawn(async move {
            session.run_deadline().await;

            let session_id = session.id();
            registry.remove(&session_id);
            for player_id in session.players() {
                player_sessions.remove_if(&player_id, |_, sid| *sid == session_id);
            }

            info!(session_id = %session_id, state = ?session.state(), "Session removed from registry");
        });
    }
}
