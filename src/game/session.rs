//! Session state machine for a single round between two players

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::net::protocol::{ForfeitReason, MoveReveal, ServerMsg, Verdict};

use super::outcome::{evaluate, Choice, Outcome, Side};
use super::player::{PlayerHandle, PlayerId};

pub type SessionId = Uuid;

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Match announced, collecting hidden choices
    AwaitingMoves,
    /// Round is being adjudicated
    Evaluating,
    /// Result announced to both players
    Completed,
    /// A player dropped before a result existed
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted)
    }
}

/// How the round came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEnd {
    BothMoved,
    Deadline,
    /// A player was disqualified for a protocol violation
    Forfeit,
}

/// Adjudicated round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundResult {
    Decided {
        winner: PlayerId,
        loser: PlayerId,
        end: RoundEnd,
    },
    Draw {
        end: RoundEnd,
    },
}

impl RoundResult {
    pub fn winner(&self) -> Option<PlayerId> {
        match self {
            RoundResult::Decided { winner, .. } => Some(*winner),
            RoundResult::Draw { .. } => None,
        }
    }
}

/// Effect of an accepted move
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Stored, still waiting on the opponent
    Recorded,
    /// Second move arrived and the round resolved
    RoundComplete(RoundResult),
}

/// Rejected session operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("move already submitted this round")]
    DuplicateMove,

    #[error("session is not accepting moves ({0:?})")]
    NotAwaitingMoves(SessionState),

    #[error("player is not part of this session")]
    UnknownPlayer,

    #[error("a session needs two distinct players")]
    SamePlayer,
}

struct Seat {
    player: PlayerHandle,
    choice: Option<Choice>,
}

struct SessionInner {
    state: SessionState,
    seats: [Seat; 2],
    result: Option<RoundResult>,
}

impl SessionInner {
    fn side_of(&self, player_id: PlayerId) -> Option<Side> {
        if self.seats[0].player.id == player_id {
            Some(Side::First)
        } else if self.seats[1].player.id == player_id {
            Some(Side::Second)
        } else {
            None
        }
    }

    fn seat(&self, side: Side) -> &Seat {
        &self.seats[side.index()]
    }
}

/// One match between two players.
///
/// All mutation happens under a single lock shared by both connection
/// handlers and the deadline timer, so the first of {deadline, second move}
/// to take the lock drives the transition out of `AwaitingMoves`.
pub struct Session {
    id: SessionId,
    deadline: Instant,
    inner: Mutex<SessionInner>,
    state_tx: watch::Sender<SessionState>,
}

impl Session {
    pub fn new(
        id: SessionId,
        first: PlayerHandle,
        second: PlayerHandle,
        round_time: Duration,
    ) -> Result<Self, SessionError> {
        if first.id == second.id {
            return Err(SessionError::SamePlayer);
        }

        let (state_tx, _) = watch::channel(SessionState::AwaitingMoves);

        Ok(Self {
            id,
            deadline: Instant::now() + round_time,
            inner: Mutex::new(SessionInner {
                state: SessionState::AwaitingMoves,
                seats: [
                    Seat {
                        player: first,
                        choice: None,
                    },
                    Seat {
                        player: second,
                        choice: None,
                    },
                ],
                result: None,
            }),
            state_tx,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn players(&self) -> [PlayerId; 2] {
        let inner = self.inner.lock();
        [inner.seats[0].player.id, inner.seats[1].player.id]
    }

    pub fn choice_of(&self, player_id: PlayerId) -> Option<Choice> {
        let inner = self.inner.lock();
        inner
            .side_of(player_id)
            .and_then(|side| inner.seat(side).choice)
    }

    pub fn result(&self) -> Option<RoundResult> {
        self.inner.lock().result.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Tell both players who they were paired with
    pub fn announce(&self) {
        let inner = self.inner.lock();
        if inner.state != SessionState::AwaitingMoves {
            return;
        }

        for side in [Side::First, Side::Second] {
            let opponent = inner.seat(side.other()).player.name.clone();
            inner.seat(side).player.send(ServerMsg::MatchFound { opponent });
        }

        info!(
            session_id = %self.id,
            first = %inner.seats[0].player.name,
            second = %inner.seats[1].player.name,
            "Match announced"
        );
    }

    /// Record a player's move. The first valid move per player is final.
    pub fn submit_move(
        &self,
        player_id: PlayerId,
        choice: Choice,
    ) -> Result<MoveOutcome, SessionError> {
        let mut inner = self.inner.lock();

        if inner.state != SessionState::AwaitingMoves {
            return Err(SessionError::NotAwaitingMoves(inner.state));
        }

        let side = inner.side_of(player_id).ok_or(SessionError::UnknownPlayer)?;
        let seat = &mut inner.seats[side.index()];
        if seat.choice.is_some() {
            return Err(SessionError::DuplicateMove);
        }
        seat.choice = Some(choice);

        debug!(session_id = %self.id, player_id = %player_id, "Move recorded");

        if inner.seats.iter().all(|s| s.choice.is_some()) {
            let result = self.resolve(&mut inner, RoundEnd::BothMoved, None);
            Ok(MoveOutcome::RoundComplete(result))
        } else {
            Ok(MoveOutcome::Recorded)
        }
    }

    /// Deadline reached: missing moves count as forfeits.
    /// Returns `None` if the round already ended.
    pub fn expire(&self) -> Option<RoundResult> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::AwaitingMoves {
            return None;
        }
        Some(self.resolve(&mut inner, RoundEnd::Deadline, None))
    }

    /// Disqualify a player who broke the protocol; the opponent wins
    pub fn forfeit(&self, player_id: PlayerId) -> Option<RoundResult> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::AwaitingMoves {
            return None;
        }
        let side = inner.side_of(player_id)?;
        Some(self.resolve(&mut inner, RoundEnd::Forfeit, Some(side)))
    }

    /// Connection loss. Aborts an unfinished round and notifies the other
    /// player; returns true if this call aborted the session.
    pub fn disconnect(&self, player_id: PlayerId) -> bool {
        let mut inner = self.inner.lock();

        let Some(side) = inner.side_of(player_id) else {
            return false;
        };
        if !matches!(
            inner.state,
            SessionState::AwaitingMoves | SessionState::Evaluating
        ) {
            return false;
        }

        self.set_state(&mut inner, SessionState::Aborted);

        let leaver = inner.seat(side).player.name.clone();
        inner
            .seat(side.other())
            .player
            .send(ServerMsg::OpponentDisconnected {
                opponent: leaver.clone(),
            });

        warn!(session_id = %self.id, player_id = %player_id, player = %leaver, "Session aborted, player disconnected");
        true
    }

    /// Fire the round deadline unless the session finishes first
    pub async fn run_deadline(&self) {
        let mut state_rx = self.subscribe();

        tokio::select! {
            _ = tokio::time::sleep_until(self.deadline) => {
                if let Some(result) = self.expire() {
                    info!(session_id = %self.id, ?result, "Round deadline reached");
                }
            }
            _ = wait_terminal(&mut state_rx) => {}
        }
    }

    fn set_state(&self, inner: &mut SessionInner, state: SessionState) {
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    /// AwaitingMoves -> Evaluating -> Completed, announcing the result
    fn resolve(
        &self,
        inner: &mut SessionInner,
        end: RoundEnd,
        disqualified: Option<Side>,
    ) -> RoundResult {
        self.set_state(inner, SessionState::Evaluating);

        let winning_side = match disqualified {
            Some(side) => Some(side.other()),
            None => match (inner.seats[0].choice, inner.seats[1].choice) {
                (Some(a), Some(b)) => match evaluate(a, b) {
                    Outcome::Winner(side) => Some(side),
                    Outcome::Draw => None,
                },
                (Some(_), None) => Some(Side::First),
                (None, Some(_)) => Some(Side::Second),
                (None, None) => None,
            },
        };

        let result = match winning_side {
            Some(side) => RoundResult::Decided {
                winner: inner.seat(side).player.id,
                loser: inner.seat(side.other()).player.id,
                end,
            },
            None => RoundResult::Draw { end },
        };

        let verdict = match (winning_side, end) {
            (Some(side), RoundEnd::BothMoved) => Verdict::Win {
                winner: inner.seat(side).player.name.clone(),
            },
            (Some(side), RoundEnd::Deadline) | (Some(side), RoundEnd::Forfeit) => {
                Verdict::Forfeit {
                    winner: inner.seat(side).player.name.clone(),
                    loser: inner.seat(side.other()).player.name.clone(),
                    reason: if end == RoundEnd::Deadline {
                        ForfeitReason::Timeout
                    } else {
                        ForfeitReason::Protocol
                    },
                }
            }
            (None, RoundEnd::BothMoved) => Verdict::Draw,
            (None, _) => Verdict::NoMoves,
        };

        for side in [Side::First, Side::Second] {
            let opponent = inner.seat(side.other()).player.name.clone();
            // Moves are only revealed when both were compared
            let reveal = match (end, inner.seat(side).choice, inner.seat(side.other()).choice) {
                (RoundEnd::BothMoved, Some(yours), Some(theirs)) => {
                    Some(MoveReveal { yours, theirs })
                }
                _ => None,
            };
            inner.seat(side).player.send(ServerMsg::RoundResult {
                opponent,
                reveal,
                verdict: verdict.clone(),
            });
        }

        info!(
            session_id = %self.id,
            result = %verdict.result_line(),
            "Round completed"
        );

        inner.result = Some(result.clone());
        self.set_state(inner, SessionState::Completed);
        result
    }
}

async fn wait_terminal(state_rx: &mut watch::Receiver<SessionState>) {
    while !state_rx.borrow_and_update().is_terminal() {
        if state_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Registry of live sessions
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.insert(session.id(), session);
    }

    pub fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, s)| s)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
