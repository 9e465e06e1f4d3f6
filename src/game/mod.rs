//! Game rules, players and round sessions

pub mod outcome;
pub mod player;
pub mod session;

pub use outcome::{evaluate, Choice, Outcome, Side};
pub use player::{Player, PlayerHandle, PlayerId, PlayerStatus};
pub use session::{
    MoveOutcome, RoundEnd, RoundResult, Session, SessionError, SessionId, SessionRegistry,
    SessionState,
};
