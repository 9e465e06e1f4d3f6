//! Client state machine driven by network events
//!
//! The controller never touches the socket. It consumes [`ClientEvent`]s
//! produced by the network task, sends [`ClientCommand`]s back, and returns
//! [`UiUpdate`]s for whatever front end is rendering the game.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::game::outcome::Choice;
use crate::net::protocol::{MoveReveal, ResultLine, ServerEvent};

use super::{ClientCommand, ClientError, ClientEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Connected,
    WaitingForOpponent,
    ChoosingMove,
    AwaitingResult,
    RoundOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    Won,
    Lost,
    Draw,
    /// No result, e.g. the opponent disconnected
    Aborted,
}

/// Something the front end should show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiUpdate {
    Status(String),
    MovesEnabled(bool),
    Opponent(String),
    Result {
        opponent: String,
        outcome: RoundOutcome,
        /// Both moves, when the round compared them
        reveal: Option<MoveReveal>,
        text: String,
    },
    /// Terminal failure; nothing further will happen
    Fatal(String),
}

pub struct ClientController {
    name: String,
    state: ClientState,
    opponent: Option<String>,
    round_secs: u64,
    failed: bool,
    commands: mpsc::UnboundedSender<ClientCommand>,
}

impl ClientController {
    pub fn new(name: impl Into<String>, commands: mpsc::UnboundedSender<ClientCommand>) -> Self {
        Self {
            name: name.into(),
            state: ClientState::Idle,
            opponent: None,
            round_secs: 59,
            failed: false,
            commands,
        }
    }

    /// Seconds announced to the player once a match starts
    pub fn with_round_secs(mut self, secs: u64) -> Self {
        self.round_secs = secs;
        self
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn opponent(&self) -> Option<&str> {
        self.opponent.as_deref()
    }

    pub fn can_submit(&self) -> bool {
        self.state == ClientState::ChoosingMove
    }

    /// Reconnection gave up; the controller accepts no further commands
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn handle_event(&mut self, event: ClientEvent) -> Vec<UiUpdate> {
        debug!(state = ?self.state, ?event, "Client event");

        match event {
            ClientEvent::Connected => {
                self.state = ClientState::Connected;
                vec![
                    UiUpdate::Status(format!("Hello {}, connecting you to a game...", self.name)),
                    UiUpdate::MovesEnabled(false),
                ]
            }
            ClientEvent::Server(server) => self.handle_server(server),
            ClientEvent::ConnectionLost => {
                self.state = ClientState::Idle;
                vec![
                    UiUpdate::Status("Connection lost, reconnecting...".to_string()),
                    UiUpdate::MovesEnabled(false),
                ]
            }
            ClientEvent::Reconnecting {
                attempt,
                max_attempts,
            } => vec![UiUpdate::Status(format!(
                "Reconnecting to the server (attempt {attempt} of {max_attempts})..."
            ))],
            ClientEvent::ConnectionFailed { attempts } => {
                warn!(attempts, "Giving up on the server");
                self.state = ClientState::Idle;
                self.failed = true;
                vec![
                    UiUpdate::MovesEnabled(false),
                    UiUpdate::Fatal("Could not reconnect to the server.".to_string()),
                ]
            }
        }
    }

    fn handle_server(&mut self, event: ServerEvent) -> Vec<UiUpdate> {
        match event {
            ServerEvent::Waiting => {
                self.state = ClientState::WaitingForOpponent;
                vec![UiUpdate::Status(format!(
                    "Hello {}, waiting for an opponent...",
                    self.name
                ))]
            }
            ServerEvent::MatchFound { opponent } => {
                info!(opponent = %opponent, "Match found");
                self.state = ClientState::ChoosingMove;
                self.opponent = Some(opponent.clone());
                vec![
                    UiUpdate::Opponent(opponent.clone()),
                    UiUpdate::Status(format!(
                        "Your opponent {opponent} has arrived. You have {} seconds to submit your move.",
                        self.round_secs
                    )),
                    UiUpdate::MovesEnabled(true),
                ]
            }
            ServerEvent::RoundResult {
                opponent,
                reveal,
                result,
            } => {
                let outcome = self.outcome_of(&opponent, &result);
                info!(opponent = %opponent, ?outcome, "Round over");
                self.state = ClientState::RoundOver;
                self.opponent = Some(opponent.clone());
                vec![
                    UiUpdate::MovesEnabled(false),
                    UiUpdate::Result {
                        opponent,
                        outcome,
                        reveal,
                        text: result.text().to_string(),
                    },
                ]
            }
            ServerEvent::Notice(text) => vec![UiUpdate::Status(text)],
        }
    }

    fn outcome_of(&self, opponent: &str, result: &ResultLine) -> RoundOutcome {
        match result {
            ResultLine::Draw { .. } => RoundOutcome::Draw,
            ResultLine::Aborted { .. } => RoundOutcome::Aborted,
            // Names can collide; the opponent's name is the tie breaker
            ResultLine::Winner { name, .. } if name == opponent && name != &self.name => {
                RoundOutcome::Lost
            }
            ResultLine::Winner { name, .. } if name == &self.name => RoundOutcome::Won,
            ResultLine::Winner { .. } => RoundOutcome::Lost,
        }
    }

    /// Send this round's move. Only one move is accepted per match announcement.
    pub fn submit_move(&mut self, choice: Choice) -> Result<Vec<UiUpdate>, ClientError> {
        if self.state != ClientState::ChoosingMove {
            return Err(ClientError::MoveNotAllowed(self.state));
        }
        self.commands
            .send(ClientCommand::Move(choice))
            .map_err(|_| ClientError::ChannelClosed)?;

        self.state = ClientState::AwaitingResult;
        Ok(vec![
            UiUpdate::MovesEnabled(false),
            UiUpdate::Status(format!("You chose {choice}. Waiting for the result...")),
        ])
    }

    /// Queue up for another round after the last one finished
    pub fn play_again(&mut self) -> Result<Vec<UiUpdate>, ClientError> {
        if self.failed || !matches!(self.state, ClientState::RoundOver | ClientState::Idle) {
            return Err(ClientError::MoveNotAllowed(self.state));
        }
        self.commands
            .send(ClientCommand::PlayAgain)
            .map_err(|_| ClientError::ChannelClosed)?;

        self.state = ClientState::Idle;
        self.opponent = None;
        Ok(vec![UiUpdate::Status("Looking for a new game...".to_string())])
    }

    pub fn quit(&mut self) {
        let _ = self.commands.send(ClientCommand::Quit);
        self.state = ClientState::Idle;
    }
}
