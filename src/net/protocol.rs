//! Line protocol spoken between players and the match server
//!
//! Every logical message is one UTF-8 line terminated by `\n`. The substrings
//! `Match found with`, `wins!` and `It's a draw!` are matched by peers and must
//! not change. Player names never contain them.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::game::outcome::Choice;

pub const MATCH_FOUND_PREFIX: &str = "Match found with";
pub const WINS_SUFFIX: &str = "wins!";
pub const DRAW_TEXT: &str = "It's a draw!";
pub const WAITING_TEXT: &str = "Waiting for an opponent...";
pub const REVEAL_PREFIX: &str = "Your move is";
const REVEAL_INFIX: &str = ". Your opponent's move is";

/// Substrings a display name may not carry, since clients key on them
const RESERVED_MARKERS: [&str; 4] = [MATCH_FOUND_PREFIX, WINS_SUFFIX, DRAW_TEXT, REVEAL_PREFIX];

/// Display name used when the handshake line is blank
pub const DEFAULT_PLAYER_NAME: &str = "Player";
pub const MAX_NAME_CHARS: usize = 49;
/// Longest accepted line, excluding the terminator
pub const MAX_LINE_BYTES: usize = 256;

/// Malformed or unexpected wire data
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown move token {0:?}")]
    UnknownMove(String),

    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("empty line")]
    EmptyLine,
}

/// Failure while reading a line off a stream
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

// ============================================================================
// Client -> server
// ============================================================================

/// Messages sent by a player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMsg {
    /// First line after connecting: the display name
    Handshake(String),
    /// One move per round
    Move(Choice),
}

impl ClientMsg {
    pub fn encode(&self) -> String {
        match self {
            ClientMsg::Handshake(name) => format!("{}\n", normalize_name(name)),
            ClientMsg::Move(choice) => format!("{}\n", choice.as_str()),
        }
    }
}

/// Clean up a handshake line into a display name
///
/// Protocol markers are removed until none remain, so a name can never be
/// mistaken for an announcement or a result.
pub fn normalize_name(raw: &str) -> String {
    let mut name: String = raw.chars().filter(|c| !c.is_control()).collect();
    while let Some(marker) = RESERVED_MARKERS.iter().copied().find(|m| name.contains(m)) {
        name = name.replace(marker, "");
    }
    let name: String = name.trim().chars().take(MAX_NAME_CHARS).collect();
    let name = name.trim();

    if name.is_empty() {
        DEFAULT_PLAYER_NAME.to_string()
    } else {
        name.to_string()
    }
}

/// Decode a move line sent after the handshake
pub fn decode_move(line: &str) -> Result<Choice, ProtocolError> {
    if line.trim().is_empty() {
        return Err(ProtocolError::EmptyLine);
    }
    line.parse::<Choice>()
        .map_err(|e| ProtocolError::UnknownMove(e.0))
}

// ============================================================================
// Server -> client
// ============================================================================

/// Why a round ended without both moves being compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForfeitReason {
    /// Deadline passed before the player moved
    Timeout,
    /// Player sent something that was not a move
    Protocol,
}

/// Text of the second line of a result announcement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Win { winner: String },
    Draw,
    Forfeit {
        winner: String,
        loser: String,
        reason: ForfeitReason,
    },
    /// Nobody moved before the deadline
    NoMoves,
}

impl Verdict {
    pub fn result_line(&self) -> String {
        match self {
            Verdict::Win { winner } => format!("{winner} {WINS_SUFFIX}"),
            Verdict::Draw => DRAW_TEXT.to_string(),
            Verdict::Forfeit {
                winner,
                loser,
                reason: ForfeitReason::Timeout,
            } => format!("{winner} {WINS_SUFFIX} {loser} did not move in time."),
            Verdict::Forfeit {
                winner,
                loser,
                reason: ForfeitReason::Protocol,
            } => format!("{winner} {WINS_SUFFIX} {loser} forfeited."),
            Verdict::NoMoves => format!("{DRAW_TEXT} Neither player moved in time."),
        }
    }
}

/// Both moves of a compared round, from one player's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveReveal {
    pub yours: Choice,
    pub theirs: Choice,
}

impl MoveReveal {
    pub fn line(&self) -> String {
        format!("{REVEAL_PREFIX} {}{REVEAL_INFIX} {}.", self.yours, self.theirs)
    }

    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.trim().strip_prefix(REVEAL_PREFIX)?;
        let (yours, theirs) = rest.strip_suffix('.')?.split_once(REVEAL_INFIX)?;
        Some(Self {
            yours: yours.parse().ok()?,
            theirs: theirs.parse().ok()?,
        })
    }
}

/// Messages sent by the server to one player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMsg {
    /// Handshake accepted, player is queued
    Waiting,
    MatchFound { opponent: String },
    /// Optional move reveal, then the opponent name and the result line
    RoundResult {
        opponent: String,
        reveal: Option<MoveReveal>,
        verdict: Verdict,
    },
    /// Round aborted because the other side dropped
    OpponentDisconnected { opponent: String },
}

impl ServerMsg {
    pub fn lines(&self) -> Vec<String> {
        match self {
            ServerMsg::Waiting => vec![WAITING_TEXT.to_string()],
            ServerMsg::MatchFound { opponent } => {
                vec![format!("{MATCH_FOUND_PREFIX} {opponent}!")]
            }
            ServerMsg::RoundResult {
                opponent,
                reveal,
                verdict,
            } => reveal
                .iter()
                .map(MoveReveal::line)
                .chain([opponent.clone(), verdict.result_line()])
                .collect(),
            ServerMsg::OpponentDisconnected { opponent } => vec![
                opponent.clone(),
                format!("{opponent} disconnected. The game could not be completed."),
            ],
        }
    }

    /// Wire bytes, one `\n` per line
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for line in self.lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

/// Second line of a result announcement, as seen by a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultLine {
    Winner { name: String, text: String },
    Draw { text: String },
    /// Round did not produce a result (disconnect or error notice)
    Aborted { text: String },
}

impl ResultLine {
    pub fn parse(line: &str) -> Self {
        let text = line.to_string();
        if line.contains(DRAW_TEXT) {
            ResultLine::Draw { text }
        } else if let Some(idx) = line.find(WINS_SUFFIX) {
            let name = line[..idx].trim().to_string();
            ResultLine::Winner { name, text }
        } else {
            ResultLine::Aborted { text }
        }
    }

    pub fn text(&self) -> &str {
        match self {
            ResultLine::Winner { text, .. }
            | ResultLine::Draw { text }
            | ResultLine::Aborted { text } => text,
        }
    }
}

/// Decoded server traffic on the client side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Waiting,
    MatchFound { opponent: String },
    RoundResult {
        opponent: String,
        reveal: Option<MoveReveal>,
        result: ResultLine,
    },
    /// Line that fits no known shape
    Notice(String),
}

/// Stateful decoder for server lines
///
/// A result announcement spans two lines (opponent name, then result), so
/// after a match announcement the decoder pairs up the following lines. A
/// move reveal may come first. Inside a round the next line is always taken
/// as the opponent name, whatever it contains.
#[derive(Debug, Default)]
pub struct ServerLineDecoder {
    in_round: bool,
    reveal: Option<MoveReveal>,
    pending_opponent: Option<String>,
}

impl ServerLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, line: &str) -> Option<ServerEvent> {
        if let Some(opponent) = self.pending_opponent.take() {
            self.in_round = false;
            return Some(ServerEvent::RoundResult {
                opponent,
                reveal: self.reveal.take(),
                result: ResultLine::parse(line),
            });
        }

        if self.in_round {
            if self.reveal.is_none() {
                if let Some(reveal) = MoveReveal::parse(line) {
                    self.reveal = Some(reveal);
                    return None;
                }
            }
            self.pending_opponent = Some(line.trim().to_string());
            return None;
        }

        if line.contains(MATCH_FOUND_PREFIX) {
            self.in_round = true;
            self.reveal = None;
            return Some(ServerEvent::MatchFound {
                opponent: parse_opponent(line),
            });
        }

        if line.trim() == WAITING_TEXT {
            Some(ServerEvent::Waiting)
        } else {
            Some(ServerEvent::Notice(line.to_string()))
        }
    }
}

fn parse_opponent(line: &str) -> String {
    line.split_once(MATCH_FOUND_PREFIX)
        .map(|(_, rest)| rest)
        .unwrap_or_default()
        .split('!')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

// ============================================================================
// Framing
// ============================================================================

/// Splits a byte stream into lines; partial lines stay buffered
///
/// After an overlong line is rejected, input is dropped up to and including
/// the next `\n`.
#[derive(Debug)]
pub struct LineFramer {
    buf: BytesMut,
    limit: usize,
    discarding: bool,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(limit + 1),
            limit,
            discarding: false,
        }
    }

    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Next complete line without its terminator, if one is buffered
    pub fn next_line(&mut self) -> Result<Option<String>, ProtocolError> {
        if self.discarding {
            match self.buf.iter().position(|b| *b == b'\n') {
                Some(end) => {
                    let _ = self.buf.split_to(end + 1);
                    self.discarding = false;
                }
                None => {
                    self.buf.clear();
                    return Ok(None);
                }
            }
        }

        match self.buf.iter().position(|b| *b == b'\n') {
            Some(end) => {
                let frame = self.buf.split_to(end + 1);
                if end > self.limit {
                    return Err(ProtocolError::LineTooLong { limit: self.limit });
                }
                let mut line = &frame[..end];
                if line.last() == Some(&b'\r') {
                    line = &line[..line.len() - 1];
                }
                std::str::from_utf8(line)
                    .map(|s| Some(s.to_string()))
                    .map_err(|_| ProtocolError::InvalidUtf8)
            }
            None if self.buf.len() > self.limit => {
                self.buf.clear();
                self.discarding = true;
                Err(ProtocolError::LineTooLong { limit: self.limit })
            }
            None => Ok(None),
        }
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads framed lines from an async byte stream
pub struct LineReader<R> {
    inner: R,
    framer: LineFramer,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            framer: LineFramer::new(),
        }
    }

    /// Next line, or `None` once the peer closed the stream.
    /// Cancel safe: buffered bytes survive a dropped future.
    pub async fn next_line(&mut self) -> Result<Option<String>, ReadError> {
        loop {
            if let Some(line) = self.framer.next_line()? {
                return Ok(Some(line));
            }
            if self.inner.read_buf(self.framer.buffer_mut()).await? == 0 {
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_found_text() {
        let msg = ServerMsg::MatchFound {
            opponent: "Bob".into(),
        };
        assert_eq!(msg.encode(), "Match found with Bob!\n");
    }

    #[test]
    fn test_result_is_two_lines() {
        let msg = ServerMsg::RoundResult {
            opponent: "Bob".into(),
            reveal: None,
            verdict: Verdict::Win {
                winner: "Alice".into(),
            },
        };
        assert_eq!(msg.encode(), "Bob\nAlice wins!\n");

        let draw = ServerMsg::RoundResult {
            opponent: "Bob".into(),
            reveal: None,
            verdict: Verdict::Draw,
        };
        assert_eq!(draw.encode(), "Bob\nIt's a draw!\n");
    }

    #[test]
    fn test_reveal_precedes_result() {
        let reveal = MoveReveal {
            yours: Choice::Rock,
            theirs: Choice::Scissors,
        };
        let msg = ServerMsg::RoundResult {
            opponent: "Bob".into(),
            reveal: Some(reveal),
            verdict: Verdict::Win {
                winner: "Alice".into(),
            },
        };
        let lines = msg.lines();
        assert_eq!(
            lines,
            vec![
                "Your move is rock. Your opponent's move is scissors.".to_string(),
                "Bob".to_string(),
                "Alice wins!".to_string(),
            ]
        );
        assert!(!lines[0].contains(MATCH_FOUND_PREFIX));
        assert!(!lines[0].contains(WINS_SUFFIX));
        assert!(!lines[0].contains(DRAW_TEXT));
        assert_eq!(MoveReveal::parse(&lines[0]), Some(reveal));
        assert_eq!(MoveReveal::parse("Your move is spock. Your opponent's move is rock."), None);
    }

    #[test]
    fn test_forfeit_lines_keep_markers() {
        let timeout = Verdict::Forfeit {
            winner: "Alice".into(),
            loser: "Bob".into(),
            reason: ForfeitReason::Timeout,
        };
        assert!(timeout.result_line().starts_with("Alice wins!"));
        assert!(Verdict::NoMoves.result_line().starts_with(DRAW_TEXT));
    }

    #[test]
    fn test_disconnect_notice_has_no_result_marker() {
        let lines = ServerMsg::OpponentDisconnected {
            opponent: "Bob".into(),
        }
        .lines();
        assert_eq!(lines.len(), 2);
        assert!(!lines[1].contains(WINS_SUFFIX));
        assert!(!lines[1].contains(DRAW_TEXT));
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Alice \r"), "Alice");
        assert_eq!(normalize_name(""), DEFAULT_PLAYER_NAME);
        assert_eq!(normalize_name(" \t "), DEFAULT_PLAYER_NAME);
        assert_eq!(normalize_name(&"x".repeat(80)).len(), MAX_NAME_CHARS);
    }

    #[test]
    fn test_normalize_name_strips_markers() {
        assert_eq!(normalize_name("It's a draw!"), DEFAULT_PLAYER_NAME);
        assert_eq!(normalize_name("Match found with Eve"), "Eve");
        assert_eq!(normalize_name("Eve wins! It's a draw!"), "Eve");
        assert_eq!(normalize_name("Your move is rock"), "rock");
        // Removing one marker must not leave another behind
        assert_eq!(normalize_name("winwins!s!"), DEFAULT_PLAYER_NAME);

        for raw in ["Match found with Eve", "It's a draw! wins!", "Eve wins!"] {
            let name = normalize_name(raw);
            for marker in RESERVED_MARKERS {
                assert!(!name.contains(marker), "{name:?} still has {marker:?}");
            }
        }
    }

    #[test]
    fn test_sanitized_winner_parses_back() {
        let winner = normalize_name("Eve wins! It's a draw!");
        let line = Verdict::Win { winner }.result_line();
        assert_eq!(
            ResultLine::parse(&line),
            ResultLine::Winner {
                name: "Eve".into(),
                text: "Eve wins!".into()
            }
        );

        let winner = normalize_name("It's a draw! wins!");
        let line = Verdict::Win { winner }.result_line();
        assert!(matches!(
            ResultLine::parse(&line),
            ResultLine::Winner { name, .. } if name == DEFAULT_PLAYER_NAME
        ));
    }

    #[test]
    fn test_decode_move() {
        assert_eq!(decode_move("rock"), Ok(Choice::Rock));
        assert_eq!(decode_move(""), Err(ProtocolError::EmptyLine));
        assert_eq!(
            decode_move("spock"),
            Err(ProtocolError::UnknownMove("spock".into()))
        );
    }

    #[test]
    fn test_framer_holds_partial_lines() {
        let mut framer = LineFramer::new();
        framer.buffer_mut().extend_from_slice(b"roc");
        assert_eq!(framer.next_line(), Ok(None));

        framer.buffer_mut().extend_from_slice(b"k\r\npaper\nsci");
        assert_eq!(framer.next_line(), Ok(Some("rock".into())));
        assert_eq!(framer.next_line(), Ok(Some("paper".into())));
        assert_eq!(framer.next_line(), Ok(None));
    }

    #[test]
    fn test_framer_rejects_oversized_lines() {
        let mut framer = LineFramer::with_limit(8);
        framer.buffer_mut().extend_from_slice(b"0123456789abc");
        assert_eq!(
            framer.next_line(),
            Err(ProtocolError::LineTooLong { limit: 8 })
        );

        // Tail of the rejected line is dropped, not returned as a new line
        framer.buffer_mut().extend_from_slice(b"tail");
        assert_eq!(framer.next_line(), Ok(None));
        framer.buffer_mut().extend_from_slice(b"rock\n");
        assert_eq!(framer.next_line(), Ok(None));
        framer.buffer_mut().extend_from_slice(b"ok\n");
        assert_eq!(framer.next_line(), Ok(Some("ok".into())));
    }

    #[test]
    fn test_framer_drops_overflow_tail_in_same_chunk() {
        let mut framer = LineFramer::with_limit(8);
        framer.buffer_mut().extend_from_slice(b"0123456789");
        assert!(framer.next_line().is_err());
        framer.buffer_mut().extend_from_slice(b"paper\nscissors\n");
        assert_eq!(framer.next_line(), Ok(Some("scissors".into())));
        assert_eq!(framer.next_line(), Ok(None));
    }

    #[test]
    fn test_framer_rejects_invalid_utf8() {
        let mut framer = LineFramer::new();
        framer.buffer_mut().extend_from_slice(&[0xff, 0xfe, b'\n']);
        assert_eq!(framer.next_line(), Err(ProtocolError::InvalidUtf8));
    }

    #[test]
    fn test_decoder_pairs_result_lines() {
        let mut decoder = ServerLineDecoder::new();
        assert_eq!(decoder.feed(WAITING_TEXT), Some(ServerEvent::Waiting));
        assert_eq!(
            decoder.feed("Match found with Bob! Please make your move."),
            Some(ServerEvent::MatchFound {
                opponent: "Bob".into()
            })
        );
        assert_eq!(decoder.feed("Bob"), None);
        assert_eq!(
            decoder.feed("Alice wins!"),
            Some(ServerEvent::RoundResult {
                opponent: "Bob".into(),
                reveal: None,
                result: ResultLine::Winner {
                    name: "Alice".into(),
                    text: "Alice wins!".into()
                },
            })
        );
    }

    #[test]
    fn test_decoder_attaches_reveal() {
        let mut decoder = ServerLineDecoder::new();
        decoder.feed("Match found with Bob!");
        let reveal = MoveReveal {
            yours: Choice::Paper,
            theirs: Choice::Paper,
        };
        let msg = ServerMsg::RoundResult {
            opponent: "Bob".into(),
            reveal: Some(reveal),
            verdict: Verdict::Draw,
        };
        let events: Vec<_> = msg.lines().iter().filter_map(|l| decoder.feed(l)).collect();
        assert_eq!(
            events,
            vec![ServerEvent::RoundResult {
                opponent: "Bob".into(),
                reveal: Some(reveal),
                result: ResultLine::Draw {
                    text: DRAW_TEXT.into()
                },
            }]
        );
    }

    #[test]
    fn test_decoder_takes_opponent_line_verbatim() {
        // An opponent line that looks like a match announcement is still a name
        let mut decoder = ServerLineDecoder::new();
        assert!(matches!(
            decoder.feed("Match found with Eve!"),
            Some(ServerEvent::MatchFound { .. })
        ));
        assert_eq!(decoder.feed("Match found with Eve"), None);
        assert_eq!(
            decoder.feed("Alice wins!"),
            Some(ServerEvent::RoundResult {
                opponent: "Match found with Eve".into(),
                reveal: None,
                result: ResultLine::Winner {
                    name: "Alice".into(),
                    text: "Alice wins!".into()
                },
            })
        );

        // The next round starts normally
        assert_eq!(
            decoder.feed("Match found with Eve!"),
            Some(ServerEvent::MatchFound {
                opponent: "Eve".into()
            })
        );
    }

    #[test]
    fn test_decoder_disconnect_notice() {
        let mut decoder = ServerLineDecoder::new();
        decoder.feed("Match found with Bob!");
        let lines = ServerMsg::OpponentDisconnected {
            opponent: "Bob".into(),
        }
        .lines();
        assert_eq!(decoder.feed(&lines[0]), None);
        match decoder.feed(&lines[1]) {
            Some(ServerEvent::RoundResult {
                result: ResultLine::Aborted { .. },
                ..
            }) => {}
            other => panic!("expected aborted result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_line_reader_over_stream() {
        let stream = tokio_test::io::Builder::new()
            .read(b"Alice\nro")
            .read(b"ck\n")
            .build();
        let mut reader = LineReader::new(stream);

        assert_eq!(reader.next_line().await.unwrap(), Some("Alice".into()));
        assert_eq!(reader.next_line().await.unwrap(), Some("rock".into()));
        assert_eq!(reader.next_line().await.unwrap(), None);
    }
}
