//! Choices and the round adjudication table

use std::fmt;
use std::str::FromStr;

/// A move a player can submit for a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Choice {
    Rock,
    Paper,
    Scissors,
}

impl Choice {
    pub const ALL: [Choice; 3] = [Choice::Rock, Choice::Paper, Choice::Scissors];

    /// Wire token for this choice
    pub fn as_str(self) -> &'static str {
        match self {
            Choice::Rock => "rock",
            Choice::Paper => "paper",
            Choice::Scissors => "scissors",
        }
    }

    /// The choice this one defeats
    pub fn beats(self) -> Choice {
        match self {
            Choice::Rock => Choice::Scissors,
            Choice::Scissors => Choice::Paper,
            Choice::Paper => Choice::Rock,
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token did not name a known move
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown move: {0:?}")]
pub struct UnknownChoice(pub String);

impl FromStr for Choice {
    type Err = UnknownChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Choice::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(token))
            .ok_or_else(|| UnknownChoice(token.to_string()))
    }
}

/// Which of the two evaluated choices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    First,
    Second,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::First => Side::Second,
            Side::Second => Side::First,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Side::First => 0,
            Side::Second => 1,
        }
    }
}

/// Result of comparing two choices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Winner(Side),
    Draw,
}

/// Compare two choices with the standard beats relation
pub fn evaluate(a: Choice, b: Choice) -> Outcome {
    if a == b {
        Outcome::Draw
    } else if a.beats() == b {
        Outcome::Winner(Side::First)
    } else {
        Outcome::Winner(Side::Second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagonal_is_draw() {
        for c in Choice::ALL {
            assert_eq!(evaluate(c, c), Outcome::Draw);
        }
    }

    #[test]
    fn test_antisymmetric_off_diagonal() {
        for a in Choice::ALL {
            for b in Choice::ALL {
                if a == b {
                    continue;
                }
                match (evaluate(a, b), evaluate(b, a)) {
                    (Outcome::Winner(x), Outcome::Winner(y)) => assert_eq!(x, y.other()),
                    other => panic!("expected a winner both ways for {a}/{b}, got {other:?}"),
                }
            }
        }
    }

    #[test]
    fn test_win_counts() {
        let all: Vec<Outcome> = Choice::ALL
            .iter()
            .flat_map(|a| Choice::ALL.iter().map(move |b| evaluate(*a, *b)))
            .collect();

        let first = all.iter().filter(|o| **o == Outcome::Winner(Side::First)).count();
        let second = all.iter().filter(|o| **o == Outcome::Winner(Side::Second)).count();
        let draws = all.iter().filter(|o| **o == Outcome::Draw).count();
        assert_eq!((first, second, draws), (3, 3, 3));
    }

    #[test]
    fn test_standard_rules() {
        assert_eq!(evaluate(Choice::Rock, Choice::Scissors), Outcome::Winner(Side::First));
        assert_eq!(evaluate(Choice::Scissors, Choice::Paper), Outcome::Winner(Side::First));
        assert_eq!(evaluate(Choice::Paper, Choice::Rock), Outcome::Winner(Side::First));
        assert_eq!(evaluate(Choice::Rock, Choice::Paper), Outcome::Winner(Side::Second));
    }

    #[test]
    fn test_parse_tokens() {
        assert_eq!("rock".parse::<Choice>(), Ok(Choice::Rock));
        assert_eq!(" Paper\r".parse::<Choice>(), Ok(Choice::Paper));
        assert_eq!("SCISSORS".parse::<Choice>(), Ok(Choice::Scissors));
        assert_eq!("lizard".parse::<Choice>(), Err(UnknownChoice("lizard".into())));
    }
}
