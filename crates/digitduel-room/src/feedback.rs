//! The feedback engine: scoring a guess against a secret.
//!
//! Pure functions over validated [`Code`]s. Nothing here knows about rooms,
//! turns, or players.

use std::fmt;
use std::str::FromStr;

use digitduel_protocol::{CODE_LENGTH, Feedback, GameMode};

use crate::RoomError;

/// A validated five-digit code. Leading zeros and repeated digits are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code([u8; CODE_LENGTH]);

impl Code {
    /// Parses `value`, which must be exactly five ASCII digits.
    ///
    /// # Errors
    /// Returns [`RoomError::Validation`] for any other length or character.
    pub fn parse(value: &str) -> Result<Self, RoomError> {
        let bytes = value.as_bytes();
        if bytes.len() != CODE_LENGTH {
            return Err(RoomError::Validation(format!(
                "expected {CODE_LENGTH} digits, got {} characters",
                value.chars().count()
            )));
        }

        let mut digits = [0u8; CODE_LENGTH];
        for (slot, &byte) in digits.iter_mut().zip(bytes) {
            if !byte.is_ascii_digit() {
                return Err(RoomError::Validation(format!(
                    "{value:?} contains a non-digit character"
                )));
            }
            *slot = byte - b'0';
        }
        Ok(Self(digits))
    }

    pub fn digits(&self) -> &[u8; CODE_LENGTH] {
        &self.0
    }
}

impl FromStr for Code {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for digit in self.0 {
            write!(f, "{digit}")?;
        }
        Ok(())
    }
}

/// Raw match counts for one guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    /// Positions where guess and secret agree.
    pub exact: u8,
    /// Remaining guess digits that occur at some other unmatched secret position.
    pub misplaced: u8,
}

impl Score {
    /// Guess digits that match nothing in the secret.
    pub fn out_of_place(&self) -> u8 {
        CODE_LENGTH as u8 - self.exact - self.misplaced
    }
}

/// Counts exact and misplaced digits with multiset semantics.
///
/// Exact matches are taken first. The misplaced count then pairs each
/// unmatched guess digit with at most one unmatched secret occurrence, so a
/// repeated digit is never credited more often than the secret holds it.
pub fn score(guess: &Code, secret: &Code) -> Score {
    let mut exact = 0;
    // Unmatched secret digits, counted by value.
    let mut pool = [0u8; 10];
    let mut open = [None; CODE_LENGTH];

    for (i, (&g, &s)) in guess.0.iter().zip(&secret.0).enumerate() {
        if g == s {
            exact += 1;
        } else {
            pool[s as usize] += 1;
            open[i] = Some(g);
        }
    }

    let mut misplaced = 0;
    for g in open.into_iter().flatten() {
        let left = &mut pool[g as usize];
        if *left > 0 {
            *left -= 1;
            misplaced += 1;
        }
    }

    Score { exact, misplaced }
}

/// The outcome of one guess: what the guesser is told, and whether it won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub feedback: Feedback,
    pub solved: bool,
}

/// Scores `guess` against `secret` and shapes the result for `mode`.
///
/// Standard mode reveals both counts. Hard mode only reveals how many digits
/// are in the secret at all, without saying which are in place. In both
/// modes the guess wins only when every position matches.
pub fn evaluate(guess: &Code, secret: &Code, mode: GameMode) -> Verdict {
    let score = score(guess, secret);
    let feedback = match mode {
        GameMode::Standard => Feedback::Standard {
            exact: score.exact,
            misplaced: score.misplaced,
            out_of_place: score.out_of_place(),
        },
        GameMode::Hard => Feedback::Hard {
            total_correct: score.exact + score.misplaced,
        },
    };
    Verdict {
        feedback,
        solved: score.exact == CODE_LENGTH as u8,
    }
}
