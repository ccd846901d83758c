// src/exam/mod.rs

//! Attempt timing, answer collection and scoring.
//!
//! Everything here is pure computation over already-loaded models. The
//! handlers load state from the store, run it through these types and persist
//! whatever they return.

pub mod attempt;
pub mod collector;
pub mod scorer;
pub mod timer;

use thiserror::Error;

use crate::models::{QuestionId, question::OptionId};

pub use attempt::{AttemptSession, Finalization, Trigger};
pub use collector::{AnswerSheet, Selection, ensure_offered};
pub use scorer::{QuestionOutcome, ScoreCard};
pub use timer::AttemptTimer;

/// Errors raised while collecting answers or closing an attempt.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExamError {
    /// The question does not belong to the attempt's test.
    #[error("Question {0} is not part of this test")]
    UnknownQuestion(QuestionId),

    /// The option is not one of the question's options.
    #[error("Question {question_id} has no option '{option_id}'")]
    UnknownOption {
        question_id: QuestionId,
        option_id: OptionId,
    },

    /// An expiry signal arrived while time was still left.
    #[error("Attempt time has not run out yet ({remaining_seconds}s remaining)")]
    NotExpired { remaining_seconds: i64 },
}
