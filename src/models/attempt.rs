// src/models/attempt.rs

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    AttemptId, QuestionId, TestId, UserId,
    question::{OptionId, PublicQuestion},
};
use crate::exam::{Selection, scorer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
    AutoSubmitted,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::AutoSubmitted => "auto_submitted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(AttemptStatus::InProgress),
            "submitted" => Ok(AttemptStatus::Submitted),
            "auto_submitted" => Ok(AttemptStatus::AutoSubmitted),
            other => Err(format!("unknown attempt status '{}'", other)),
        }
    }
}

/// Represents the 'test_attempts' table in the database.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub test_id: TestId,
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,

    /// Snapshot of the test's duration when the attempt started.
    pub duration_minutes: i32,

    pub submitted_at: Option<DateTime<Utc>>,
    pub time_taken_seconds: Option<i64>,
    pub score: i32,

    /// Snapshot of the test's total marks when the attempt started.
    pub total_marks: i32,

    pub status: AttemptStatus,
}

/// Represents the 'attempt_answers' table in the database.
/// One record per question per attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerRecord {
    pub attempt_id: AttemptId,
    pub question_id: QuestionId,
    pub selected_answers: Selection,
    pub is_correct: bool,
    pub marks_obtained: i32,
}

/// Input for `ExamStore::create_attempt`.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub test_id: TestId,
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub total_marks: i32,
}

/// An attempt joined with its test's title.
#[derive(Debug, Clone)]
pub struct AttemptWithTitle {
    pub attempt: Attempt,
    pub test_title: String,
}

/// An attempt joined with the student who made it.
#[derive(Debug, Clone)]
pub struct AttemptWithStudent {
    pub attempt: Attempt,
    pub student_name: String,
    pub student_email: String,
}

/// An attempt with its display percentage.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptResult {
    #[serde(flatten)]
    pub attempt: Attempt,

    /// Score as a percentage of total marks, one decimal (e.g. "70.0%").
    pub percentage: String,

    pub passed: bool,
}

impl From<Attempt> for AttemptResult {
    fn from(attempt: Attempt) -> Self {
        Self {
            percentage: scorer::format_percentage(attempt.score, attempt.total_marks),
            passed: scorer::is_passing(attempt.score, attempt.total_marks),
            attempt,
        }
    }
}

/// Entry of the student's test history.
#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub result: AttemptResult,
    pub test_title: String,
}

/// Entry of an admin's per-test results view.
#[derive(Debug, Serialize)]
pub struct TestResultEntry {
    #[serde(flatten)]
    pub result: AttemptResult,
    pub student_name: String,
    pub student_email: String,
}

/// Everything a student needs to render (or resume) an attempt.
#[derive(Debug, Serialize)]
pub struct AttemptPaper {
    pub attempt: AttemptResult,
    pub test_title: String,
    pub deadline: DateTime<Utc>,
    pub remaining_seconds: i64,
    pub questions: Vec<PublicQuestion>,
    pub selections: BTreeMap<QuestionId, Selection>,

    /// Per-question grading, present once the attempt is terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graded: Option<Vec<AnswerRecord>>,
}

/// Response to a submit or expiry request.
#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    #[serde(flatten)]
    pub result: AttemptResult,

    /// The attempt had already been closed; nothing was rescored.
    pub already_finalized: bool,

    pub answers: Vec<AnswerRecord>,
}

/// DTO for selecting (or toggling) an option.
#[derive(Debug, Deserialize)]
pub struct SelectAnswerRequest {
    pub question_id: QuestionId,
    pub option_id: OptionId,
}

#[derive(Debug, Serialize)]
pub struct SelectAnswerResponse {
    pub question_id: QuestionId,
    pub selected_answers: Selection,
}
