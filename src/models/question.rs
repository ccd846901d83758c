// src/models/question.rs

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{QuestionId, TestId};

/// Identifier of an answer option, unique within its question (e.g. "1".."4").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionId(String);

impl OptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How many options a question's answer key may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Exactly one correct option; selecting replaces the previous choice.
    SingleCorrect,
    /// One or more correct options; selecting toggles membership.
    MultiCorrect,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::SingleCorrect => "single_correct",
            QuestionType::MultiCorrect => "multi_correct",
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_correct" => Ok(QuestionType::SingleCorrect),
            "multi_correct" => Ok(QuestionType::MultiCorrect),
            other => Err(format!("unknown question type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: OptionId,
    pub text: String,
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub id: QuestionId,
    pub test_id: TestId,
    pub text: String,
    pub question_type: QuestionType,

    /// Options in display order.
    pub options: Vec<ChoiceOption>,

    /// The authoritative answer key. Always a subset of the option ids.
    pub correct_answers: BTreeSet<OptionId>,

    pub marks: i32,

    /// Authoring position; questions are always served in this order.
    pub order_index: i32,
}

impl Question {
    /// Whether `option` is one of this question's options.
    pub fn offers(&self, option: &OptionId) -> bool {
        self.options.iter().any(|o| &o.id == option)
    }
}

/// DTO for sending a question to a student (excludes the answer key).
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: QuestionId,
    pub text: String,
    pub question_type: QuestionType,
    pub options: Vec<ChoiceOption>,
    pub marks: i32,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            text: q.text.clone(),
            question_type: q.question_type,
            options: q.options.clone(),
            marks: q.marks,
        }
    }
}

/// DTO for authoring a question.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuestionDraft {
    #[validate(length(max = 2000, message = "Question text is too long."))]
    pub text: String,

    pub question_type: QuestionType,

    #[validate(length(
        min = 2,
        max = 10,
        message = "A question needs between 2 and 10 options."
    ))]
    pub options: Vec<ChoiceOption>,

    #[serde(default)]
    pub correct_answers: BTreeSet<OptionId>,

    #[validate(range(min = 1, max = 1000, message = "Marks must be between 1 and 1000."))]
    pub marks: i32,
}

impl QuestionDraft {
    /// Checks the answer key against the options.
    /// `number` is the 1-based position used in user-facing messages.
    pub fn check(&self, number: usize) -> Result<(), String> {
        if self.text.trim().is_empty() {
            return Err(format!("Question {}: Question text is required", number));
        }
        if self.options.iter().any(|o| o.text.trim().is_empty()) {
            return Err(format!("Question {}: All options must have text", number));
        }

        let mut ids = BTreeSet::new();
        for option in &self.options {
            if option.id.as_str().trim().is_empty() || !ids.insert(&option.id) {
                return Err(format!("Question {}: Option ids must be unique and non-empty", number));
            }
        }

        if self.correct_answers.is_empty() {
            return Err(format!(
                "Question {}: Please select at least one correct answer",
                number
            ));
        }
        if let Some(unknown) = self.correct_answers.iter().find(|id| !ids.contains(id)) {
            return Err(format!(
                "Question {}: Correct answer '{}' is not one of the options",
                number, unknown
            ));
        }
        if self.question_type == QuestionType::SingleCorrect && self.correct_answers.len() != 1 {
            return Err(format!(
                "Question {}: Single-correct questions need exactly one correct answer",
                number
            ));
        }

        Ok(())
    }
}

/// Validates a full question set as submitted by the authoring form.
pub fn check_questions(questions: &[QuestionDraft]) -> Result<(), String> {
    if questions.is_empty() {
        return Err("Please add at least one question".to_string());
    }
    questions
        .iter()
        .enumerate()
        .try_for_each(|(i, q)| q.check(i + 1))
}
