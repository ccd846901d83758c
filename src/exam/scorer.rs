// src/exam/scorer.rs

use serde::Serialize;

use super::{AnswerSheet, Selection};
use crate::{
    config::PASSING_PERCENTAGE,
    models::{
        AttemptId, QuestionId,
        attempt::AnswerRecord,
        question::Question,
    },
};

/// Grading of a single question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionOutcome {
    pub question_id: QuestionId,
    pub selected_answers: Selection,
    pub is_correct: bool,
    pub marks_obtained: i32,
}

impl QuestionOutcome {
    pub fn into_record(self, attempt_id: AttemptId) -> AnswerRecord {
        AnswerRecord {
            attempt_id,
            question_id: self.question_id,
            selected_answers: self.selected_answers,
            is_correct: self.is_correct,
            marks_obtained: self.marks_obtained,
        }
    }
}

/// Result of grading a whole answer sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreCard {
    pub score: i32,
    pub total_marks: i32,

    /// One outcome per question, in question order.
    pub outcomes: Vec<QuestionOutcome>,
}

/// Full marks only for an exact match with the answer key; no partial credit.
pub fn is_correct(question: &Question, selection: &Selection) -> bool {
    selection.options() == &question.correct_answers
}

/// Grades every question of a test. Unanswered questions count as empty selections.
pub fn score(questions: &[Question], sheet: &AnswerSheet) -> ScoreCard {
    let outcomes: Vec<QuestionOutcome> = questions
        .iter()
        .map(|question| {
            let selected = sheet.selection(question.id).cloned().unwrap_or_default();
            let correct = is_correct(question, &selected);
            QuestionOutcome {
                question_id: question.id,
                selected_answers: selected,
                is_correct: correct,
                marks_obtained: if correct { question.marks } else { 0 },
            }
        })
        .collect();

    ScoreCard {
        score: outcomes.iter().map(|o| o.marks_obtained).sum(),
        total_marks: questions.iter().map(|q| q.marks).sum(),
        outcomes,
    }
}

pub fn percentage(score: i32, total_marks: i32) -> f64 {
    if total_marks <= 0 {
        return 0.0;
    }
    f64::from(score) / f64::from(total_marks) * 100.0
}

/// Renders the percentage with one decimal, e.g. `7/10` -> `"70.0%"`.
pub fn format_percentage(score: i32, total_marks: i32) -> String {
    format!("{:.1}%", percentage(score, total_marks))
}

pub fn is_passing(score: i32, total_marks: i32) -> bool {
    total_marks > 0 && percentage(score, total_marks) >= PASSING_PERCENTAGE
}
