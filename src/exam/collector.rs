// src/exam/collector.rs

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::ExamError;
use crate::models::{
    QuestionId,
    attempt::AnswerRecord,
    question::{OptionId, Question, QuestionType},
};

/// The options a student has currently picked for one question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(BTreeSet<OptionId>);

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one click on `option`.
    ///
    /// Single-correct questions keep only the latest choice; multi-correct
    /// questions toggle the option in or out.
    pub fn select(&mut self, question_type: QuestionType, option: OptionId) {
        match question_type {
            QuestionType::SingleCorrect => {
                self.0.clear();
                self.0.insert(option);
            }
            QuestionType::MultiCorrect => {
                if !self.0.remove(&option) {
                    self.0.insert(option);
                }
            }
        }
    }

    pub fn options(&self) -> &BTreeSet<OptionId> {
        &self.0
    }

    pub fn contains(&self, option: &OptionId) -> bool {
        self.0.contains(option)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OptionId> {
        self.0.iter()
    }
}

impl FromIterator<OptionId> for Selection {
    fn from_iter<I: IntoIterator<Item = OptionId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeSet<OptionId>> for Selection {
    fn from(options: BTreeSet<OptionId>) -> Self {
        Self(options)
    }
}

/// Fails unless `option` is one of `question`'s options.
pub fn ensure_offered(question: &Question, option: &OptionId) -> Result<(), ExamError> {
    if question.offers(option) {
        Ok(())
    } else {
        Err(ExamError::UnknownOption {
            question_id: question.id,
            option_id: option.clone(),
        })
    }
}

/// Every selection made during one attempt, keyed by question.
#[derive(Debug, Clone, Default)]
pub struct AnswerSheet {
    selections: HashMap<QuestionId, Selection>,
}

impl AnswerSheet {
    /// Rebuilds the sheet from the persisted answer records.
    pub fn from_records(records: &[AnswerRecord]) -> Self {
        records
            .iter()
            .map(|r| (r.question_id, r.selected_answers.clone()))
            .collect()
    }

    pub fn selection(&self, question_id: QuestionId) -> Option<&Selection> {
        self.selections.get(&question_id)
    }
}

impl FromIterator<(QuestionId, Selection)> for AnswerSheet {
    fn from_iter<I: IntoIterator<Item = (QuestionId, Selection)>>(iter: I) -> Self {
        Self {
            selections: iter.into_iter().collect(),
        }
    }
}
