// src/exam/attempt.rs

use chrono::{DateTime, Utc};

use super::{AnswerSheet, AttemptTimer, ExamError, ScoreCard, scorer};
use crate::models::{
    attempt::{Attempt, AttemptStatus},
    question::Question,
};

/// What asked for the attempt to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The student pressed submit.
    Manual,
    /// The attempt's time budget ran out.
    Expiry,
}

/// The terminal state to write for an attempt.
#[derive(Debug, Clone)]
pub struct Finalization {
    pub status: AttemptStatus,
    pub submitted_at: DateTime<Utc>,
    pub time_taken_seconds: i64,
    pub card: ScoreCard,
}

/// An attempt viewed through its timer.
///
/// Decides whether the attempt is still open and, when asked to close it,
/// which terminal status applies. A closed attempt is never closed twice.
#[derive(Debug)]
pub struct AttemptSession<'a> {
    attempt: &'a Attempt,
    timer: AttemptTimer,
    grace_seconds: i64,
}

impl<'a> AttemptSession<'a> {
    /// The timer runs on the duration captured when the attempt started, so
    /// later edits to the test do not move its deadline.
    pub fn new(attempt: &'a Attempt, grace_seconds: i64) -> Self {
        Self {
            attempt,
            timer: AttemptTimer::new(attempt.started_at, attempt.duration_minutes),
            grace_seconds,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.attempt.status.is_terminal()
    }

    /// Open, but its time (including grace) is over; must be auto-submitted
    /// before anything else touches it.
    pub fn needs_auto_submit(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.timer.is_past_grace(now, self.grace_seconds)
    }

    /// Closes the attempt and grades it.
    ///
    /// Returns `Ok(None)` when the attempt is already terminal: the second
    /// termination is a no-op and nothing is rescored.
    pub fn close(
        &self,
        trigger: Trigger,
        now: DateTime<Utc>,
        questions: &[Question],
        sheet: &AnswerSheet,
    ) -> Result<Option<Finalization>, ExamError> {
        if !self.is_open() {
            return Ok(None);
        }

        let status = match trigger {
            Trigger::Manual if self.timer.is_past_grace(now, self.grace_seconds) => {
                AttemptStatus::AutoSubmitted
            }
            Trigger::Manual => AttemptStatus::Submitted,
            Trigger::Expiry => {
                let remaining_seconds = self.timer.remaining_seconds(now);
                if remaining_seconds > self.grace_seconds {
                    return Err(ExamError::NotExpired { remaining_seconds });
                }
                AttemptStatus::AutoSubmitted
            }
        };

        Ok(Some(Finalization {
            status,
            submitted_at: now,
            time_taken_seconds: self.timer.elapsed_seconds(now),
            card: scorer::score(questions, sheet),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{ChoiceOption, OptionId, QuestionType};
    use chrono::TimeDelta;

    const GRACE: i64 = 5;

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn attempt(status: AttemptStatus, duration_minutes: i32) -> Attempt {
        Attempt {
            id: 1,
            test_id: 1,
            user_id: 2,
            started_at: start(),
            duration_minutes,
            submitted_at: None,
            time_taken_seconds: None,
            score: 0,
            total_marks: 4,
            status,
        }
    }

    fn questions() -> Vec<Question> {
        vec![Question {
            id: 10,
            test_id: 1,
            text: "Capital of France?".to_string(),
            question_type: QuestionType::SingleCorrect,
            options: vec![
                ChoiceOption {
                    id: OptionId::new("a"),
                    text: "Paris".to_string(),
                },
                ChoiceOption {
                    id: OptionId::new("b"),
                    text: "Lyon".to_string(),
                },
            ],
            correct_answers: [OptionId::new("a")].into_iter().collect(),
            marks: 4,
            order_index: 0,
        }]
    }

    #[test]
    fn test_manual_submit_before_deadline() {
        let a = attempt(AttemptStatus::InProgress, 10);
        let qs = questions();
        let sheet: AnswerSheet = [(10, [OptionId::new("a")].into_iter().collect())]
            .into_iter()
            .collect();

        let session = AttemptSession::new(&a, GRACE);
        let now = start() + TimeDelta::seconds(90);
        let f = session.close(Trigger::Manual, now, &qs, &sheet).unwrap().unwrap();

        assert_eq!(f.status, AttemptStatus::Submitted);
        assert_eq!(f.time_taken_seconds, 90);
        assert_eq!(f.card.score, 4);
        assert_eq!(f.submitted_at, now);
    }

    #[test]
    fn test_expiry_yields_auto_submitted() {
        let a = attempt(AttemptStatus::InProgress, 10);
        let session = AttemptSession::new(&a, GRACE);
        let now = start() + TimeDelta::minutes(10);
        let f = session
            .close(Trigger::Expiry, now, &questions(), &AnswerSheet::default())
            .unwrap()
            .unwrap();

        assert_eq!(f.status, AttemptStatus::AutoSubmitted);
        assert_eq!(f.time_taken_seconds, 600);
        assert_eq!(f.card.score, 0);
    }

    #[test]
    fn test_early_expiry_signal_rejected() {
        let a = attempt(AttemptStatus::InProgress, 10);
        let session = AttemptSession::new(&a, GRACE);
        let now = start() + TimeDelta::seconds(60);
        let err = session
            .close(Trigger::Expiry, now, &questions(), &AnswerSheet::default())
            .unwrap_err();
        assert_eq!(err, ExamError::NotExpired { remaining_seconds: 540 });
    }

    #[test]
    fn test_late_manual_submit_counts_as_auto() {
        let a = attempt(AttemptStatus::InProgress, 1);
        let session = AttemptSession::new(&a, GRACE);
        let within_grace = start() + TimeDelta::minutes(1) + TimeDelta::seconds(GRACE);
        let late = within_grace + TimeDelta::seconds(1);

        let f = session
            .close(Trigger::Manual, within_grace, &questions(), &AnswerSheet::default())
            .unwrap()
            .unwrap();
        assert_eq!(f.status, AttemptStatus::Submitted);

        let f = session
            .close(Trigger::Manual, late, &questions(), &AnswerSheet::default())
            .unwrap()
            .unwrap();
        assert_eq!(f.status, AttemptStatus::AutoSubmitted);
        assert!(session.needs_auto_submit(late));
    }

    #[test]
    fn test_terminal_attempt_is_noop() {
        for status in [AttemptStatus::Submitted, AttemptStatus::AutoSubmitted] {
            let a = attempt(status, 10);
            let session = AttemptSession::new(&a, GRACE);
            let later = start() + TimeDelta::hours(1);
            for trigger in [Trigger::Manual, Trigger::Expiry] {
                let result = session
                    .close(trigger, later, &questions(), &AnswerSheet::default())
                    .unwrap();
                assert!(result.is_none());
            }
            assert!(!session.needs_auto_submit(later));
        }
    }
}
