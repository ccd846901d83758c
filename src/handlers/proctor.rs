// src/handlers/proctor.rs

use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    exam::{AnswerSheet, AttemptSession, AttemptTimer, Trigger},
    models::{
        AttemptId,
        attempt::{Attempt, AttemptPaper, SubmissionResponse},
        question::PublicQuestion,
        test::Test,
    },
    state::AppState,
    store::ExamStore,
};

/// Runs the exam core against the store for one request.
///
/// Holds a single `now` so every decision within a request sees the same instant.
pub struct Proctor<'a> {
    store: &'a dyn ExamStore,
    grace_seconds: i64,
    now: DateTime<Utc>,
}

impl<'a> Proctor<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            store: state.store.as_ref(),
            grace_seconds: state.config.submit_grace_seconds,
            now: state.clock.now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Ends the attempt, grades it and persists the result.
    ///
    /// If the attempt is already terminal (or another request closes it
    /// first) the stored result is returned untouched.
    pub async fn close(
        &self,
        attempt: Attempt,
        trigger: Trigger,
    ) -> Result<SubmissionResponse, AppError> {
        let questions = self.store.list_questions(attempt.test_id).await?;
        let records = self.store.list_answers(attempt.id).await?;
        let sheet = AnswerSheet::from_records(&records);

        let session = AttemptSession::new(&attempt, self.grace_seconds);
        let applied = match session.close(trigger, self.now, &questions, &sheet)? {
            Some(finalization) => {
                let applied = self
                    .store
                    .finalize_attempt(attempt.id, &finalization)
                    .await
                    .map_err(|e| {
                        tracing::error!("Failed to submit attempt {}: {:?}", attempt.id, e);
                        AppError::from(e)
                    })?;
                if applied {
                    tracing::info!(
                        attempt_id = attempt.id,
                        status = %finalization.status,
                        score = finalization.card.score,
                        total_marks = finalization.card.total_marks,
                        "Attempt closed"
                    );
                }
                applied
            }
            None => false,
        };

        self.submission(attempt.id, !applied).await
    }

    /// Auto-submits an open attempt whose time (and grace) is over.
    /// Returns the attempt as it stands afterwards.
    pub async fn settle(&self, attempt: Attempt) -> Result<Attempt, AppError> {
        let expired = AttemptSession::new(&attempt, self.grace_seconds).needs_auto_submit(self.now);
        if !expired {
            return Ok(attempt);
        }

        tracing::info!(attempt_id = attempt.id, "Attempt time ran out; auto-submitting");
        let response = self.close(attempt, Trigger::Expiry).await?;
        Ok(response.result.attempt)
    }

    /// The student's view of an attempt: questions without answer keys,
    /// current selections and time left.
    pub async fn paper(&self, attempt: Attempt, test: &Test) -> Result<AttemptPaper, AppError> {
        let questions = self.store.list_questions(test.id).await?;
        let records = self.store.list_answers(attempt.id).await?;

        let timer = AttemptTimer::new(attempt.started_at, attempt.duration_minutes);
        let remaining_seconds = if attempt.status.is_terminal() {
            0
        } else {
            timer.remaining_seconds(self.now)
        };
        let graded = attempt.status.is_terminal().then(|| records.clone());

        Ok(AttemptPaper {
            attempt: attempt.into(),
            test_title: test.title.clone(),
            deadline: timer.deadline(),
            remaining_seconds,
            questions: questions.iter().map(PublicQuestion::from).collect(),
            selections: records
                .into_iter()
                .map(|r| (r.question_id, r.selected_answers))
                .collect(),
            graded,
        })
    }

    async fn submission(
        &self,
        attempt_id: AttemptId,
        already_finalized: bool,
    ) -> Result<SubmissionResponse, AppError> {
        let attempt = self
            .store
            .find_attempt(attempt_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;
        let answers = self.store.list_answers(attempt_id).await?;

        Ok(SubmissionResponse {
            result: attempt.into(),
            already_finalized,
            answers,
        })
    }
}
