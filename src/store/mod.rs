// src/store/mod.rs

//! Persistence boundary.
//!
//! Handlers only talk to `ExamStore`. `PgStore` is the production
//! implementation; `MemoryStore` keeps everything in process and is used when
//! no database is configured (and by the integration tests).

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    exam::{Finalization, Selection},
    models::{
        AttemptId, TestId, UserId,
        attempt::{AnswerRecord, Attempt, AttemptWithStudent, AttemptWithTitle, NewAttempt},
        question::{OptionId, Question, QuestionDraft},
        test::{NewTest, Test, TestWithQuestions, UpdateTestRequest},
        user::{NewUser, User},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness or state constraint was violated.
    #[error("{0}")]
    Conflict(String),

    /// The backend itself failed.
    #[error("storage failure: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub type SharedStore = Arc<dyn ExamStore>;

#[async_trait]
pub trait ExamStore: Send + Sync {
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Fails with `Conflict` when the email is taken.
    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;

    /// Newest first.
    async fn list_tests(&self, active_only: bool) -> StoreResult<Vec<Test>>;

    async fn find_test(&self, id: TestId) -> StoreResult<Option<Test>>;

    /// Inserts the test and its questions atomically. The test starts inactive.
    async fn create_test(&self, test: NewTest) -> StoreResult<TestWithQuestions>;

    async fn update_test(&self, id: TestId, changes: &UpdateTestRequest)
    -> StoreResult<Option<Test>>;

    /// Flips `is_active`.
    async fn toggle_test_active(&self, id: TestId) -> StoreResult<Option<Test>>;

    /// Replaces every question and recomputes `total_marks`.
    /// Fails with `Conflict` once the test has attempts.
    async fn replace_questions(
        &self,
        test_id: TestId,
        questions: Vec<QuestionDraft>,
    ) -> StoreResult<Option<TestWithQuestions>>;

    /// Deletes the test together with its questions, attempts and answers.
    async fn delete_test(&self, id: TestId) -> StoreResult<bool>;

    /// Authoring order.
    async fn list_questions(&self, test_id: TestId) -> StoreResult<Vec<Question>>;

    async fn find_attempt(&self, id: AttemptId) -> StoreResult<Option<Attempt>>;

    /// All of one user's attempts at one test.
    async fn list_attempts_for(&self, user_id: UserId, test_id: TestId)
    -> StoreResult<Vec<Attempt>>;

    /// A user's attempts with test titles, newest first.
    async fn list_user_attempts(&self, user_id: UserId) -> StoreResult<Vec<AttemptWithTitle>>;

    /// A test's attempts with student details, newest first.
    async fn list_test_attempts(&self, test_id: TestId) -> StoreResult<Vec<AttemptWithStudent>>;

    /// Fails with `Conflict` when the user already has an in-progress attempt at the test.
    async fn create_attempt(&self, attempt: NewAttempt) -> StoreResult<Attempt>;

    async fn list_answers(&self, attempt_id: AttemptId) -> StoreResult<Vec<AnswerRecord>>;

    /// Applies one click on `option` to the stored selection for `question`
    /// and returns the new selection. The read and the write happen under one
    /// lock, so concurrent clicks on the same attempt are not lost.
    /// Returns `None` (and writes nothing) unless the attempt is in progress.
    async fn select_option(
        &self,
        attempt_id: AttemptId,
        question: &Question,
        option: OptionId,
    ) -> StoreResult<Option<Selection>>;

    /// Writes the terminal status, score and every graded answer in one step,
    /// only if the attempt is still in progress. Returns whether it was applied.
    async fn finalize_attempt(
        &self,
        attempt_id: AttemptId,
        finalization: &Finalization,
    ) -> StoreResult<bool>;
}
