// src/store/memory.rs

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{ExamStore, StoreError, StoreResult};
use crate::{
    exam::{Finalization, Selection},
    models::{
        AttemptId, QuestionId, TestId, UserId,
        attempt::{
            AnswerRecord, Attempt, AttemptStatus, AttemptWithStudent, AttemptWithTitle,
            NewAttempt,
        },
        question::{OptionId, Question, QuestionDraft},
        test::{self, NewTest, Test, TestWithQuestions, UpdateTestRequest},
        user::{NewUser, User},
    },
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<UserId, User>,
    tests: BTreeMap<TestId, Test>,
    questions: BTreeMap<QuestionId, Question>,
    attempts: BTreeMap<AttemptId, Attempt>,
    answers: BTreeMap<(AttemptId, QuestionId), AnswerRecord>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn questions_of(&self, test_id: TestId) -> Vec<Question> {
        let mut questions: Vec<Question> = self
            .questions
            .values()
            .filter(|q| q.test_id == test_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| (q.order_index, q.id));
        questions
    }

    fn insert_questions(&mut self, test_id: TestId, drafts: Vec<QuestionDraft>) {
        for (index, draft) in drafts.into_iter().enumerate() {
            let id = self.next_id();
            self.questions.insert(
                id,
                Question {
                    id,
                    test_id,
                    text: draft.text,
                    question_type: draft.question_type,
                    options: draft.options,
                    correct_answers: draft.correct_answers,
                    marks: draft.marks,
                    order_index: index as i32,
                },
            );
        }
    }

    fn with_questions(&self, test: Test) -> TestWithQuestions {
        let questions = self.questions_of(test.id);
        TestWithQuestions { test, questions }
    }
}

/// In-process `ExamStore`. A single mutex serializes every operation, which
/// makes each trait method atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest first, ties broken by id so insertion order is stable.
fn newest_first(a: &Attempt, b: &Attempt) -> std::cmp::Ordering {
    b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id))
}

#[async_trait]
impl ExamStore for MemoryStore {
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("Email already registered".to_string()));
        }

        let id = tables.next_id();
        let user = User {
            id,
            email: user.email,
            password_hash: user.password_hash,
            full_name: user.full_name,
            role: user.role,
            created_at: Utc::now(),
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn list_tests(&self, active_only: bool) -> StoreResult<Vec<Test>> {
        let tables = self.tables.lock().await;
        let mut tests: Vec<Test> = tables
            .tests
            .values()
            .filter(|t| !active_only || t.is_active)
            .cloned()
            .collect();
        tests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(tests)
    }

    async fn find_test(&self, id: TestId) -> StoreResult<Option<Test>> {
        Ok(self.tables.lock().await.tests.get(&id).cloned())
    }

    async fn create_test(&self, new_test: NewTest) -> StoreResult<TestWithQuestions> {
        let mut tables = self.tables.lock().await;
        let id = tables.next_id();
        let test = Test {
            id,
            total_marks: new_test.total_marks(),
            title: new_test.title,
            description: new_test.description,
            duration_minutes: new_test.duration_minutes,
            is_active: false,
            created_by: Some(new_test.created_by),
            created_at: Utc::now(),
        };
        tables.tests.insert(id, test.clone());
        tables.insert_questions(id, new_test.questions);
        Ok(tables.with_questions(test))
    }

    async fn update_test(
        &self,
        id: TestId,
        changes: &UpdateTestRequest,
    ) -> StoreResult<Option<Test>> {
        let mut tables = self.tables.lock().await;
        let Some(test) = tables.tests.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(title) = &changes.title {
            test.title = title.trim().to_string();
        }
        if changes.description.is_some() {
            test.description = test::normalize_description(changes.description.clone());
        }
        if let Some(duration) = changes.duration_minutes {
            test.duration_minutes = duration;
        }
        Ok(Some(test.clone()))
    }

    async fn toggle_test_active(&self, id: TestId) -> StoreResult<Option<Test>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.tests.get_mut(&id).map(|test| {
            test.is_active = !test.is_active;
            test.clone()
        }))
    }

    async fn replace_questions(
        &self,
        test_id: TestId,
        questions: Vec<QuestionDraft>,
    ) -> StoreResult<Option<TestWithQuestions>> {
        let mut tables = self.tables.lock().await;
        if !tables.tests.contains_key(&test_id) {
            return Ok(None);
        }
        if tables.attempts.values().any(|a| a.test_id == test_id) {
            return Err(StoreError::Conflict(
                "Questions cannot be replaced once the test has attempts".to_string(),
            ));
        }

        let total_marks = test::total_marks(&questions);
        tables.questions.retain(|_, q| q.test_id != test_id);
        tables.insert_questions(test_id, questions);

        let Some(test) = tables.tests.get_mut(&test_id) else {
            return Ok(None);
        };
        test.total_marks = total_marks;
        let test = test.clone();
        Ok(Some(tables.with_questions(test)))
    }

    async fn delete_test(&self, id: TestId) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        if tables.tests.remove(&id).is_none() {
            return Ok(false);
        }

        tables.questions.retain(|_, q| q.test_id != id);
        let removed: Vec<AttemptId> = tables
            .attempts
            .values()
            .filter(|a| a.test_id == id)
            .map(|a| a.id)
            .collect();
        tables.attempts.retain(|_, a| a.test_id != id);
        tables
            .answers
            .retain(|(attempt_id, _), _| !removed.contains(attempt_id));
        Ok(true)
    }

    async fn list_questions(&self, test_id: TestId) -> StoreResult<Vec<Question>> {
        Ok(self.tables.lock().await.questions_of(test_id))
    }

    async fn find_attempt(&self, id: AttemptId) -> StoreResult<Option<Attempt>> {
        Ok(self.tables.lock().await.attempts.get(&id).cloned())
    }

    async fn list_attempts_for(
        &self,
        user_id: UserId,
        test_id: TestId,
    ) -> StoreResult<Vec<Attempt>> {
        let tables = self.tables.lock().await;
        let mut attempts: Vec<Attempt> = tables
            .attempts
            .values()
            .filter(|a| a.user_id == user_id && a.test_id == test_id)
            .cloned()
            .collect();
        attempts.sort_by(newest_first);
        Ok(attempts)
    }

    async fn list_user_attempts(&self, user_id: UserId) -> StoreResult<Vec<AttemptWithTitle>> {
        let tables = self.tables.lock().await;
        let mut attempts: Vec<&Attempt> = tables
            .attempts
            .values()
            .filter(|a| a.user_id == user_id)
            .collect();
        attempts.sort_by(|a, b| newest_first(a, b));

        Ok(attempts
            .into_iter()
            .filter_map(|a| {
                tables.tests.get(&a.test_id).map(|t| AttemptWithTitle {
                    attempt: a.clone(),
                    test_title: t.title.clone(),
                })
            })
            .collect())
    }

    async fn list_test_attempts(&self, test_id: TestId) -> StoreResult<Vec<AttemptWithStudent>> {
        let tables = self.tables.lock().await;
        let mut attempts: Vec<&Attempt> = tables
            .attempts
            .values()
            .filter(|a| a.test_id == test_id)
            .collect();
        attempts.sort_by(|a, b| newest_first(a, b));

        Ok(attempts
            .into_iter()
            .filter_map(|a| {
                tables.users.get(&a.user_id).map(|u| AttemptWithStudent {
                    attempt: a.clone(),
                    student_name: u.full_name.clone(),
                    student_email: u.email.clone(),
                })
            })
            .collect())
    }

    async fn create_attempt(&self, attempt: NewAttempt) -> StoreResult<Attempt> {
        let mut tables = self.tables.lock().await;
        let already_open = tables.attempts.values().any(|a| {
            a.user_id == attempt.user_id
                && a.test_id == attempt.test_id
                && a.status == AttemptStatus::InProgress
        });
        if already_open {
            return Err(StoreError::Conflict(
                "An attempt for this test is already in progress".to_string(),
            ));
        }

        let id = tables.next_id();
        let attempt = Attempt {
            id,
            test_id: attempt.test_id,
            user_id: attempt.user_id,
            started_at: attempt.started_at,
            duration_minutes: attempt.duration_minutes,
            submitted_at: None,
            time_taken_seconds: None,
            score: 0,
            total_marks: attempt.total_marks,
            status: AttemptStatus::InProgress,
        };
        tables.attempts.insert(id, attempt.clone());
        Ok(attempt)
    }

    async fn list_answers(&self, attempt_id: AttemptId) -> StoreResult<Vec<AnswerRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .answers
            .range((attempt_id, QuestionId::MIN)..=(attempt_id, QuestionId::MAX))
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn select_option(
        &self,
        attempt_id: AttemptId,
        question: &Question,
        option: OptionId,
    ) -> StoreResult<Option<Selection>> {
        let mut tables = self.tables.lock().await;
        let open = tables
            .attempts
            .get(&attempt_id)
            .is_some_and(|a| a.status == AttemptStatus::InProgress);
        if !open {
            return Ok(None);
        }

        let record = tables
            .answers
            .entry((attempt_id, question.id))
            .or_insert_with(|| AnswerRecord {
                attempt_id,
                question_id: question.id,
                selected_answers: Selection::new(),
                is_correct: false,
                marks_obtained: 0,
            });
        record.selected_answers.select(question.question_type, option);
        Ok(Some(record.selected_answers.clone()))
    }

    async fn finalize_attempt(
        &self,
        attempt_id: AttemptId,
        finalization: &Finalization,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let Some(attempt) = tables.attempts.get_mut(&attempt_id) else {
            return Ok(false);
        };
        if attempt.status.is_terminal() {
            return Ok(false);
        }

        attempt.status = finalization.status;
        attempt.submitted_at = Some(finalization.submitted_at);
        attempt.time_taken_seconds = Some(finalization.time_taken_seconds);
        attempt.score = finalization.card.score;

        for outcome in &finalization.card.outcomes {
            let record = outcome.clone().into_record(attempt_id);
            tables.answers.insert((attempt_id, record.question_id), record);
        }
        Ok(true)
    }
}
