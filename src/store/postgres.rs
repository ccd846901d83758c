// src/store/postgres.rs

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    FromRow, PgPool, Postgres, QueryBuilder, Transaction, postgres::PgPoolOptions, types::Json,
};

use super::{ExamStore, StoreError, StoreResult};
use crate::{
    exam::{Finalization, Selection},
    models::{
        AttemptId, TestId, UserId,
        attempt::{AnswerRecord, Attempt, AttemptWithStudent, AttemptWithTitle, NewAttempt},
        question::{ChoiceOption, OptionId, Question, QuestionDraft},
        test::{self, NewTest, Test, TestWithQuestions, UpdateTestRequest},
        user::{NewUser, User},
    },
};

const MAX_CONNECT_RETRIES: u32 = 5;

/// Postgres-backed `ExamStore`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects with retry, waiting for the database to come up.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let mut retry_count = 0;
        loop {
            match PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(3))
                .connect(database_url)
                .await
            {
                Ok(pool) => return Ok(Self::new(pool)),
                Err(e) => {
                    retry_count += 1;
                    if retry_count > MAX_CONNECT_RETRIES {
                        return Err(StoreError::Backend(format!(
                            "failed to connect to database after {} retries: {}",
                            MAX_CONNECT_RETRIES, e
                        )));
                    }
                    tracing::warn!(
                        "Database not ready, retrying in 2s... (Attempt {})",
                        retry_count
                    );
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    full_name: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            full_name: row.full_name,
            role: row.role.parse().map_err(StoreError::Backend)?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct QuestionRow {
    id: i64,
    test_id: i64,
    question_text: String,
    question_type: String,
    options: Json<Vec<ChoiceOption>>,
    correct_answers: Json<Vec<OptionId>>,
    marks: i32,
    order_index: i32,
}

impl TryFrom<QuestionRow> for Question {
    type Error = StoreError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        Ok(Question {
            id: row.id,
            test_id: row.test_id,
            text: row.question_text,
            question_type: row.question_type.parse().map_err(StoreError::Backend)?,
            options: row.options.0,
            correct_answers: row.correct_answers.0.into_iter().collect(),
            marks: row.marks,
            order_index: row.order_index,
        })
    }
}

#[derive(FromRow)]
struct AttemptRow {
    id: i64,
    test_id: i64,
    user_id: i64,
    started_at: DateTime<Utc>,
    duration_minutes: i32,
    submitted_at: Option<DateTime<Utc>>,
    time_taken_seconds: Option<i64>,
    score: i32,
    total_marks: i32,
    status: String,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = StoreError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(Attempt {
            id: row.id,
            test_id: row.test_id,
            user_id: row.user_id,
            started_at: row.started_at,
            duration_minutes: row.duration_minutes,
            submitted_at: row.submitted_at,
            time_taken_seconds: row.time_taken_seconds,
            score: row.score,
            total_marks: row.total_marks,
            status: row.status.parse().map_err(StoreError::Backend)?,
        })
    }
}

#[derive(FromRow)]
struct AttemptTitleRow {
    #[sqlx(flatten)]
    attempt: AttemptRow,
    test_title: String,
}

#[derive(FromRow)]
struct AttemptStudentRow {
    #[sqlx(flatten)]
    attempt: AttemptRow,
    student_name: String,
    student_email: String,
}

#[derive(FromRow)]
struct AnswerRow {
    attempt_id: i64,
    question_id: i64,
    selected_answers: Json<Vec<OptionId>>,
    is_correct: bool,
    marks_obtained: i32,
}

impl From<AnswerRow> for AnswerRecord {
    fn from(row: AnswerRow) -> Self {
        AnswerRecord {
            attempt_id: row.attempt_id,
            question_id: row.question_id,
            selected_answers: row.selected_answers.0.into_iter().collect(),
            is_correct: row.is_correct,
            marks_obtained: row.marks_obtained,
        }
    }
}

fn selection_json(selection: &Selection) -> Json<Vec<OptionId>> {
    Json(selection.iter().cloned().collect())
}

async fn insert_questions(
    tx: &mut Transaction<'_, Postgres>,
    test_id: TestId,
    drafts: Vec<QuestionDraft>,
) -> StoreResult<Vec<Question>> {
    let mut questions = Vec::with_capacity(drafts.len());
    for (index, draft) in drafts.into_iter().enumerate() {
        let row = sqlx::query_as::<_, QuestionRow>(
            r#"
            INSERT INTO questions
            (test_id, question_text, question_type, options, correct_answers, marks, order_index)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, test_id, question_text, question_type, options, correct_answers, marks, order_index
            "#,
        )
        .bind(test_id)
        .bind(draft.text)
        .bind(draft.question_type.as_str())
        .bind(Json(draft.options))
        .bind(Json(draft.correct_answers.into_iter().collect::<Vec<_>>()))
        .bind(draft.marks)
        .bind(index as i32)
        .fetch_one(&mut **tx)
        .await?;
        questions.push(Question::try_from(row)?);
    }
    Ok(questions)
}

#[async_trait]
impl ExamStore for PgStore {
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, full_name, role, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, full_name, role, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (email, password_hash, full_name, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, password_hash, full_name, role, created_at
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict("Email already registered".to_string())
            } else {
                StoreError::from(e)
            }
        })?;

        User::try_from(row)
    }

    async fn list_tests(&self, active_only: bool) -> StoreResult<Vec<Test>> {
        let tests = sqlx::query_as::<_, Test>(
            r#"
            SELECT id, title, description, duration_minutes, total_marks, is_active, created_by, created_at
            FROM tests
            WHERE is_active OR NOT $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(tests)
    }

    async fn find_test(&self, id: TestId) -> StoreResult<Option<Test>> {
        let test = sqlx::query_as::<_, Test>(
            r#"
            SELECT id, title, description, duration_minutes, total_marks, is_active, created_by, created_at
            FROM tests
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(test)
    }

    async fn create_test(&self, new_test: NewTest) -> StoreResult<TestWithQuestions> {
        let mut tx = self.pool.begin().await?;

        let test = sqlx::query_as::<_, Test>(
            r#"
            INSERT INTO tests (title, description, duration_minutes, total_marks, is_active, created_by)
            VALUES ($1, $2, $3, $4, FALSE, $5)
            RETURNING id, title, description, duration_minutes, total_marks, is_active, created_by, created_at
            "#,
        )
        .bind(&new_test.title)
        .bind(&new_test.description)
        .bind(new_test.duration_minutes)
        .bind(new_test.total_marks())
        .bind(new_test.created_by)
        .fetch_one(&mut *tx)
        .await?;

        let questions = insert_questions(&mut tx, test.id, new_test.questions).await?;
        tx.commit().await?;

        Ok(TestWithQuestions { test, questions })
    }

    async fn update_test(
        &self,
        id: TestId,
        changes: &UpdateTestRequest,
    ) -> StoreResult<Option<Test>> {
        if changes.is_empty() {
            return self.find_test(id).await;
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE tests SET ");
        let mut separated = builder.separated(", ");

        if let Some(title) = &changes.title {
            separated.push("title = ");
            separated.push_bind_unseparated(title.trim().to_string());
        }

        if changes.description.is_some() {
            separated.push("description = ");
            separated.push_bind_unseparated(test::normalize_description(changes.description.clone()));
        }

        if let Some(duration) = changes.duration_minutes {
            separated.push("duration_minutes = ");
            separated.push_bind_unseparated(duration);
        }

        separated.push("updated_at = NOW()");

        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(
            " RETURNING id, title, description, duration_minutes, total_marks, is_active, created_by, created_at",
        );

        let test = builder
            .build_query_as::<Test>()
            .fetch_optional(&self.pool)
            .await?;

        Ok(test)
    }

    async fn toggle_test_active(&self, id: TestId) -> StoreResult<Option<Test>> {
        let test = sqlx::query_as::<_, Test>(
            r#"
            UPDATE tests SET is_active = NOT is_active, updated_at = NOW()
            WHERE id = $1
            RETURNING id, title, description, duration_minutes, total_marks, is_active, created_by, created_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(test)
    }

    async fn replace_questions(
        &self,
        test_id: TestId,
        questions: Vec<QuestionDraft>,
    ) -> StoreResult<Option<TestWithQuestions>> {
        let mut tx = self.pool.begin().await?;

        // Row lock keeps a concurrent attempt start from slipping in.
        let locked = sqlx::query_scalar::<_, i64>("SELECT id FROM tests WHERE id = $1 FOR UPDATE")
            .bind(test_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(None);
        }

        let attempts: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM test_attempts WHERE test_id = $1")
                .bind(test_id)
                .fetch_one(&mut *tx)
                .await?;
        if attempts > 0 {
            return Err(StoreError::Conflict(
                "Questions cannot be replaced once the test has attempts".to_string(),
            ));
        }

        let total_marks = test::total_marks(&questions);
        sqlx::query("DELETE FROM questions WHERE test_id = $1")
            .bind(test_id)
            .execute(&mut *tx)
            .await?;
        let questions = insert_questions(&mut tx, test_id, questions).await?;

        let test = sqlx::query_as::<_, Test>(
            r#"
            UPDATE tests SET total_marks = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, title, description, duration_minutes, total_marks, is_active, created_by, created_at
            "#,
        )
        .bind(test_id)
        .bind(total_marks)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(TestWithQuestions { test, questions }))
    }

    async fn delete_test(&self, id: TestId) -> StoreResult<bool> {
        // Questions, attempts and answers go with it (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM tests WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_questions(&self, test_id: TestId) -> StoreResult<Vec<Question>> {
        sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, test_id, question_text, question_type, options, correct_answers, marks, order_index
            FROM questions
            WHERE test_id = $1
            ORDER BY order_index, id
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Question::try_from)
        .collect()
    }

    async fn find_attempt(&self, id: AttemptId) -> StoreResult<Option<Attempt>> {
        sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT id, test_id, user_id, started_at, duration_minutes, submitted_at, time_taken_seconds, score, total_marks, status
            FROM test_attempts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Attempt::try_from)
        .transpose()
    }

    async fn list_attempts_for(
        &self,
        user_id: UserId,
        test_id: TestId,
    ) -> StoreResult<Vec<Attempt>> {
        sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT id, test_id, user_id, started_at, duration_minutes, submitted_at, time_taken_seconds, score, total_marks, status
            FROM test_attempts
            WHERE user_id = $1 AND test_id = $2
            ORDER BY started_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Attempt::try_from)
        .collect()
    }

    async fn list_user_attempts(&self, user_id: UserId) -> StoreResult<Vec<AttemptWithTitle>> {
        sqlx::query_as::<_, AttemptTitleRow>(
            r#"
            SELECT
                a.id, a.test_id, a.user_id, a.started_at, a.duration_minutes, a.submitted_at,
                a.time_taken_seconds, a.score, a.total_marks, a.status,
                t.title AS test_title
            FROM test_attempts a
            JOIN tests t ON t.id = a.test_id
            WHERE a.user_id = $1
            ORDER BY a.started_at DESC, a.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| {
            Ok(AttemptWithTitle {
                attempt: Attempt::try_from(row.attempt)?,
                test_title: row.test_title,
            })
        })
        .collect()
    }

    async fn list_test_attempts(&self, test_id: TestId) -> StoreResult<Vec<AttemptWithStudent>> {
        sqlx::query_as::<_, AttemptStudentRow>(
            r#"
            SELECT
                a.id, a.test_id, a.user_id, a.started_at, a.duration_minutes, a.submitted_at,
                a.time_taken_seconds, a.score, a.total_marks, a.status,
                u.full_name AS student_name,
                u.email AS student_email
            FROM test_attempts a
            JOIN users u ON u.id = a.user_id
            WHERE a.test_id = $1
            ORDER BY a.started_at DESC, a.id DESC
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| {
            Ok(AttemptWithStudent {
                attempt: Attempt::try_from(row.attempt)?,
                student_name: row.student_name,
                student_email: row.student_email,
            })
        })
        .collect()
    }

    async fn create_attempt(&self, attempt: NewAttempt) -> StoreResult<Attempt> {
        // The partial unique index on (user_id, test_id) WHERE status = 'in_progress'
        // enforces a single open attempt.
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            INSERT INTO test_attempts (test_id, user_id, started_at, duration_minutes, total_marks, status)
            VALUES ($1, $2, $3, $4, $5, 'in_progress')
            RETURNING id, test_id, user_id, started_at, duration_minutes, submitted_at, time_taken_seconds, score, total_marks, status
            "#,
        )
        .bind(attempt.test_id)
        .bind(attempt.user_id)
        .bind(attempt.started_at)
        .bind(attempt.duration_minutes)
        .bind(attempt.total_marks)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict("An attempt for this test is already in progress".to_string())
            } else {
                StoreError::from(e)
            }
        })?;

        Attempt::try_from(row)
    }

    async fn list_answers(&self, attempt_id: AttemptId) -> StoreResult<Vec<AnswerRecord>> {
        let rows = sqlx::query_as::<_, AnswerRow>(
            r#"
            SELECT attempt_id, question_id, selected_answers, is_correct, marks_obtained
            FROM attempt_answers
            WHERE attempt_id = $1
            ORDER BY question_id
            "#,
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AnswerRecord::from).collect())
    }

    async fn select_option(
        &self,
        attempt_id: AttemptId,
        question: &Question,
        option: OptionId,
    ) -> StoreResult<Option<Selection>> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes clicks on this attempt against each other and
        // against finalization.
        let open = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM test_attempts WHERE id = $1 AND status = 'in_progress' FOR UPDATE",
        )
        .bind(attempt_id)
        .fetch_optional(&mut *tx)
        .await?;
        if open.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let current = sqlx::query_scalar::<_, Json<Vec<OptionId>>>(
            "SELECT selected_answers FROM attempt_answers WHERE attempt_id = $1 AND question_id = $2",
        )
        .bind(attempt_id)
        .bind(question.id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut selection: Selection = current
            .map(|json| json.0.into_iter().collect())
            .unwrap_or_default();
        selection.select(question.question_type, option);

        sqlx::query(
            r#"
            INSERT INTO attempt_answers (attempt_id, question_id, selected_answers)
            VALUES ($1, $2, $3)
            ON CONFLICT (attempt_id, question_id) DO UPDATE SET
                selected_answers = EXCLUDED.selected_answers,
                updated_at = NOW()
            "#,
        )
        .bind(attempt_id)
        .bind(question.id)
        .bind(selection_json(&selection))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(selection))
    }

    async fn finalize_attempt(
        &self,
        attempt_id: AttemptId,
        finalization: &Finalization,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        // Only the first termination matches; later ones touch zero rows.
        let result = sqlx::query(
            r#"
            UPDATE test_attempts
            SET status = $2, submitted_at = $3, time_taken_seconds = $4, score = $5
            WHERE id = $1 AND status = 'in_progress'
            "#,
        )
        .bind(attempt_id)
        .bind(finalization.status.as_str())
        .bind(finalization.submitted_at)
        .bind(finalization.time_taken_seconds)
        .bind(finalization.card.score)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for outcome in &finalization.card.outcomes {
            sqlx::query(
                r#"
                INSERT INTO attempt_answers
                (attempt_id, question_id, selected_answers, is_correct, marks_obtained)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (attempt_id, question_id) DO UPDATE SET
                    selected_answers = EXCLUDED.selected_answers,
                    is_correct = EXCLUDED.is_correct,
                    marks_obtained = EXCLUDED.marks_obtained,
                    updated_at = NOW()
                "#,
            )
            .bind(attempt_id)
            .bind(outcome.question_id)
            .bind(selection_json(&outcome.selected_answers))
            .bind(outcome.is_correct)
            .bind(outcome.marks_obtained)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }
}
