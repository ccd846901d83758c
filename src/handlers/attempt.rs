// src/handlers/attempt.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::proctor::Proctor;
use crate::{
    error::AppError,
    exam::{ExamError, Trigger, ensure_offered},
    models::{
        AttemptId, TestId,
        attempt::{
            Attempt, AttemptResult, HistoryEntry, NewAttempt, SelectAnswerRequest,
            SelectAnswerResponse,
        },
        test::{ActiveTest, Test},
    },
    state::AppState,
    store::StoreError,
    utils::jwt::Session,
};

/// Loads an attempt owned by the caller together with its test.
/// Other users' attempts are reported as missing.
async fn load_own_attempt(
    state: &AppState,
    session: &Session,
    id: AttemptId,
) -> Result<(Attempt, Test), AppError> {
    let attempt = state
        .store
        .find_attempt(id)
        .await?
        .filter(|a| a.user_id == session.user_id)
        .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;

    let test = state
        .store
        .find_test(attempt.test_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Test not found".to_string()))?;

    Ok((attempt, test))
}

/// Lists active tests, each with the caller's finished or resumable attempt.
pub async fn list_active_tests(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, AppError> {
    let proctor = Proctor::new(&state);
    let tests = state.store.list_tests(true).await.map_err(|e| {
        tracing::error!("Failed to load active tests: {:?}", e);
        AppError::from(e)
    })?;

    let mut entries = Vec::with_capacity(tests.len());
    for test in tests {
        let mut completed_attempt = None;
        let mut open_attempt_id = None;

        for attempt in state.store.list_attempts_for(session.user_id, test.id).await? {
            let attempt = proctor.settle(attempt).await?;
            if attempt.status.is_terminal() {
                completed_attempt.get_or_insert_with(|| AttemptResult::from(attempt));
            } else {
                open_attempt_id = Some(attempt.id);
            }
        }

        entries.push(ActiveTest {
            test,
            completed_attempt,
            open_attempt_id,
        });
    }

    Ok(Json(entries))
}

/// Starts an attempt, or resumes the caller's open one.
///
/// * 201 with a fresh paper when a new attempt is created.
/// * 200 with the existing paper when resuming.
/// * 409 when the caller has already completed this test.
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(test_id): Path<TestId>,
) -> Result<impl IntoResponse, AppError> {
    let proctor = Proctor::new(&state);
    let test = state
        .store
        .find_test(test_id)
        .await?
        .filter(|t| t.is_active)
        .ok_or_else(|| AppError::NotFound("Test not found".to_string()))?;

    let mut open = None;
    for attempt in state.store.list_attempts_for(session.user_id, test.id).await? {
        let attempt = proctor.settle(attempt).await?;
        if attempt.status.is_terminal() {
            return Err(AppError::Conflict(
                "You have already completed this test".to_string(),
            ));
        }
        open = Some(attempt);
    }

    if let Some(attempt) = open {
        tracing::debug!(attempt_id = attempt.id, "Resuming attempt");
        return Ok((StatusCode::OK, Json(proctor.paper(attempt, &test).await?)));
    }

    let created = state
        .store
        .create_attempt(NewAttempt {
            test_id: test.id,
            user_id: session.user_id,
            started_at: proctor.now(),
            duration_minutes: test.duration_minutes,
            total_marks: test.total_marks,
        })
        .await;

    let attempt = match created {
        Ok(attempt) => attempt,
        // A concurrent start for the same student won the race.
        Err(StoreError::Conflict(_)) => {
            let open = state
                .store
                .list_attempts_for(session.user_id, test.id)
                .await?
                .into_iter()
                .find(|a| !a.status.is_terminal())
                .ok_or_else(|| AppError::Conflict("You have already completed this test".to_string()))?;
            tracing::debug!(attempt_id = open.id, "Resuming attempt started concurrently");
            return Ok((StatusCode::OK, Json(proctor.paper(open, &test).await?)));
        }
        Err(e) => {
            tracing::error!("Failed to start attempt: {:?}", e);
            return Err(e.into());
        }
    };

    tracing::info!(
        attempt_id = attempt.id,
        test_id = test.id,
        user_id = session.user_id,
        "Attempt started"
    );

    Ok((StatusCode::CREATED, Json(proctor.paper(attempt, &test).await?)))
}

/// Returns the caller's finished attempts, newest first.
pub async fn list_history(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, AppError> {
    let proctor = Proctor::new(&state);
    let attempts = state.store.list_user_attempts(session.user_id).await?;

    let mut history = Vec::with_capacity(attempts.len());
    for entry in attempts {
        let attempt = proctor.settle(entry.attempt).await?;
        if attempt.status.is_terminal() {
            history.push(HistoryEntry {
                result: attempt.into(),
                test_title: entry.test_title,
            });
        }
    }

    Ok(Json(history))
}

/// Returns the attempt paper: questions, selections and time left.
pub async fn get_attempt(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<AttemptId>,
) -> Result<impl IntoResponse, AppError> {
    let proctor = Proctor::new(&state);
    let (attempt, test) = load_own_attempt(&state, &session, id).await?;
    let attempt = proctor.settle(attempt).await?;

    Ok(Json(proctor.paper(attempt, &test).await?))
}

/// Records one click on an option.
///
/// Single-correct questions replace the previous choice, multi-correct
/// questions toggle. Rejected once the attempt is closed.
pub async fn select_answer(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<AttemptId>,
    Json(req): Json<SelectAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let proctor = Proctor::new(&state);
    let (attempt, test) = load_own_attempt(&state, &session, id).await?;
    let attempt = proctor.settle(attempt).await?;
    if attempt.status.is_terminal() {
        return Err(AppError::Conflict("Attempt is no longer in progress".to_string()));
    }

    let questions = state.store.list_questions(test.id).await?;
    let question = questions
        .iter()
        .find(|q| q.id == req.question_id)
        .ok_or(ExamError::UnknownQuestion(req.question_id))?;

    ensure_offered(question, &req.option_id)?;

    let selection = state
        .store
        .select_option(attempt.id, question, req.option_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to save answer: {:?}", e);
            AppError::from(e)
        })?
        .ok_or_else(|| AppError::Conflict("Attempt is no longer in progress".to_string()))?;

    Ok(Json(SelectAnswerResponse {
        question_id: question.id,
        selected_answers: selection,
    }))
}

/// Submits the attempt (manual trigger). Submitting twice returns the stored result.
pub async fn submit_attempt(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<AttemptId>,
) -> Result<impl IntoResponse, AppError> {
    let proctor = Proctor::new(&state);
    let (attempt, _) = load_own_attempt(&state, &session, id).await?;

    Ok(Json(proctor.close(attempt, Trigger::Manual).await?))
}

/// Closes the attempt because its timer ran out.
pub async fn expire_attempt(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<AttemptId>,
) -> Result<impl IntoResponse, AppError> {
    let proctor = Proctor::new(&state);
    let (attempt, _) = load_own_attempt(&state, &session, id).await?;

    Ok(Json(proctor.close(attempt, Trigger::Expiry).await?))
}
