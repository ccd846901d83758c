// src/handlers/admin.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use super::proctor::Proctor;
use crate::{
    error::AppError,
    models::{
        TestId,
        attempt::TestResultEntry,
        question::check_questions,
        test::{CreateTestRequest, NewTest, ReplaceQuestionsRequest, TestWithQuestions, UpdateTestRequest},
    },
    state::AppState,
    store::SharedStore,
    utils::jwt::Session,
};

fn test_not_found() -> AppError {
    AppError::NotFound("Test not found".to_string())
}

/// Lists every test, newest first.
/// Admin only.
pub async fn list_tests(State(store): State<SharedStore>) -> Result<impl IntoResponse, AppError> {
    let tests = store.list_tests(false).await.map_err(|e| {
        tracing::error!("Failed to list tests: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(tests))
}

/// Creates a test with its questions. The test starts inactive and its
/// total marks are the sum of the question marks.
/// Admin only.
pub async fn create_test(
    State(store): State<SharedStore>,
    Extension(session): Extension<Session>,
    Json(payload): Json<CreateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if payload.title.trim().is_empty() {
        return Err(AppError::BadRequest("Title is required".to_string()));
    }
    check_questions(&payload.questions).map_err(AppError::BadRequest)?;

    let created = store
        .create_test(NewTest::from_request(payload, session.user_id))
        .await
        .map_err(|e| {
            tracing::error!("Failed to create test: {:?}", e);
            AppError::from(e)
        })?;

    tracing::info!(
        test_id = created.test.id,
        questions = created.questions.len(),
        total_marks = created.test.total_marks,
        "Test created"
    );

    Ok((StatusCode::CREATED, Json(created)))
}

/// Returns a test with its questions, answer keys included.
/// Admin only.
pub async fn get_test(
    State(store): State<SharedStore>,
    Path(id): Path<TestId>,
) -> Result<impl IntoResponse, AppError> {
    let test = store.find_test(id).await?.ok_or_else(test_not_found)?;
    let questions = store.list_questions(id).await?;

    Ok(Json(TestWithQuestions { test, questions }))
}

/// Updates title, description or duration.
/// Admin only.
pub async fn update_test(
    State(store): State<SharedStore>,
    Path(id): Path<TestId>,
    Json(payload): Json<UpdateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if payload.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(AppError::BadRequest("Title is required".to_string()));
    }

    let test = store
        .update_test(id, &payload)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update test: {:?}", e);
            AppError::from(e)
        })?
        .ok_or_else(test_not_found)?;

    Ok(Json(test))
}

/// Replaces the question set and recomputes total marks.
/// Refused once students have attempted the test.
/// Admin only.
pub async fn replace_questions(
    State(store): State<SharedStore>,
    Path(id): Path<TestId>,
    Json(payload): Json<ReplaceQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    check_questions(&payload.questions).map_err(AppError::BadRequest)?;

    let updated = store
        .replace_questions(id, payload.questions)
        .await?
        .ok_or_else(test_not_found)?;

    tracing::info!(test_id = id, total_marks = updated.test.total_marks, "Questions replaced");

    Ok(Json(updated))
}

/// Flips the test between active and inactive.
/// Admin only.
pub async fn toggle_test(
    State(store): State<SharedStore>,
    Path(id): Path<TestId>,
) -> Result<impl IntoResponse, AppError> {
    let test = store
        .toggle_test_active(id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to toggle test: {:?}", e);
            AppError::from(e)
        })?
        .ok_or_else(test_not_found)?;

    tracing::info!(test_id = id, is_active = test.is_active, "Test activation toggled");

    Ok(Json(test))
}

/// Deletes a test along with its questions, attempts and results.
/// Admin only.
pub async fn delete_test(
    State(store): State<SharedStore>,
    Path(id): Path<TestId>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = store.delete_test(id).await.map_err(|e| {
        tracing::error!("Failed to delete test: {:?}", e);
        AppError::from(e)
    })?;

    if !deleted {
        return Err(test_not_found());
    }

    tracing::info!(test_id = id, "Test deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Lists all attempts at a test with the students who made them.
/// Expired open attempts are auto-submitted first.
/// Admin only.
pub async fn test_results(
    State(state): State<AppState>,
    Path(id): Path<TestId>,
) -> Result<impl IntoResponse, AppError> {
    let proctor = Proctor::new(&state);
    let test = state.store.find_test(id).await?.ok_or_else(test_not_found)?;

    let mut results = Vec::new();
    for entry in state.store.list_test_attempts(test.id).await? {
        let attempt = proctor.settle(entry.attempt).await?;
        results.push(TestResultEntry {
            result: attempt.into(),
            student_name: entry.student_name,
            student_email: entry.student_email,
        });
    }

    Ok(Json(results))
}
