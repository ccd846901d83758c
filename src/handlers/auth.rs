// src/handlers/auth.rs

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::user::{AuthResponse, LoginRequest, NewUser, Role, SignupRequest},
    store::{ExamStore, SharedStore},
    utils::{
        hash::{hash_password, verify_password},
        jwt::{Session, sign_jwt},
    },
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Registers a new student account and signs it in.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created with a token and the user (excluding password).
pub async fn signup(
    State(store): State<SharedStore>,
    State(config): State<Config>,
    Json(payload): Json<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = normalize_email(&payload.email);
    if store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let user = store
        .insert_user(NewUser {
            email,
            password_hash: hash_password(&payload.password)?,
            full_name: payload.full_name.trim().to_string(),
            role: Role::Student,
        })
        .await
        .map_err(|e| {
            tracing::error!("Failed to create account: {:?}", e);
            AppError::from(e)
        })?;

    tracing::info!(user_id = user.id, "Student account created");

    let token = sign_jwt(user.id, user.role, &config.jwt_secret, config.jwt_expiration)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            token_type: "Bearer",
            user,
        }),
    ))
}

/// Authenticates a user and returns a JWT token.
///
/// Unknown email and wrong password produce the same message.
pub async fn login(
    State(store): State<SharedStore>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.validate().is_err() {
        return Err(AppError::AuthError(INVALID_CREDENTIALS.to_string()));
    }

    let user = store
        .find_user_by_email(&normalize_email(&payload.email))
        .await
        .map_err(|e| {
            tracing::error!("Login lookup failed: {:?}", e);
            AppError::from(e)
        })?
        .ok_or_else(|| AppError::AuthError(INVALID_CREDENTIALS.to_string()))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::AuthError(INVALID_CREDENTIALS.to_string()));
    }

    let token = sign_jwt(user.id, user.role, &config.jwt_secret, config.jwt_expiration)?;

    Ok(Json(AuthResponse {
        token,
        token_type: "Bearer",
        user,
    }))
}

/// Returns the user behind the current session.
pub async fn me(
    State(store): State<SharedStore>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, AppError> {
    let user = store
        .find_user(session.user_id)
        .await?
        .ok_or_else(|| AppError::AuthError("User no longer exists".to_string()))?;

    Ok(Json(user))
}

/// Creates the configured administrator account if it does not exist yet.
pub async fn seed_admin_user(store: &dyn ExamStore, config: &Config) -> Result<(), AppError> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };

    let email = normalize_email(email);
    if store.find_user_by_email(&email).await?.is_some() {
        return Ok(());
    }

    tracing::info!("Seeding admin user: {}", email);
    store
        .insert_user(NewUser {
            email,
            password_hash: hash_password(password)?,
            full_name: "Administrator".to_string(),
            role: Role::Admin,
        })
        .await?;
    tracing::info!("Admin user created successfully.");

    Ok(())
}
