//! Authentication routes — password login and API key generation.

use argon2::password_hash::PasswordHash;
use argon2::{Argon2, PasswordVerifier};
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::User;

use crate::middleware::auth::{AuthUser, encode_jwt};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/api-keys", post(generate_api_key))
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response for successful login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: Uuid,
    pub username: String,
}

/// Response for API key generation.
#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub api_key: String,
}

/// POST /api/auth/login — Verify credentials, return JWT.
async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let user: User = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(&req.email)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::Auth("Invalid email or password".to_string()))?;

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|_| AppError::Internal("Stored password hash is malformed".to_string()))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::Auth("Invalid email or password".to_string()))?;

    let token = encode_jwt(
        user.id,
        &state.config.jwt_secret,
        state.config.jwt_expiry_hours,
    )?;

    tracing::info!(
        user_id = %user.id,
        username = %user.username,
        "User authenticated"
    );

    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
        username: user.username,
    }))
}

/// POST /api/auth/api-keys — Generate a new API key for the authenticated user.
async fn generate_api_key(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiKeyResponse>, AppError> {
    // Generate a random API key
    let api_key = format!("nc_{}", Uuid::new_v4().to_string().replace('-', ""));

    // Store in the database
    sqlx::query("UPDATE users SET api_key = $1, updated_at = NOW() WHERE id = $2")
        .bind(&api_key)
        .bind(auth.user_id)
        .execute(&state.pool)
        .await?;

    tracing::info!(
        user_id = %auth.user_id,
        "API key generated"
    );

    Ok(Json(ApiKeyResponse { api_key }))
}
