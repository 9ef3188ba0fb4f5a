use axum::{Json, extract::State, http::StatusCode};

use crate::{
    AppState,
    error::{AppError, Result},
    models::{AuthResponse, RegisterRequest, UserRole},
    queries::user_queries::{self, NewUser},
    utils::jwt,
};

pub const MIN_PASSWORD_LENGTH: usize = 8;

pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    validate_credentials(&payload.username, &payload.email, &payload.password)?;

    let password_hash = hash_password(&payload.password)?;

    let user = user_queries::create_user(
        &state.db,
        NewUser {
            username: payload.username.trim(),
            email: payload.email.trim(),
            password_hash: &password_hash,
            first_name: payload.first_name.as_deref().unwrap_or("").trim(),
            last_name: payload.last_name.as_deref().unwrap_or("").trim(),
            role: UserRole::Client,
            is_active: true,
        },
    )
    .await?;

    tracing::info!("Registered user {} ({})", user.username, user.id);

    let token = jwt::generate_token(&state.jwt_secret, &user)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user_id: user.id,
            email: user.email,
            username: user.username,
        }),
    ))
}

pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::InternalError(format!("Password hashing failed: {}", e)))
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(AppError::BadRequest("Username cannot be empty".to_string()));
    }
    Ok(())
}

pub fn validate_credentials(username: &str, email: &str, password: &str) -> Result<()> {
    validate_username(username)?;
    validate_email(email)?;
    validate_password(password)
}
