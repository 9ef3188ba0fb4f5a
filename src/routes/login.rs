use axum::{Extension, Json, extract::State, http::StatusCode};

use crate::{
    AppState,
    error::{AppError, Result},
    models::{AuthResponse, AuthUser, LoginRequest},
    queries::user_queries,
    utils::jwt,
};

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid credentials".to_string())
}

pub async fn login_user(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let (login, password) = match (payload.username.as_deref(), payload.password.as_deref()) {
        (Some(login), Some(password)) if !login.trim().is_empty() && !password.is_empty() => {
            (login.trim(), password)
        }
        _ => {
            return Err(AppError::BadRequest(
                "Username and password are required".to_string(),
            ));
        }
    };

    let user = user_queries::find_by_login(&state.db, login)
        .await?
        .ok_or_else(invalid_credentials)?;

    let is_valid = bcrypt::verify(password, &user.password)
        .map_err(|e| AppError::InternalError(format!("Password verification failed: {}", e)))?;

    if !is_valid || !user.is_active {
        return Err(invalid_credentials());
    }

    let token = jwt::generate_token(&state.jwt_secret, &user)?;

    Ok(Json(AuthResponse {
        token,
        user_id: user.id,
        email: user.email,
        username: user.username,
    }))
}

/// Revokes every token issued to the caller so far.
pub async fn logout_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<StatusCode> {
    user_queries::bump_token_version(&state.db, user.id).await?;
    tracing::info!("User {} logged out", user.id);

    Ok(StatusCode::NO_CONTENT)
}
