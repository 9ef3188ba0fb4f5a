use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{
    AppState,
    error::AppError,
    models::{AuthUser, User, UserRole},
    queries::user_queries,
    utils::{
        extractors::{bearer_token, extract_user_id},
        jwt,
    },
};

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request_token(&req)?;
    let user = authenticate(&state, &token).await?;

    req.extensions_mut().insert(AuthUser::from(&user));

    Ok(next.run(req).await)
}

pub async fn admin_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request_token(&req)?;
    let user = authenticate(&state, &token).await?;

    if user.role != UserRole::Admin {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    req.extensions_mut().insert(AuthUser::from(&user));

    Ok(next.run(req).await)
}

fn request_token(req: &Request) -> Result<String, AppError> {
    let header = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok());

    bearer_token(header).map(str::to_string)
}

async fn authenticate(state: &AppState, token: &str) -> Result<User, AppError> {
    let claims = jwt::verify_token(&state.jwt_secret, token)?;
    let user_id = extract_user_id(&claims)?;

    let user = user_queries::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    if !user.is_active {
        return Err(AppError::Unauthorized("User is inactive".to_string()));
    }

    if user.token_version != claims.ver {
        return Err(AppError::Unauthorized("Token has been revoked".to_string()));
    }

    Ok(user)
}
