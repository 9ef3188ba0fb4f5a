use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::{database, error::Result, AppState};

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Ready once Postgres answers; also reports which media and payment backends are wired.
pub async fn readiness_check(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let schema_version = database::schema_version(&state.db).await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "ready",
            "database": "connected",
            "schema_version": schema_version,
            "media": state.media.backend(),
            "payments": format!("stripe-{}", state.stripe.mode()),
        })),
    ))
}
