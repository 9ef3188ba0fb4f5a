use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;

use crate::{
    AppState,
    error::{AppError, Result},
    models::{
        AuthUser, Claim, ClaimDetailResponse, ClaimFeedbackRequest, ClaimQuery,
        ClaimSearchResponse, ClaimStats, ClaimStatsQuery, CreateClaimRequest, OrderStatus,
        UpdateClaimStatusRequest,
    },
    queries::{
        claim_queries::{self, FeedbackOutcome, NewClaim, StatusChange, StatusChangeOutcome},
        order_queries, product_queries,
    },
};

const MAX_TITLE_CHARS: usize = 200;
const DEFAULT_STATS_DAYS: i32 = 30;
const MAX_STATS_DAYS: i32 = 365;

fn claim_not_found() -> AppError {
    AppError::NotFound("Claim not found".to_string())
}

fn validate_title(title: Option<&str>) -> Result<&str> {
    let title = title.map(str::trim).unwrap_or("");
    if title.is_empty() {
        return Err(AppError::BadRequest("Title is required".to_string()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::BadRequest(format!(
            "Title cannot exceed {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(title)
}

fn validate_description(description: Option<&str>) -> Result<&str> {
    let description = description.map(str::trim).unwrap_or("");
    if description.is_empty() {
        return Err(AppError::BadRequest("Description is required".to_string()));
    }
    Ok(description)
}

fn validate_rating(rating: Option<i16>) -> Result<i16> {
    match rating {
        Some(r) if (1..=5).contains(&r) => Ok(r),
        Some(_) => Err(AppError::BadRequest(
            "Rating must be between 1 and 5".to_string(),
        )),
        None => Err(AppError::BadRequest("Rating is required".to_string())),
    }
}

fn stats_window(days: Option<i32>) -> i32 {
    days.unwrap_or(DEFAULT_STATS_DAYS).clamp(1, MAX_STATS_DAYS)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

async fn detail_response(
    state: &AppState,
    claim: Claim,
    admin: bool,
) -> Result<Json<ClaimDetailResponse>> {
    let product_name = product_queries::find_by_id(&state.db, claim.product_id)
        .await?
        .map(|p| p.name);
    let history = claim_queries::get_history(&state.db, claim.id).await?;
    let claim = if admin { claim } else { claim.for_customer() };

    Ok(Json(ClaimDetailResponse {
        product_name,
        is_resolved: claim.status.is_settled(),
        days_open: claim.days_open(Utc::now()),
        allowed_statuses: if admin {
            claim.status.next_statuses().to_vec()
        } else {
            Vec::new()
        },
        history,
        claim,
    }))
}

/// Files a claim against an item of one of the caller's completed orders.
pub async fn create_claim(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateClaimRequest>,
) -> Result<(StatusCode, Json<Claim>)> {
    let title = validate_title(payload.title.as_deref())?;
    let description = validate_description(payload.description.as_deref())?;
    let damage_type = payload
        .damage_type
        .ok_or_else(|| AppError::BadRequest("damage_type is required".to_string()))?;
    let order_id = payload
        .order_id
        .ok_or_else(|| AppError::BadRequest("order_id is required".to_string()))?;
    let order_item_id = payload
        .order_item_id
        .ok_or_else(|| AppError::BadRequest("order_item_id is required".to_string()))?;

    let order = order_queries::find_by_id(&state.db, order_id)
        .await?
        .filter(|o| o.customer_id == user.id)
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    if order.status != OrderStatus::Completed {
        return Err(AppError::BadRequest(
            "Claims can only be filed for completed orders".to_string(),
        ));
    }

    let item = order_queries::get_items(&state.db, order.id)
        .await?
        .into_iter()
        .find(|i| i.id == order_item_id)
        .ok_or_else(|| AppError::BadRequest("The item does not belong to this order".to_string()))?;

    if payload.product_id.is_some_and(|p| p != item.product_id) {
        return Err(AppError::BadRequest(
            "product_id does not match the order item".to_string(),
        ));
    }

    let claim = claim_queries::create_claim(
        &state.db,
        NewClaim {
            customer_id: user.id,
            order_id: order.id,
            order_item_id: item.id,
            product_id: item.product_id,
            title,
            description,
            damage_type,
            priority: damage_type.default_priority(),
        },
    )
    .await?;

    tracing::info!(
        "Claim {} filed by {} for order {}",
        claim.ticket_number,
        user.username,
        order.id
    );

    Ok((StatusCode::CREATED, Json(claim.for_customer())))
}

pub async fn my_claims(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Claim>>> {
    let claims = claim_queries::get_customer_claims(&state.db, user.id)
        .await?
        .into_iter()
        .map(Claim::for_customer)
        .collect();

    Ok(Json(claims))
}

pub async fn get_claim(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<ClaimDetailResponse>> {
    let claim = claim_queries::find_by_id(&state.db, id)
        .await?
        .filter(|c| c.customer_id == user.id || user.is_admin())
        .ok_or_else(claim_not_found)?;

    detail_response(&state, claim, user.is_admin()).await
}

pub async fn add_feedback(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
    Json(payload): Json<ClaimFeedbackRequest>,
) -> Result<Json<Claim>> {
    let rating = validate_rating(payload.rating)?;

    let outcome = claim_queries::add_feedback(
        &state.db,
        id,
        user.id,
        rating,
        non_blank(&payload.feedback),
    )
    .await?
    .ok_or_else(claim_not_found)?;

    match outcome {
        FeedbackOutcome::Rated(claim) => {
            tracing::info!("Claim {} rated {}/5 by {}", claim.ticket_number, rating, user.username);
            Ok(Json(claim.for_customer()))
        }
        FeedbackOutcome::NotSettled(status) => Err(AppError::Conflict(format!(
            "Feedback is accepted once the claim is resolved (currently {:?})",
            status
        ))),
        FeedbackOutcome::AlreadyRated => Err(AppError::Conflict(
            "Feedback was already submitted for this claim".to_string(),
        )),
    }
}

//ADMIN ROUTES
pub async fn list_claims(
    State(state): State<AppState>,
    Query(params): Query<ClaimQuery>,
) -> Result<Json<ClaimSearchResponse>> {
    let claims = claim_queries::search_claims(&state.db, params).await?;

    Ok(Json(claims))
}

pub async fn claim_stats(
    State(state): State<AppState>,
    Query(params): Query<ClaimStatsQuery>,
) -> Result<Json<ClaimStats>> {
    let stats = claim_queries::stats(&state.db, stats_window(params.days)).await?;

    Ok(Json(stats))
}

pub async fn update_claim_status(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateClaimStatusRequest>,
) -> Result<Json<ClaimDetailResponse>> {
    let status = payload
        .status
        .ok_or_else(|| AppError::BadRequest("status is required".to_string()))?;

    let outcome = claim_queries::change_status(
        &state.db,
        id,
        admin.id,
        StatusChange {
            status,
            priority: payload.priority,
            resolution: payload.resolution,
            admin_response: non_blank(&payload.admin_response),
            internal_notes: non_blank(&payload.internal_notes),
            note: non_blank(&payload.note),
        },
    )
    .await?
    .ok_or_else(claim_not_found)?;

    match outcome {
        StatusChangeOutcome::Updated(claim) => {
            tracing::info!(
                "Claim {} moved to {:?} by {}",
                claim.ticket_number,
                claim.status,
                admin.username
            );
            detail_response(&state, claim, true).await
        }
        StatusChangeOutcome::NotAllowed { from, to } => Err(AppError::Conflict(format!(
            "A claim cannot move from {:?} to {:?}",
            from, to
        ))),
        StatusChangeOutcome::ResolutionRequired => Err(AppError::BadRequest(
            "A resolution is required to resolve the claim".to_string(),
        )),
    }
}
