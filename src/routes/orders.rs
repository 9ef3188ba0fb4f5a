use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::Response,
};

use crate::{
    AppState,
    error::{AppError, Result},
    models::{
        AuthUser, CompleteOrderRequest, ManualCompletionRequest, Order, OrderResponse,
        OrderSearchResponse, OrderStatus, SalesHistoryQuery,
    },
    queries::{order_queries, user_queries},
    routes::attachment,
    services::{order_service, report_export, stripe_service},
};

async fn order_response(state: &AppState, order: Order) -> Result<Json<OrderResponse>> {
    let items = order_queries::get_items(&state.db, order.id).await?;

    Ok(Json(OrderResponse::new(order, items)))
}

pub async fn my_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<OrderResponse>>> {
    let orders = order_queries::get_user_orders(&state.db, user.id).await?;

    Ok(Json(orders))
}

/// Customer confirmation after returning from the Stripe checkout page.
pub async fn complete_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CompleteOrderRequest>,
) -> Result<Json<OrderResponse>> {
    let session_id = payload.session_id.trim();
    if session_id.is_empty() {
        return Err(AppError::BadRequest("session_id is required".to_string()));
    }
    let session_id = stripe_service::validate_session_id(session_id)?;

    let session = stripe_service::retrieve_checkout_session(&state.stripe, session_id).await?;
    let order = order_service::confirm_paid_session(&state.db, &user, &session).await?;

    order_response(&state, order).await
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<OrderResponse>> {
    if let Some(order) = order_queries::cancel_order(&state.db, id, user.id).await? {
        tracing::info!("Order {} cancelled by {}", order.id, user.username);
        return order_response(&state, order).await;
    }

    match order_queries::find_by_id(&state.db, id).await? {
        Some(order) if order.customer_id == user.id => Err(AppError::Conflict(
            "Only orders awaiting payment can be cancelled".to_string(),
        )),
        _ => Err(AppError::NotFound("Order not found".to_string())),
    }
}

async fn receipt_response(state: &AppState, order: Order) -> Result<Response> {
    if order.status != OrderStatus::Completed {
        return Err(AppError::NotFound("Receipt not found".to_string()));
    }

    let customer = user_queries::find_by_id(&state.db, order.customer_id)
        .await?
        .map(|u| u.username)
        .unwrap_or_default();
    let items = order_queries::get_items(&state.db, order.id).await?;

    let pdf = report_export::render_receipt(&order, &customer, &items)?;

    Ok(attachment(
        pdf,
        report_export::PDF_CONTENT_TYPE,
        &format!("receipt_{}.pdf", order.id),
    ))
}

pub async fn order_receipt(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Response> {
    let order = order_queries::find_by_id(&state.db, id)
        .await?
        .filter(|o| o.customer_id == user.id || user.is_admin())
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    receipt_response(&state, order).await
}

pub async fn admin_order_receipt(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response> {
    let order = order_queries::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    receipt_response(&state, order).await
}

pub async fn sales_history(
    State(state): State<AppState>,
    Query(params): Query<SalesHistoryQuery>,
) -> Result<Json<OrderSearchResponse>> {
    if let (Some(start), Some(end)) = (params.start_date, params.end_date) {
        if start > end {
            return Err(AppError::BadRequest(
                "start_date cannot be after end_date".to_string(),
            ));
        }
    }

    let orders = order_queries::sales_history(&state.db, params).await?;

    Ok(Json(orders))
}

/// Completes a user's open order without a payment callback.
pub async fn admin_complete_order(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Json(payload): Json<ManualCompletionRequest>,
) -> Result<Json<OrderResponse>> {
    let user_id = payload
        .user_id
        .ok_or_else(|| AppError::BadRequest("user_id is required".to_string()))?;

    let order = order_service::complete_for_customer(&state.db, &admin, user_id).await?;
    order_response(&state, order).await
}
