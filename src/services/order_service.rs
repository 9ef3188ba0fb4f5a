use sqlx::PgPool;

use crate::{
    error::{AppError, Result},
    models::{AuthUser, Order},
    queries::order_queries::{self, CompletionOutcome},
    services::stripe_service::CheckoutSession,
};

/// Runs the shared completion and maps each outcome onto an HTTP error.
pub async fn finalize_order(pool: &PgPool, order_id: i32) -> Result<Order> {
    match order_queries::complete_order(pool, order_id).await? {
        Some(CompletionOutcome::Completed(order)) => {
            tracing::info!("Order {} completed", order.id);
            Ok(order)
        }
        Some(CompletionOutcome::AlreadyCompleted(order)) => Ok(order),
        Some(CompletionOutcome::InsufficientStock { product_name }) => {
            tracing::warn!(
                "Order {} could not be completed: not enough stock for '{}'",
                order_id,
                product_name
            );
            Err(AppError::BadRequest(format!(
                "Not enough stock available for '{}'.",
                product_name
            )))
        }
        Some(CompletionOutcome::Cancelled(_)) => Err(AppError::Conflict(
            "The order has been cancelled".to_string(),
        )),
        None => Err(AppError::NotFound("Order not found".to_string())),
    }
}

/// Completes the order a paid session belongs to, provided the caller owns it.
pub async fn confirm_paid_session(
    pool: &PgPool,
    user: &AuthUser,
    session: &CheckoutSession,
) -> Result<Order> {
    if !session.is_paid() {
        return Err(AppError::BadRequest(
            "Payment has not been completed".to_string(),
        ));
    }

    let order_id = session.order_id().ok_or_else(|| {
        AppError::BadRequest("Checkout session is not linked to an order".to_string())
    })?;

    let order = order_queries::find_by_id(pool, order_id)
        .await?
        .filter(|o| o.customer_id == user.id)
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    tracing::info!(
        "{} confirmed payment session {} for order {}",
        user.username,
        session.id,
        order.id
    );

    finalize_order(pool, order.id).await
}

/// Manual completion of a customer's open order, PROCESSING first.
pub async fn complete_for_customer(pool: &PgPool, admin: &AuthUser, user_id: i32) -> Result<Order> {
    let order = order_queries::find_open_order(pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No open order for this user".to_string()))?;

    tracing::info!(
        "Admin {} completing order {} of user {}",
        admin.username,
        order.id,
        user_id
    );

    finalize_order(pool, order.id).await
}
