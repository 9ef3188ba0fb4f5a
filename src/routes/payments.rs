use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;

use crate::{
    AppState,
    error::{AppError, Result},
    queries::order_queries::{self, CompletionOutcome},
    services::stripe_service::{self, CheckoutSession, WebhookEvent},
};

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Stripe webhook. The signature is checked against the raw body before anything is parsed.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing Stripe signature".to_string()))?;

    if !stripe_service::verify_webhook_signature(
        &state.stripe.webhook_secret,
        signature,
        &body,
        Utc::now().timestamp(),
    ) {
        tracing::warn!("Rejected Stripe webhook with invalid signature");
        return Err(AppError::BadRequest("Invalid signature".to_string()));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {}", e)))?;

    if event.event_type != stripe_service::CHECKOUT_COMPLETED_EVENT {
        tracing::info!("Ignoring Stripe event {} ({})", event.id, event.event_type);
        return Ok(StatusCode::OK);
    }

    let session: CheckoutSession = match serde_json::from_value(event.data.object) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("Stripe event {} has no readable session: {}", event.id, e);
            return Ok(StatusCode::OK);
        }
    };

    let Some(order_id) = session.order_id() else {
        tracing::warn!("Checkout session {} carries no order_id", session.id);
        return Ok(StatusCode::OK);
    };

    match order_queries::complete_order(&state.db, order_id).await? {
        Some(CompletionOutcome::Completed(order)) => {
            tracing::info!("Order {} completed by Stripe session {}", order.id, session.id);
        }
        Some(CompletionOutcome::AlreadyCompleted(order)) => {
            tracing::info!("Order {} was already completed", order.id);
        }
        Some(CompletionOutcome::InsufficientStock { product_name }) => {
            tracing::warn!(
                "Paid order {} left unchanged: not enough stock for '{}'",
                order_id,
                product_name
            );
        }
        Some(CompletionOutcome::Cancelled(order)) => {
            tracing::warn!("Payment received for cancelled order {}", order.id);
        }
        None => {
            tracing::warn!("Stripe session {} references unknown order {}", session.id, order_id);
        }
    }

    Ok(StatusCode::OK)
}
