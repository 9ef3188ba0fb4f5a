use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    error::{AppError, Result},
    models::{
        AddCartItemRequest, AuthUser, CheckoutResponse, Order, OrderItemDetail, OrderResponse,
        UpdateCartItemRequest,
    },
    queries::{order_queries, product_queries},
    services::{
        cart_service,
        stripe_service::{self, CheckoutLine},
    },
};

fn cart_closed() -> AppError {
    AppError::Conflict("The cart is already being checked out".to_string())
}

async fn cart_response(state: &AppState, order: Order) -> Result<Json<OrderResponse>> {
    let items = order_queries::get_items(&state.db, order.id).await?;

    Ok(Json(OrderResponse::new(order, items)))
}

pub async fn get_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<OrderResponse>> {
    let cart = order_queries::get_or_create_cart(&state.db, user.id).await?;

    cart_response(&state, cart).await
}

pub async fn add_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<AddCartItemRequest>,
) -> Result<(StatusCode, Json<OrderResponse>)> {
    let product_id = payload
        .product_id
        .ok_or_else(|| AppError::BadRequest("Product ID is required.".to_string()))?;
    let quantity = payload.quantity.unwrap_or(1);
    cart_service::ensure_positive_quantity(quantity)?;

    let product = product_queries::find_by_id(&state.db, product_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    let cart = order_queries::get_or_create_cart(&state.db, user.id).await?;

    let already_in_cart = order_queries::find_item_by_product(&state.db, cart.id, product.id)
        .await?
        .map(|item| item.quantity)
        .unwrap_or(0);

    let requested = already_in_cart
        .checked_add(quantity)
        .ok_or_else(|| AppError::BadRequest("Quantity is too large.".to_string()))?;
    cart_service::ensure_stock(requested, product.stock)?;

    let cart = order_queries::add_item(&state.db, cart.id, product.id, quantity, product.price)
        .await?
        .ok_or_else(cart_closed)?;

    let response = cart_response(&state, cart).await?;
    Ok((StatusCode::CREATED, response))
}

pub async fn update_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(item_id): Path<i32>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> Result<Json<OrderResponse>> {
    let item = order_queries::find_cart_item(&state.db, user.id, item_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Cart item not found".to_string()))?;

    let cart = match payload.quantity {
        q if q < 0 => {
            return Err(AppError::BadRequest(
                "Quantity cannot be negative.".to_string(),
            ));
        }
        0 => order_queries::delete_item(&state.db, item.order_id, item.id).await?,
        q => {
            cart_service::ensure_stock(q, item.product_stock)?;
            order_queries::set_item_quantity(&state.db, item.order_id, item.id, q).await?
        }
    };

    cart_response(&state, cart.ok_or_else(cart_closed)?).await
}

pub async fn remove_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(item_id): Path<i32>,
) -> Result<Json<OrderResponse>> {
    let item = order_queries::find_cart_item(&state.db, user.id, item_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Cart item not found".to_string()))?;

    let cart = order_queries::delete_item(&state.db, item.order_id, item.id)
        .await?
        .ok_or_else(cart_closed)?;

    cart_response(&state, cart).await
}

/// Freezes the cart in PROCESSING, then opens a Stripe Checkout session for exactly
/// the lines that were frozen.
pub async fn checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<CheckoutResponse>> {
    let (order, items) =
        order_queries::begin_checkout(&state.db, user.id, cart_service::validate_for_checkout)
            .await?
            .ok_or_else(|| AppError::NotFound("No active cart found.".to_string()))?;

    let session = match open_payment_session(&state, order.id, &items).await {
        Ok(session) => session,
        Err(e) => {
            if !order_queries::release_checkout(&state.db, order.id).await? {
                tracing::warn!("Order {} stays in PROCESSING without a payment session", order.id);
            }
            return Err(e);
        }
    };

    let order = order_queries::attach_payment_session(
        &state.db,
        order.id,
        &session.id,
        &session.checkout_url,
    )
    .await?
    .ok_or_else(|| AppError::Conflict("The order changed during checkout".to_string()))?;

    tracing::info!(
        "Checkout session {} created for order {} of {} (total {})",
        session.id,
        order.id,
        user.username,
        order.total_price
    );

    Ok(Json(CheckoutResponse {
        order_id: order.id,
        checkout_url: session.checkout_url,
    }))
}

struct PaymentSession {
    id: String,
    checkout_url: String,
}

async fn open_payment_session(
    state: &AppState,
    order_id: i32,
    items: &[OrderItemDetail],
) -> Result<PaymentSession> {
    let lines = items
        .iter()
        .map(|item| -> Result<CheckoutLine> {
            Ok(CheckoutLine {
                name: item.product_name.clone(),
                unit_amount: stripe_service::to_cents(item.price)?,
                quantity: item.quantity,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let session = stripe_service::create_checkout_session(&state.stripe, order_id, &lines).await?;
    let checkout_url = session.url.ok_or_else(|| {
        AppError::PaymentError("Stripe did not return a checkout URL".to_string())
    })?;

    Ok(PaymentSession {
        id: session.id,
        checkout_url,
    })
}
