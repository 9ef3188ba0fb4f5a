mod admin;
mod cart;
mod categories;
mod claims;
mod health;
mod login;
mod orders;
mod payments;
mod products;
mod profile;
mod register;
mod reports;

use axum::{
    Router,
    http::header,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};

use crate::{
    AppState,
    middleware::{admin_middleware, auth_middleware},
};

pub fn create_router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/auth/register", post(register::register_user))
        .route("/auth/login", post(login::login_user))
        .route("/categories", get(categories::list_categories))
        .route("/categories/{slug}", get(categories::get_category))
        .route("/products", get(products::search_products))
        .route("/products/{id}", get(products::get_product))
        .route("/payments/stripe/webhook", post(payments::stripe_webhook));

    let authenticated = Router::new()
        .route("/auth/logout", post(login::logout_user))
        .route("/auth/profile", get(profile::get_profile))
        .route("/cart", get(cart::get_cart).post(cart::add_item))
        .route(
            "/cart/items/{item_id}",
            put(cart::update_item).delete(cart::remove_item),
        )
        .route("/cart/checkout", post(cart::checkout))
        .route("/orders/mine", get(orders::my_orders))
        .route("/orders/complete", post(orders::complete_order))
        .route("/orders/{id}/cancel", post(orders::cancel_order))
        .route("/orders/{id}/receipt", get(orders::order_receipt))
        .route("/claims", post(claims::create_claim))
        .route("/claims/mine", get(claims::my_claims))
        .route("/claims/{id}", get(claims::get_claim))
        .route("/claims/{id}/feedback", patch(claims::add_feedback))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin = Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route(
            "/users/{id}",
            get(admin::get_user)
                .put(admin::update_user)
                .delete(admin::delete_user),
        )
        .route("/categories", post(admin::create_category))
        .route(
            "/categories/{slug}",
            put(admin::update_category).delete(admin::delete_category),
        )
        .route("/products", post(admin::create_product))
        .route(
            "/products/{id}",
            put(admin::update_product).delete(admin::delete_product),
        )
        .route("/products/{id}/image", put(admin::upload_product_image))
        .route("/orders", get(orders::sales_history))
        .route("/orders/complete", post(orders::admin_complete_order))
        .route("/orders/{id}/receipt", get(orders::admin_order_receipt))
        .route("/reports/generate", post(reports::generate_report))
        .route("/reports/interpret", post(reports::interpret_prompt))
        .route("/claims", get(claims::list_claims))
        .route("/claims/stats", get(claims::claim_stats))
        .route("/claims/{id}/status", patch(claims::update_claim_status))
        .route_layer(middleware::from_fn_with_state(state, admin_middleware));

    Router::new()
        .merge(public)
        .merge(authenticated)
        .nest("/admin", admin)
}

/// Binary download with a suggested file name.
pub(crate) fn attachment(bytes: Vec<u8>, content_type: &'static str, filename: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response()
}
