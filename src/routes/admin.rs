use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use crate::{
    AppState,
    error::{AppError, Result},
    models::{
        AuthUser, Category, CreateCategoryRequest, CreateProductRequest, CreateUserRequest,
        ProductResponse, UpdateCategoryRequest, UpdateProductRequest, UpdateUserRequest, UserQuery,
        UserResponse, UserRole, UserSearchResponse,
    },
    queries::{
        category_queries, product_queries,
        user_queries::{self, NewUser},
    },
    routes::register::{
        hash_password, validate_credentials, validate_email, validate_password, validate_username,
    },
    services::media_service::{self, MAX_IMAGE_BYTES},
};

//USER ROUTES
pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<UserQuery>,
) -> Result<Json<UserSearchResponse>> {
    let users = user_queries::search_users(&state.db, params).await?;

    Ok(Json(users))
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>)> {
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
            role: payload.role.unwrap_or(UserRole::Client),
            is_active: payload.is_active.unwrap_or(true),
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<UserResponse>> {
    let user = user_queries::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(UserResponse::from(user)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>> {
    if let Some(ref username) = payload.username {
        validate_username(username)?;
    }
    if let Some(ref email) = payload.email {
        validate_email(email)?;
    }

    let password_hash = match payload.password.as_deref() {
        Some(password) => {
            validate_password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    let user = user_queries::update_user(&state.db, id, &payload, password_hash.as_deref())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(UserResponse::from(user)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<StatusCode> {
    if admin.id == id {
        return Err(AppError::BadRequest(
            "You cannot delete your own account".to_string(),
        ));
    }

    if user_queries::delete_user(&state.db, id).await? == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!("Admin {} deleted user {}", admin.id, id);

    Ok(StatusCode::NO_CONTENT)
}

//CATEGORY ROUTES
fn validate_category_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AppError::BadRequest("Category name cannot be empty".to_string()));
    }
    Ok(())
}

fn validate_slug(slug: &str) -> Result<()> {
    let slug = slug.trim();
    if slug.is_empty() || slug.chars().any(char::is_whitespace) {
        return Err(AppError::BadRequest(
            "Slug must be non-empty and contain no spaces".to_string(),
        ));
    }
    Ok(())
}

pub async fn create_category(
    State(state): State<AppState>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>)> {
    validate_category_name(&payload.name)?;
    validate_slug(&payload.slug)?;

    let category = category_queries::create_category(&state.db, &payload).await?;

    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(payload): Json<UpdateCategoryRequest>,
) -> Result<Json<Category>> {
    if let Some(ref name) = payload.name {
        validate_category_name(name)?;
    }
    if let Some(ref new_slug) = payload.slug {
        validate_slug(new_slug)?;
    }

    let category = category_queries::update_category(&state.db, &slug, &payload)
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found".to_string()))?;

    Ok(Json(category))
}

pub async fn delete_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode> {
    let category = category_queries::find_by_slug(&state.db, &slug)
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found".to_string()))?;

    if category_queries::count_products(&state.db, category.id).await? > 0 {
        return Err(AppError::Conflict(
            "Category still has products".to_string(),
        ));
    }

    category_queries::delete_category(&state.db, category.id).await?;

    Ok(StatusCode::NO_CONTENT)
}

//PRODUCT ROUTES
/// Largest value a NUMERIC(10, 2) column holds.
fn max_price() -> Decimal {
    Decimal::new(9_999_999_999, 2)
}

fn validate_product_fields(
    name: Option<&str>,
    price: Option<Decimal>,
    stock: Option<i32>,
) -> Result<()> {
    if let Some(name) = name {
        if name.trim().is_empty() {
            return Err(AppError::BadRequest("Product name cannot be empty".to_string()));
        }
    }

    if let Some(price) = price {
        if price <= Decimal::ZERO {
            return Err(AppError::BadRequest("Price must be greater than 0".to_string()));
        }
        if price.normalize().scale() > 2 {
            return Err(AppError::BadRequest(
                "Price cannot have more than 2 decimal places".to_string(),
            ));
        }
        if price > max_price() {
            return Err(AppError::BadRequest(
                "Price cannot exceed 99999999.99".to_string(),
            ));
        }
    }

    if let Some(stock) = stock {
        if stock < 0 {
            return Err(AppError::BadRequest("Stock cannot be negative".to_string()));
        }
    }

    Ok(())
}

async fn ensure_category_exists(state: &AppState, category_id: i32) -> Result<()> {
    if category_queries::find_by_id(&state.db, category_id)
        .await?
        .is_none()
    {
        return Err(AppError::BadRequest("Category does not exist".to_string()));
    }
    Ok(())
}

async fn product_response(state: &AppState, id: i32) -> Result<Json<ProductResponse>> {
    let product = product_queries::find_with_category(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    Ok(Json(ProductResponse::from(product)))
}

pub async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>)> {
    validate_product_fields(Some(&payload.name), Some(payload.price), payload.stock)?;
    ensure_category_exists(&state, payload.category_id).await?;

    let product = product_queries::create_product(&state.db, &payload).await?;

    Ok((StatusCode::CREATED, product_response(&state, product.id).await?))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>> {
    validate_product_fields(payload.name.as_deref(), payload.price, payload.stock)?;
    if let Some(category_id) = payload.category_id {
        ensure_category_exists(&state, category_id).await?;
    }

    product_queries::update_product(&state.db, id, &payload)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    product_response(&state, id).await
}

/// Products that appear in any order are deactivated instead of deleted.
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response> {
    let product = product_queries::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    if product_queries::has_order_items(&state.db, id).await? {
        product_queries::deactivate_product(&state.db, id).await?;
        tracing::info!("Product {} is referenced by orders, deactivated", id);

        return Ok((
            StatusCode::OK,
            Json(json!({
                "message": "Product is referenced by orders and was deactivated",
                "deactivated": true,
            })),
        )
            .into_response());
    }

    product_queries::delete_product(&state.db, id).await?;

    if let Some(key) = product
        .image_url
        .as_deref()
        .and_then(|url| state.media.key_from_url(url))
    {
        if let Err(e) = state.media.delete(key).await {
            tracing::warn!("Failed to delete image of product {}: {}", id, e);
        }
    }

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Replaces the product image with the raw request body.
pub async fn upload_product_image(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ProductResponse>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let extension = media_service::image_extension(content_type).ok_or_else(|| {
        AppError::BadRequest("Unsupported image type. Use JPEG, PNG, WebP or GIF".to_string())
    })?;

    if body.is_empty() {
        return Err(AppError::BadRequest("Image body is empty".to_string()));
    }
    if body.len() > MAX_IMAGE_BYTES {
        return Err(AppError::BadRequest("Image must be at most 5 MiB".to_string()));
    }

    let product = product_queries::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    let key = media_service::product_image_key(id, Uuid::new_v4(), extension);
    let url = state.media.upload(&key, content_type, body).await?;

    product_queries::set_image_url(&state.db, id, &url)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    if let Some(old_key) = product
        .image_url
        .as_deref()
        .and_then(|old| state.media.key_from_url(old))
    {
        if let Err(e) = state.media.delete(old_key).await {
            tracing::warn!("Failed to delete previous image of product {}: {}", id, e);
        }
    }

    product_response(&state, id).await
}
