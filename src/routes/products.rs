use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::{
    AppState,
    error::{AppError, Result},
    models::{ProductListResponse, ProductQuery, ProductResponse},
    queries::product_queries,
};

pub async fn search_products(
    State(state): State<AppState>,
    Query(params): Query<ProductQuery>,
) -> Result<Json<ProductListResponse>> {
    if let (Some(min), Some(max)) = (params.min_price, params.max_price) {
        if min > max {
            return Err(AppError::BadRequest(
                "min_price cannot be greater than max_price".to_string(),
            ));
        }
    }

    let products = product_queries::search_products(&state.db, params).await?;

    Ok(Json(products))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ProductResponse>> {
    let product = product_queries::find_with_category(&state.db, id)
        .await?
        .filter(|p| p.product.is_active)
        .ok_or(AppError::NotFound("Product not found".to_string()))?;

    Ok(Json(ProductResponse::from(product)))
}
