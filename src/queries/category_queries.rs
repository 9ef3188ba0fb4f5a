use sqlx::PgPool;

use crate::{
    error::{AppError, Result},
    models::{Category, CreateCategoryRequest, UpdateCategoryRequest},
};

const DUPLICATE_CATEGORY: &str = "A category with this name or slug already exists";

/// Find category by ID
pub async fn find_by_id(pool: &PgPool, id: i32) -> Result<Option<Category>> {
    let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(category)
}

/// Find category by slug
pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Category>> {
    let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await?;

    Ok(category)
}

pub async fn get_all(pool: &PgPool) -> Result<Vec<Category>> {
    let categories = sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name ASC")
        .fetch_all(pool)
        .await?;

    Ok(categories)
}

pub async fn create_category(pool: &PgPool, req: &CreateCategoryRequest) -> Result<Category> {
    let category = sqlx::query_as::<_, Category>(
        "INSERT INTO categories (name, slug) VALUES ($1, $2) RETURNING *",
    )
    .bind(req.name.trim())
    .bind(req.slug.trim())
    .fetch_one(pool)
    .await
    .map_err(|e| AppError::conflict_on_unique(e, DUPLICATE_CATEGORY))?;

    Ok(category)
}

pub async fn update_category(
    pool: &PgPool,
    slug: &str,
    req: &UpdateCategoryRequest,
) -> Result<Option<Category>> {
    let category = sqlx::query_as::<_, Category>(
        r#"
        UPDATE categories
        SET
            name = COALESCE($1, name),
            slug = COALESCE($2, slug)
        WHERE slug = $3
        RETURNING *
        "#,
    )
    .bind(req.name.as_deref().map(str::trim))
    .bind(req.slug.as_deref().map(str::trim))
    .bind(slug)
    .fetch_optional(pool)
    .await
    .map_err(|e| AppError::conflict_on_unique(e, DUPLICATE_CATEGORY))?;

    Ok(category)
}

pub async fn count_products(pool: &PgPool, category_id: i32) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE category_id = $1")
        .bind(category_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

pub async fn delete_category(pool: &PgPool, id: i32) -> Result<u64> {
    let result = sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
