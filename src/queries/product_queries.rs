use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    error::Result,
    models::{
        CreateProductRequest, Product, ProductListResponse, ProductOrdering, ProductQuery,
        ProductResponse, ProductWithCategory, UpdateProductRequest,
    },
};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

pub async fn find_by_id(pool: &PgPool, id: i32) -> Result<Option<Product>> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(product)
}

pub async fn find_with_category(pool: &PgPool, id: i32) -> Result<Option<ProductWithCategory>> {
    let product = sqlx::query_as::<_, ProductWithCategory>(
        "SELECT p.*, c.name AS category_name, c.slug AS category_slug
         FROM products p
         JOIN categories c ON c.id = p.category_id
         WHERE p.id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(product)
}

/// Lists active products matching the filters, paginated.
pub async fn search_products(pool: &PgPool, params: ProductQuery) -> Result<ProductListResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT p.*, c.name AS category_name, c.slug AS category_slug,
            COUNT(*) OVER() AS total_count
         FROM products p
         JOIN categories c ON c.id = p.category_id
         WHERE p.is_active = true",
    );

    // category
    if let Some(ref slug) = params.category {
        query.push(" AND c.slug = ");
        query.push_bind(slug.clone());
    }

    // text search
    if let Some(ref search) = params.search {
        let pattern = format!("%{}%", search.trim());
        query.push(" AND (p.name ILIKE ");
        query.push_bind(pattern.clone());
        query.push(" OR p.description ILIKE ");
        query.push_bind(pattern);
        query.push(")");
    }

    // price range
    if let Some(min_price) = params.min_price {
        query.push(" AND p.price >= ");
        query.push_bind(min_price);
    }

    if let Some(max_price) = params.max_price {
        query.push(" AND p.price <= ");
        query.push_bind(max_price);
    }

    match params.in_stock {
        Some(true) => {
            query.push(" AND p.stock > 0");
        }
        Some(false) => {
            query.push(" AND p.stock = 0");
        }
        None => {}
    }

    query.push(" ORDER BY ");
    query.push(match params.ordering.unwrap_or(ProductOrdering::Name) {
        ProductOrdering::PriceAsc => "p.price ASC, p.id ASC",
        ProductOrdering::PriceDesc => "p.price DESC, p.id ASC",
        ProductOrdering::Name => "p.name ASC, p.id ASC",
        ProductOrdering::Newest => "p.created_at DESC, p.id DESC",
    });

    query.push(" LIMIT ");
    query.push_bind(limit);
    query.push(" OFFSET ");
    query.push_bind(offset);

    #[derive(sqlx::FromRow)]
    struct SearchResult {
        #[sqlx(flatten)]
        product: ProductWithCategory,
        total_count: i64,
    }

    let results = query
        .build_query_as::<SearchResult>()
        .fetch_all(pool)
        .await?;

    let total = results.first().map(|r| r.total_count).unwrap_or(0);
    let products = results
        .into_iter()
        .map(|r| ProductResponse::from(r.product))
        .collect();

    Ok(ProductListResponse {
        products,
        total,
        limit,
        offset,
    })
}

pub async fn create_product(pool: &PgPool, req: &CreateProductRequest) -> Result<Product> {
    let product = sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products (category_id, name, description, price, stock, is_active)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(req.category_id)
    .bind(req.name.trim())
    .bind(&req.description)
    .bind(req.price)
    .bind(req.stock.unwrap_or(0))
    .bind(req.is_active.unwrap_or(true))
    .fetch_one(pool)
    .await?;

    Ok(product)
}

pub async fn update_product(
    pool: &PgPool,
    id: i32,
    req: &UpdateProductRequest,
) -> Result<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(
        r#"
        UPDATE products
        SET
            category_id = COALESCE($1, category_id),
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            price = COALESCE($4, price),
            stock = COALESCE($5, stock),
            is_active = COALESCE($6, is_active),
            updated_at = NOW()
        WHERE id = $7
        RETURNING *
        "#,
    )
    .bind(req.category_id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(&req.description)
    .bind(req.price)
    .bind(req.stock)
    .bind(req.is_active)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(product)
}

pub async fn has_order_items(pool: &PgPool, id: i32) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM order_items WHERE product_id = $1)")
            .bind(id)
            .fetch_one(pool)
            .await?;

    Ok(exists)
}

pub async fn deactivate_product(pool: &PgPool, id: i32) -> Result<u64> {
    let result =
        sqlx::query("UPDATE products SET is_active = false, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

    Ok(result.rows_affected())
}

pub async fn delete_product(pool: &PgPool, id: i32) -> Result<u64> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

pub async fn set_image_url(pool: &PgPool, id: i32, image_url: &str) -> Result<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(
        "UPDATE products SET image_url = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(image_url)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(product)
}
