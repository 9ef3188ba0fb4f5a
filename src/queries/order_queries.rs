use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use crate::{
    error::{AppError, Result},
    models::{Order, OrderItemDetail, OrderResponse, OrderSearchResponse, OrderStatus, SalesHistoryQuery},
};

const ITEM_SELECT: &str = "SELECT oi.id, oi.order_id, oi.product_id, oi.quantity, oi.price,
        p.name AS product_name, p.image_url AS product_image_url,
        p.stock AS product_stock, p.is_active AS product_is_active
     FROM order_items oi
     JOIN products p ON p.id = oi.product_id";

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug)]
pub enum CompletionOutcome {
    Completed(Order),
    /// Completing twice changes nothing.
    AlreadyCompleted(Order),
    /// Nothing was written; the order keeps its previous state.
    InsufficientStock { product_name: String },
    Cancelled(Order),
}

pub async fn find_by_id(pool: &PgPool, id: i32) -> Result<Option<Order>> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(order)
}

/// Returns the customer's cart, creating it when missing.
pub async fn get_or_create_cart(pool: &PgPool, user_id: i32) -> Result<Order> {
    let created = sqlx::query_as::<_, Order>(
        "INSERT INTO orders (customer_id) VALUES ($1)
         ON CONFLICT (customer_id) WHERE status = 'PENDING' DO NOTHING
         RETURNING *",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    if let Some(order) = created {
        return Ok(order);
    }

    let order = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE customer_id = $1 AND status = 'PENDING'",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(order)
}

/// Most recent order still awaiting payment.
pub async fn find_open_order(pool: &PgPool, user_id: i32) -> Result<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders
         WHERE customer_id = $1 AND status IN ('PENDING', 'PROCESSING')
         ORDER BY (status = 'PROCESSING') DESC, updated_at DESC
         LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(order)
}

pub async fn get_items(pool: &PgPool, order_id: i32) -> Result<Vec<OrderItemDetail>> {
    let items = sqlx::query_as::<_, OrderItemDetail>(&format!(
        "{} WHERE oi.order_id = $1 ORDER BY oi.id",
        ITEM_SELECT
    ))
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(items)
}

pub async fn get_items_for_orders(pool: &PgPool, order_ids: &[i32]) -> Result<Vec<OrderItemDetail>> {
    if order_ids.is_empty() {
        return Ok(Vec::new());
    }

    let items = sqlx::query_as::<_, OrderItemDetail>(&format!(
        "{} WHERE oi.order_id = ANY($1) ORDER BY oi.order_id, oi.id",
        ITEM_SELECT
    ))
    .bind(order_ids)
    .fetch_all(pool)
    .await?;

    Ok(items)
}

/// An item of the user's PENDING cart, if it exists.
pub async fn find_cart_item(
    pool: &PgPool,
    user_id: i32,
    item_id: i32,
) -> Result<Option<OrderItemDetail>> {
    let item = sqlx::query_as::<_, OrderItemDetail>(&format!(
        "{} JOIN orders o ON o.id = oi.order_id
         WHERE oi.id = $1 AND o.customer_id = $2 AND o.status = 'PENDING'",
        ITEM_SELECT
    ))
    .bind(item_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(item)
}

pub async fn find_item_by_product(
    pool: &PgPool,
    order_id: i32,
    product_id: i32,
) -> Result<Option<OrderItemDetail>> {
    let item = sqlx::query_as::<_, OrderItemDetail>(&format!(
        "{} WHERE oi.order_id = $1 AND oi.product_id = $2",
        ITEM_SELECT
    ))
    .bind(order_id)
    .bind(product_id)
    .fetch_optional(pool)
    .await?;

    Ok(item)
}

/// Locks the order row while it is still a PENDING cart.
async fn lock_cart(tx: &mut Transaction<'_, Postgres>, order_id: i32) -> Result<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE id = $1 AND status = 'PENDING' FOR UPDATE",
    )
    .bind(order_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(order)
}

/// Recomputes `total_price` from the item rows.
async fn recompute_total(tx: &mut Transaction<'_, Postgres>, order_id: i32) -> Result<Order> {
    let order = sqlx::query_as::<_, Order>(
        "UPDATE orders
         SET total_price = COALESCE(
                (SELECT SUM(quantity * price) FROM order_items WHERE order_id = $1), 0),
             updated_at = NOW()
         WHERE id = $1
         RETURNING *",
    )
    .bind(order_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(order)
}

/// Adds `quantity` to the line for this product. The price snapshot is kept from the first add.
/// Returns `None` when the order is no longer a PENDING cart.
pub async fn add_item(
    pool: &PgPool,
    order_id: i32,
    product_id: i32,
    quantity: i32,
    price: Decimal,
) -> Result<Option<Order>> {
    let mut tx = pool.begin().await?;

    if lock_cart(&mut tx, order_id).await?.is_none() {
        tx.rollback().await?;
        return Ok(None);
    }

    sqlx::query(
        "INSERT INTO order_items (order_id, product_id, quantity, price)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (order_id, product_id)
         DO UPDATE SET quantity = order_items.quantity + EXCLUDED.quantity",
    )
    .bind(order_id)
    .bind(product_id)
    .bind(quantity)
    .bind(price)
    .execute(&mut *tx)
    .await?;

    let order = recompute_total(&mut tx, order_id).await?;
    tx.commit().await?;

    Ok(Some(order))
}

pub async fn set_item_quantity(
    pool: &PgPool,
    order_id: i32,
    item_id: i32,
    quantity: i32,
) -> Result<Option<Order>> {
    let mut tx = pool.begin().await?;

    if lock_cart(&mut tx, order_id).await?.is_none() {
        tx.rollback().await?;
        return Ok(None);
    }

    sqlx::query("UPDATE order_items SET quantity = $1 WHERE id = $2 AND order_id = $3")
        .bind(quantity)
        .bind(item_id)
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

    let order = recompute_total(&mut tx, order_id).await?;
    tx.commit().await?;

    Ok(Some(order))
}

pub async fn delete_item(pool: &PgPool, order_id: i32, item_id: i32) -> Result<Option<Order>> {
    let mut tx = pool.begin().await?;

    if lock_cart(&mut tx, order_id).await?.is_none() {
        tx.rollback().await?;
        return Ok(None);
    }

    sqlx::query("DELETE FROM order_items WHERE id = $1 AND order_id = $2")
        .bind(item_id)
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

    let order = recompute_total(&mut tx, order_id).await?;
    tx.commit().await?;

    Ok(Some(order))
}

/// Freezes the customer's cart for payment: PENDING -> PROCESSING with the total
/// recomputed from the locked item rows. `validate` sees the same rows and can
/// abort the transition. Returns `None` when there is no cart.
pub async fn begin_checkout<F>(
    pool: &PgPool,
    user_id: i32,
    validate: F,
) -> Result<Option<(Order, Vec<OrderItemDetail>)>>
where
    F: FnOnce(&[OrderItemDetail]) -> Result<()>,
{
    let mut tx = pool.begin().await?;

    let cart = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE customer_id = $1 AND status = 'PENDING' FOR UPDATE",
    )
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    let cart = match cart {
        Some(cart) => cart,
        None => {
            tx.rollback().await?;
            return Ok(None);
        }
    };

    let items = sqlx::query_as::<_, OrderItemDetail>(&format!(
        "{} WHERE oi.order_id = $1 ORDER BY oi.id",
        ITEM_SELECT
    ))
    .bind(cart.id)
    .fetch_all(&mut *tx)
    .await?;

    if let Err(e) = validate(&items) {
        tx.rollback().await?;
        return Err(e);
    }

    recompute_total(&mut tx, cart.id).await?;

    let order = sqlx::query_as::<_, Order>(
        "UPDATE orders SET status = 'PROCESSING', updated_at = NOW()
         WHERE id = $1
         RETURNING *",
    )
    .bind(cart.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some((order, items)))
}

/// Stores the payment session of an order frozen by `begin_checkout`.
/// `None` if the order left PROCESSING meanwhile.
pub async fn attach_payment_session(
    pool: &PgPool,
    order_id: i32,
    session_id: &str,
    checkout_url: &str,
) -> Result<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(
        "UPDATE orders
         SET payment_session_id = $1, checkout_url = $2, updated_at = NOW()
         WHERE id = $3 AND status = 'PROCESSING'
         RETURNING *",
    )
    .bind(session_id)
    .bind(checkout_url)
    .bind(order_id)
    .fetch_optional(pool)
    .await?;

    Ok(order)
}

/// Returns a frozen order to the cart stage when no payment session could be
/// opened. Leaves it untouched if the customer already has a new cart.
pub async fn release_checkout(pool: &PgPool, order_id: i32) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE orders SET status = 'PENDING', updated_at = NOW()
         WHERE id = $1 AND status = 'PROCESSING' AND payment_session_id IS NULL
           AND NOT EXISTS (
               SELECT 1 FROM orders other
               WHERE other.customer_id = orders.customer_id AND other.status = 'PENDING'
           )",
    )
    .bind(order_id)
    .execute(pool)
    .await
    .map_err(|e| AppError::conflict_on_unique(e, "A new cart already exists"))?;

    Ok(result.rows_affected() > 0)
}

/// Marks the order COMPLETED and decrements stock for each item, all or nothing.
/// Returns `None` when the order does not exist.
pub async fn complete_order(pool: &PgPool, order_id: i32) -> Result<Option<CompletionOutcome>> {
    let mut tx = pool.begin().await?;

    // Row lock serializes concurrent completions of the same order
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?;

    let order = match order {
        Some(o) => o,
        None => {
            tx.rollback().await?;
            return Ok(None);
        }
    };

    match order.status {
        OrderStatus::Completed => {
            tx.rollback().await?;
            return Ok(Some(CompletionOutcome::AlreadyCompleted(order)));
        }
        OrderStatus::Cancelled => {
            tx.rollback().await?;
            return Ok(Some(CompletionOutcome::Cancelled(order)));
        }
        OrderStatus::Pending | OrderStatus::Processing => {}
    }

    let items = sqlx::query_as::<_, (i32, i32, String)>(
        "SELECT oi.product_id, oi.quantity, p.name
         FROM order_items oi
         JOIN products p ON p.id = oi.product_id
         WHERE oi.order_id = $1
         ORDER BY oi.product_id",
    )
    .bind(order.id)
    .fetch_all(&mut *tx)
    .await?;

    for (product_id, quantity, product_name) in items {
        let result = sqlx::query(
            "UPDATE products
             SET stock = stock - $1, updated_at = NOW()
             WHERE id = $2 AND stock >= $1",
        )
        .bind(quantity)
        .bind(product_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(Some(CompletionOutcome::InsufficientStock { product_name }));
        }
    }

    let order = sqlx::query_as::<_, Order>(
        "UPDATE orders
         SET status = 'COMPLETED', completed_at = NOW(), updated_at = NOW()
         WHERE id = $1
         RETURNING *",
    )
    .bind(order.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(CompletionOutcome::Completed(order)))
}

/// PROCESSING -> CANCELLED for the owner's order.
pub async fn cancel_order(pool: &PgPool, order_id: i32, user_id: i32) -> Result<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(
        "UPDATE orders SET status = 'CANCELLED', updated_at = NOW()
         WHERE id = $1 AND customer_id = $2 AND status = 'PROCESSING'
         RETURNING *",
    )
    .bind(order_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(order)
}

async fn attach_items(pool: &PgPool, orders: Vec<Order>) -> Result<Vec<OrderResponse>> {
    let order_ids: Vec<i32> = orders.iter().map(|o| o.id).collect();
    let all_items = get_items_for_orders(pool, &order_ids).await?;

    let mut items_map: HashMap<i32, Vec<OrderItemDetail>> = HashMap::new();
    for item in all_items {
        items_map.entry(item.order_id).or_default().push(item);
    }

    Ok(orders
        .into_iter()
        .map(|order| {
            let items = items_map.remove(&order.id).unwrap_or_default();
            OrderResponse::new(order, items)
        })
        .collect())
}

/// Everything past the cart stage, newest first.
pub async fn get_user_orders(pool: &PgPool, user_id: i32) -> Result<Vec<OrderResponse>> {
    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders
         WHERE customer_id = $1 AND status != 'PENDING'
         ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    attach_items(pool, orders).await
}

pub async fn sales_history(pool: &PgPool, params: SalesHistoryQuery) -> Result<OrderSearchResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT o.*, COUNT(*) OVER() AS total_count
         FROM orders o
         JOIN users u ON u.id = o.customer_id
         WHERE o.status = 'COMPLETED'",
    );

    if let Some(start) = params.start_date {
        query_builder.push(" AND (o.completed_at AT TIME ZONE 'UTC')::date >= ");
        query_builder.push_bind(start);
    }

    if let Some(end) = params.end_date {
        query_builder.push(" AND (o.completed_at AT TIME ZONE 'UTC')::date <= ");
        query_builder.push_bind(end);
    }

    if let Some(customer_id) = params.customer {
        query_builder.push(" AND o.customer_id = ");
        query_builder.push_bind(customer_id);
    }

    if let Some(ref name) = params.customer_name {
        let pattern = format!("%{}%", name.trim());
        query_builder.push(" AND (u.username ILIKE ");
        query_builder.push_bind(pattern.clone());
        query_builder.push(" OR u.first_name ILIKE ");
        query_builder.push_bind(pattern.clone());
        query_builder.push(" OR u.last_name ILIKE ");
        query_builder.push_bind(pattern);
        query_builder.push(")");
    }

    query_builder.push(" ORDER BY o.completed_at DESC, o.id DESC");
    query_builder.push(" LIMIT ");
    query_builder.push_bind(limit);
    query_builder.push(" OFFSET ");
    query_builder.push_bind(offset);

    #[derive(sqlx::FromRow)]
    struct SearchResult {
        #[sqlx(flatten)]
        order: Order,
        total_count: i64,
    }

    let results = query_builder
        .build_query_as::<SearchResult>()
        .fetch_all(pool)
        .await?;

    let total = results.first().map(|r| r.total_count).unwrap_or(0);
    let orders: Vec<Order> = results.into_iter().map(|r| r.order).collect();

    Ok(OrderSearchResponse {
        orders: attach_items(pool, orders).await?,
        total,
        limit,
        offset,
    })
}
