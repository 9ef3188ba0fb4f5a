use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    error::Result,
    models::{DateRange, ReportFilters, ReportLine},
};

/// Sold lines of COMPLETED orders, optionally limited to an inclusive UTC date range
/// and narrowed by the prompt's filters.
pub async fn completed_lines(
    pool: &PgPool,
    range: Option<DateRange>,
    filters: &ReportFilters,
) -> Result<Vec<ReportLine>> {
    let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT o.id AS order_id, o.completed_at, u.username AS customer,
            p.name AS product_name, c.name AS category_name, oi.quantity, oi.price
         FROM order_items oi
         JOIN orders o ON o.id = oi.order_id
         JOIN users u ON u.id = o.customer_id
         JOIN products p ON p.id = oi.product_id
         JOIN categories c ON c.id = p.category_id
         WHERE o.status = 'COMPLETED' AND o.completed_at IS NOT NULL",
    );

    if let Some(range) = range {
        query.push(" AND (o.completed_at AT TIME ZONE 'UTC')::date BETWEEN ");
        query.push_bind(range.start);
        query.push(" AND ");
        query.push_bind(range.end);
    }

    if let Some(min) = filters.price_min {
        query.push(" AND oi.price >= ");
        query.push_bind(min);
    }

    if let Some(max) = filters.price_max {
        query.push(" AND oi.price <= ");
        query.push_bind(max);
    }

    if let Some(ref customer) = filters.customer {
        query.push(" AND LOWER(u.username) = LOWER(");
        query.push_bind(customer.clone());
        query.push(")");
    }

    if let Some(ref category) = filters.category {
        query.push(" AND (LOWER(c.slug) = LOWER(");
        query.push_bind(category.clone());
        query.push(") OR LOWER(c.name) = LOWER(");
        query.push_bind(category.clone());
        query.push("))");
    }

    query.push(" ORDER BY o.completed_at ASC, o.id ASC, oi.id ASC");

    let lines = query.build_query_as::<ReportLine>().fetch_all(pool).await?;

    Ok(lines)
}
