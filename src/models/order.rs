use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

// DB models

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: i32,
    pub customer_id: i32,
    pub status: OrderStatus,
    pub total_price: Decimal,
    #[serde(skip_serializing)]
    pub payment_session_id: Option<String>,
    pub checkout_url: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An order line joined with the product it references.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderItemDetail {
    pub id: i32,
    pub order_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub price: Decimal,
    pub product_name: String,
    pub product_image_url: Option<String>,
    pub product_stock: i32,
    pub product_is_active: bool,
}

// Request types

#[derive(Debug, Deserialize)]
pub struct AddCartItemRequest {
    pub product_id: Option<i32>,
    pub quantity: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct CompleteOrderRequest {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ManualCompletionRequest {
    pub user_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct SalesHistoryQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Customer id.
    pub customer: Option<i32>,
    pub customer_name: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// Response types

#[derive(Debug, Serialize)]
pub struct ProductSummary {
    pub id: i32,
    pub name: String,
    pub image_url: Option<String>,
    pub stock: i32,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub id: i32,
    pub product: ProductSummary,
    pub quantity: i32,
    pub price: Decimal,
    pub subtotal: Decimal,
}

impl From<OrderItemDetail> for OrderItemResponse {
    fn from(item: OrderItemDetail) -> Self {
        Self {
            id: item.id,
            subtotal: item.price * Decimal::from(item.quantity),
            product: ProductSummary {
                id: item.product_id,
                name: item.product_name,
                image_url: item.product_image_url,
                stock: item.product_stock,
            },
            quantity: item.quantity,
            price: item.price,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItemResponse>,
}

impl OrderResponse {
    pub fn new(order: Order, items: Vec<OrderItemDetail>) -> Self {
        Self {
            order,
            items: items.into_iter().map(OrderItemResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderSearchResponse {
    pub orders: Vec<OrderResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: i32,
    pub checkout_url: String,
}
