//! Flows that need a real Postgres. `#[sqlx::test]` creates a fresh database per
//! test from `DATABASE_URL` and applies the migrations.

use std::time::Duration;

use rust_decimal::Decimal;
use sqlx::PgPool;

use sales_back::{
    error::AppError,
    models::{OrderStatus, ProductQuery, ReportFilters, UserRole},
    queries::{
        order_queries::{self, CompletionOutcome},
        product_queries, report_queries,
        user_queries::{self, NewUser},
    },
};

mod support;

use support::{client, product, product_in};

#[sqlx::test]
async fn one_pending_cart_per_customer(pool: PgPool) {
    let ana = client(&pool, "ana").await;

    let first = order_queries::get_or_create_cart(&pool, ana.id).await.unwrap();
    let second = order_queries::get_or_create_cart(&pool, ana.id).await.unwrap();
    assert_eq!(first.id, second.id);

    let pending: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders WHERE customer_id = $1 AND status = 'PENDING'",
    )
    .bind(ana.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(pending, 1);
}

#[sqlx::test]
async fn totals_follow_item_changes(pool: PgPool) {
    let ana = client(&pool, "ana").await;
    let mouse = product(&pool, "Mouse", Decimal::new(1050, 2), 10).await;
    let pad = product(&pool, "Pad", Decimal::new(300, 2), 10).await;

    let cart = order_queries::get_or_create_cart(&pool, ana.id).await.unwrap();
    order_queries::add_item(&pool, cart.id, mouse.id, 2, mouse.price).await.unwrap();
    order_queries::add_item(&pool, cart.id, mouse.id, 1, mouse.price).await.unwrap();
    let cart = order_queries::add_item(&pool, cart.id, pad.id, 1, pad.price)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cart.total_price, Decimal::new(3450, 2));

    let items = order_queries::get_items(&pool, cart.id).await.unwrap();
    assert_eq!(items.len(), 2);
    let pad_item = items.iter().find(|i| i.product_id == pad.id).unwrap();
    let cart = order_queries::delete_item(&pool, cart.id, pad_item.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cart.total_price, Decimal::new(3150, 2));
}

#[sqlx::test]
async fn checkout_freezes_the_cart(pool: PgPool) {
    let ana = client(&pool, "ana").await;
    let lamp = product(&pool, "Lamp", Decimal::new(2000, 2), 5).await;
    let desk = product(&pool, "Desk", Decimal::new(15000, 2), 5).await;

    let cart = order_queries::get_or_create_cart(&pool, ana.id).await.unwrap();
    order_queries::add_item(&pool, cart.id, lamp.id, 1, lamp.price).await.unwrap();

    let (order, items) = order_queries::begin_checkout(&pool, ana.id, |_| Ok(()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.total_price, Decimal::new(2000, 2));
    assert_eq!(items.len(), 1);

    // Writes that arrive after the freeze are refused
    let late = order_queries::add_item(&pool, order.id, desk.id, 1, desk.price)
        .await
        .unwrap();
    assert!(late.is_none());
    let item_id = items[0].id;
    assert!(order_queries::set_item_quantity(&pool, order.id, item_id, 4)
        .await
        .unwrap()
        .is_none());
    assert!(order_queries::delete_item(&pool, order.id, item_id)
        .await
        .unwrap()
        .is_none());

    let completed = order_queries::complete_order(&pool, order.id).await.unwrap();
    let completed = match completed {
        Some(CompletionOutcome::Completed(order)) => order,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(completed.total_price, Decimal::new(2000, 2));

    let desk = product_queries::find_by_id(&pool, desk.id).await.unwrap().unwrap();
    assert_eq!(desk.stock, 5);
    let lamp = product_queries::find_by_id(&pool, lamp.id).await.unwrap().unwrap();
    assert_eq!(lamp.stock, 4);
}

#[sqlx::test]
async fn item_write_waiting_on_checkout_is_refused(pool: PgPool) {
    let ana = client(&pool, "ana").await;
    let lamp = product(&pool, "Lamp", Decimal::new(2000, 2), 5).await;
    let desk = product(&pool, "Desk", Decimal::new(15000, 2), 5).await;

    let cart = order_queries::get_or_create_cart(&pool, ana.id).await.unwrap();
    order_queries::add_item(&pool, cart.id, lamp.id, 1, lamp.price).await.unwrap();

    // Hold the row lock the way checkout does
    let mut tx = pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM orders WHERE id = $1 FOR UPDATE")
        .bind(cart.id)
        .execute(&mut *tx)
        .await
        .unwrap();

    let (cart_id, desk_id, desk_price) = (cart.id, desk.id, desk.price);
    let writer_pool = pool.clone();
    let writer = tokio::spawn(async move {
        order_queries::add_item(&writer_pool, cart_id, desk_id, 1, desk_price).await
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!writer.is_finished());

    sqlx::query("UPDATE orders SET status = 'PROCESSING' WHERE id = $1")
        .bind(cart.id)
        .execute(&mut *tx)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let written = writer.await.unwrap().unwrap();
    assert!(written.is_none());

    let items = order_queries::get_items(&pool, cart.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_id, lamp.id);
}

#[sqlx::test]
async fn concurrent_checkout_and_add_agree_on_the_total(pool: PgPool) {
    let ana = client(&pool, "ana").await;
    let lamp = product(&pool, "Lamp", Decimal::new(2000, 2), 50).await;
    let desk = product(&pool, "Desk", Decimal::new(15000, 2), 50).await;

    let cart = order_queries::get_or_create_cart(&pool, ana.id).await.unwrap();
    order_queries::add_item(&pool, cart.id, lamp.id, 1, lamp.price).await.unwrap();

    let (ana_id, cart_id, desk_id, desk_price) = (ana.id, cart.id, desk.id, desk.price);
    let checkout_pool = pool.clone();
    let checkout = tokio::spawn(async move {
        order_queries::begin_checkout(&checkout_pool, ana_id, |_| Ok(())).await
    });
    let add_pool = pool.clone();
    let add = tokio::spawn(async move {
        order_queries::add_item(&add_pool, cart_id, desk_id, 1, desk_price).await
    });

    let (frozen, frozen_items) = checkout.await.unwrap().unwrap().unwrap();
    let added = add.await.unwrap().unwrap();

    let items = order_queries::get_items(&pool, cart.id).await.unwrap();
    let sum: Decimal = items
        .iter()
        .map(|i| i.price * Decimal::from(i.quantity))
        .sum();

    // Whichever ran first, the frozen total covers exactly the frozen lines
    assert_eq!(frozen.total_price, sum);
    assert_eq!(frozen_items.len(), items.len());
    if added.is_some() {
        assert_eq!(items.len(), 2);
    } else {
        assert_eq!(items.len(), 1);
    }
}

#[sqlx::test]
async fn failed_validation_leaves_the_cart_open(pool: PgPool) {
    let ana = client(&pool, "ana").await;
    let lamp = product(&pool, "Lamp", Decimal::new(2000, 2), 5).await;

    let cart = order_queries::get_or_create_cart(&pool, ana.id).await.unwrap();
    order_queries::add_item(&pool, cart.id, lamp.id, 1, lamp.price).await.unwrap();

    let err = order_queries::begin_checkout(&pool, ana.id, |_| {
        Err(AppError::BadRequest("nope".to_string()))
    })
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let cart = order_queries::find_by_id(&pool, cart.id).await.unwrap().unwrap();
    assert_eq!(cart.status, OrderStatus::Pending);
}

#[sqlx::test]
async fn released_checkout_returns_to_the_cart(pool: PgPool) {
    let ana = client(&pool, "ana").await;
    let lamp = product(&pool, "Lamp", Decimal::new(2000, 2), 5).await;

    let cart = order_queries::get_or_create_cart(&pool, ana.id).await.unwrap();
    order_queries::add_item(&pool, cart.id, lamp.id, 1, lamp.price).await.unwrap();
    let (order, _) = order_queries::begin_checkout(&pool, ana.id, |_| Ok(()))
        .await
        .unwrap()
        .unwrap();

    assert!(order_queries::release_checkout(&pool, order.id).await.unwrap());
    let cart = order_queries::get_or_create_cart(&pool, ana.id).await.unwrap();
    assert_eq!(cart.id, order.id);

    // Once a session is attached the order stays frozen
    order_queries::begin_checkout(&pool, ana.id, |_| Ok(())).await.unwrap();
    order_queries::attach_payment_session(&pool, order.id, "cs_test_1", "https://pay")
        .await
        .unwrap()
        .unwrap();
    assert!(!order_queries::release_checkout(&pool, order.id).await.unwrap());
}

#[sqlx::test]
async fn completion_never_drives_stock_negative(pool: PgPool) {
    let ana = client(&pool, "ana").await;
    let luis = client(&pool, "luis").await;
    let lamp = product(&pool, "Lamp", Decimal::new(2000, 2), 2).await;

    let mut carts = Vec::new();
    for customer in [&ana, &luis] {
        let cart = order_queries::get_or_create_cart(&pool, customer.id).await.unwrap();
        order_queries::add_item(&pool, cart.id, lamp.id, 2, lamp.price).await.unwrap();
        carts.push(cart.id);
    }

    let first = order_queries::complete_order(&pool, carts[0]).await.unwrap();
    assert!(matches!(first, Some(CompletionOutcome::Completed(_))));

    let second = order_queries::complete_order(&pool, carts[1]).await.unwrap();
    assert!(matches!(
        second,
        Some(CompletionOutcome::InsufficientStock { .. })
    ));

    let lamp = product_queries::find_by_id(&pool, lamp.id).await.unwrap().unwrap();
    assert_eq!(lamp.stock, 0);

    let untouched = order_queries::find_by_id(&pool, carts[1]).await.unwrap().unwrap();
    assert_eq!(untouched.status, OrderStatus::Pending);
    assert!(untouched.completed_at.is_none());
}

#[sqlx::test]
async fn second_completion_is_a_no_op(pool: PgPool) {
    let ana = client(&pool, "ana").await;
    let lamp = product(&pool, "Lamp", Decimal::new(2000, 2), 5).await;

    let cart = order_queries::get_or_create_cart(&pool, ana.id).await.unwrap();
    order_queries::add_item(&pool, cart.id, lamp.id, 2, lamp.price).await.unwrap();

    order_queries::complete_order(&pool, cart.id).await.unwrap();
    let again = order_queries::complete_order(&pool, cart.id).await.unwrap();
    assert!(matches!(again, Some(CompletionOutcome::AlreadyCompleted(_))));

    let lamp = product_queries::find_by_id(&pool, lamp.id).await.unwrap().unwrap();
    assert_eq!(lamp.stock, 3);

    // A fresh cart can be opened once the previous one left PENDING
    let next = order_queries::get_or_create_cart(&pool, ana.id).await.unwrap();
    assert_ne!(next.id, cart.id);
}

#[sqlx::test]
async fn emails_are_unique_regardless_of_case(pool: PgPool) {
    let new_user = |username: &'static str, email: &'static str| NewUser {
        username,
        email,
        password_hash: "hash",
        first_name: "",
        last_name: "",
        role: UserRole::Client,
        is_active: true,
    };

    let ana = user_queries::create_user(&pool, new_user("ana", "Ana@Example.COM"))
        .await
        .unwrap();
    assert_eq!(ana.email, "ana@example.com");

    let err = user_queries::create_user(&pool, new_user("ana2", "ana@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let found = user_queries::find_by_login(&pool, "ANA@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, ana.id);
}

#[sqlx::test]
async fn in_stock_filter_excludes_sold_out_products(pool: PgPool) {
    product(&pool, "Sold out", Decimal::new(500, 2), 0).await;
    product(&pool, "Available", Decimal::new(500, 2), 4).await;

    let listing = product_queries::search_products(
        &pool,
        ProductQuery {
            in_stock: Some(true),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(listing.total, 1);
    assert!(listing.products.iter().all(|p| p.product.stock > 0));

    let sold_out = product_queries::search_products(
        &pool,
        ProductQuery {
            in_stock: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(sold_out.total, 1);
}

#[sqlx::test]
async fn report_lines_follow_prompt_filters(pool: PgPool) {
    let ana = client(&pool, "Ana").await;
    let luis = client(&pool, "luis").await;
    let washer = product_in(&pool, "lavado", "Washer", Decimal::new(90000, 2), 10).await;
    let soap = product_in(&pool, "limpieza", "Soap", Decimal::new(500, 2), 10).await;

    for (customer, item) in [(&ana, &washer), (&ana, &soap), (&luis, &washer)] {
        let cart = order_queries::get_or_create_cart(&pool, customer.id).await.unwrap();
        order_queries::add_item(&pool, cart.id, item.id, 1, item.price).await.unwrap();
        order_queries::complete_order(&pool, cart.id).await.unwrap();
    }

    let all = report_queries::completed_lines(&pool, None, &ReportFilters::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 3);

    let expensive = ReportFilters {
        price_min: Some(Decimal::new(800, 0)),
        ..Default::default()
    };
    let lines = report_queries::completed_lines(&pool, None, &expensive).await.unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.product_name == "Washer"));

    let anas_cheap = ReportFilters {
        price_max: Some(Decimal::new(10, 0)),
        customer: Some("ana".to_string()),
        ..Default::default()
    };
    let lines = report_queries::completed_lines(&pool, None, &anas_cheap).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].product_name, "Soap");

    let by_category = ReportFilters {
        category: Some("LAVADO".to_string()),
        ..Default::default()
    };
    let lines = report_queries::completed_lines(&pool, None, &by_category).await.unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.category_name == "LAVADO"));
}
