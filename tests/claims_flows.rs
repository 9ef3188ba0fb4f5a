//! Claim filing and review against a real Postgres.

use axum::http::StatusCode;
use chrono::Utc;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;

use sales_back::{
    models::{ClaimPriority, ClaimStatus, DamageType, Product, User},
    queries::{
        claim_queries::{self, NewClaim},
        order_queries::{self, CompletionOutcome},
    },
};

mod support;

use support::{admin, body_json, client, empty_request, json_request, product, send};

/// A COMPLETED order of `user` holding one unit of each product, with its item ids.
async fn completed_order(pool: &PgPool, user: &User, products: &[&Product]) -> (i32, Vec<i32>) {
    let cart = order_queries::get_or_create_cart(pool, user.id).await.unwrap();
    for p in products {
        order_queries::add_item(pool, cart.id, p.id, 1, p.price)
            .await
            .unwrap()
            .unwrap();
    }
    let outcome = order_queries::complete_order(pool, cart.id).await.unwrap();
    assert!(matches!(outcome, Some(CompletionOutcome::Completed(_))));

    let items = order_queries::get_items(pool, cart.id).await.unwrap();
    let ids = products
        .iter()
        .map(|p| items.iter().find(|i| i.product_id == p.id).unwrap().id)
        .collect();
    (cart.id, ids)
}

fn claim_body(order_id: i32, item_id: i32) -> serde_json::Value {
    json!({
        "order_id": order_id,
        "order_item_id": item_id,
        "title": "Cracked housing",
        "description": "The lamp arrived with a cracked base",
        "damage_type": "SHIPPING_DAMAGE",
    })
}

#[sqlx::test]
async fn customers_file_claims_on_completed_orders(pool: PgPool) {
    let ana = client(&pool, "ana").await;
    let lamp = product(&pool, "Lamp", Decimal::new(2000, 2), 5).await;
    let (order_id, items) = completed_order(&pool, &ana, &[&lamp]).await;
    let app = support::build_app(pool.clone());

    let response = send(&app, json_request("POST", "/claims", &ana, claim_body(order_id, items[0]))).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let claim = body_json(response).await;
    let ticket = claim["ticket_number"].as_str().unwrap();
    assert!(Regex::new(r"^CLM-\d{8}-\d{4}$").unwrap().is_match(ticket), "{}", ticket);
    assert!(ticket.starts_with(&format!("CLM-{}-", Utc::now().format("%Y%m%d"))));
    assert_eq!(claim["status"], "PENDING");
    assert_eq!(claim["priority"], "MEDIUM");
    assert_eq!(claim["product_id"], lamp.id);

    let response = send(&app, empty_request("GET", "/claims/mine", &ana)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
}

#[sqlx::test]
async fn claims_need_an_owned_completed_order(pool: PgPool) {
    let ana = client(&pool, "ana").await;
    let bob = client(&pool, "bob").await;
    let lamp = product(&pool, "Lamp", Decimal::new(2000, 2), 5).await;
    let desk = product(&pool, "Desk", Decimal::new(15000, 2), 5).await;
    let (order_id, items) = completed_order(&pool, &ana, &[&lamp]).await;
    let app = support::build_app(pool.clone());

    // Someone else's order
    let response = send(&app, json_request("POST", "/claims", &bob, claim_body(order_id, items[0]))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Still an open cart
    let cart = order_queries::get_or_create_cart(&pool, ana.id).await.unwrap();
    order_queries::add_item(&pool, cart.id, desk.id, 1, desk.price).await.unwrap();
    let open_item = order_queries::find_item_by_product(&pool, cart.id, desk.id)
        .await
        .unwrap()
        .unwrap();
    let response = send(&app, json_request("POST", "/claims", &ana, claim_body(cart.id, open_item.id))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Item from a different order
    let response = send(&app, json_request("POST", "/claims", &ana, claim_body(order_id, open_item.id))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut mismatched = claim_body(order_id, items[0]);
    mismatched["product_id"] = json!(desk.id);
    let response = send(&app, json_request("POST", "/claims", &ana, mismatched)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut untyped = claim_body(order_id, items[0]);
    untyped["damage_type"] = serde_json::Value::Null;
    let response = send(&app, json_request("POST", "/claims", &ana, untyped)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test]
async fn one_open_claim_per_item(pool: PgPool) {
    let ana = client(&pool, "ana").await;
    let lamp = product(&pool, "Lamp", Decimal::new(2000, 2), 5).await;
    let (order_id, items) = completed_order(&pool, &ana, &[&lamp]).await;
    let app = support::build_app(pool.clone());

    let first = send(&app, json_request("POST", "/claims", &ana, claim_body(order_id, items[0]))).await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = send(&app, json_request("POST", "/claims", &ana, claim_body(order_id, items[0]))).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[sqlx::test]
async fn tickets_count_up_within_a_day(pool: PgPool) {
    let ana = client(&pool, "ana").await;
    let lamp = product(&pool, "Lamp", Decimal::new(2000, 2), 5).await;
    let desk = product(&pool, "Desk", Decimal::new(15000, 2), 5).await;
    let (order_id, items) = completed_order(&pool, &ana, &[&lamp, &desk]).await;

    let mut tickets = Vec::new();
    for (item_id, product_id) in [(items[0], lamp.id), (items[1], desk.id)] {
        let claim = claim_queries::create_claim(
            &pool,
            NewClaim {
                customer_id: ana.id,
                order_id,
                order_item_id: item_id,
                product_id,
                title: "Wrong colour",
                description: "Ordered black, got white",
                damage_type: DamageType::WrongProduct,
                priority: DamageType::WrongProduct.default_priority(),
            },
        )
        .await
        .unwrap();
        assert_eq!(claim.priority, ClaimPriority::High);
        tickets.push(claim.ticket_number);
    }

    let today = claim_queries::ticket_number(Utc::now().date_naive(), 1);
    assert_eq!(tickets[0], today);
    assert!(tickets[1].ends_with("-0002"));
}

#[sqlx::test]
async fn admins_walk_claims_through_review(pool: PgPool) {
    let ana = client(&pool, "ana").await;
    let root = admin(&pool, "root").await;
    let lamp = product(&pool, "Lamp", Decimal::new(2000, 2), 5).await;
    let (order_id, items) = completed_order(&pool, &ana, &[&lamp]).await;
    let app = support::build_app(pool.clone());

    let created = send(&app, json_request("POST", "/claims", &ana, claim_body(order_id, items[0]))).await;
    let claim_id = body_json(created).await["id"].as_i64().unwrap();
    let status_uri = format!("/admin/claims/{}/status", claim_id);

    // Customers cannot drive the review
    let response = send(&app, json_request("PATCH", &status_uri, &ana, json!({"status": "IN_REVIEW"}))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&app, json_request("PATCH", &status_uri, &root, json!({"status": "RESOLVED"}))).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = send(
        &app,
        json_request(
            "PATCH",
            &status_uri,
            &root,
            json!({"status": "IN_REVIEW", "internal_notes": "courier damage", "note": "Looking into it"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let detail = body_json(response).await;
    assert_eq!(detail["status"], "IN_REVIEW");
    assert_eq!(detail["allowed_statuses"], json!(["REQUIRES_INFO", "APPROVED", "REJECTED"]));

    let response = send(&app, json_request("PATCH", &status_uri, &root, json!({"status": "APPROVED"}))).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Resolving needs a resolution
    let response = send(&app, json_request("PATCH", &status_uri, &root, json!({"status": "RESOLVED"}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &app,
        json_request(
            "PATCH",
            &status_uri,
            &root,
            json!({"status": "RESOLVED", "resolution": "REPLACEMENT", "admin_response": "A new lamp is on its way"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let detail = body_json(response).await;
    assert_eq!(detail["resolution"], "REPLACEMENT");
    assert_eq!(detail["is_resolved"], true);
    assert!(!detail["resolved_at"].is_null());

    let history = claim_queries::get_history(&pool, claim_id as i32).await.unwrap();
    let steps: Vec<_> = history.iter().map(|h| h.new_status).collect();
    assert_eq!(
        steps,
        vec![
            Some(ClaimStatus::Pending),
            Some(ClaimStatus::InReview),
            Some(ClaimStatus::Approved),
            Some(ClaimStatus::Resolved),
        ]
    );
    assert_eq!(history[0].actor.as_deref(), Some("ana"));
    assert_eq!(history[1].actor.as_deref(), Some("root"));
    assert_eq!(history[1].notes.as_deref(), Some("Looking into it"));

    // The customer sees the outcome but not the staff notes
    let response = send(&app, empty_request("GET", &format!("/claims/{}", claim_id), &ana)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let detail = body_json(response).await;
    assert_eq!(detail["admin_response"], "A new lamp is on its way");
    assert!(detail.get("internal_notes").is_none());
    assert_eq!(detail["history"].as_array().unwrap().len(), 4);

    let response = send(&app, empty_request("GET", &format!("/claims/{}", claim_id), &root)).await;
    assert_eq!(body_json(response).await["internal_notes"], "courier damage");
}

#[sqlx::test]
async fn feedback_waits_for_a_settled_claim(pool: PgPool) {
    let ana = client(&pool, "ana").await;
    let bob = client(&pool, "bob").await;
    let root = admin(&pool, "root").await;
    let lamp = product(&pool, "Lamp", Decimal::new(2000, 2), 5).await;
    let (order_id, items) = completed_order(&pool, &ana, &[&lamp]).await;
    let app = support::build_app(pool.clone());

    let created = send(&app, json_request("POST", "/claims", &ana, claim_body(order_id, items[0]))).await;
    let claim_id = body_json(created).await["id"].as_i64().unwrap();
    let feedback_uri = format!("/claims/{}/feedback", claim_id);
    let status_uri = format!("/admin/claims/{}/status", claim_id);

    let response = send(&app, json_request("PATCH", &feedback_uri, &ana, json!({"rating": 4}))).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    for status in ["REJECTED", "CLOSED"] {
        let response = send(&app, json_request("PATCH", &status_uri, &root, json!({"status": status}))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = send(&app, json_request("PATCH", &feedback_uri, &bob, json!({"rating": 1}))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, json_request("PATCH", &feedback_uri, &ana, json!({"rating": 9}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &app,
        json_request("PATCH", &feedback_uri, &ana, json!({"rating": 4, "feedback": "Quick answer"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let claim = body_json(response).await;
    assert_eq!(claim["customer_rating"], 4);
    assert!(!claim["closed_at"].is_null());

    let response = send(&app, json_request("PATCH", &feedback_uri, &ana, json!({"rating": 5}))).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // A rejected claim no longer blocks a new one on the same item
    let response = send(&app, json_request("POST", "/claims", &ana, claim_body(order_id, items[0]))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[sqlx::test]
async fn admins_search_and_count_claims(pool: PgPool) {
    let ana = client(&pool, "ana").await;
    let root = admin(&pool, "root").await;
    let lamp = product(&pool, "Lamp", Decimal::new(2000, 2), 5).await;
    let desk = product(&pool, "Desk", Decimal::new(15000, 2), 5).await;
    let (order_id, items) = completed_order(&pool, &ana, &[&lamp, &desk]).await;
    let app = support::build_app(pool.clone());

    send(&app, json_request("POST", "/claims", &ana, claim_body(order_id, items[0]))).await;
    let mut defect = claim_body(order_id, items[1]);
    defect["damage_type"] = json!("FACTORY_DEFECT");
    send(&app, json_request("POST", "/claims", &ana, defect)).await;

    let response = send(&app, empty_request("GET", "/admin/claims?priority=HIGH", &root)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["claims"][0]["product_id"], desk.id);

    let response = send(&app, empty_request("GET", "/admin/claims/stats?days=7", &root)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let stats = body_json(response).await;
    assert_eq!(stats["days"], 7);
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["by_status"]["PENDING"], 2);
    assert_eq!(stats["by_status"]["CLOSED"], 0);
    assert_eq!(stats["by_damage_type"]["FACTORY_DEFECT"], 1);
    assert!(stats["average_rating"].is_null());

    let response = send(&app, empty_request("GET", "/admin/claims", &ana)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
