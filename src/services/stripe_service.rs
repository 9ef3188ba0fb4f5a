use std::collections::HashMap;

use hmac::{Hmac, Mac};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::Deserialize;
use sha2::Sha256;

use crate::{
    config::StripeConfig,
    error::{AppError, Result},
};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

pub const CHECKOUT_COMPLETED_EVENT: &str = "checkout.session.completed";

#[derive(Debug, Clone)]
pub struct CheckoutLine {
    pub name: String,
    pub unit_amount: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub payment_status: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    pub fn order_id(&self) -> Option<i32> {
        self.metadata.get("order_id").and_then(|v| v.parse().ok())
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

/// Converts a price into the smallest currency unit.
pub fn to_cents(amount: Decimal) -> Result<i64> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| AppError::InternalError(format!("Amount out of range: {}", amount)))
}

pub fn checkout_form_params(
    config: &StripeConfig,
    order_id: i32,
    lines: &[CheckoutLine],
) -> Vec<(String, String)> {
    let success_url = if config.success_url.contains("{CHECKOUT_SESSION_ID}") {
        config.success_url.clone()
    } else {
        let separator = if config.success_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}session_id={{CHECKOUT_SESSION_ID}}",
            config.success_url, separator
        )
    };

    let mut params = vec![
        ("mode".to_string(), "payment".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        ("success_url".to_string(), success_url),
        ("cancel_url".to_string(), config.cancel_url.clone()),
        ("client_reference_id".to_string(), order_id.to_string()),
        ("metadata[order_id]".to_string(), order_id.to_string()),
    ];

    for (i, line) in lines.iter().enumerate() {
        let prefix = format!("line_items[{}]", i);
        params.push((
            format!("{}[price_data][currency]", prefix),
            config.currency.clone(),
        ));
        params.push((
            format!("{}[price_data][product_data][name]", prefix),
            line.name.clone(),
        ));
        params.push((
            format!("{}[price_data][unit_amount]", prefix),
            line.unit_amount.to_string(),
        ));
        params.push((format!("{}[quantity]", prefix), line.quantity.to_string()));
    }

    params
}

pub async fn create_checkout_session(
    config: &StripeConfig,
    order_id: i32,
    lines: &[CheckoutLine],
) -> Result<CheckoutSession> {
    let params = checkout_form_params(config, order_id, lines);

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/checkout/sessions", STRIPE_API_BASE))
        .bearer_auth(&config.secret_key)
        .form(&params)
        .send()
        .await
        .map_err(|e| AppError::PaymentError(format!("Stripe request failed: {}", e)))?;

    parse_stripe_response(response).await
}

/// Checkout session ids look like `cs_test_a1B2...`; anything else never reaches the API path.
pub fn validate_session_id(session_id: &str) -> Result<&str> {
    let valid = session_id.starts_with("cs_")
        && session_id.len() <= 255
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid {
        return Err(AppError::BadRequest("Invalid session_id".to_string()));
    }
    Ok(session_id)
}

pub async fn retrieve_checkout_session(
    config: &StripeConfig,
    session_id: &str,
) -> Result<CheckoutSession> {
    let session_id = validate_session_id(session_id)?;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/checkout/sessions/{}", STRIPE_API_BASE, session_id))
        .bearer_auth(&config.secret_key)
        .send()
        .await
        .map_err(|e| AppError::PaymentError(format!("Stripe request failed: {}", e)))?;

    parse_stripe_response(response).await
}

async fn parse_stripe_response(response: reqwest::Response) -> Result<CheckoutSession> {
    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| AppError::PaymentError(format!("Failed to parse Stripe response: {}", e)))?;

    if !status.is_success() {
        let message = body
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown Stripe error");
        tracing::error!("Stripe API error response ({}): {}", status, body);
        return Err(AppError::PaymentError(message.to_string()));
    }

    serde_json::from_value(body)
        .map_err(|e| AppError::PaymentError(format!("Unexpected Stripe session payload: {}", e)))
}

fn payload_mac(secret: &str, timestamp: i64, payload: &[u8]) -> Option<Hmac<Sha256>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(mac)
}

/// HMAC-SHA256 of `"{timestamp}.{payload}"` in hex, as Stripe signs webhooks.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> Option<String> {
    payload_mac(secret, timestamp, payload).map(|mac| hex::encode(mac.finalize().into_bytes()))
}

/// Checks a `Stripe-Signature` header (`t=...,v1=...`) against the raw body.
pub fn verify_webhook_signature(secret: &str, header: &str, payload: &[u8], now: i64) -> bool {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = match timestamp {
        Some(t) => t,
        None => return false,
    };

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return false;
    }

    signatures.iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        payload_mac(secret, timestamp, payload)
            .map(|mac| mac.verify_slice(&expected).is_ok())
            .unwrap_or(false)
    })
}
