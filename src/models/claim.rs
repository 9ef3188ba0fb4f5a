use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "claim_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Pending,
    InReview,
    RequiresInfo,
    Approved,
    Rejected,
    Resolved,
    Closed,
}

impl ClaimStatus {
    pub const ALL: [ClaimStatus; 7] = [
        ClaimStatus::Pending,
        ClaimStatus::InReview,
        ClaimStatus::RequiresInfo,
        ClaimStatus::Approved,
        ClaimStatus::Rejected,
        ClaimStatus::Resolved,
        ClaimStatus::Closed,
    ];

    /// Statuses an admin may move a claim to from this one.
    pub fn next_statuses(self) -> &'static [ClaimStatus] {
        use ClaimStatus::*;

        match self {
            Pending => &[InReview, Rejected],
            InReview => &[RequiresInfo, Approved, Rejected],
            RequiresInfo => &[InReview, Rejected],
            Approved => &[Resolved],
            Rejected => &[Closed],
            Resolved => &[Closed],
            Closed => &[],
        }
    }

    pub fn can_move_to(self, next: ClaimStatus) -> bool {
        self.next_statuses().contains(&next)
    }

    /// Resolved or closed; only then may the customer rate the outcome.
    pub fn is_settled(self) -> bool {
        matches!(self, ClaimStatus::Resolved | ClaimStatus::Closed)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "damage_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DamageType {
    FactoryDefect,
    ShippingDamage,
    WrongProduct,
    MissingParts,
    NotAsDescribed,
    Other,
}

impl DamageType {
    pub const ALL: [DamageType; 6] = [
        DamageType::FactoryDefect,
        DamageType::ShippingDamage,
        DamageType::WrongProduct,
        DamageType::MissingParts,
        DamageType::NotAsDescribed,
        DamageType::Other,
    ];

    /// Defects and wrong deliveries jump the queue.
    pub fn default_priority(self) -> ClaimPriority {
        match self {
            DamageType::FactoryDefect | DamageType::WrongProduct => ClaimPriority::High,
            _ => ClaimPriority::Medium,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "claim_priority", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ClaimPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl ClaimPriority {
    pub const ALL: [ClaimPriority; 4] = [
        ClaimPriority::Low,
        ClaimPriority::Medium,
        ClaimPriority::High,
        ClaimPriority::Urgent,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "claim_resolution", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimResolution {
    FullRefund,
    PartialRefund,
    Replacement,
    Repair,
    #[sqlx(rename = "NONE")]
    #[serde(rename = "NONE")]
    NoAction,
}

// DB models

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Claim {
    pub id: i32,
    pub ticket_number: String,
    pub customer_id: i32,
    pub order_id: i32,
    pub order_item_id: i32,
    pub product_id: i32,
    pub title: String,
    pub description: String,
    pub damage_type: DamageType,
    pub priority: ClaimPriority,
    pub status: ClaimStatus,
    pub resolution: Option<ClaimResolution>,
    pub admin_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_notes: Option<String>,
    pub customer_rating: Option<i16>,
    pub customer_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Claim {
    /// Customers never see the staff notes.
    pub fn for_customer(mut self) -> Self {
        self.internal_notes = None;
        self
    }

    pub fn days_open(&self, now: DateTime<Utc>) -> i64 {
        (self.resolved_at.unwrap_or(now) - self.created_at).num_days()
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ClaimHistoryEntry {
    pub id: i32,
    pub claim_id: i32,
    pub actor_id: Option<i32>,
    pub actor: Option<String>,
    pub action: String,
    pub old_status: Option<ClaimStatus>,
    pub new_status: Option<ClaimStatus>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

// Request types

#[derive(Debug, Deserialize)]
pub struct CreateClaimRequest {
    pub order_id: Option<i32>,
    pub order_item_id: Option<i32>,
    /// Optional cross-check against the item's product.
    pub product_id: Option<i32>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub damage_type: Option<DamageType>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateClaimStatusRequest {
    pub status: Option<ClaimStatus>,
    pub priority: Option<ClaimPriority>,
    pub resolution: Option<ClaimResolution>,
    pub admin_response: Option<String>,
    pub internal_notes: Option<String>,
    /// Stored on the history entry.
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimFeedbackRequest {
    pub rating: Option<i16>,
    pub feedback: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClaimQuery {
    pub status: Option<ClaimStatus>,
    pub priority: Option<ClaimPriority>,
    pub damage_type: Option<DamageType>,
    /// Customer id.
    pub customer: Option<i32>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimStatsQuery {
    pub days: Option<i32>,
}

// Response types

#[derive(Debug, Serialize)]
pub struct ClaimDetailResponse {
    #[serde(flatten)]
    pub claim: Claim,
    pub product_name: Option<String>,
    pub is_resolved: bool,
    pub days_open: i64,
    pub allowed_statuses: Vec<ClaimStatus>,
    pub history: Vec<ClaimHistoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct ClaimSearchResponse {
    pub claims: Vec<Claim>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct ClaimStats {
    pub days: i32,
    pub total: i64,
    pub by_status: BTreeMap<ClaimStatus, i64>,
    pub by_priority: BTreeMap<ClaimPriority, i64>,
    pub by_damage_type: BTreeMap<DamageType, i64>,
    pub average_rating: Option<Decimal>,
    pub average_resolution_days: Option<Decimal>,
}
