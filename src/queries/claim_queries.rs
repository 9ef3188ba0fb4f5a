use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use crate::{
    error::{AppError, Result},
    models::{
        Claim, ClaimHistoryEntry, ClaimPriority, ClaimQuery, ClaimResolution, ClaimSearchResponse,
        ClaimStats, ClaimStatus, DamageType,
    },
};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;
const TICKET_ATTEMPTS: usize = 5;
const TICKET_CONSTRAINT: &str = "claims_ticket_number_key";
const OPEN_CLAIM_INDEX: &str = "one_open_claim_per_item";

pub struct NewClaim<'a> {
    pub customer_id: i32,
    pub order_id: i32,
    pub order_item_id: i32,
    pub product_id: i32,
    pub title: &'a str,
    pub description: &'a str,
    pub damage_type: DamageType,
    pub priority: ClaimPriority,
}

pub struct StatusChange<'a> {
    pub status: ClaimStatus,
    pub priority: Option<ClaimPriority>,
    pub resolution: Option<ClaimResolution>,
    pub admin_response: Option<&'a str>,
    pub internal_notes: Option<&'a str>,
    pub note: Option<&'a str>,
}

#[derive(Debug)]
pub enum StatusChangeOutcome {
    Updated(Claim),
    NotAllowed { from: ClaimStatus, to: ClaimStatus },
    /// RESOLVED needs a resolution, given now or earlier.
    ResolutionRequired,
}

#[derive(Debug)]
pub enum FeedbackOutcome {
    Rated(Claim),
    NotSettled(ClaimStatus),
    AlreadyRated,
}

fn ticket_prefix(day: NaiveDate) -> String {
    format!("CLM-{}-", day.format("%Y%m%d"))
}

/// `CLM-YYYYMMDD-NNNN`, numbered per calendar day.
pub fn ticket_number(day: NaiveDate, sequence: i64) -> String {
    format!("{}{:04}", ticket_prefix(day), sequence)
}

fn violated_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            db_err.constraint().map(str::to_string)
        }
        _ => None,
    }
}

async fn record_history(
    tx: &mut Transaction<'_, Postgres>,
    claim_id: i32,
    actor_id: i32,
    action: &str,
    old_status: Option<ClaimStatus>,
    new_status: Option<ClaimStatus>,
    notes: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO claim_history (claim_id, actor_id, action, old_status, new_status, notes)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(claim_id)
    .bind(actor_id)
    .bind(action)
    .bind(old_status)
    .bind(new_status)
    .bind(notes)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Inserts the claim under the next free ticket of the day, retrying when a
/// concurrent insert took the same number.
pub async fn create_claim(pool: &PgPool, new_claim: NewClaim<'_>) -> Result<Claim> {
    for _ in 0..TICKET_ATTEMPTS {
        let mut tx = pool.begin().await?;

        let today = Utc::now().date_naive();
        let pattern = format!("{}%", ticket_prefix(today));
        let last: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(SUBSTRING(ticket_number FROM 14)::BIGINT), 0)
             FROM claims
             WHERE ticket_number LIKE $1",
        )
        .bind(&pattern)
        .fetch_one(&mut *tx)
        .await?;

        let inserted = sqlx::query_as::<_, Claim>(
            "INSERT INTO claims
                (ticket_number, customer_id, order_id, order_item_id, product_id,
                 title, description, damage_type, priority)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING *",
        )
        .bind(ticket_number(today, last + 1))
        .bind(new_claim.customer_id)
        .bind(new_claim.order_id)
        .bind(new_claim.order_item_id)
        .bind(new_claim.product_id)
        .bind(new_claim.title)
        .bind(new_claim.description)
        .bind(new_claim.damage_type)
        .bind(new_claim.priority)
        .fetch_one(&mut *tx)
        .await;

        let claim = match inserted {
            Ok(claim) => claim,
            Err(e) => match violated_constraint(&e).as_deref() {
                Some(TICKET_CONSTRAINT) => continue,
                Some(OPEN_CLAIM_INDEX) => {
                    return Err(AppError::Conflict(
                        "An open claim already exists for this item".to_string(),
                    ));
                }
                _ => return Err(e.into()),
            },
        };

        record_history(
            &mut tx,
            claim.id,
            new_claim.customer_id,
            "Claim created",
            None,
            Some(claim.status),
            None,
        )
        .await?;

        tx.commit().await?;
        return Ok(claim);
    }

    Err(AppError::InternalError(
        "Could not allocate a claim ticket number".to_string(),
    ))
}

pub async fn find_by_id(pool: &PgPool, id: i32) -> Result<Option<Claim>> {
    let claim = sqlx::query_as::<_, Claim>("SELECT * FROM claims WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(claim)
}

pub async fn get_customer_claims(pool: &PgPool, customer_id: i32) -> Result<Vec<Claim>> {
    let claims = sqlx::query_as::<_, Claim>(
        "SELECT * FROM claims WHERE customer_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(customer_id)
    .fetch_all(pool)
    .await?;

    Ok(claims)
}

pub async fn get_history(pool: &PgPool, claim_id: i32) -> Result<Vec<ClaimHistoryEntry>> {
    let history = sqlx::query_as::<_, ClaimHistoryEntry>(
        "SELECT h.id, h.claim_id, h.actor_id, u.username AS actor, h.action,
            h.old_status, h.new_status, h.notes, h.created_at
         FROM claim_history h
         LEFT JOIN users u ON u.id = h.actor_id
         WHERE h.claim_id = $1
         ORDER BY h.created_at ASC, h.id ASC",
    )
    .bind(claim_id)
    .fetch_all(pool)
    .await?;

    Ok(history)
}

pub async fn search_claims(pool: &PgPool, params: ClaimQuery) -> Result<ClaimSearchResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT c.*, COUNT(*) OVER() AS total_count FROM claims c WHERE 1=1");

    if let Some(status) = params.status {
        query_builder.push(" AND c.status = ");
        query_builder.push_bind(status);
    }

    if let Some(priority) = params.priority {
        query_builder.push(" AND c.priority = ");
        query_builder.push_bind(priority);
    }

    if let Some(damage_type) = params.damage_type {
        query_builder.push(" AND c.damage_type = ");
        query_builder.push_bind(damage_type);
    }

    if let Some(customer_id) = params.customer {
        query_builder.push(" AND c.customer_id = ");
        query_builder.push_bind(customer_id);
    }

    query_builder.push(" ORDER BY c.priority DESC, c.created_at DESC, c.id DESC");
    query_builder.push(" LIMIT ");
    query_builder.push_bind(limit);
    query_builder.push(" OFFSET ");
    query_builder.push_bind(offset);

    #[derive(sqlx::FromRow)]
    struct SearchResult {
        #[sqlx(flatten)]
        claim: Claim,
        total_count: i64,
    }

    let results = query_builder
        .build_query_as::<SearchResult>()
        .fetch_all(pool)
        .await?;

    let total = results.first().map(|r| r.total_count).unwrap_or(0);
    let claims = results.into_iter().map(|r| r.claim).collect();

    Ok(ClaimSearchResponse {
        claims,
        total,
        limit,
        offset,
    })
}

/// Applies an admin status change under a row lock and records it.
/// Returns `None` when the claim does not exist.
pub async fn change_status(
    pool: &PgPool,
    claim_id: i32,
    admin_id: i32,
    change: StatusChange<'_>,
) -> Result<Option<StatusChangeOutcome>> {
    let mut tx = pool.begin().await?;

    let claim = sqlx::query_as::<_, Claim>("SELECT * FROM claims WHERE id = $1 FOR UPDATE")
        .bind(claim_id)
        .fetch_optional(&mut *tx)
        .await?;

    let claim = match claim {
        Some(claim) => claim,
        None => {
            tx.rollback().await?;
            return Ok(None);
        }
    };

    if !claim.status.can_move_to(change.status) {
        tx.rollback().await?;
        return Ok(Some(StatusChangeOutcome::NotAllowed {
            from: claim.status,
            to: change.status,
        }));
    }

    if change.status == ClaimStatus::Resolved
        && change.resolution.or(claim.resolution).is_none()
    {
        tx.rollback().await?;
        return Ok(Some(StatusChangeOutcome::ResolutionRequired));
    }

    let updated = sqlx::query_as::<_, Claim>(
        "UPDATE claims
         SET status = $1,
             priority = COALESCE($2, priority),
             resolution = COALESCE($3, resolution),
             admin_response = COALESCE($4, admin_response),
             internal_notes = COALESCE($5, internal_notes),
             resolved_at = CASE WHEN $6 THEN COALESCE(resolved_at, NOW()) ELSE resolved_at END,
             closed_at = CASE WHEN $7 THEN NOW() ELSE closed_at END,
             updated_at = NOW()
         WHERE id = $8
         RETURNING *",
    )
    .bind(change.status)
    .bind(change.priority)
    .bind(change.resolution)
    .bind(change.admin_response)
    .bind(change.internal_notes)
    .bind(change.status.is_settled())
    .bind(change.status == ClaimStatus::Closed)
    .bind(claim.id)
    .fetch_one(&mut *tx)
    .await?;

    record_history(
        &mut tx,
        claim.id,
        admin_id,
        "Status changed",
        Some(claim.status),
        Some(updated.status),
        change.note,
    )
    .await?;

    tx.commit().await?;
    Ok(Some(StatusChangeOutcome::Updated(updated)))
}

/// Stores the customer's rating of a settled claim. `None` when the claim
/// does not exist or belongs to someone else.
pub async fn add_feedback(
    pool: &PgPool,
    claim_id: i32,
    customer_id: i32,
    rating: i16,
    feedback: Option<&str>,
) -> Result<Option<FeedbackOutcome>> {
    let mut tx = pool.begin().await?;

    let claim = sqlx::query_as::<_, Claim>(
        "SELECT * FROM claims WHERE id = $1 AND customer_id = $2 FOR UPDATE",
    )
    .bind(claim_id)
    .bind(customer_id)
    .fetch_optional(&mut *tx)
    .await?;

    let claim = match claim {
        Some(claim) => claim,
        None => {
            tx.rollback().await?;
            return Ok(None);
        }
    };

    if !claim.status.is_settled() {
        tx.rollback().await?;
        return Ok(Some(FeedbackOutcome::NotSettled(claim.status)));
    }

    if claim.customer_rating.is_some() {
        tx.rollback().await?;
        return Ok(Some(FeedbackOutcome::AlreadyRated));
    }

    let rated = sqlx::query_as::<_, Claim>(
        "UPDATE claims
         SET customer_rating = $1, customer_feedback = $2, updated_at = NOW()
         WHERE id = $3
         RETURNING *",
    )
    .bind(rating)
    .bind(feedback)
    .bind(claim.id)
    .fetch_one(&mut *tx)
    .await?;

    record_history(
        &mut tx,
        claim.id,
        customer_id,
        "Feedback submitted",
        None,
        None,
        Some(&format!("Rating {}/5", rating)),
    )
    .await?;

    tx.commit().await?;
    Ok(Some(FeedbackOutcome::Rated(rated)))
}

/// Counts and averages over the claims created in the last `days` days.
pub async fn stats(pool: &PgPool, days: i32) -> Result<ClaimStats> {
    const WINDOW: &str = "created_at >= NOW() - make_interval(days => $1)";

    let by_status = sqlx::query_as::<_, (ClaimStatus, i64)>(&format!(
        "SELECT status, COUNT(*) FROM claims WHERE {} GROUP BY status",
        WINDOW
    ))
    .bind(days)
    .fetch_all(pool)
    .await?;

    let by_priority = sqlx::query_as::<_, (ClaimPriority, i64)>(&format!(
        "SELECT priority, COUNT(*) FROM claims WHERE {} GROUP BY priority",
        WINDOW
    ))
    .bind(days)
    .fetch_all(pool)
    .await?;

    let by_damage_type = sqlx::query_as::<_, (DamageType, i64)>(&format!(
        "SELECT damage_type, COUNT(*) FROM claims WHERE {} GROUP BY damage_type",
        WINDOW
    ))
    .bind(days)
    .fetch_all(pool)
    .await?;

    let (total, average_rating, average_resolution_days) =
        sqlx::query_as::<_, (i64, Option<Decimal>, Option<Decimal>)>(&format!(
            "SELECT COUNT(*),
                AVG(customer_rating)::NUMERIC(4, 2),
                (AVG(EXTRACT(EPOCH FROM (resolved_at - created_at))) / 86400)::NUMERIC(10, 2)
             FROM claims WHERE {}",
            WINDOW
        ))
        .bind(days)
        .fetch_one(pool)
        .await?;

    let mut stats = ClaimStats {
        days,
        total,
        by_status: ClaimStatus::ALL.iter().map(|s| (*s, 0)).collect(),
        by_priority: ClaimPriority::ALL.iter().map(|p| (*p, 0)).collect(),
        by_damage_type: DamageType::ALL.iter().map(|d| (*d, 0)).collect(),
        average_rating,
        average_resolution_days,
    };
    stats.by_status.extend(by_status);
    stats.by_priority.extend(by_priority);
    stats.by_damage_type.extend(by_damage_type);

    Ok(stats)
}
