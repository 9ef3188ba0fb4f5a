use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, Result},
    models::{UpdateUserRequest, User, UserQuery, UserResponse, UserRole, UserSearchResponse},
};

const USER_SELECT: &str = "SELECT u.id, u.username, u.email, u.password, u.first_name, u.last_name,
        u.is_active, u.token_version, p.role, u.created_at, u.updated_at
     FROM users u
     JOIN profiles p ON p.user_id = u.id";

const DUPLICATE_USER: &str = "Username or email already exists";

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub role: UserRole,
    pub is_active: bool,
}

pub async fn find_by_id(pool: &PgPool, id: i32) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!("{} WHERE u.id = $1", USER_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(user)
}

/// Looks a user up by username first, then by email.
pub async fn find_by_login(pool: &PgPool, login: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "{} WHERE u.username = $1 OR LOWER(u.email) = LOWER($1)
         ORDER BY (u.username = $1) DESC
         LIMIT 1",
        USER_SELECT
    ))
    .bind(login)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Inserts the user and its profile in one transaction. Emails are stored lowercased.
pub async fn create_user(pool: &PgPool, new_user: NewUser<'_>) -> Result<User> {
    let mut tx = pool.begin().await?;

    let user_id: i32 = sqlx::query_scalar(
        "INSERT INTO users (username, email, password, first_name, last_name, is_active)
         VALUES ($1, LOWER($2), $3, $4, $5, $6)
         RETURNING id",
    )
    .bind(new_user.username)
    .bind(new_user.email)
    .bind(new_user.password_hash)
    .bind(new_user.first_name)
    .bind(new_user.last_name)
    .bind(new_user.is_active)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| AppError::conflict_on_unique(e, DUPLICATE_USER))?;

    sqlx::query("INSERT INTO profiles (user_id, role) VALUES ($1, $2)")
        .bind(user_id)
        .bind(new_user.role)
        .execute(&mut *tx)
        .await?;

    let user = sqlx::query_as::<_, User>(&format!("{} WHERE u.id = $1", USER_SELECT))
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(user)
}

pub async fn search_users(pool: &PgPool, params: UserQuery) -> Result<UserSearchResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT u.id, u.username, u.email, u.password, u.first_name, u.last_name,
            u.is_active, u.token_version, p.role, u.created_at, u.updated_at,
            COUNT(*) OVER() AS total_count
         FROM users u
         JOIN profiles p ON p.user_id = u.id
         WHERE 1=1",
    );

    if let Some(ref search) = params.search {
        let pattern = format!("%{}%", search.trim());
        query_builder.push(" AND (u.username ILIKE ");
        query_builder.push_bind(pattern.clone());
        query_builder.push(" OR u.email ILIKE ");
        query_builder.push_bind(pattern);
        query_builder.push(")");
    }

    if let Some(role) = params.role {
        query_builder.push(" AND p.role = ");
        query_builder.push_bind(role);
    }

    query_builder.push(" ORDER BY u.created_at DESC, u.id DESC");
    query_builder.push(" LIMIT ");
    query_builder.push_bind(limit);
    query_builder.push(" OFFSET ");
    query_builder.push_bind(offset);

    #[derive(sqlx::FromRow)]
    struct SearchResult {
        #[sqlx(flatten)]
        user: User,
        total_count: i64,
    }

    let results = query_builder
        .build_query_as::<SearchResult>()
        .fetch_all(pool)
        .await?;

    let total = results.first().map(|r| r.total_count).unwrap_or(0);
    let users = results
        .into_iter()
        .map(|r| UserResponse::from(r.user))
        .collect();

    Ok(UserSearchResponse {
        users,
        total,
        limit,
        offset,
    })
}

/// Applies a partial update. A new password hash also revokes existing tokens.
pub async fn update_user(
    pool: &PgPool,
    id: i32,
    req: &UpdateUserRequest,
    password_hash: Option<&str>,
) -> Result<Option<User>> {
    let mut tx = pool.begin().await?;

    let updated: Option<i32> = sqlx::query_scalar(
        r#"
        UPDATE users
        SET
            username = COALESCE($1, username),
            email = COALESCE(LOWER(TRIM($2)), email),
            first_name = COALESCE($3, first_name),
            last_name = COALESCE($4, last_name),
            is_active = COALESCE($5, is_active),
            password = COALESCE($6::varchar, password),
            token_version = token_version + CASE WHEN $6::varchar IS NULL THEN 0 ELSE 1 END,
            updated_at = NOW()
        WHERE id = $7
        RETURNING id
        "#,
    )
    .bind(req.username.as_deref())
    .bind(req.email.as_deref())
    .bind(req.first_name.as_deref())
    .bind(req.last_name.as_deref())
    .bind(req.is_active)
    .bind(password_hash)
    .bind(id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| AppError::conflict_on_unique(e, DUPLICATE_USER))?;

    if updated.is_none() {
        tx.rollback().await?;
        return Ok(None);
    }

    if let Some(role) = req.role {
        sqlx::query("UPDATE profiles SET role = $1 WHERE user_id = $2")
            .bind(role)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    let user = sqlx::query_as::<_, User>(&format!("{} WHERE u.id = $1", USER_SELECT))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(user)
}

pub async fn delete_user(pool: &PgPool, id: i32) -> Result<u64> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Invalidates every token issued before this call.
pub async fn bump_token_version(pool: &PgPool, id: i32) -> Result<()> {
    sqlx::query(
        "UPDATE users SET token_version = token_version + 1, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}
