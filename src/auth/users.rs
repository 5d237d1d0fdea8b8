//! The `auth_users` table: signup, invite tokens, and the anonymous-user
//! gate (spec §4.5).

use crate::auth::password::hash_password;
use crate::db::Database;
use crate::error::AppError;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

/// Invite/verification tokens live for 7 days (spec §4.5).
pub const VERIFICATION_TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub is_anonymous: bool,
    pub created_at: String,
}

/// Create a user with an email/password pair, bcrypt-hashing the password
/// at `bcrypt_cost`.
pub async fn create_user(
    db: &Database,
    email: &str,
    password: &str,
    bcrypt_cost: u32,
) -> Result<User, AppError> {
    let id = uuid::Uuid::new_v4().to_string();
    let hashed = hash_password(password, bcrypt_cost)?;

    let result = sqlx::query(
        "INSERT INTO auth_users (id, email, encrypted_password, is_anonymous) VALUES (?, ?, ?, 0)",
    )
    .bind(&id)
    .bind(email)
    .bind(&hashed)
    .execute(db.pool())
    .await;

    if let Err(sqlx::Error::Database(db_err)) = &result {
        if db_err.is_unique_violation() {
            return Err(AppError::Conflict(format!("email already registered: {email}")));
        }
    }
    result?;

    fetch_user(db, &id).await
}

/// Create an anonymous user. Callers must check `allow_anonymous` in
/// config before calling this — the gate itself lives in the handler
/// layer so it can be surfaced as a precondition error with a clear
/// message (spec §4.5, §7).
pub async fn create_anonymous_user(db: &Database) -> Result<User, AppError> {
    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO auth_users (id, is_anonymous) VALUES (?, 1)")
        .bind(&id)
        .execute(db.pool())
        .await?;
    fetch_user(db, &id).await
}

async fn fetch_user(db: &Database, id: &str) -> Result<User, AppError> {
    let row = sqlx::query("SELECT id, email, is_anonymous, created_at FROM auth_users WHERE id = ?")
        .bind(id)
        .fetch_one(db.pool())
        .await?;
    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        is_anonymous: row.get::<i64, _>("is_anonymous") != 0,
        created_at: row.get("created_at"),
    })
}

pub async fn find_by_email(db: &Database, email: &str) -> Result<Option<(User, String)>, AppError> {
    let row = sqlx::query(
        "SELECT id, email, is_anonymous, created_at, encrypted_password FROM auth_users WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(db.pool())
    .await?;
    Ok(row.map(|row| {
        (
            User {
                id: row.get("id"),
                email: row.get("email"),
                is_anonymous: row.get::<i64, _>("is_anonymous") != 0,
                created_at: row.get("created_at"),
            },
            row.get::<Option<String>, _>("encrypted_password").unwrap_or_default(),
        )
    }))
}

/// Issue a 7-day invite/verification token for `user_id`.
pub async fn issue_verification_token(
    db: &Database,
    user_id: &str,
    token_type: &str,
    email: Option<&str>,
) -> Result<String, AppError> {
    let token = uuid::Uuid::new_v4().to_string();
    let expires_at = (Utc::now() + Duration::days(VERIFICATION_TOKEN_TTL_DAYS)).to_rfc3339();
    sqlx::query(
        "INSERT INTO auth_verification_tokens (token, user_id, type, email, expires_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&token)
    .bind(user_id)
    .bind(token_type)
    .bind(email)
    .bind(&expires_at)
    .execute(db.pool())
    .await?;
    Ok(token)
}

/// List every auth-domain user, most recently created first (spec §4.5
/// component H, the dashboard's user-management table).
pub async fn list_users(db: &Database) -> Result<Vec<User>, AppError> {
    let rows = sqlx::query(
        "SELECT id, email, is_anonymous, created_at FROM auth_users ORDER BY created_at DESC",
    )
    .fetch_all(db.pool())
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| User {
            id: row.get("id"),
            email: row.get("email"),
            is_anonymous: row.get::<i64, _>("is_anonymous") != 0,
            created_at: row.get("created_at"),
        })
        .collect())
}

/// Delete a user. `auth_verification_tokens` rows cascade via the foreign
/// key declared in `Database::bootstrap` (spec §3 "Deleting a user
/// cascades ... via foreign-key discipline").
pub async fn delete_user(db: &Database, id: &str) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM auth_users WHERE id = ?")
        .bind(id)
        .execute(db.pool())
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("user not found: {id}")));
    }
    Ok(())
}

/// Create a passwordless user row for `email` and issue a 7-day invite
/// token (spec §4.5 component H "Invite tokens"). Sending the token is
/// the SMTP mailer's job (out of scope, spec §1); the caller relays the
/// returned token through whatever channel it has.
pub async fn invite_user(db: &Database, email: &str) -> Result<(User, String), AppError> {
    let id = uuid::Uuid::new_v4().to_string();
    let result = sqlx::query("INSERT INTO auth_users (id, email, is_anonymous) VALUES (?, ?, 0)")
        .bind(&id)
        .bind(email)
        .execute(db.pool())
        .await;
    if let Err(sqlx::Error::Database(db_err)) = &result {
        if db_err.is_unique_violation() {
            return Err(AppError::Conflict(format!("email already registered: {email}")));
        }
    }
    result?;
    let token = issue_verification_token(db, &id, "invite", Some(email)).await?;
    let user = fetch_user(db, &id).await?;
    Ok((user, token))
}

/// Redeem an invite token: set the invited user's password and mark their
/// email confirmed. Rejects tokens that are missing, expired, or not of
/// type `invite` (spec §3 "invite token" + §4.5).
pub async fn accept_invite(
    db: &Database,
    token: &str,
    password: &str,
    bcrypt_cost: u32,
) -> Result<User, AppError> {
    let row = sqlx::query("SELECT user_id, type, expires_at FROM auth_verification_tokens WHERE token = ?")
        .bind(token)
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(|| AppError::NotFound("invite token not found".to_string()))?;

    let token_type: String = row.get("type");
    if token_type != "invite" {
        return Err(AppError::Validation("token is not an invite token".to_string()));
    }
    let expires_at: String = row.get("expires_at");
    let expires_at = chrono::DateTime::parse_from_rfc3339(&expires_at)
        .map_err(|e| AppError::Internal(format!("corrupt token expiry: {e}")))?;
    let user_id: String = row.get("user_id");
    if expires_at < Utc::now() {
        sqlx::query("DELETE FROM auth_verification_tokens WHERE token = ?")
            .bind(token)
            .execute(db.pool())
            .await?;
        return Err(AppError::Unauthorized("invite token expired".to_string()));
    }

    let hashed = hash_password(password, bcrypt_cost)?;
    sqlx::query(
        "UPDATE auth_users SET encrypted_password = ?, email_confirmed_at = strftime('%Y-%m-%d %H:%M:%f+00','now') WHERE id = ?",
    )
    .bind(&hashed)
    .bind(&user_id)
    .execute(db.pool())
    .await?;
    sqlx::query("DELETE FROM auth_verification_tokens WHERE token = ?")
        .bind(token)
        .execute(db.pool())
        .await?;
    fetch_user(db, &user_id).await
}

/// Consume a verification token, rejecting it if missing or expired.
/// Tokens are single-use: the row is deleted on success.
pub async fn consume_verification_token(db: &Database, token: &str) -> Result<String, AppError> {
    let row = sqlx::query("SELECT user_id, expires_at FROM auth_verification_tokens WHERE token = ?")
        .bind(token)
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(|| AppError::NotFound("verification token not found".to_string()))?;

    let expires_at: String = row.get("expires_at");
    let expires_at = chrono::DateTime::parse_from_rfc3339(&expires_at)
        .map_err(|e| AppError::Internal(format!("corrupt token expiry: {e}")))?;
    if expires_at < Utc::now() {
        sqlx::query("DELETE FROM auth_verification_tokens WHERE token = ?")
            .bind(token)
            .execute(db.pool())
            .await?;
        return Err(AppError::Unauthorized("verification token expired".to_string()));
    }

    let user_id: String = row.get("user_id");
    sqlx::query("DELETE FROM auth_verification_tokens WHERE token = ?")
        .bind(token)
        .execute(db.pool())
        .await?;
    Ok(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_user_then_find_by_email() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        create_user(&db, "a@example.com", "hunter2", 4).await.unwrap();
        let (user, hashed) = find_by_email(&db, "a@example.com").await.unwrap().unwrap();
        assert!(!user.is_anonymous);
        assert!(crate::auth::password::verify_password("hunter2", &hashed).unwrap());
    }

    #[tokio::test]
    async fn duplicate_email_is_conflict() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        create_user(&db, "a@example.com", "hunter2", 4).await.unwrap();
        let result = create_user(&db, "a@example.com", "other", 4).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn anonymous_user_has_no_email() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let user = create_anonymous_user(&db).await.unwrap();
        assert!(user.is_anonymous);
        assert!(user.email.is_none());
    }

    #[tokio::test]
    async fn verification_token_round_trips_and_is_single_use() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let user = create_anonymous_user(&db).await.unwrap();
        let token = issue_verification_token(&db, &user.id, "invite", None).await.unwrap();
        let resolved = consume_verification_token(&db, &token).await.unwrap();
        assert_eq!(resolved, user.id);
        assert!(consume_verification_token(&db, &token).await.is_err());
    }

    #[tokio::test]
    async fn list_users_orders_most_recent_first() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        create_user(&db, "a@example.com", "hunter2", 4).await.unwrap();
        create_user(&db, "b@example.com", "hunter2", 4).await.unwrap();
        let listed = list_users(&db).await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn delete_user_removes_row_and_rejects_unknown_id() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let user = create_anonymous_user(&db).await.unwrap();
        delete_user(&db, &user.id).await.unwrap();
        assert!(list_users(&db).await.unwrap().is_empty());
        assert!(matches!(delete_user(&db, &user.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn invite_then_accept_issues_password_and_confirms_email() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let (user, token) = invite_user(&db, "invitee@example.com").await.unwrap();
        assert!(user.email.is_some());

        let accepted = accept_invite(&db, &token, "newpassword", 4).await.unwrap();
        assert_eq!(accepted.id, user.id);
        let (_, hashed) = find_by_email(&db, "invitee@example.com").await.unwrap().unwrap();
        assert!(crate::auth::password::verify_password("newpassword", &hashed).unwrap());
        // single-use: the token row is gone.
        assert!(accept_invite(&db, &token, "again", 4).await.is_err());
    }

    #[tokio::test]
    async fn invite_duplicate_email_is_conflict() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        invite_user(&db, "dup@example.com").await.unwrap();
        let result = invite_user(&db, "dup@example.com").await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn accept_invite_rejects_wrong_token_type() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let user = create_anonymous_user(&db).await.unwrap();
        let token = issue_verification_token(&db, &user.id, "password_reset", None).await.unwrap();
        let result = accept_invite(&db, &token, "newpassword", 4).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
