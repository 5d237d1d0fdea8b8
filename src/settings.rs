//! Dashboard-managed runtime settings and email templates (spec §2 "Settings & Template Store"):
//! a plain key/value store (`_settings`) for things operators tune after
//! first boot, plus the `_email_templates` table used by the invite mailer.

use crate::db::Database;
use crate::error::AppError;
use serde::Serialize;
use sqlx::Row;

/// Default templates seeded on first use if the table is empty, so the
/// mailer always has something to send even before an operator has
/// customized anything (spec §2 "Settings & Template Store").
const DEFAULT_TEMPLATES: &[(&str, &str, &str)] = &[
    (
        "invite",
        "You've been invited",
        "Hello,\n\nYou've been invited to join. Use the link below to accept:\n{{invite_link}}\n",
    ),
    (
        "password_reset",
        "Reset your password",
        "Hello,\n\nUse the link below to reset your password:\n{{reset_link}}\n",
    ),
];

pub async fn get_setting(db: &Database, key: &str) -> Result<Option<String>, AppError> {
    let row = sqlx::query("SELECT value FROM _settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db.pool())
        .await?;
    Ok(row.map(|r| r.get("value")))
}

pub async fn set_setting(db: &Database, key: &str, value: &str) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO _settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(db.pool())
    .await?;
    Ok(())
}

pub async fn list_settings(db: &Database) -> Result<Vec<(String, String)>, AppError> {
    let rows = sqlx::query("SELECT key, value FROM _settings ORDER BY key")
        .fetch_all(db.pool())
        .await?;
    Ok(rows.into_iter().map(|r| (r.get("key"), r.get("value"))).collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailTemplate {
    pub name: String,
    pub subject: String,
    pub body: String,
}

/// Ensure the built-in templates exist, without overwriting anything an
/// operator has already customized.
pub async fn ensure_default_templates(db: &Database) -> Result<(), AppError> {
    for (name, subject, body) in DEFAULT_TEMPLATES {
        sqlx::query(
            "INSERT INTO _email_templates (name, subject, body) VALUES (?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(name)
        .bind(subject)
        .bind(body)
        .execute(db.pool())
        .await?;
    }
    Ok(())
}

pub async fn get_template(db: &Database, name: &str) -> Result<EmailTemplate, AppError> {
    let row = sqlx::query("SELECT name, subject, body FROM _email_templates WHERE name = ?")
        .bind(name)
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("email template not found: {name}")))?;
    Ok(EmailTemplate {
        name: row.get("name"),
        subject: row.get("subject"),
        body: row.get("body"),
    })
}

pub async fn set_template(db: &Database, name: &str, subject: &str, body: &str) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO _email_templates (name, subject, body) VALUES (?, ?, ?)
         ON CONFLICT(name) DO UPDATE SET subject = excluded.subject, body = excluded.body",
    )
    .bind(name)
    .bind(subject)
    .bind(body)
    .execute(db.pool())
    .await?;
    Ok(())
}

/// Render `{{placeholder}}` tokens in a template body against `vars`.
#[must_use]
pub fn render_template(body: &str, vars: &[(&str, &str)]) -> String {
    let mut rendered = body.to_string();
    for (key, value) in vars {
        rendered = rendered.replace(&format!("{{{{{key}}}}}"), value);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn settings_roundtrip() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        set_setting(&db, "site_name", "My Project").await.unwrap();
        assert_eq!(get_setting(&db, "site_name").await.unwrap().as_deref(), Some("My Project"));
        set_setting(&db, "site_name", "Renamed").await.unwrap();
        assert_eq!(get_setting(&db, "site_name").await.unwrap().as_deref(), Some("Renamed"));
    }

    #[tokio::test]
    async fn default_templates_are_seeded_once() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        ensure_default_templates(&db).await.unwrap();
        set_template(&db, "invite", "Custom subject", "custom body").await.unwrap();
        ensure_default_templates(&db).await.unwrap();
        let template = get_template(&db, "invite").await.unwrap();
        assert_eq!(template.subject, "Custom subject");
    }

    #[test]
    fn render_template_substitutes_placeholders() {
        let rendered = render_template("hi {{name}}", &[("name", "Ada")]);
        assert_eq!(rendered, "hi Ada");
    }
}
