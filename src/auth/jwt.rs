//! API-facing bearer tokens (spec §4.5): HS256 JWTs carrying the caller's
//! user id and role, verified by [`crate::rls::AuthContext`] construction
//! in the request middleware.

use crate::error::AppError;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject — the `auth_users.id` of the token holder.
    pub sub: String,
    /// `authenticated` or `anon`.
    pub role: String,
    /// The token holder's email, when one exists (anonymous users have none).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub email: Option<String>,
    /// Expiry, seconds since epoch.
    pub exp: i64,
}

/// Sign a bearer token for `user_id`/`role`/`email`, valid for `ttl_seconds`.
pub fn issue_token(
    secret: &str,
    user_id: &str,
    role: &str,
    email: Option<&str>,
    ttl_seconds: i64,
) -> Result<String, AppError> {
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        email: email.map(str::to_string),
        exp: (chrono::Utc::now() + chrono::Duration::seconds(ttl_seconds)).timestamp(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppError::Internal(format!("jwt sign failed: {e}")))
}

/// Verify and decode a bearer token, rejecting expired or malformed ones.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("invalid token: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_then_verify_roundtrips() {
        let token = issue_token("secret", "user-1", "authenticated", Some("a@example.com"), 3600).unwrap();
        let claims = verify_token("secret", &token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.role, "authenticated");
        assert_eq!(claims.email.as_deref(), Some("a@example.com"));
    }

    #[test]
    fn anonymous_token_has_no_email() {
        let token = issue_token("secret", "user-1", "anon", None, 3600).unwrap();
        let claims = verify_token("secret", &token).unwrap();
        assert!(claims.email.is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_token("secret", "user-1", "authenticated", None, -10).unwrap();
        assert!(verify_token("secret", &token).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token("secret", "user-1", "authenticated", None, 3600).unwrap();
        assert!(verify_token("other-secret", &token).is_err());
    }
}
