//! Password hashing for the dashboard operator account and for `auth_users`
//! rows (spec §2, §4.5 — bcrypt, not the teacher's argon2: the spec names
//! bcrypt explicitly, see SPEC_FULL.md's AMBIENT STACK note).

use crate::error::AppError;

/// Hash `plain` with bcrypt at `cost`.
pub fn hash_password(plain: &str, cost: u32) -> Result<String, AppError> {
    bcrypt::hash(plain, cost).map_err(|e| AppError::Internal(format!("bcrypt hash failed: {e}")))
}

/// Verify `plain` against a previously-hashed password.
pub fn verify_password(plain: &str, hashed: &str) -> Result<bool, AppError> {
    bcrypt::verify(plain, hashed).map_err(|e| AppError::Internal(format!("bcrypt verify failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_roundtrips() {
        let hashed = hash_password("correct horse battery staple", 4).unwrap();
        assert!(verify_password("correct horse battery staple", &hashed).unwrap());
        assert!(!verify_password("wrong", &hashed).unwrap());
    }
}
