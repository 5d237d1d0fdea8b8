//! Authentication: dashboard sessions, the user table, password hashing,
//! and API-facing JWTs (spec §4.5).

pub mod jwt;
pub mod password;
pub mod session;
pub mod users;

pub use jwt::{issue_token, verify_token, Claims};
pub use password::{hash_password, verify_password};
pub use session::{Session, SessionStore};
pub use users::{create_user, User};
