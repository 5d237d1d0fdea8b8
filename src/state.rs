//! Shared application state (the architecture-collapse point: every
//! component that would have been its own microservice in the teacher's
//! layout is instead a module reached through one `AppState`, see
//! SPEC_FULL.md's AMBIENT STACK note).

use crate::auth::session::SessionStore;
use crate::config::Config;
use crate::db::Database;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub sessions: SessionStore,
}

impl AppState {
    pub async fn bootstrap(config: Config) -> Result<Self, crate::error::AppError> {
        let db = Database::connect(&config.database.path).await?;
        crate::settings::ensure_default_templates(&db).await?;
        Ok(Self {
            db,
            config: Arc::new(config),
            sessions: SessionStore::new(),
        })
    }
}
