use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn, orm_from_pool},
    mailer::{self, Mailer},
    storage::{self, ObjectStorage},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Build the state from an already-connected pool, picking the external
    /// clients that the configuration enables.
    pub fn new(config: AppConfig, pool: DbPool) -> anyhow::Result<Self> {
        let storage = storage::from_config(config.storage.as_ref())?;
        let mailer = mailer::from_config(config.mail.as_ref())?;
        Ok(Self {
            orm: orm_from_pool(&pool),
            pool,
            config: Arc::new(config),
            storage,
            mailer,
        })
    }
}
