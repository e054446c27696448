use std::sync::Arc;

use tracing::warn;

use crate::auth::jwt::JwtKeys;
use crate::auth::password::CredentialHasher;
use crate::config::{AppConfig, StoreConfig};
use crate::db;
use crate::users::{
    memory::InMemoryUserStore,
    repo::{PgUserStore, UserStore},
    services::UserService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: UserService,
    pub keys: JwtKeys,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store: Arc<dyn UserStore> = match &config.store {
            StoreConfig::Postgres {
                database_url,
                max_connections,
            } => {
                let pool = db::connect(database_url, *max_connections).await?;
                db::run_migrations(&pool).await?;
                Arc::new(PgUserStore::new(pool))
            }
            StoreConfig::Memory => {
                warn!("using in-memory user store; accounts are lost on restart");
                Arc::new(InMemoryUserStore::new())
            }
        };

        Self::from_parts(config, store)
    }

    pub fn from_parts(config: Arc<AppConfig>, store: Arc<dyn UserStore>) -> anyhow::Result<Self> {
        let hasher = CredentialHasher::new(config.password)?;
        let keys = JwtKeys::new(&config.jwt);
        Ok(Self {
            users: UserService::new(store, hasher),
            keys,
            config,
        })
    }
}
