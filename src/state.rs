use std::sync::Arc;

use tracing::warn;

use crate::{
    auth::{jwt::JwtKeys, password::Argon2Hasher},
    config::{AppConfig, StoreBackend},
    db,
    storage::LocalStorage,
    users::{
        memory::MemoryUserStore,
        repo::{MongoUserStore, UserStore},
        services::AccountService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub accounts: Arc<AccountService>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn UserStore> = match config.store {
            StoreBackend::Mongo => Arc::new(MongoUserStore::new(&db::connect(&config).await?)),
            StoreBackend::Memory => {
                warn!("using the in-memory user store; data is lost on restart");
                Arc::new(MemoryUserStore::new())
            }
        };
        Self::from_parts(config, store).await
    }

    pub async fn from_parts(config: AppConfig, store: Arc<dyn UserStore>) -> anyhow::Result<Self> {
        let hasher = Arc::new(Argon2Hasher::new(&config.hash)?);
        let tokens = Arc::new(JwtKeys::new(&config.jwt)?);
        let storage = Arc::new(LocalStorage::new(&config.upload_dir).await?);

        let accounts = Arc::new(AccountService::new(
            store,
            hasher,
            tokens,
            storage,
            config.db_timeout,
        ));

        Ok(Self {
            config: Arc::new(config),
            accounts,
        })
    }
}
