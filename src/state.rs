use std::sync::Arc;

use axum::extract::FromRef;
use log::info;

use crate::conversation::repository::{MemoryConversationRepository, RedisConversationRepository};
use crate::integration::{self, Store, cache};
use crate::manager::{self, service::ConversationManagerImpl};
use crate::overview::repository::{MemoryOverviewRepository, RedisOverviewRepository};
use crate::{conversation, overview};

#[derive(Clone)]
pub struct AppState {
    manager: manager::Service,
}

impl AppState {
    pub async fn init(config: &integration::Config) -> integration::Result<Self> {
        let (conversation_repo, overview_repo): (conversation::Repository, overview::Repository) =
            match &config.store {
                Store::Memory => {
                    info!("using in-memory store");
                    (
                        Arc::new(MemoryConversationRepository::default()),
                        Arc::new(MemoryOverviewRepository::default()),
                    )
                }
                Store::Redis(redis_config) => {
                    let redis = cache::init(redis_config).await?;
                    info!("using redis store");
                    (
                        Arc::new(RedisConversationRepository::new(redis.clone())),
                        Arc::new(RedisOverviewRepository::new(redis)),
                    )
                }
            };

        Ok(Self::new(Arc::new(ConversationManagerImpl::new(
            conversation_repo,
            overview_repo,
        ))))
    }

    pub fn new(manager: manager::Service) -> Self {
        Self { manager }
    }

    /// In-memory state, used by tests.
    pub fn memory() -> Self {
        Self::new(Arc::new(ConversationManagerImpl::new(
            Arc::new(MemoryConversationRepository::default()),
            Arc::new(MemoryOverviewRepository::default()),
        )))
    }
}

impl FromRef<AppState> for manager::Service {
    fn from_ref(s: &AppState) -> Self {
        s.manager.clone()
    }
}
