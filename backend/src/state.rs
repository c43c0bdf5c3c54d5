use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    config::Config,
    repositories::{
        ChangeRequestRepositoryTrait, InMemoryStore, PgChangeRequestRepository, PgTargetRepository,
        TargetRepositoryTrait,
    },
    services::{AuthorizationPolicy, ChangeRequestService, RolePolicy, TargetService},
    utils::time::{Clock, SystemClock},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub change_requests: Arc<dyn ChangeRequestRepositoryTrait>,
    pub targets: Arc<dyn TargetRepositoryTrait>,
    pub policy: Arc<dyn AuthorizationPolicy>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        config: Config,
        change_requests: Arc<dyn ChangeRequestRepositoryTrait>,
        targets: Arc<dyn TargetRepositoryTrait>,
        policy: Arc<dyn AuthorizationPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            change_requests,
            targets,
            policy,
            clock,
        }
    }

    /// State backed by PostgreSQL.
    pub fn postgres(pool: PgPool, config: Config) -> Self {
        let clock = Arc::new(SystemClock::new(config.time_zone));
        Self::new(
            config,
            Arc::new(PgChangeRequestRepository::new(pool.clone())),
            Arc::new(PgTargetRepository::new(pool)),
            Arc::new(RolePolicy::new()),
            clock,
        )
    }

    /// State backed by a fresh in-memory store.
    pub fn in_memory(config: Config) -> Self {
        Self::with_store(config, InMemoryStore::new())
    }

    /// State backed by an existing in-memory store, e.g. one seeded by a test.
    pub fn with_store(config: Config, store: InMemoryStore) -> Self {
        let clock = Arc::new(SystemClock::new(config.time_zone));
        Self::new(
            config,
            Arc::new(store.clone()),
            Arc::new(store),
            Arc::new(RolePolicy::new()),
            clock,
        )
    }

    pub fn change_request_service(&self) -> ChangeRequestService {
        ChangeRequestService::new(
            self.change_requests.clone(),
            self.targets.clone(),
            self.policy.clone(),
            self.clock.clone(),
        )
    }

    pub fn target_service(&self) -> TargetService {
        TargetService::new(self.targets.clone(), self.policy.clone(), self.clock.clone())
    }
}
