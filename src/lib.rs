use std::sync::Arc;

use config::Config;
use redis::Client as RedisClient;

use crate::cache::SyncLock;
use crate::spond::SpondSession;
use crate::store::EventStore;

pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod spond;
pub mod store;
pub mod sync;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub config: Config,
    pub redis: Arc<RedisClient>,
    pub session: SpondSession,
    pub sync_lock: SyncLock,
}

impl AppState {
    pub fn new(store: Arc<dyn EventStore>, config: Config, redis: Arc<RedisClient>) -> Self {
        let sync_lock = SyncLock::new(redis.clone(), config.sync_lock_ttl());
        Self {
            store,
            config,
            redis,
            session: SpondSession::new(),
            sync_lock,
        }
    }
}
