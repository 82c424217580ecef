pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod lifecycle;
pub mod reports;
pub mod store;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::lifecycle::VisitLifecycle;
use crate::store::SqliteVisitStore;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub visits: VisitLifecycle,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Wire the lifecycle manager to SQLite-backed visit storage
    pub fn new(config: Config, db: DbPool) -> Self {
        let visits = VisitLifecycle::new(Arc::new(SqliteVisitStore::new(db.clone())));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            db,
            visits,
            rate_limiter,
        }
    }
}
