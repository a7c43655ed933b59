pub mod utils;
pub mod models;
pub mod db;
pub mod identity;
pub mod api;

use std::sync::Arc;
use identity::IdentityEngine;
use utils::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub started_at: std::time::Instant,
    pub config: Config,
    pub pool: db::DbPool,
    pub engine: Arc<IdentityEngine>,
}

impl AppState {
    pub fn new(config: Config, pool: db::DbPool) -> Self {
        let engine = Arc::new(IdentityEngine::new(config.cluster_params()));
        Self {
            started_at: std::time::Instant::now(),
            config,
            pool,
            engine,
        }
    }
}
