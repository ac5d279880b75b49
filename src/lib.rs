pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;

use std::sync::Arc;
use tokio::task;
use tracing::info;

// Shared state for the whole application
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub redis: redis_client::RedisClient,
    pub cache: cache::CacheService,
    pub allocator: services::SeatAllocator,
    pub ledger: services::ReservationLedger,
    pub config: config::Config,
}

impl AppState {
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let db = database::Database::connect(&config.database).await?;
        info!("Database connected");

        db.run_migrations().await?;

        let redis = redis_client::RedisClient::connect(&config.redis).await?;
        info!("Redis connected");

        let cache = cache::CacheService::new(
            redis.clone(),
            db.clone(),
            config.booking.ticket_view_ttl_seconds,
        );
        let allocator = services::SeatAllocator::new(db.clone(), cache.clone());
        let ledger = services::ReservationLedger::new(
            db.clone(),
            cache.clone(),
            config.booking.cancellation_cutoff_hours,
        );

        let state = Arc::new(Self {
            db,
            redis,
            cache,
            allocator,
            ledger,
            config,
        });

        // Warm the cache off the startup path
        let state_for_bg = state.clone();
        task::spawn(async move {
            state_for_bg.cache.warmup_cache().await;
        });

        Ok(state)
    }
}
