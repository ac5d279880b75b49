use crate::{database::Database, redis_client::RedisClient};
use tracing::info;

pub mod tickets;

pub use tickets::TicketViewFilter;

#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
    db: Database,
    ticket_view_ttl: u64,
}

impl CacheService {
    pub fn new(redis: RedisClient, db: Database, ticket_view_ttl: u64) -> Self {
        Self {
            redis,
            db,
            ticket_view_ttl,
        }
    }

    // Warm the unfiltered ticket view at startup
    pub async fn warmup_cache(&self) {
        info!("Starting cache warmup...");

        let filter = TicketViewFilter::default();
        if let Ok(items) = self.load_ticket_view_from_db(&filter).await {
            if let Ok(payload) = serde_json::to_string(&items) {
                let _ = self.cache_ticket_view(&filter, &payload).await;
            }
        }

        info!("Cache warmup done");
    }
}
