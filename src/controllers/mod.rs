pub mod show_themes;
pub mod astronomy_shows;
pub mod domes;
pub mod show_sessions;
pub mod reservations;
pub mod tickets;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(show_themes::routes())
        .merge(astronomy_shows::routes())
        .merge(domes::routes())
        .merge(show_sessions::routes())
        .merge(reservations::routes())
        .merge(tickets::routes())
}
