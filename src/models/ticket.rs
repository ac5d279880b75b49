use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub row: i32,
    pub seat: i32,
    pub show_session_id: i64,
    pub reservation_id: i64,
}

/// Flat list projection: owner email and show title are joined in so the
/// listing never fans out into per-row lookups.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TicketListItem {
    pub id: i64,
    pub row: i32,
    pub seat: i32,
    pub user: String,
    pub astronomy_show: String,
}
