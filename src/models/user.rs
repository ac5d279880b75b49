use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub is_active: bool,
    pub registered_at: DateTime<Utc>,
}

impl User {
    // Resolve an opaque bearer token to its owner. Token issuance lives
    // outside this service; inactive accounts resolve to nothing.
    pub async fn find_by_token(
        token: Uuid,
        db: &crate::database::Database,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT u.id, u.email, u.first_name, u.last_name, u.is_staff, u.is_active, u.registered_at
             FROM users u
             JOIN auth_tokens t ON t.user_id = u.id
             WHERE t.token = $1 AND u.is_active",
        )
        .bind(token)
        .fetch_optional(&db.pool)
        .await
    }
}
