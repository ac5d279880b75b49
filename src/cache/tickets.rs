use redis::AsyncCommands;
use serde::Deserialize;
use tracing::{info, warn};

use crate::cache::CacheService;
use crate::models::ticket::TicketListItem;

/// Filters accepted by the ticket listing. Both are case-insensitive
/// substring matches and combine with AND when given together.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketViewFilter {
    pub title: Option<String>,
    pub email: Option<String>,
}

impl TicketViewFilter {
    // Blank query params count as absent
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref().filter(|s| !s.is_empty())
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().filter(|s| !s.is_empty())
    }

    pub fn cache_key(&self) -> String {
        format!(
            "ticket_view:title={}&email={}",
            self.title().unwrap_or(""),
            self.email().unwrap_or("")
        )
    }
}

// Wraps a search term for ILIKE, escaping the pattern metacharacters so
// the term matches literally.
pub(crate) fn contains_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

// Assembles the listing query for the given filters. Returned binds are
// in placeholder order.
fn build_ticket_view_sql(filter: &TicketViewFilter) -> (String, Vec<String>) {
    let mut sql = String::from(
        r#"SELECT t.id, t."row", t.seat, u.email AS "user", a.title AS astronomy_show
           FROM tickets t
           JOIN reservations r ON r.id = t.reservation_id
           JOIN users u ON u.id = r.user_id
           JOIN show_sessions s ON s.id = t.show_session_id
           JOIN astronomy_shows a ON a.id = s.astronomy_show_id"#,
    );

    let mut conditions: Vec<String> = Vec::new();
    let mut binds: Vec<String> = Vec::new();

    if let Some(title) = filter.title() {
        conditions.push(format!("a.title ILIKE ${}", binds.len() + 1));
        binds.push(contains_pattern(title));
    }
    if let Some(email) = filter.email() {
        conditions.push(format!("u.email ILIKE ${}", binds.len() + 1));
        binds.push(contains_pattern(email));
    }

    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(" ORDER BY t.id");

    (sql, binds)
}

impl CacheService {
    pub async fn load_ticket_view_from_db(
        &self,
        filter: &TicketViewFilter,
    ) -> Result<Vec<TicketListItem>, sqlx::Error> {
        let (sql, binds) = build_ticket_view_sql(filter);

        let mut query = sqlx::query_as::<_, TicketListItem>(&sql);
        for bind in binds {
            query = query.bind(bind);
        }
        query.fetch_all(&self.db.pool).await
    }

    pub async fn get_cached_ticket_view(
        &self,
        filter: &TicketViewFilter,
    ) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        conn.get(filter.cache_key()).await
    }

    pub async fn cache_ticket_view(
        &self,
        filter: &TicketViewFilter,
        payload: &str,
    ) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        conn.set_ex(filter.cache_key(), payload, self.ticket_view_ttl)
            .await
    }

    /// Drop every cached ticket view, filtered or not. Invalidation is
    /// deliberately coarse: any ticket write may change any filtered view.
    pub async fn invalidate_ticket_views(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg("ticket_view:*")
            .query_async(&mut conn)
            .await?;
        if !keys.is_empty() {
            let _: () = conn.del(keys).await?;
        }
        Ok(())
    }

    // Best-effort variant for write paths: a stale view is tolerable for
    // one TTL, a failed write response is not.
    pub async fn drop_ticket_views(&self) {
        match self.invalidate_ticket_views().await {
            Ok(()) => info!("Invalidated ticket view cache"),
            Err(e) => warn!("Failed to invalidate ticket view cache: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::internet::en::SafeEmail;
    use fake::Fake;

    #[test]
    fn cache_key_is_stable_for_unfiltered_views() {
        let filter = TicketViewFilter::default();
        assert_eq!(filter.cache_key(), "ticket_view:title=&email=");
    }

    #[test]
    fn cache_key_carries_both_filters() {
        let filter = TicketViewFilter {
            title: Some("Orion".to_string()),
            email: Some("alice@x.com".to_string()),
        };
        assert_eq!(
            filter.cache_key(),
            "ticket_view:title=Orion&email=alice@x.com"
        );
    }

    #[test]
    fn blank_params_collapse_to_the_unfiltered_key() {
        let filter = TicketViewFilter {
            title: Some(String::new()),
            email: Some(String::new()),
        };
        assert_eq!(filter.title(), None);
        assert_eq!(filter.email(), None);
        assert_eq!(filter.cache_key(), TicketViewFilter::default().cache_key());
    }

    #[test]
    fn unfiltered_sql_has_no_where_clause() {
        let (sql, binds) = build_ticket_view_sql(&TicketViewFilter::default());
        assert!(!sql.contains("WHERE"));
        assert!(sql.ends_with("ORDER BY t.id"));
        assert!(binds.is_empty());
    }

    #[test]
    fn title_filter_binds_first() {
        let filter = TicketViewFilter {
            title: Some("Orion".to_string()),
            email: None,
        };
        let (sql, binds) = build_ticket_view_sql(&filter);
        assert!(sql.contains("WHERE a.title ILIKE $1"));
        assert_eq!(binds, vec!["%Orion%".to_string()]);
    }

    #[test]
    fn email_alone_still_binds_as_dollar_one() {
        let email: String = SafeEmail().fake();
        let filter = TicketViewFilter {
            title: None,
            email: Some(email.clone()),
        };
        let (sql, binds) = build_ticket_view_sql(&filter);
        assert!(sql.contains("WHERE u.email ILIKE $1"));
        assert!(!sql.contains("a.title ILIKE"));
        assert_eq!(binds, vec![format!("%{email}%")]);
    }

    #[test]
    fn combined_filters_are_anded_in_bind_order() {
        let filter = TicketViewFilter {
            title: Some("Mars".to_string()),
            email: Some("bob@x.com".to_string()),
        };
        let (sql, binds) = build_ticket_view_sql(&filter);
        assert!(sql.contains("a.title ILIKE $1 AND u.email ILIKE $2"));
        assert_eq!(binds, vec!["%Mars%".to_string(), "%bob@x.com%".to_string()]);
    }

    #[test]
    fn pattern_metacharacters_match_literally() {
        assert_eq!(contains_pattern("100%"), "%100\\%%");
        assert_eq!(contains_pattern("a_b"), "%a\\_b%");
        assert_eq!(contains_pattern("back\\slash"), "%back\\\\slash%");
    }
}
