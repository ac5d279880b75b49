use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;

use crate::cache::tickets::contains_pattern;
use crate::cache::CacheService;
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::models::Reservation;

/// Reservation row joined with its owner, for responses that render the
/// owner as an email.
#[derive(Debug, Clone, FromRow)]
pub struct ReservationWithOwner {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub user_id: i64,
    pub email: String,
}

/// Returns the first session (in show-time order) that pins the
/// reservation inside the cutoff window. Sessions already in the past
/// block cancellation as well: their lead time is negative.
pub fn first_blocking_session(
    sessions: &[(i64, DateTime<Utc>)],
    now: DateTime<Utc>,
    cutoff: Duration,
) -> Option<i64> {
    sessions
        .iter()
        .find(|(_, show_time)| *show_time - now < cutoff)
        .map(|(id, _)| *id)
}

/// Owns the reservation lifecycle. Opening is unconditional; cancellation
/// is fenced by ownership and by the cutoff window over every ticket in
/// the reservation.
#[derive(Clone)]
pub struct ReservationLedger {
    db: Database,
    cache: CacheService,
    cutoff_hours: i64,
}

impl ReservationLedger {
    pub fn new(db: Database, cache: CacheService, cutoff_hours: i64) -> Self {
        Self {
            db,
            cache,
            cutoff_hours,
        }
    }

    pub async fn open(&self, principal: &AuthUser) -> AppResult<Reservation> {
        let reservation = sqlx::query_as::<_, Reservation>(
            "INSERT INTO reservations (user_id) VALUES ($1) RETURNING id, created_at, user_id",
        )
        .bind(principal.id)
        .fetch_one(&self.db.pool)
        .await?;

        Ok(reservation)
    }

    /// Deletes the reservation and, via cascade, every ticket in it.
    /// All-or-nothing: one session inside the cutoff window rejects the
    /// whole cancellation.
    pub async fn cancel(&self, principal: &AuthUser, reservation_id: i64) -> AppResult<()> {
        let mut tx = self.db.pool.begin().await?;

        let owner: i64 = sqlx::query_scalar("SELECT user_id FROM reservations WHERE id = $1")
            .bind(reservation_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::NotFound {
                resource: "Reservation",
                id: reservation_id,
            })?;

        principal.ensure_owner_or_staff(owner)?;

        let sessions: Vec<(i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT s.id, s.show_time
             FROM tickets t
             JOIN show_sessions s ON s.id = t.show_session_id
             WHERE t.reservation_id = $1
             ORDER BY s.show_time",
        )
        .bind(reservation_id)
        .fetch_all(&mut *tx)
        .await?;

        if let Some(session_id) =
            first_blocking_session(&sessions, Utc::now(), Duration::hours(self.cutoff_hours))
        {
            return Err(AppError::TooLateToCancel {
                session_id,
                cutoff_hours: self.cutoff_hours,
            });
        }

        sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(reservation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        // The cascade reached the tickets, so the cached views are stale
        self.cache.drop_ticket_views().await;

        Ok(())
    }

    pub async fn find(
        &self,
        principal: &AuthUser,
        reservation_id: i64,
    ) -> AppResult<ReservationWithOwner> {
        let reservation = sqlx::query_as::<_, ReservationWithOwner>(
            "SELECT r.id, r.created_at, r.user_id, u.email
             FROM reservations r
             JOIN users u ON u.id = r.user_id
             WHERE r.id = $1",
        )
        .bind(reservation_id)
        .fetch_optional(&self.db.pool)
        .await?
        .ok_or(AppError::NotFound {
            resource: "Reservation",
            id: reservation_id,
        })?;

        principal.ensure_owner_or_staff(reservation.user_id)?;

        Ok(reservation)
    }

    // Everyone sees only their own reservations, staff included
    pub async fn list(
        &self,
        principal: &AuthUser,
        search: Option<&str>,
    ) -> AppResult<Vec<ReservationWithOwner>> {
        let mut sql = String::from(
            "SELECT r.id, r.created_at, r.user_id, u.email
             FROM reservations r
             JOIN users u ON u.id = r.user_id
             WHERE r.user_id = $1",
        );
        if search.is_some() {
            sql.push_str(" AND u.email ILIKE $2");
        }
        sql.push_str(" ORDER BY r.id");

        let mut query = sqlx::query_as::<_, ReservationWithOwner>(&sql).bind(principal.id);
        if let Some(term) = search {
            query = query.bind(contains_pattern(term));
        }

        Ok(query.fetch_all(&self.db.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn empty_reservation_is_never_blocked() {
        assert_eq!(
            first_blocking_session(&[], at_noon(), Duration::hours(5)),
            None
        );
    }

    #[test]
    fn a_session_just_inside_the_window_blocks() {
        let now = at_noon();
        let sessions = [(7, now + Duration::hours(4) + Duration::minutes(59))];
        assert_eq!(
            first_blocking_session(&sessions, now, Duration::hours(5)),
            Some(7)
        );
    }

    #[test]
    fn a_session_just_outside_the_window_does_not_block() {
        let now = at_noon();
        let sessions = [(7, now + Duration::hours(5) + Duration::minutes(1))];
        assert_eq!(
            first_blocking_session(&sessions, now, Duration::hours(5)),
            None
        );
    }

    #[test]
    fn exactly_at_the_cutoff_is_allowed() {
        let now = at_noon();
        let sessions = [(7, now + Duration::hours(5))];
        assert_eq!(
            first_blocking_session(&sessions, now, Duration::hours(5)),
            None
        );
    }

    #[test]
    fn a_session_already_started_blocks() {
        let now = at_noon();
        let sessions = [(3, now - Duration::hours(2))];
        assert_eq!(
            first_blocking_session(&sessions, now, Duration::hours(5)),
            Some(3)
        );
    }

    #[test]
    fn the_earliest_offending_session_is_named() {
        let now = at_noon();
        let sessions = [
            (1, now + Duration::hours(2)),
            (2, now + Duration::hours(3)),
            (3, now + Duration::hours(40)),
        ];
        assert_eq!(
            first_blocking_session(&sessions, now, Duration::hours(5)),
            Some(1)
        );
    }

    #[test]
    fn one_blocking_session_rejects_a_mostly_distant_reservation() {
        let now = at_noon();
        let sessions = [
            (1, now + Duration::hours(30)),
            (2, now + Duration::hours(1)),
            (3, now + Duration::hours(60)),
        ];
        let ordered: Vec<_> = {
            let mut s = sessions.to_vec();
            s.sort_by_key(|(_, t)| *t);
            s
        };
        assert_eq!(
            first_blocking_session(&ordered, now, Duration::hours(5)),
            Some(2)
        );
    }
}
