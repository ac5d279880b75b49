use crate::cache::CacheService;
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::models::Ticket;

/// One seat claim against a session, on behalf of a reservation.
#[derive(Debug, Clone)]
pub struct SeatRequest {
    pub row: i32,
    pub seat: i32,
    pub show_session: i64,
    pub reservation: i64,
}

#[derive(sqlx::FromRow)]
struct SessionDims {
    rows: i32,
    seats_in_row: i32,
}

// Bounds are strict on both ends: row 0 and row == rows are both rejected,
// so the highest-numbered row and seat in every dome are never bookable.
pub fn check_seat_bounds(row: i32, seat: i32, rows: i32, seats_in_row: i32) -> AppResult<()> {
    if !(0 < row && row < rows) {
        return Err(AppError::Validation(format!("Row {row} is out of range.")));
    }
    if !(0 < seat && seat < seats_in_row) {
        return Err(AppError::Validation(format!("Seat {seat} is out of range.")));
    }
    Ok(())
}

fn map_unique_violation(err: sqlx::Error, request: &SeatRequest) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AppError::SeatTaken {
            row: request.row,
            seat: request.seat,
        },
        _ => AppError::Database(err),
    }
}

/// Hands out seats. Seat uniqueness is scoped per session: the same
/// (row, seat) may be sold once for every session. The EXISTS pre-check
/// gives early feedback; the unique constraint on
/// (show_session_id, "row", seat) settles races.
#[derive(Clone)]
pub struct SeatAllocator {
    db: Database,
    cache: CacheService,
}

impl SeatAllocator {
    pub fn new(db: Database, cache: CacheService) -> Self {
        Self { db, cache }
    }

    pub async fn reserve(&self, principal: &AuthUser, request: &SeatRequest) -> AppResult<Ticket> {
        let owner = self.reservation_owner(request.reservation).await?;
        principal.ensure_owner_or_staff(owner)?;

        let dims = self.session_dims(request.show_session).await?;
        check_seat_bounds(request.row, request.seat, dims.rows, dims.seats_in_row)?;

        if self.seat_is_taken(request, None).await? {
            return Err(AppError::SeatTaken {
                row: request.row,
                seat: request.seat,
            });
        }

        let ticket = sqlx::query_as::<_, Ticket>(
            r#"INSERT INTO tickets ("row", seat, show_session_id, reservation_id)
               VALUES ($1, $2, $3, $4)
               RETURNING id, "row", seat, show_session_id, reservation_id"#,
        )
        .bind(request.row)
        .bind(request.seat)
        .bind(request.show_session)
        .bind(request.reservation)
        .fetch_one(&self.db.pool)
        .await
        .map_err(|e| map_unique_violation(e, request))?;

        self.cache.drop_ticket_views().await;

        Ok(ticket)
    }

    // Full replacement of every field, never a partial patch
    pub async fn update(
        &self,
        principal: &AuthUser,
        ticket_id: i64,
        request: &SeatRequest,
    ) -> AppResult<Ticket> {
        let current = self.find(ticket_id).await?;

        let owner = self.reservation_owner(current.reservation_id).await?;
        principal.ensure_owner_or_staff(owner)?;

        // Re-pointing the ticket at another reservation needs rights on
        // that reservation as well
        if request.reservation != current.reservation_id {
            let new_owner = self.reservation_owner(request.reservation).await?;
            principal.ensure_owner_or_staff(new_owner)?;
        }

        let dims = self.session_dims(request.show_session).await?;
        check_seat_bounds(request.row, request.seat, dims.rows, dims.seats_in_row)?;

        if self.seat_is_taken(request, Some(ticket_id)).await? {
            return Err(AppError::SeatTaken {
                row: request.row,
                seat: request.seat,
            });
        }

        let ticket = sqlx::query_as::<_, Ticket>(
            r#"UPDATE tickets
               SET "row" = $1, seat = $2, show_session_id = $3, reservation_id = $4
               WHERE id = $5
               RETURNING id, "row", seat, show_session_id, reservation_id"#,
        )
        .bind(request.row)
        .bind(request.seat)
        .bind(request.show_session)
        .bind(request.reservation)
        .bind(ticket_id)
        .fetch_one(&self.db.pool)
        .await
        .map_err(|e| map_unique_violation(e, request))?;

        self.cache.drop_ticket_views().await;

        Ok(ticket)
    }

    pub async fn release(&self, principal: &AuthUser, ticket_id: i64) -> AppResult<()> {
        let ticket = self.find(ticket_id).await?;

        let owner = self.reservation_owner(ticket.reservation_id).await?;
        principal.ensure_owner_or_staff(owner)?;

        sqlx::query("DELETE FROM tickets WHERE id = $1")
            .bind(ticket_id)
            .execute(&self.db.pool)
            .await?;

        self.cache.drop_ticket_views().await;

        Ok(())
    }

    pub async fn find(&self, ticket_id: i64) -> AppResult<Ticket> {
        sqlx::query_as::<_, Ticket>(
            r#"SELECT id, "row", seat, show_session_id, reservation_id
               FROM tickets
               WHERE id = $1"#,
        )
        .bind(ticket_id)
        .fetch_optional(&self.db.pool)
        .await?
        .ok_or(AppError::NotFound {
            resource: "Ticket",
            id: ticket_id,
        })
    }

    async fn reservation_owner(&self, reservation_id: i64) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT user_id FROM reservations WHERE id = $1")
            .bind(reservation_id)
            .fetch_optional(&self.db.pool)
            .await?
            .ok_or(AppError::NotFound {
                resource: "Reservation",
                id: reservation_id,
            })
    }

    async fn session_dims(&self, session_id: i64) -> AppResult<SessionDims> {
        sqlx::query_as::<_, SessionDims>(
            r#"SELECT d."rows", d.seats_in_row
               FROM show_sessions s
               JOIN planetarium_domes d ON d.id = s.planetarium_dome_id
               WHERE s.id = $1"#,
        )
        .bind(session_id)
        .fetch_optional(&self.db.pool)
        .await?
        .ok_or(AppError::NotFound {
            resource: "Show session",
            id: session_id,
        })
    }

    async fn seat_is_taken(
        &self,
        request: &SeatRequest,
        exclude_ticket: Option<i64>,
    ) -> AppResult<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"SELECT EXISTS (
                   SELECT 1 FROM tickets
                   WHERE show_session_id = $1
                     AND "row" = $2
                     AND seat = $3
                     AND ($4::BIGINT IS NULL OR id <> $4)
               )"#,
        )
        .bind(request.show_session)
        .bind(request.row)
        .bind(request.seat)
        .bind(exclude_ticket)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn interior_seats_pass() {
        assert!(check_seat_bounds(1, 1, 10, 10).is_ok());
        assert!(check_seat_bounds(9, 9, 10, 10).is_ok());
        assert!(check_seat_bounds(5, 3, 10, 10).is_ok());
    }

    #[test]
    fn zero_and_negative_are_rejected() {
        assert!(check_seat_bounds(0, 1, 10, 10).is_err());
        assert!(check_seat_bounds(1, 0, 10, 10).is_err());
        assert!(check_seat_bounds(-3, 1, 10, 10).is_err());
    }

    #[test]
    fn the_last_row_and_seat_are_excluded() {
        assert!(check_seat_bounds(10, 1, 10, 10).is_err());
        assert!(check_seat_bounds(1, 10, 10, 10).is_err());
    }

    #[test]
    fn a_two_by_two_dome_has_exactly_one_bookable_seat() {
        assert!(check_seat_bounds(1, 1, 2, 2).is_ok());
        assert!(check_seat_bounds(0, 1, 2, 2).is_err());
        assert!(check_seat_bounds(2, 1, 2, 2).is_err());
        assert!(check_seat_bounds(1, 2, 2, 2).is_err());
    }

    #[test]
    fn row_is_checked_before_seat() {
        let err = check_seat_bounds(0, 0, 10, 10).unwrap_err();
        assert_eq!(err.to_string(), "Row 0 is out of range.");
    }

    #[test]
    fn messages_carry_the_offending_value() {
        let err = check_seat_bounds(12, 1, 10, 10).unwrap_err();
        assert_eq!(err.to_string(), "Row 12 is out of range.");

        let err = check_seat_bounds(1, 42, 10, 40).unwrap_err();
        assert_eq!(err.to_string(), "Seat 42 is out of range.");
    }

    // Stand-in for the driver error raised when the tickets constraint
    // fires under two racing writers.
    #[derive(Debug)]
    struct DuplicateSeat;

    impl std::fmt::Display for DuplicateSeat {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(
                f,
                "duplicate key value violates unique constraint \"uq_ticket_seat_per_session\""
            )
        }
    }

    impl std::error::Error for DuplicateSeat {}

    impl sqlx::error::DatabaseError for DuplicateSeat {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint \"uq_ticket_seat_per_session\""
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::UniqueViolation
        }
    }

    fn request_for(row: i32, seat: i32) -> SeatRequest {
        SeatRequest {
            row,
            seat,
            show_session: 1,
            reservation: 1,
        }
    }

    #[test]
    fn a_unique_violation_becomes_seat_taken() {
        let err = map_unique_violation(
            sqlx::Error::Database(Box::new(DuplicateSeat)),
            &request_for(3, 7),
        );
        assert!(matches!(err, AppError::SeatTaken { row: 3, seat: 7 }));
        assert_eq!(err.to_string(), "This seat is already taken.");
    }

    #[test]
    fn other_database_errors_pass_through() {
        let err = map_unique_violation(sqlx::Error::RowNotFound, &request_for(3, 7));
        assert!(matches!(err, AppError::Database(_)));
    }

    proptest! {
        #[test]
        fn bounds_accept_exactly_the_strict_interior(
            row in -5i32..600,
            seat in -5i32..600,
            rows in 2i32..500,
            seats_in_row in 2i32..500,
        ) {
            let accepted = check_seat_bounds(row, seat, rows, seats_in_row).is_ok();
            let interior = 0 < row && row < rows && 0 < seat && seat < seats_in_row;
            prop_assert_eq!(accepted, interior);
        }
    }
}
