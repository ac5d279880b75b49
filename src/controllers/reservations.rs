use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::AppResult;
use crate::middleware::AuthUser;
use crate::services::ledger::ReservationWithOwner;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/reservation",
            get(list_reservations).post(create_reservation),
        )
        .route(
            "/reservation/{id}",
            get(retrieve_reservation).delete(cancel_reservation),
        )
}

#[derive(Debug, Deserialize)]
struct ReservationSearchParams {
    search: Option<String>,
}

/// Reservation as served to clients: created_at rendered as
/// "YYYY-MM-DD HH:MM:SS", the owner as a bare email.
#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub id: i64,
    pub created_at: String,
    pub user: String,
}

impl From<ReservationWithOwner> for ReservationResponse {
    fn from(reservation: ReservationWithOwner) -> Self {
        Self {
            id: reservation.id,
            created_at: reservation
                .created_at
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            user: reservation.email,
        }
    }
}

async fn list_reservations(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<ReservationSearchParams>,
) -> AppResult<impl IntoResponse> {
    let term = params.search.as_deref().filter(|s| !s.is_empty());
    let reservations = state.ledger.list(&user, term).await?;

    let response: Vec<ReservationResponse> = reservations
        .into_iter()
        .map(ReservationResponse::from)
        .collect();
    Ok(Json(response))
}

// POST /api/reservation takes no body: the reservation is opened for the
// calling principal and stamped server-side
async fn create_reservation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let reservation = state.ledger.open(&user).await?;

    let response = ReservationResponse {
        id: reservation.id,
        created_at: reservation
            .created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        user: user.email,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

async fn retrieve_reservation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let reservation = state.ledger.find(&user, id).await?;
    Ok(Json(ReservationResponse::from(reservation)))
}

async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    state.ledger.cancel(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn created_at_is_rendered_without_sub_seconds() {
        let reservation = ReservationWithOwner {
            id: 8,
            created_at: Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 5).unwrap(),
            user_id: 2,
            email: "alice@example.com".to_string(),
        };
        let value = serde_json::to_value(ReservationResponse::from(reservation)).unwrap();
        assert_eq!(value["created_at"], "2026-03-14 12:00:05");
        assert_eq!(value["user"], "alice@example.com");
        assert!(value.get("user_id").is_none());
    }
}
