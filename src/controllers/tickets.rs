use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::TicketViewFilter;
use crate::controllers::reservations::ReservationResponse;
use crate::controllers::show_sessions::{load_session_detail, ShowSessionDetail};
use crate::errors::AppResult;
use crate::middleware::{AppJson, AuthUser};
use crate::models::Ticket;
use crate::services::SeatRequest;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ticket", get(list_tickets).post(create_ticket))
        .route(
            "/ticket/{id}",
            get(retrieve_ticket).put(update_ticket).delete(delete_ticket),
        )
}

#[derive(Debug, Deserialize)]
struct TicketPayload {
    row: i32,
    seat: i32,
    show_session: i64,
    reservation: i64,
}

impl TicketPayload {
    fn as_request(&self) -> SeatRequest {
        SeatRequest {
            row: self.row,
            seat: self.seat,
            show_session: self.show_session,
            reservation: self.reservation,
        }
    }
}

/// Write-response shape: relations as bare ids, mirroring the payload.
#[derive(Debug, Serialize)]
struct TicketWriteResponse {
    id: i64,
    row: i32,
    seat: i32,
    show_session: i64,
    reservation: i64,
}

impl From<Ticket> for TicketWriteResponse {
    fn from(ticket: Ticket) -> Self {
        Self {
            id: ticket.id,
            row: ticket.row,
            seat: ticket.seat,
            show_session: ticket.show_session_id,
            reservation: ticket.reservation_id,
        }
    }
}

/// Retrieve shape: session and reservation nested in full.
#[derive(Debug, Serialize)]
struct TicketDetail {
    id: i64,
    row: i32,
    seat: i32,
    show_session: ShowSessionDetail,
    reservation: ReservationResponse,
}

// GET /api/ticket?title=&email=
//
// Serves the cached view when present; on a miss the freshly built page is
// written back under the filter's key. X-Cache reports which path ran.
async fn list_tickets(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(filter): Query<TicketViewFilter>,
) -> AppResult<Response> {
    if let Ok(Some(cached)) = state.cache.get_cached_ticket_view(&filter).await {
        return Ok(Response::builder()
            .header("Content-Type", "application/json")
            .header("X-Cache", "HIT")
            .body(Body::from(cached))
            .unwrap());
    }

    let items = state.cache.load_ticket_view_from_db(&filter).await?;

    if let Ok(json_str) = serde_json::to_string(&items) {
        if let Err(e) = state.cache.cache_ticket_view(&filter, &json_str).await {
            tracing::error!("Failed to cache ticket view: {:?}", e);
        }

        return Ok(Response::builder()
            .header("Content-Type", "application/json")
            .header("X-Cache", "MISS")
            .body(Body::from(json_str))
            .unwrap());
    }

    Ok(Json(items).into_response())
}

async fn create_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(payload): AppJson<TicketPayload>,
) -> AppResult<impl IntoResponse> {
    let ticket = state.allocator.reserve(&user, &payload.as_request()).await?;
    Ok((StatusCode::CREATED, Json(TicketWriteResponse::from(ticket))))
}

async fn retrieve_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let ticket = state.allocator.find(id).await?;

    // The ledger enforces owner-or-staff on the ticket's reservation
    let reservation =
        ReservationResponse::from(state.ledger.find(&user, ticket.reservation_id).await?);
    let show_session = load_session_detail(&state.db, ticket.show_session_id).await?;

    Ok(Json(TicketDetail {
        id: ticket.id,
        row: ticket.row,
        seat: ticket.seat,
        show_session,
        reservation,
    }))
}

async fn update_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<TicketPayload>,
) -> AppResult<impl IntoResponse> {
    let ticket = state
        .allocator
        .update(&user, id, &payload.as_request())
        .await?;
    Ok(Json(TicketWriteResponse::from(ticket)))
}

async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    state.allocator.release(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::FromRequest;
    use crate::errors::AppError;

    #[test]
    fn write_response_exposes_relation_ids_under_payload_names() {
        let ticket = Ticket {
            id: 21,
            row: 4,
            seat: 6,
            show_session_id: 2,
            reservation_id: 9,
        };
        let value = serde_json::to_value(TicketWriteResponse::from(ticket)).unwrap();
        assert_eq!(value["show_session"], 2);
        assert_eq!(value["reservation"], 9);
        assert!(value.get("show_session_id").is_none());
    }

    #[test]
    fn payload_converts_to_a_seat_request_field_for_field() {
        let payload = TicketPayload {
            row: 4,
            seat: 6,
            show_session: 2,
            reservation: 9,
        };
        let request = payload.as_request();
        assert_eq!(request.row, 4);
        assert_eq!(request.seat, 6);
        assert_eq!(request.show_session, 2);
        assert_eq!(request.reservation, 9);
    }

    #[tokio::test]
    async fn a_body_missing_a_field_is_rejected_as_validation() {
        let request = axum::http::Request::builder()
            .method(axum::http::Method::POST)
            .uri("/ticket")
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"row": 1, "seat": 1, "show_session": 1}"#))
            .unwrap();

        let err = AppJson::<TicketPayload>::from_request(request, &())
            .await
            .err()
            .expect("a payload without reservation must not parse");

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("reservation"));
    }
}
