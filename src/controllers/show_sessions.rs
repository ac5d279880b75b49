use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::sync::Arc;

use crate::controllers::astronomy_shows::{load_show_detail, AstronomyShowDetail};
use crate::controllers::domes::{load_dome, DomeResponse};
use crate::errors::{AppError, AppResult};
use crate::middleware::{AppJson, AuthUser};
use crate::models::ShowSession;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/show-session", get(list_sessions).post(create_session))
        .route(
            "/show-session/{id}",
            get(retrieve_session)
                .put(update_session)
                .delete(delete_session),
        )
}

#[derive(Debug, Deserialize)]
struct ShowSessionPayload {
    astronomy_show: i64,
    planetarium_dome: i64,
    show_time: DateTime<Utc>,
}

/// Listing shape: both relations flattened to display names.
#[derive(Debug, FromRow, Serialize)]
pub struct ShowSessionListItem {
    pub id: i64,
    pub astronomy_show: String,
    pub planetarium_dome: String,
    pub show_time: DateTime<Utc>,
}

/// Retrieve shape: both relations nested in full.
#[derive(Debug, Serialize)]
pub struct ShowSessionDetail {
    pub id: i64,
    pub astronomy_show: AstronomyShowDetail,
    pub planetarium_dome: DomeResponse,
    pub show_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ShowSessionWriteResponse {
    id: i64,
    astronomy_show: i64,
    planetarium_dome: i64,
    show_time: DateTime<Utc>,
}

impl From<ShowSession> for ShowSessionWriteResponse {
    fn from(session: ShowSession) -> Self {
        Self {
            id: session.id,
            astronomy_show: session.astronomy_show_id,
            planetarium_dome: session.planetarium_dome_id,
            show_time: session.show_time,
        }
    }
}

pub(crate) async fn load_session_detail(
    db: &crate::database::Database,
    id: i64,
) -> AppResult<ShowSessionDetail> {
    let session = sqlx::query_as::<_, ShowSession>(
        "SELECT id, astronomy_show_id, planetarium_dome_id, show_time
         FROM show_sessions
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&db.pool)
    .await?
    .ok_or(AppError::NotFound {
        resource: "Show session",
        id,
    })?;

    let astronomy_show = load_show_detail(db, session.astronomy_show_id).await?;
    let dome = load_dome(db, session.planetarium_dome_id).await?;

    Ok(ShowSessionDetail {
        id: session.id,
        astronomy_show,
        planetarium_dome: DomeResponse::from(dome),
        show_time: session.show_time,
    })
}

async fn ensure_show_exists(db: &crate::database::Database, id: i64) -> AppResult<()> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM astronomy_shows WHERE id = $1)")
            .bind(id)
            .fetch_one(&db.pool)
            .await?;
    if exists {
        Ok(())
    } else {
        Err(AppError::NotFound {
            resource: "Astronomy show",
            id,
        })
    }
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let sessions = sqlx::query_as::<_, ShowSessionListItem>(
        "SELECT s.id, a.title AS astronomy_show, d.name AS planetarium_dome, s.show_time
         FROM show_sessions s
         JOIN astronomy_shows a ON a.id = s.astronomy_show_id
         JOIN planetarium_domes d ON d.id = s.planetarium_dome_id
         ORDER BY s.id",
    )
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(sessions))
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(payload): AppJson<ShowSessionPayload>,
) -> AppResult<impl IntoResponse> {
    user.ensure_staff()?;

    ensure_show_exists(&state.db, payload.astronomy_show).await?;
    load_dome(&state.db, payload.planetarium_dome).await?;

    let session = sqlx::query_as::<_, ShowSession>(
        "INSERT INTO show_sessions (astronomy_show_id, planetarium_dome_id, show_time)
         VALUES ($1, $2, $3)
         RETURNING id, astronomy_show_id, planetarium_dome_id, show_time",
    )
    .bind(payload.astronomy_show)
    .bind(payload.planetarium_dome)
    .bind(payload.show_time)
    .fetch_one(&state.db.pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ShowSessionWriteResponse::from(session)),
    ))
}

async fn retrieve_session(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let detail = load_session_detail(&state.db, id).await?;
    Ok(Json(detail))
}

async fn update_session(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<ShowSessionPayload>,
) -> AppResult<impl IntoResponse> {
    user.ensure_staff()?;

    ensure_show_exists(&state.db, payload.astronomy_show).await?;
    load_dome(&state.db, payload.planetarium_dome).await?;

    let session = sqlx::query_as::<_, ShowSession>(
        "UPDATE show_sessions
         SET astronomy_show_id = $1, planetarium_dome_id = $2, show_time = $3
         WHERE id = $4
         RETURNING id, astronomy_show_id, planetarium_dome_id, show_time",
    )
    .bind(payload.astronomy_show)
    .bind(payload.planetarium_dome)
    .bind(payload.show_time)
    .bind(id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or(AppError::NotFound {
        resource: "Show session",
        id,
    })?;

    Ok(Json(ShowSessionWriteResponse::from(session)))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    user.ensure_staff()?;

    sqlx::query_scalar::<_, i64>("DELETE FROM show_sessions WHERE id = $1 RETURNING id")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or(AppError::NotFound {
            resource: "Show session",
            id,
        })?;

    // Tickets for the session are gone via cascade
    state.cache.drop_ticket_views().await;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn write_response_exposes_relation_ids_under_payload_names() {
        let session = ShowSession {
            id: 11,
            astronomy_show_id: 2,
            planetarium_dome_id: 5,
            show_time: Utc.with_ymd_and_hms(2026, 9, 1, 19, 30, 0).unwrap(),
        };
        let value = serde_json::to_value(ShowSessionWriteResponse::from(session)).unwrap();
        assert_eq!(value["astronomy_show"], 2);
        assert_eq!(value["planetarium_dome"], 5);
        assert!(value.get("astronomy_show_id").is_none());
    }
}
