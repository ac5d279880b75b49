use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::errors::{AppError, AppResult};
use crate::middleware::{AppJson, AuthUser};
use crate::models::PlanetariumDome;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/planetarium-dome", get(list_domes).post(create_dome))
        .route(
            "/planetarium-dome/{id}",
            get(retrieve_dome).put(update_dome).delete(delete_dome),
        )
}

#[derive(Debug, Deserialize, Validate)]
struct DomePayload {
    #[validate(length(min = 1, max = 255))]
    name: String,
    #[validate(range(min = 1))]
    rows: i32,
    #[validate(range(min = 1))]
    seats_in_row: i32,
}

/// Dome as served to clients: capacity is derived on the way out and
/// never stored.
#[derive(Debug, Serialize)]
pub struct DomeResponse {
    pub id: i64,
    pub name: String,
    pub rows: i32,
    pub seats_in_row: i32,
    pub capacity: i64,
}

impl From<PlanetariumDome> for DomeResponse {
    fn from(dome: PlanetariumDome) -> Self {
        let capacity = dome.capacity();
        Self {
            id: dome.id,
            name: dome.name,
            rows: dome.rows,
            seats_in_row: dome.seats_in_row,
            capacity,
        }
    }
}

pub(crate) async fn load_dome(
    db: &crate::database::Database,
    id: i64,
) -> AppResult<PlanetariumDome> {
    sqlx::query_as::<_, PlanetariumDome>(
        r#"SELECT id, name, "rows", seats_in_row FROM planetarium_domes WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(&db.pool)
    .await?
    .ok_or(AppError::NotFound {
        resource: "Planetarium dome",
        id,
    })
}

async fn list_domes(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let domes = sqlx::query_as::<_, PlanetariumDome>(
        r#"SELECT id, name, "rows", seats_in_row FROM planetarium_domes ORDER BY id"#,
    )
    .fetch_all(&state.db.pool)
    .await?;

    let domes: Vec<DomeResponse> = domes.into_iter().map(DomeResponse::from).collect();
    Ok(Json(domes))
}

async fn create_dome(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(payload): AppJson<DomePayload>,
) -> AppResult<impl IntoResponse> {
    user.ensure_staff()?;
    payload.validate()?;

    let dome = sqlx::query_as::<_, PlanetariumDome>(
        r#"INSERT INTO planetarium_domes (name, "rows", seats_in_row)
           VALUES ($1, $2, $3)
           RETURNING id, name, "rows", seats_in_row"#,
    )
    .bind(&payload.name)
    .bind(payload.rows)
    .bind(payload.seats_in_row)
    .fetch_one(&state.db.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(DomeResponse::from(dome))))
}

async fn retrieve_dome(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let dome = load_dome(&state.db, id).await?;
    Ok(Json(DomeResponse::from(dome)))
}

async fn update_dome(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<DomePayload>,
) -> AppResult<impl IntoResponse> {
    user.ensure_staff()?;
    payload.validate()?;

    let dome = sqlx::query_as::<_, PlanetariumDome>(
        r#"UPDATE planetarium_domes
           SET name = $1, "rows" = $2, seats_in_row = $3
           WHERE id = $4
           RETURNING id, name, "rows", seats_in_row"#,
    )
    .bind(&payload.name)
    .bind(payload.rows)
    .bind(payload.seats_in_row)
    .bind(id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or(AppError::NotFound {
        resource: "Planetarium dome",
        id,
    })?;

    Ok(Json(DomeResponse::from(dome)))
}

async fn delete_dome(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    user.ensure_staff()?;

    sqlx::query_scalar::<_, i64>("DELETE FROM planetarium_domes WHERE id = $1 RETURNING id")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or(AppError::NotFound {
            resource: "Planetarium dome",
            id,
        })?;

    // The cascade takes the dome's sessions and their tickets with it
    state.cache.drop_ticket_views().await;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_serializes_with_derived_capacity() {
        let dome = PlanetariumDome {
            id: 3,
            name: "West dome".to_string(),
            rows: 12,
            seats_in_row: 8,
        };
        let value = serde_json::to_value(DomeResponse::from(dome)).unwrap();
        assert_eq!(value["id"], 3);
        assert_eq!(value["rows"], 12);
        assert_eq!(value["seats_in_row"], 8);
        assert_eq!(value["capacity"], 96);
    }
}
