use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::errors::{AppError, AppResult};
use crate::middleware::{AppJson, AuthUser};
use crate::models::ShowTheme;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/show-theme", get(list_themes).post(create_theme))
        .route(
            "/show-theme/{id}",
            get(retrieve_theme).put(update_theme).delete(delete_theme),
        )
}

#[derive(Debug, Deserialize, Validate)]
struct ShowThemePayload {
    #[validate(length(min = 1, max = 127))]
    name: String,
}

async fn list_themes(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let themes = sqlx::query_as::<_, ShowTheme>("SELECT id, name FROM show_themes ORDER BY id")
        .fetch_all(&state.db.pool)
        .await?;
    Ok(Json(themes))
}

async fn create_theme(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(payload): AppJson<ShowThemePayload>,
) -> AppResult<impl IntoResponse> {
    user.ensure_staff()?;
    payload.validate()?;

    let theme = sqlx::query_as::<_, ShowTheme>(
        "INSERT INTO show_themes (name) VALUES ($1) RETURNING id, name",
    )
    .bind(&payload.name)
    .fetch_one(&state.db.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(theme)))
}

async fn retrieve_theme(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let theme = sqlx::query_as::<_, ShowTheme>("SELECT id, name FROM show_themes WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or(AppError::NotFound {
            resource: "Show theme",
            id,
        })?;
    Ok(Json(theme))
}

async fn update_theme(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<ShowThemePayload>,
) -> AppResult<impl IntoResponse> {
    user.ensure_staff()?;
    payload.validate()?;

    let theme = sqlx::query_as::<_, ShowTheme>(
        "UPDATE show_themes SET name = $1 WHERE id = $2 RETURNING id, name",
    )
    .bind(&payload.name)
    .bind(id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or(AppError::NotFound {
        resource: "Show theme",
        id,
    })?;

    Ok(Json(theme))
}

async fn delete_theme(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    user.ensure_staff()?;

    sqlx::query_scalar::<_, i64>("DELETE FROM show_themes WHERE id = $1 RETURNING id")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or(AppError::NotFound {
            resource: "Show theme",
            id,
        })?;

    Ok(StatusCode::NO_CONTENT)
}
