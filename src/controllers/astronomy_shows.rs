use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use std::collections::BTreeMap;
use std::sync::Arc;
use validator::Validate;

use crate::cache::tickets::contains_pattern;
use crate::errors::{AppError, AppResult};
use crate::middleware::{AppJson, AuthUser};
use crate::models::{AstronomyShow, ShowTheme};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/astronomy-show", get(list_shows).post(create_show))
        .route(
            "/astronomy-show/{id}",
            get(retrieve_show).put(update_show).delete(delete_show),
        )
}

#[derive(Debug, Deserialize, Validate)]
struct AstronomyShowPayload {
    #[validate(length(min = 1, max = 255))]
    title: String,
    description: String,
    #[serde(default)]
    show_theme: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    search: Option<String>,
}

impl SearchParams {
    fn term(&self) -> Option<&str> {
        self.search.as_deref().filter(|s| !s.is_empty())
    }
}

/// Listing shape: themes flattened to their names.
#[derive(Debug, Serialize)]
pub struct AstronomyShowListItem {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub show_theme: Vec<String>,
}

/// Retrieve shape: themes nested as full objects.
#[derive(Debug, Serialize)]
pub struct AstronomyShowDetail {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub show_theme: Vec<ShowTheme>,
}

/// Write-response shape: themes as bare ids, mirroring the payload.
#[derive(Debug, Serialize)]
struct AstronomyShowWriteResponse {
    id: i64,
    title: String,
    description: String,
    show_theme: Vec<i64>,
}

pub(crate) async fn load_show_detail(
    db: &crate::database::Database,
    id: i64,
) -> AppResult<AstronomyShowDetail> {
    let show = sqlx::query_as::<_, AstronomyShow>(
        "SELECT id, title, description FROM astronomy_shows WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&db.pool)
    .await?
    .ok_or(AppError::NotFound {
        resource: "Astronomy show",
        id,
    })?;

    let themes = sqlx::query_as::<_, ShowTheme>(
        "SELECT st.id, st.name
         FROM show_themes st
         JOIN astronomy_show_themes m ON m.show_theme_id = st.id
         WHERE m.astronomy_show_id = $1
         ORDER BY st.id",
    )
    .bind(id)
    .fetch_all(&db.pool)
    .await?;

    Ok(AstronomyShowDetail {
        id: show.id,
        title: show.title,
        description: show.description,
        show_theme: themes,
    })
}

// Replaces the show's theme set wholesale. Ids must all refer to existing
// themes; duplicates in the payload collapse to one link.
async fn attach_themes(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    show_id: i64,
    theme_ids: &[i64],
) -> AppResult<()> {
    if theme_ids.is_empty() {
        return Ok(());
    }

    let mut ids = theme_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    let known: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM show_themes WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_one(&mut **tx)
        .await?;
    if known != ids.len() as i64 {
        return Err(AppError::Validation(
            "show_theme contains an unknown theme id.".to_string(),
        ));
    }

    sqlx::query(
        "INSERT INTO astronomy_show_themes (astronomy_show_id, show_theme_id)
         SELECT $1, theme_id FROM UNNEST($2::BIGINT[]) AS theme_id
         ON CONFLICT DO NOTHING",
    )
    .bind(show_id)
    .bind(&ids)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

// GET /api/astronomy-show?search=
// The search term matches title or description, case-insensitively
async fn list_shows(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(params): Query<SearchParams>,
) -> AppResult<impl IntoResponse> {
    let mut sql = String::from(
        "SELECT a.id, a.title, a.description, st.name AS theme_name
         FROM astronomy_shows a
         LEFT JOIN astronomy_show_themes m ON m.astronomy_show_id = a.id
         LEFT JOIN show_themes st ON st.id = m.show_theme_id",
    );
    if params.term().is_some() {
        sql.push_str(" WHERE a.title ILIKE $1 OR a.description ILIKE $1");
    }
    sql.push_str(" ORDER BY a.id, st.id");

    let mut query = sqlx::query(&sql);
    if let Some(term) = params.term() {
        query = query.bind(contains_pattern(term));
    }
    let rows = query.fetch_all(&state.db.pool).await?;

    let mut grouped: BTreeMap<i64, (String, String, Vec<String>)> = BTreeMap::new();
    for row in rows {
        let id: i64 = row.get("id");
        let entry = grouped
            .entry(id)
            .or_insert_with(|| (row.get("title"), row.get("description"), Vec::new()));
        if let Some(name) = row.get::<Option<String>, _>("theme_name") {
            entry.2.push(name);
        }
    }

    let shows: Vec<AstronomyShowListItem> = grouped
        .into_iter()
        .map(|(id, (title, description, show_theme))| AstronomyShowListItem {
            id,
            title,
            description,
            show_theme,
        })
        .collect();

    Ok(Json(shows))
}

async fn create_show(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(payload): AppJson<AstronomyShowPayload>,
) -> AppResult<impl IntoResponse> {
    user.ensure_staff()?;
    payload.validate()?;

    let mut tx = state.db.pool.begin().await?;

    let show = sqlx::query_as::<_, AstronomyShow>(
        "INSERT INTO astronomy_shows (title, description)
         VALUES ($1, $2)
         RETURNING id, title, description",
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .fetch_one(&mut *tx)
    .await?;

    attach_themes(&mut tx, show.id, &payload.show_theme).await?;

    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(AstronomyShowWriteResponse {
            id: show.id,
            title: show.title,
            description: show.description,
            show_theme: payload.show_theme,
        }),
    ))
}

async fn retrieve_show(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let detail = load_show_detail(&state.db, id).await?;
    Ok(Json(detail))
}

async fn update_show(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<AstronomyShowPayload>,
) -> AppResult<impl IntoResponse> {
    user.ensure_staff()?;
    payload.validate()?;

    let mut tx = state.db.pool.begin().await?;

    let show = sqlx::query_as::<_, AstronomyShow>(
        "UPDATE astronomy_shows
         SET title = $1, description = $2
         WHERE id = $3
         RETURNING id, title, description",
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound {
        resource: "Astronomy show",
        id,
    })?;

    sqlx::query("DELETE FROM astronomy_show_themes WHERE astronomy_show_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    attach_themes(&mut tx, id, &payload.show_theme).await?;

    tx.commit().await?;

    Ok(Json(AstronomyShowWriteResponse {
        id: show.id,
        title: show.title,
        description: show.description,
        show_theme: payload.show_theme,
    }))
}

async fn delete_show(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    user.ensure_staff()?;

    sqlx::query_scalar::<_, i64>("DELETE FROM astronomy_shows WHERE id = $1 RETURNING id")
        .bind(id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or(AppError::NotFound {
            resource: "Astronomy show",
            id,
        })?;

    // Sessions under the show cascade away, and their tickets with them
    state.cache.drop_ticket_views().await;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_search_is_ignored() {
        let params = SearchParams {
            search: Some(String::new()),
        };
        assert_eq!(params.term(), None);

        let params = SearchParams {
            search: Some("nebula".to_string()),
        };
        assert_eq!(params.term(), Some("nebula"));
    }

    #[test]
    fn list_item_flattens_themes_to_names() {
        let item = AstronomyShowListItem {
            id: 1,
            title: "Wonders of Orion".to_string(),
            description: "A tour of the nebula.".to_string(),
            show_theme: vec!["Deep sky".to_string()],
        };
        let value = serde_json::to_value(item).unwrap();
        assert_eq!(value["show_theme"], serde_json::json!(["Deep sky"]));
    }

    #[test]
    fn detail_nests_full_theme_objects() {
        let detail = AstronomyShowDetail {
            id: 1,
            title: "Wonders of Orion".to_string(),
            description: "A tour of the nebula.".to_string(),
            show_theme: vec![ShowTheme {
                id: 4,
                name: "Deep sky".to_string(),
            }],
        };
        let value = serde_json::to_value(detail).unwrap();
        assert_eq!(value["show_theme"][0]["id"], 4);
        assert_eq!(value["show_theme"][0]["name"], "Deep sky");
    }
}
