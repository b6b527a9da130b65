use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, AppResult},
    repository::table_service::{create_row, list_rows},
    schemas::{remove_nulls, serialize_to_map, validate_input, CreateRentIndexInput, RentIndicesQuery},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route(
        "/rent-indices",
        axum::routing::get(list_rent_indices).post(create_rent_index),
    )
}

async fn list_rent_indices(
    State(state): State<AppState>,
    Query(query): Query<RentIndicesQuery>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if !query.include_inactive.unwrap_or(false) {
        filters.insert("is_active".to_string(), Value::Bool(true));
    }
    let rows = list_rows(pool, "rent_indices", Some(&filters), 100, 0, "name", true).await?;
    Ok(Json(json!({ "data": rows })))
}

async fn create_rent_index(
    State(state): State<AppState>,
    Json(payload): Json<CreateRentIndexInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let record = remove_nulls(serialize_to_map(&payload));
    let created = create_row(pool, "rent_indices", &record).await?;
    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
