use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::HashSet;

use crate::{
    error::{AppError, AppResult},
    repository::table_service::{count_rows, create_row, delete_row, get_row, list_rows, update_row},
    schemas::{
        clamp_limit, remove_nulls, serialize_to_map, validate_input, CreatePropertyInput,
        PropertiesQuery, PropertyPath, UpdatePropertyInput,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/properties",
            axum::routing::get(list_properties).post(create_property),
        )
        .route(
            "/properties/{property_id}",
            axum::routing::get(get_property)
                .patch(update_property)
                .delete(delete_property),
        )
}

async fn list_properties(
    State(state): State<AppState>,
    Query(query): Query<PropertiesQuery>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(search) = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        filters.insert(
            "name__ilike".to_string(),
            Value::String(format!("%{search}%")),
        );
    }

    let mut rows = list_rows(
        pool,
        "properties",
        Some(&filters),
        clamp_limit(query.limit),
        0,
        "name",
        true,
    )
    .await?;

    let occupied = occupied_property_ids(pool).await?;
    for row in &mut rows {
        if let Some(obj) = row.as_object_mut() {
            let id = obj
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            obj.insert("occupied".to_string(), Value::Bool(occupied.contains(&id)));
        }
    }
    Ok(Json(json!({ "data": rows })))
}

async fn create_property(
    State(state): State<AppState>,
    Json(payload): Json<CreatePropertyInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let record = remove_nulls(serialize_to_map(&payload));
    let created = create_row(pool, "properties", &record).await?;
    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_property(
    State(state): State<AppState>,
    Path(path): Path<PropertyPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let mut record = get_row(pool, "properties", &path.property_id, "id").await?;

    let occupied = occupied_property_ids(pool).await?;
    if let Some(obj) = record.as_object_mut() {
        obj.insert(
            "occupied".to_string(),
            Value::Bool(occupied.contains(&path.property_id)),
        );
    }
    Ok(Json(record))
}

async fn update_property(
    State(state): State<AppState>,
    Path(path): Path<PropertyPath>,
    Json(payload): Json<UpdatePropertyInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let patch = remove_nulls(serialize_to_map(&payload));
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    let updated = update_row(pool, "properties", &path.property_id, &patch, "id").await?;
    Ok(Json(updated))
}

async fn delete_property(
    State(state): State<AppState>,
    Path(path): Path<PropertyPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;

    let mut lease_filter = Map::new();
    lease_filter.insert(
        "property_id".to_string(),
        Value::String(path.property_id.clone()),
    );
    let lease_count = count_rows(pool, "leases", Some(&lease_filter)).await?;
    if lease_count > 0 {
        return Err(AppError::Conflict(format!(
            "Property has {lease_count} lease(s); remove them first."
        )));
    }

    let deleted = delete_row(pool, "properties", &path.property_id, "id").await?;
    Ok(Json(deleted))
}

/// Ids of properties currently tenanted: an active lease whose end date has
/// not passed counts, anything else leaves the property available.
async fn occupied_property_ids(pool: &sqlx::PgPool) -> AppResult<HashSet<String>> {
    let today = Utc::now().date_naive();
    let mut filters = Map::new();
    filters.insert("is_active".to_string(), Value::Bool(true));
    filters.insert(
        "ends_on__gte".to_string(),
        Value::String(today.format("%Y-%m-%d").to_string()),
    );
    let leases = list_rows(pool, "leases", Some(&filters), 1000, 0, "created_at", false).await?;
    Ok(leases
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| obj.get("property_id"))
        .filter_map(Value::as_str)
        .map(ToOwned::to_owned)
        .collect())
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
