use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, AppResult},
    repository::table_service::{count_rows, create_row, delete_row, get_row, list_rows, update_row},
    schemas::{
        clamp_limit, remove_nulls, serialize_to_map, validate_input, CreateTenantInput, TenantPath,
        TenantsQuery, UpdateTenantInput,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/tenants",
            axum::routing::get(list_tenants).post(create_tenant),
        )
        .route(
            "/tenants/{tenant_id}",
            axum::routing::get(get_tenant)
                .patch(update_tenant)
                .delete(delete_tenant),
        )
}

async fn list_tenants(
    State(state): State<AppState>,
    Query(query): Query<TenantsQuery>,
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
            "last_name__ilike".to_string(),
            Value::String(format!("%{search}%")),
        );
    }

    let rows = list_rows(
        pool,
        "tenants",
        Some(&filters),
        clamp_limit(query.limit),
        0,
        "last_name",
        true,
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn create_tenant(
    State(state): State<AppState>,
    Json(payload): Json<CreateTenantInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    validate_national_id(&payload.national_id)?;
    let pool = db_pool(&state)?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    trim_string_fields(&mut record);
    // duplicate national_id hits the unique index and surfaces as a 409
    let created = create_row(pool, "tenants", &record).await?;
    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let record = get_row(pool, "tenants", &path.tenant_id, "id").await?;
    Ok(Json(record))
}

async fn update_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    Json(payload): Json<UpdateTenantInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    if let Some(national_id) = payload.national_id.as_deref() {
        validate_national_id(national_id)?;
    }
    let pool = db_pool(&state)?;

    let mut patch = remove_nulls(serialize_to_map(&payload));
    trim_string_fields(&mut patch);
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    let updated = update_row(pool, "tenants", &path.tenant_id, &patch, "id").await?;
    Ok(Json(updated))
}

async fn delete_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;

    let mut lease_filter = Map::new();
    lease_filter.insert(
        "tenant_id".to_string(),
        Value::String(path.tenant_id.clone()),
    );
    let lease_count = count_rows(pool, "leases", Some(&lease_filter)).await?;
    if lease_count > 0 {
        return Err(AppError::Conflict(format!(
            "Tenant has {lease_count} lease(s); remove them first."
        )));
    }

    let deleted = delete_row(pool, "tenants", &path.tenant_id, "id").await?;
    Ok(Json(deleted))
}

/// National id must be 7 or 8 digits, nothing else (DNI format).
fn validate_national_id(value: &str) -> AppResult<()> {
    let digits = value.trim();
    if (7..=8).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        return Ok(());
    }
    Err(AppError::UnprocessableEntity(
        "national_id must be 7 or 8 digits.".to_string(),
    ))
}

fn trim_string_fields(record: &mut Map<String, Value>) {
    for value in record.values_mut() {
        if let Value::String(text) = value {
            *value = Value::String(text.trim().to_string());
        }
    }
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::{trim_string_fields, validate_national_id};
    use serde_json::{Map, Value};

    #[test]
    fn accepts_seven_and_eight_digit_ids() {
        assert!(validate_national_id("1234567").is_ok());
        assert!(validate_national_id("30123456").is_ok());
        assert!(validate_national_id(" 30123456 ").is_ok());
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(validate_national_id("123456").is_err());
        assert!(validate_national_id("123456789").is_err());
        assert!(validate_national_id("3012345a").is_err());
        assert!(validate_national_id("30.123.456").is_err());
        assert!(validate_national_id("").is_err());
    }

    #[test]
    fn trims_whitespace_from_string_fields() {
        let mut record = Map::new();
        record.insert(
            "first_name".to_string(),
            Value::String("  Ana ".to_string()),
        );
        record.insert("phone".to_string(), Value::String("11-5555-0000".to_string()));
        trim_string_fields(&mut record);
        assert_eq!(record.get("first_name"), Some(&Value::String("Ana".to_string())));
        assert_eq!(
            record.get("phone"),
            Some(&Value::String("11-5555-0000".to_string()))
        );
    }
}
