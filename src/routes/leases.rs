use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{Datelike, NaiveDate, Utc};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};

use crate::{
    error::{AppError, AppResult},
    repository::table_service::{
        create_row, create_row_tx, delete_row, get_row, list_rows, update_row, update_row_tx,
    },
    schemas::{
        clamp_limit, remove_nulls, serialize_to_map, validate_input, ApplyAdjustmentInput,
        CreateLeaseInput, LeasePath, LeasesQuery, UpcomingUpdatesQuery, UpdateLeaseInput,
    },
    services::lease_engine::{self, LeaseSnapshot},
    state::AppState,
};

const RENT_INDEX_CODES: &[&str] = &["ICL", "IPC", "MANUAL"];

/// Until an index feed supplies real coefficients, worklist rows suggest the
/// current rent raised by this factor.
const SUGGESTED_UPDATE_FACTOR: f64 = 1.25;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/leases", axum::routing::get(list_leases).post(create_lease))
        .route("/leases/expired", axum::routing::get(list_expired_leases))
        .route(
            "/leases/upcoming-updates",
            axum::routing::get(list_upcoming_updates),
        )
        .route(
            "/leases/{lease_id}",
            axum::routing::get(get_lease)
                .patch(update_lease)
                .delete(delete_lease),
        )
        .route(
            "/leases/{lease_id}/finalize",
            axum::routing::post(finalize_lease),
        )
        .route(
            "/leases/{lease_id}/adjustments",
            axum::routing::get(list_adjustments).post(apply_adjustment),
        )
}

async fn list_leases(
    State(state): State<AppState>,
    Query(query): Query<LeasesQuery>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(property_id) = non_empty_opt(query.property_id.as_deref()) {
        filters.insert("property_id".to_string(), Value::String(property_id));
    }
    if let Some(tenant_id) = non_empty_opt(query.tenant_id.as_deref()) {
        filters.insert("tenant_id".to_string(), Value::String(tenant_id));
    }
    if let Some(is_active) = query.is_active {
        filters.insert("is_active".to_string(), Value::Bool(is_active));
    }

    let rows = list_rows(
        pool,
        "leases",
        Some(&filters),
        clamp_limit(query.limit),
        0,
        "created_at",
        false,
    )
    .await?;

    let today = Utc::now().date_naive();
    let mut rows = enrich_leases(pool, rows).await?;
    for row in &mut rows {
        with_computed_fields(row, today);
    }

    // The lifecycle status only exists after computation, so it is filtered
    // here rather than in SQL.
    if let Some(status) = non_empty_opt(query.status.as_deref()) {
        let wanted = status.to_lowercase();
        rows.retain(|row| value_str(row, "status") == wanted);
    }

    Ok(Json(json!({ "data": rows })))
}

async fn create_lease(
    State(state): State<AppState>,
    Json(payload): Json<CreateLeaseInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let starts_on = lease_engine::parse_date(&payload.starts_on)
        .map_err(|err| AppError::UnprocessableEntity(format!("starts_on: {err}")))?;
    let term_months = months_u32(payload.term_months, "term_months")?;
    let ends_on = lease_engine::end_of_term(starts_on, term_months)?;

    get_row(pool, "properties", &payload.property_id, "id").await?;
    get_row(pool, "tenants", &payload.tenant_id, "id").await?;
    if let Some(rent_index_id) = payload.rent_index_id.as_deref() {
        get_row(pool, "rent_indices", rent_index_id, "id").await?;
    }
    if payload.is_active {
        ensure_no_active_lease(pool, &payload.property_id, None).await?;
    }

    let mut record = remove_nulls(serialize_to_map(&payload));
    record.insert(
        "starts_on".to_string(),
        Value::String(format_date(starts_on)),
    );
    record.insert("ends_on".to_string(), Value::String(format_date(ends_on)));

    let created = create_row(pool, "leases", &record).await?;
    let mut enriched = enrich_leases(pool, vec![created]).await?;
    let mut lease = enriched.pop().unwrap_or(Value::Null);
    with_computed_fields(&mut lease, Utc::now().date_naive());
    Ok((axum::http::StatusCode::CREATED, Json(lease)))
}

async fn get_lease(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let record = get_row(pool, "leases", &path.lease_id, "id").await?;
    let mut enriched = enrich_leases(pool, vec![record]).await?;
    let mut lease = enriched.pop().unwrap_or(Value::Null);
    with_computed_fields(&mut lease, Utc::now().date_naive());
    Ok(Json(lease))
}

async fn update_lease(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
    Json(payload): Json<UpdateLeaseInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let pool = db_pool(&state)?;
    let existing = get_row(pool, "leases", &path.lease_id, "id").await?;

    let mut patch = remove_nulls(serialize_to_map(&payload));
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }

    // The stored end date follows the contract fields; any patch touching
    // them recomputes it so the two can never drift apart.
    if patch.contains_key("starts_on") || patch.contains_key("term_months") {
        let starts_raw = patch
            .get("starts_on")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| value_str(&existing, "starts_on"));
        let starts_on = lease_engine::parse_date(&starts_raw)
            .map_err(|err| AppError::UnprocessableEntity(format!("starts_on: {err}")))?;
        let term_raw = patch
            .get("term_months")
            .and_then(Value::as_i64)
            .or_else(|| value_i64(existing.get("term_months")))
            .unwrap_or(0);
        let term_months = months_u32(term_raw, "term_months")?;
        let ends_on = lease_engine::end_of_term(starts_on, term_months)?;
        patch.insert(
            "starts_on".to_string(),
            Value::String(format_date(starts_on)),
        );
        patch.insert("ends_on".to_string(), Value::String(format_date(ends_on)));
    }

    if let Some(property_id) = patch.get("property_id").and_then(Value::as_str) {
        get_row(pool, "properties", property_id, "id").await?;
    }
    if let Some(tenant_id) = patch.get("tenant_id").and_then(Value::as_str) {
        get_row(pool, "tenants", tenant_id, "id").await?;
    }
    if let Some(rent_index_id) = patch.get("rent_index_id").and_then(Value::as_str) {
        get_row(pool, "rent_indices", rent_index_id, "id").await?;
    }

    let will_be_active = patch
        .get("is_active")
        .and_then(Value::as_bool)
        .unwrap_or_else(|| {
            existing
                .get("is_active")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        });
    if will_be_active && (patch.contains_key("is_active") || patch.contains_key("property_id")) {
        let target_property = patch
            .get("property_id")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| value_str(&existing, "property_id"));
        ensure_no_active_lease(pool, &target_property, Some(path.lease_id.as_str())).await?;
    }

    let updated = update_row(pool, "leases", &path.lease_id, &patch, "id").await?;
    let mut enriched = enrich_leases(pool, vec![updated]).await?;
    let mut lease = enriched.pop().unwrap_or(Value::Null);
    with_computed_fields(&mut lease, Utc::now().date_naive());
    Ok(Json(lease))
}

async fn delete_lease(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let deleted = delete_row(pool, "leases", &path.lease_id, "id").await?;
    Ok(Json(deleted))
}

/// Leases whose contract ran out while still flagged active; the operator
/// finalizes them one by one from this worklist.
async fn list_expired_leases(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let today = Utc::now().date_naive();

    let filters = json_map(&[
        ("is_active", Value::Bool(true)),
        ("ends_on__lt", Value::String(format_date(today))),
    ]);
    let rows = list_rows(pool, "leases", Some(&filters), 1000, 0, "ends_on", true).await?;

    let mut rows = enrich_leases(pool, rows).await?;
    for row in &mut rows {
        with_computed_fields(row, today);
        let days_overdue = -value_i64(row.get("days_remaining")).unwrap_or(0);
        if let Some(obj) = row.as_object_mut() {
            obj.insert("days_overdue".to_string(), json!(days_overdue.max(0)));
        }
    }

    Ok(Json(json!({ "data": rows })))
}

async fn finalize_lease(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;

    let existing = get_row(pool, "leases", &path.lease_id, "id").await?;
    let is_active = existing
        .get("is_active")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !is_active {
        return Err(AppError::Conflict("Lease is already finalized.".to_string()));
    }

    let patch = json_map(&[("is_active", Value::Bool(false))]);
    let updated = update_row(pool, "leases", &path.lease_id, &patch, "id").await?;
    let mut enriched = enrich_leases(pool, vec![updated]).await?;
    let mut lease = enriched.pop().unwrap_or(Value::Null);
    with_computed_fields(&mut lease, Utc::now().date_naive());
    Ok(Json(lease))
}

async fn list_upcoming_updates(
    State(state): State<AppState>,
    Query(query): Query<UpcomingUpdatesQuery>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let months_ahead = query.months_ahead.clamp(1, 24) as u32;
    let today = Utc::now().date_naive();
    let window_end = lease_engine::add_months(today, months_ahead)?;

    let filters = json_map(&[
        ("is_active", Value::Bool(true)),
        ("ends_on__gte", Value::String(format_date(today))),
    ]);
    let rows = list_rows(pool, "leases", Some(&filters), 1000, 0, "created_at", false).await?;
    let rows = enrich_leases(pool, rows).await?;

    let mut updates = Vec::new();
    for row in &rows {
        let Some(obj) = row.as_object() else {
            continue;
        };
        let snapshot = match LeaseSnapshot::from_row(obj) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(
                    lease_id = %value_str(row, "id"),
                    "Skipping lease in update schedule: {err}"
                );
                continue;
            }
        };
        let next = match lease_engine::next_update_on(&snapshot, today) {
            Ok(Some(date)) if date <= window_end => date,
            Ok(_) => continue,
            Err(err) => {
                tracing::warn!(
                    lease_id = %value_str(row, "id"),
                    "Skipping lease in update schedule: {err}"
                );
                continue;
            }
        };
        let current_rent = snapshot.charges.base_rent;
        updates.push(json!({
            "lease_id": value_str(row, "id"),
            "property_name": value_opt_str(row, "property_name"),
            "tenant_name": value_opt_str(row, "tenant_name"),
            "next_update_on": format_date(next),
            "days_until": (next - today).num_days(),
            "months_since_start": whole_months_between(snapshot.starts_on, today),
            "current_rent": round2(current_rent),
            "suggested_new_rent": round2(current_rent * SUGGESTED_UPDATE_FACTOR),
        }));
    }
    updates.sort_by(|a, b| value_str(a, "next_update_on").cmp(&value_str(b, "next_update_on")));

    Ok(Json(json!({
        "months_ahead": months_ahead,
        "count": updates.len(),
        "data": updates,
    })))
}

async fn list_adjustments(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    get_row(pool, "leases", &path.lease_id, "id").await?;

    let filters = json_map(&[("lease_id", Value::String(path.lease_id.clone()))]);
    let rows = list_rows(
        pool,
        "lease_adjustments",
        Some(&filters),
        1000,
        0,
        "applied_on",
        false,
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

/// Apply a rent revision: move the lease to the new rent and record the step
/// in the adjustment history, atomically.
async fn apply_adjustment(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
    Json(payload): Json<ApplyAdjustmentInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let index_applied = payload.index_applied.trim().to_uppercase();
    if !RENT_INDEX_CODES.contains(&index_applied.as_str()) {
        return Err(AppError::BadRequest(format!(
            "index_applied must be one of {}.",
            RENT_INDEX_CODES.join(", ")
        )));
    }

    let lease = get_row(pool, "leases", &path.lease_id, "id").await?;
    let is_active = lease
        .get("is_active")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !is_active {
        return Err(AppError::Conflict(
            "Cannot adjust a finalized lease.".to_string(),
        ));
    }

    let applied_on = match payload.applied_on.as_deref() {
        Some(raw) => lease_engine::parse_date(raw)
            .map_err(|err| AppError::UnprocessableEntity(format!("applied_on: {err}")))?,
        None => Utc::now().date_naive(),
    };
    let previous_rent = value_number(lease.get("base_rent"));
    let new_rent = round2(payload.new_rent);

    let mut record = json_map(&[
        ("lease_id", Value::String(path.lease_id.clone())),
        ("applied_on", Value::String(format_date(applied_on))),
        ("previous_rent", json!(round2(previous_rent))),
        ("new_rent", json!(new_rent)),
        ("percent_change", json!(percent_change(previous_rent, new_rent))),
        ("index_applied", Value::String(index_applied)),
    ]);
    if let Some(note) = non_empty_opt(payload.note.as_deref()) {
        record.insert("note".to_string(), Value::String(note));
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::Dependency(format!("txn begin: {e}")))?;
    let rent_patch = json_map(&[("base_rent", json!(new_rent))]);
    update_row_tx(&mut tx, "leases", &path.lease_id, &rent_patch, "id").await?;
    let created = create_row_tx(&mut tx, "lease_adjustments", &record).await?;
    tx.commit()
        .await
        .map_err(|e| AppError::Dependency(format!("txn commit: {e}")))?;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

/// 409 when the property already carries an active lease other than
/// `exclude_lease_id`. A partial unique index enforces the same rule inside
/// the database, so a race loser still gets a 409.
async fn ensure_no_active_lease(
    pool: &sqlx::PgPool,
    property_id: &str,
    exclude_lease_id: Option<&str>,
) -> AppResult<()> {
    let filters = json_map(&[
        ("property_id", Value::String(property_id.to_string())),
        ("is_active", Value::Bool(true)),
    ]);
    let rows = list_rows(pool, "leases", Some(&filters), 100, 0, "created_at", false).await?;
    let conflict = rows.iter().any(|row| {
        let id = value_str(row, "id");
        exclude_lease_id != Some(id.as_str())
    });
    if conflict {
        return Err(AppError::Conflict(
            "Property already has an active lease.".to_string(),
        ));
    }
    Ok(())
}

/// Annotate a lease row with the engine-derived fields. The end date is
/// recomputed from the contract fields, never read back from the row, so a
/// stale stored copy cannot leak into responses. Rows the engine rejects get
/// a null status and a warning instead of failing the whole request.
fn with_computed_fields(row: &mut Value, today: NaiveDate) {
    let Some(obj) = row.as_object_mut() else {
        return;
    };
    let snapshot = match LeaseSnapshot::from_row(obj) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            let lease_id = obj
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_string();
            tracing::warn!(lease_id = %lease_id, "Lease row is not computable: {err}");
            obj.insert("status".to_string(), Value::Null);
            return;
        }
    };
    let ends_on = match snapshot.ends_on() {
        Ok(date) => date,
        Err(err) => {
            tracing::warn!("Lease end date overflowed the calendar: {err}");
            obj.insert("status".to_string(), Value::Null);
            return;
        }
    };

    obj.insert("ends_on".to_string(), Value::String(format_date(ends_on)));
    obj.insert(
        "status".to_string(),
        Value::String(
            lease_engine::status_from_end_date(ends_on, today)
                .as_str()
                .to_string(),
        ),
    );
    obj.insert(
        "days_remaining".to_string(),
        json!(lease_engine::days_remaining(ends_on, today)),
    );
    match lease_engine::monthly_total(&snapshot.charges) {
        Ok(total) => {
            obj.insert("monthly_total".to_string(), json!(round2(total)));
        }
        Err(err) => {
            tracing::warn!("Lease charges are not summable: {err}");
            obj.insert("monthly_total".to_string(), Value::Null);
        }
    }
    match lease_engine::next_update_on(&snapshot, today) {
        Ok(Some(date)) => {
            obj.insert("next_update_on".to_string(), Value::String(format_date(date)));
        }
        Ok(None) => {
            obj.insert("next_update_on".to_string(), Value::Null);
        }
        Err(err) => {
            tracing::warn!("Lease update schedule is not computable: {err}");
            obj.insert("next_update_on".to_string(), Value::Null);
        }
    }
}

async fn enrich_leases(pool: &sqlx::PgPool, rows: Vec<Value>) -> AppResult<Vec<Value>> {
    if rows.is_empty() {
        return Ok(rows);
    }

    let property_ids = extract_ids(&rows, "property_id");
    let tenant_ids = extract_ids(&rows, "tenant_id");

    let property_ids_for_query = property_ids.clone();
    let tenant_ids_for_query = tenant_ids.clone();
    let (properties, tenants) = tokio::try_join!(
        async move {
            if property_ids_for_query.is_empty() {
                Ok(Vec::new())
            } else {
                list_rows(
                    pool,
                    "properties",
                    Some(&json_map(&[(
                        "id",
                        Value::Array(
                            property_ids_for_query
                                .iter()
                                .cloned()
                                .map(Value::String)
                                .collect(),
                        ),
                    )])),
                    std::cmp::max(200, property_ids_for_query.len() as i64),
                    0,
                    "created_at",
                    false,
                )
                .await
            }
        },
        async move {
            if tenant_ids_for_query.is_empty() {
                Ok(Vec::new())
            } else {
                list_rows(
                    pool,
                    "tenants",
                    Some(&json_map(&[(
                        "id",
                        Value::Array(
                            tenant_ids_for_query
                                .iter()
                                .cloned()
                                .map(Value::String)
                                .collect(),
                        ),
                    )])),
                    std::cmp::max(200, tenant_ids_for_query.len() as i64),
                    0,
                    "created_at",
                    false,
                )
                .await
            }
        }
    )?;

    let property_name = map_by_id_field(&properties, "name");
    let mut tenant_name: HashMap<String, String> = HashMap::new();
    for tenant in &tenants {
        let Some(obj) = tenant.as_object() else {
            continue;
        };
        let Some(id) = string_value(obj.get("id")) else {
            continue;
        };
        let full = format!(
            "{} {}",
            value_str(tenant, "first_name"),
            value_str(tenant, "last_name")
        )
        .trim()
        .to_string();
        if !full.is_empty() {
            tenant_name.insert(id, full);
        }
    }

    let mut enriched = Vec::with_capacity(rows.len());
    for mut row in rows {
        if let Some(obj) = row.as_object_mut() {
            if let Some(property_id) = string_value(obj.get("property_id")) {
                obj.insert(
                    "property_name".to_string(),
                    property_name
                        .get(&property_id)
                        .cloned()
                        .map(Value::String)
                        .unwrap_or(Value::Null),
                );
            }
            if let Some(tenant_id) = string_value(obj.get("tenant_id")) {
                obj.insert(
                    "tenant_name".to_string(),
                    tenant_name
                        .get(&tenant_id)
                        .cloned()
                        .map(Value::String)
                        .unwrap_or(Value::Null),
                );
            }
        }
        enriched.push(row);
    }

    Ok(enriched)
}

fn extract_ids(rows: &[Value], key: &str) -> HashSet<String> {
    rows.iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| obj.get(key))
        .filter_map(|value| string_value(Some(value)))
        .collect()
}

fn map_by_id_field(rows: &[Value], field: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for row in rows {
        let Some(obj) = row.as_object() else {
            continue;
        };
        let Some(id) = string_value(obj.get("id")) else {
            continue;
        };
        let Some(value) = string_value(obj.get(field)) else {
            continue;
        };
        values.insert(id, value);
    }
    values
}

fn whole_months_between(starts_on: NaiveDate, today: NaiveDate) -> i64 {
    if today < starts_on {
        return 0;
    }
    let mut months = i64::from(today.year() - starts_on.year()) * 12
        + (i64::from(today.month()) - i64::from(starts_on.month()));
    // the year/month delta overshoots by one until the (possibly clamped)
    // anniversary day is reached
    if months > 0 {
        if let Ok(anniversary) = lease_engine::add_months(starts_on, months as u32) {
            if anniversary > today {
                months -= 1;
            }
        }
    }
    months.max(0)
}

fn months_u32(value: i64, field: &str) -> AppResult<u32> {
    u32::try_from(value)
        .ok()
        .filter(|months| *months >= 1)
        .ok_or_else(|| {
            AppError::UnprocessableEntity(format!("{field} must be a positive month count."))
        })
}

fn percent_change(previous_rent: f64, new_rent: f64) -> f64 {
    if previous_rent > 0.0 {
        round2((new_rent - previous_rent) / previous_rent * 100.0)
    } else {
        0.0
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn value_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn value_i64(value: Option<&Value>) -> Option<i64> {
    match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|parsed| parsed as i64)),
        Some(Value::String(text)) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn string_value(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}

fn value_str(row: &Value, key: &str) -> String {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

fn value_opt_str(row: &Value, key: &str) -> Option<String> {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}

fn non_empty_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

fn json_map(entries: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert((*key).to_string(), value.clone());
    }
    map
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(text: &str) -> NaiveDate {
        NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn whole_months_ignore_partial_months() {
        assert_eq!(
            whole_months_between(date("2024-01-15"), date("2024-03-14")),
            1
        );
        assert_eq!(
            whole_months_between(date("2024-01-15"), date("2024-03-15")),
            2
        );
        assert_eq!(
            whole_months_between(date("2024-03-01"), date("2024-02-01")),
            0
        );
    }

    #[test]
    fn whole_months_follow_month_end_clamping() {
        assert_eq!(
            whole_months_between(date("2023-01-31"), date("2023-02-28")),
            1
        );
        assert_eq!(
            whole_months_between(date("2023-01-31"), date("2023-02-27")),
            0
        );
    }

    #[test]
    fn month_counts_must_be_positive() {
        assert_eq!(months_u32(12, "term_months").unwrap(), 12);
        assert!(months_u32(0, "term_months").is_err());
        assert!(months_u32(-3, "update_interval_months").is_err());
    }

    #[test]
    fn computed_fields_follow_the_contract_dates() {
        let mut row = json!({
            "id": "8b9f9d48-1111-4f0e-9c65-000000000001",
            "starts_on": "2024-01-15",
            "term_months": 12,
            "update_interval_months": 6,
            "is_active": true,
            "base_rent": 100000.0,
        });
        with_computed_fields(&mut row, date("2024-08-01"));

        assert_eq!(value_str(&row, "ends_on"), "2025-01-15");
        assert_eq!(value_str(&row, "status"), "active");
        assert_eq!(value_i64(row.get("days_remaining")), Some(167));
        assert_eq!(value_number(row.get("monthly_total")), 100000.0);
        // the only remaining candidate lands on the end date itself
        assert!(row.get("next_update_on").is_some_and(Value::is_null));
    }

    #[test]
    fn uncomputable_rows_get_a_null_status() {
        let mut row = json!({
            "id": "8b9f9d48-1111-4f0e-9c65-000000000002",
            "starts_on": "not-a-date",
            "term_months": 12,
            "update_interval_months": 12,
        });
        with_computed_fields(&mut row, date("2024-08-01"));
        assert!(row.get("status").is_some_and(Value::is_null));
        assert!(row.get("days_remaining").is_none());
    }

    #[test]
    fn adjustment_percent_is_relative_to_previous_rent() {
        assert_eq!(percent_change(100000.0, 125000.0), 25.0);
        assert_eq!(percent_change(80000.0, 100000.0), 25.0);
        assert_eq!(percent_change(0.0, 50000.0), 0.0);
    }

    #[test]
    fn index_codes_are_normalized_before_matching() {
        assert!(RENT_INDEX_CODES.contains(&"icl".trim().to_uppercase().as_str()));
        assert!(!RENT_INDEX_CODES.contains(&"uva".trim().to_uppercase().as_str()));
    }
}
