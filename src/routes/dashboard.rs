use axum::{extract::State, Json};
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

use crate::{
    error::{AppError, AppResult},
    repository::table_service::{count_rows, list_rows},
    services::lease_engine::{self, LeaseSnapshot, LeaseStatus},
    state::AppState,
};

/// Rent updates within this many months of today surface on the dashboard.
const UPDATE_LOOKAHEAD_MONTHS: u32 = 2;

/// A contract expiring within this many days is flagged urgent.
const URGENT_WINDOW_DAYS: i64 = 7;

const EXPIRATION_LIST_LIMIT: usize = 10;
const AVAILABLE_LIST_LIMIT: usize = 5;
const UPDATE_LIST_LIMIT: usize = 5;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route("/dashboard/summary", axum::routing::get(dashboard_summary))
}

/// One-call overview for the landing screen: portfolio counts, income, and
/// the short worklists (expiring contracts, free properties, upcoming rent
/// updates). Everything is recomputed from current rows on each call.
async fn dashboard_summary(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let today = Utc::now().date_naive();
    let update_window_end = lease_engine::add_months(today, UPDATE_LOOKAHEAD_MONTHS)?;

    let total_properties = count_rows(pool, "properties", None).await?;
    let total_tenants = count_rows(pool, "tenants", None).await?;
    let properties = list_rows(pool, "properties", None, 2000, 0, "name", true).await?;
    let tenants = list_rows(pool, "tenants", None, 2000, 0, "created_at", false).await?;
    let leases = list_rows(pool, "leases", None, 5000, 0, "created_at", false).await?;

    let property_name = field_by_id(&properties, "name");
    let tenant_name = tenant_names(&tenants);

    let mut active_leases = 0_i64;
    let mut expiring_soon = 0_i64;
    let mut expired_leases = 0_i64;
    let mut monthly_income = 0.0;
    let mut occupied: HashSet<String> = HashSet::new();
    let mut expirations: Vec<(i64, Value)> = Vec::new();
    let mut updates: Vec<(NaiveDate, Value)> = Vec::new();

    for lease in &leases {
        let Some(obj) = lease.as_object() else {
            continue;
        };
        let snapshot = match LeaseSnapshot::from_row(obj) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(
                    lease_id = %value_str(lease, "id"),
                    "Skipping lease in dashboard: {err}"
                );
                continue;
            }
        };
        let ends_on = match snapshot.ends_on() {
            Ok(date) => date,
            Err(err) => {
                tracing::warn!(
                    lease_id = %value_str(lease, "id"),
                    "Skipping lease in dashboard: {err}"
                );
                continue;
            }
        };
        if !snapshot.is_active {
            continue;
        }

        let days = lease_engine::days_remaining(ends_on, today);
        if days < 0 {
            // contract ran out but was never finalized; counted, not billed
            expired_leases += 1;
            continue;
        }

        active_leases += 1;
        let property_id = value_str(lease, "property_id");
        if !property_id.is_empty() {
            occupied.insert(property_id.clone());
        }
        match lease_engine::monthly_total(&snapshot.charges) {
            Ok(total) => monthly_income += total,
            Err(err) => {
                tracing::warn!(
                    lease_id = %value_str(lease, "id"),
                    "Lease charges left out of income: {err}"
                );
            }
        }

        if lease_engine::status_from_end_date(ends_on, today) == LeaseStatus::DueSoon {
            expiring_soon += 1;
            expirations.push((
                days,
                json!({
                    "lease_id": value_str(lease, "id"),
                    "property_name": property_name.get(&property_id).cloned(),
                    "tenant_name": tenant_name.get(&value_str(lease, "tenant_id")).cloned(),
                    "ends_on": ends_on.format("%Y-%m-%d").to_string(),
                    "days_remaining": days,
                    "urgent": days <= URGENT_WINDOW_DAYS,
                }),
            ));
        }

        if let Ok(Some(next)) = lease_engine::next_update_on(&snapshot, today) {
            if next <= update_window_end {
                updates.push((
                    next,
                    json!({
                        "lease_id": value_str(lease, "id"),
                        "property_name": property_name.get(&property_id).cloned(),
                        "tenant_name": tenant_name.get(&value_str(lease, "tenant_id")).cloned(),
                        "next_update_on": next.format("%Y-%m-%d").to_string(),
                        "days_until": (next - today).num_days(),
                    }),
                ));
            }
        }
    }

    expirations.sort_by_key(|(days, _)| *days);
    updates.sort_by_key(|(next, _)| *next);

    let available_list: Vec<Value> = properties
        .iter()
        .filter(|property| !occupied.contains(&value_str(property, "id")))
        .take(AVAILABLE_LIST_LIMIT)
        .map(|property| {
            json!({
                "id": value_str(property, "id"),
                "name": value_str(property, "name"),
                "address": value_str(property, "address"),
            })
        })
        .collect();

    let occupied_count = occupied.len() as i64;
    Ok(Json(json!({
        "total_properties": total_properties,
        "occupied_properties": occupied_count,
        "available_properties": (total_properties - occupied_count).max(0),
        "total_tenants": total_tenants,
        "active_leases": active_leases,
        "expiring_soon": expiring_soon,
        "expired_leases": expired_leases,
        "monthly_income": round2(monthly_income),
        "upcoming_expirations": expirations
            .into_iter()
            .take(EXPIRATION_LIST_LIMIT)
            .map(|(_, row)| row)
            .collect::<Vec<Value>>(),
        "available_property_list": available_list,
        "upcoming_updates": updates
            .into_iter()
            .take(UPDATE_LIST_LIMIT)
            .map(|(_, row)| row)
            .collect::<Vec<Value>>(),
    })))
}

fn field_by_id(rows: &[Value], field: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for row in rows {
        let id = value_str(row, "id");
        let value = value_str(row, field);
        if !id.is_empty() && !value.is_empty() {
            values.insert(id, value);
        }
    }
    values
}

fn tenant_names(rows: &[Value]) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for row in rows {
        let id = value_str(row, "id");
        if id.is_empty() {
            continue;
        }
        let full = format!(
            "{} {}",
            value_str(row, "first_name"),
            value_str(row, "last_name")
        )
        .trim()
        .to_string();
        if !full.is_empty() {
            values.insert(id, full);
        }
    }
    values
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

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_names_join_first_and_last() {
        let rows = vec![
            json!({"id": "t1", "first_name": "Ana", "last_name": "Gomez"}),
            json!({"id": "t2", "first_name": "  ", "last_name": ""}),
            json!({"first_name": "Sin", "last_name": "Id"}),
        ];
        let names = tenant_names(&rows);
        assert_eq!(names.get("t1").map(String::as_str), Some("Ana Gomez"));
        assert!(!names.contains_key("t2"));
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn field_by_id_skips_rows_without_values() {
        let rows = vec![
            json!({"id": "p1", "name": "Depto Centro"}),
            json!({"id": "p2"}),
        ];
        let names = field_by_id(&rows, "name");
        assert_eq!(names.get("p1").map(String::as_str), Some("Depto Centro"));
        assert!(!names.contains_key("p2"));
    }
}
