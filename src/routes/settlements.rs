use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, AppResult},
    repository::table_service::{get_row, list_rows},
    schemas::{validate_input, LeasePath, SettlementsQuery},
    services::lease_engine::{self, LeaseSnapshot},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/settlements", axum::routing::get(list_settlements))
        .route(
            "/settlements/{lease_id}",
            axum::routing::get(get_settlement),
        )
}

/// The monthly settlement batch: one document model per lease billable in
/// the requested period. Rendering is left to the caller; this endpoint only
/// assembles the numbers and text the renderer needs.
async fn list_settlements(
    State(state): State<AppState>,
    Query(query): Query<SettlementsQuery>,
) -> AppResult<Json<Value>> {
    validate_input(&query)?;
    let pool = db_pool(&state)?;
    let today = Utc::now().date_naive();
    let due_on = lease_engine::billing_due_date(query.month, query.year)?;

    let filters = json_map(&[("is_active", Value::Bool(true))]);
    let leases = list_rows(pool, "leases", Some(&filters), 1000, 0, "created_at", false).await?;

    let mut settlements = Vec::new();
    let mut total_billed = 0.0;
    for lease in &leases {
        let Some(obj) = lease.as_object() else {
            continue;
        };
        let snapshot = match LeaseSnapshot::from_row(obj) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(
                    lease_id = %value_str(lease, "id"),
                    "Skipping lease in settlement batch: {err}"
                );
                continue;
            }
        };
        match lease_engine::is_due_in_month(&snapshot, query.month, query.year, today) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(err) => {
                tracing::warn!(
                    lease_id = %value_str(lease, "id"),
                    "Skipping lease in settlement batch: {err}"
                );
                continue;
            }
        }

        let document =
            match build_settlement(&state, lease, &snapshot, query.month, query.year, due_on, today)
                .await
            {
                Ok(document) => document,
                Err(err) => {
                    tracing::warn!(
                        lease_id = %value_str(lease, "id"),
                        "Skipping lease in settlement batch: {err}"
                    );
                    continue;
                }
            };
        total_billed += value_number(document.get("total"));
        settlements.push(document);
    }

    Ok(Json(json!({
        "period": { "month": query.month, "year": query.year },
        "due_on": format_date(due_on),
        "count": settlements.len(),
        "total_billed": round2(total_billed),
        "settlements": settlements,
    })))
}

/// Single settlement document; 404 when the lease does not bill in the
/// requested period.
async fn get_settlement(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
    Query(query): Query<SettlementsQuery>,
) -> AppResult<Json<Value>> {
    validate_input(&query)?;
    let pool = db_pool(&state)?;
    let today = Utc::now().date_naive();
    let due_on = lease_engine::billing_due_date(query.month, query.year)?;

    let lease = get_row(pool, "leases", &path.lease_id, "id").await?;
    let obj = lease
        .as_object()
        .ok_or_else(|| AppError::Internal("Lease row is not a JSON object.".to_string()))?;
    let snapshot = LeaseSnapshot::from_row(obj)?;

    if !lease_engine::is_due_in_month(&snapshot, query.month, query.year, today)? {
        return Err(AppError::NotFound(format!(
            "Lease is not billable in {:02}/{}.",
            query.month, query.year
        )));
    }

    let document =
        build_settlement(&state, &lease, &snapshot, query.month, query.year, due_on, today).await?;
    Ok(Json(document))
}

/// The concept lines of a settlement, in the order they print. Zero-amount
/// lines are left off the document.
const CHARGE_LINES: &[(&str, &str)] = &[
    ("base_rent", "Alquiler"),
    ("common_charges", "Expensas"),
    ("electricity", "Luz"),
    ("water", "Agua"),
    ("other_charges", "Otros conceptos"),
];

async fn build_settlement(
    state: &AppState,
    lease: &Value,
    snapshot: &LeaseSnapshot,
    month: u32,
    year: i32,
    due_on: NaiveDate,
    issued_on: NaiveDate,
) -> AppResult<Value> {
    let pool = db_pool(state)?;

    let tenant = get_row(pool, "tenants", &value_str(lease, "tenant_id"), "id").await?;
    let property = get_row(pool, "properties", &value_str(lease, "property_id"), "id").await?;

    let ends_on = snapshot.ends_on()?;
    let total = lease_engine::monthly_total(&snapshot.charges)?;
    let last_name = value_str(&tenant, "last_name");

    Ok(json!({
        "lease_id": value_str(lease, "id"),
        "period": { "month": month, "year": year },
        "tenant": {
            "full_name": format!(
                "{} {}",
                value_str(&tenant, "first_name"),
                last_name
            ).trim(),
            "national_id": value_str(&tenant, "national_id"),
            "phone": value_str(&tenant, "phone"),
        },
        "property": {
            "name": value_str(&property, "name"),
            "address": value_str(&property, "address"),
        },
        "contract": {
            "starts_on": format_date(snapshot.starts_on),
            "ends_on": format_date(ends_on),
            "term_months": snapshot.term_months,
        },
        "items": charge_items(snapshot),
        "total": round2(total),
        "due_on": format_date(due_on),
        "issued_on": format_date(issued_on),
        "filename": settlement_filename(&last_name, month, year),
    }))
}

fn charge_items(snapshot: &LeaseSnapshot) -> Vec<Value> {
    let amounts = [
        snapshot.charges.base_rent,
        snapshot.charges.common_charges,
        snapshot.charges.electricity,
        snapshot.charges.water,
        snapshot.charges.other_charges,
    ];
    CHARGE_LINES
        .iter()
        .zip(amounts)
        .filter(|(_, amount)| *amount > 0.0)
        .map(|((code, label), amount)| {
            json!({ "code": code, "label": label, "amount": round2(amount) })
        })
        .collect()
}

fn settlement_filename(last_name: &str, month: u32, year: i32) -> String {
    let sanitized = last_name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>();
    let stem = if sanitized.is_empty() {
        "tenant".to_string()
    } else {
        sanitized
    };
    format!("settlement_{stem}_{month}_{year}.pdf")
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

fn value_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
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
    use crate::services::lease_engine::MonthlyCharges;

    fn snapshot(charges: MonthlyCharges) -> LeaseSnapshot {
        LeaseSnapshot {
            starts_on: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            term_months: 12,
            update_interval_months: 12,
            is_active: true,
            charges,
        }
    }

    #[test]
    fn zero_amount_lines_are_left_off() {
        let snapshot = snapshot(MonthlyCharges {
            base_rent: 100000.0,
            common_charges: 25000.0,
            electricity: 0.0,
            water: 0.0,
            other_charges: 1234.5,
        });
        let items = charge_items(&snapshot);
        let codes: Vec<&str> = items
            .iter()
            .filter_map(|item| item.get("code"))
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(codes, vec!["base_rent", "common_charges", "other_charges"]);
    }

    #[test]
    fn item_labels_match_the_printed_concepts() {
        let snapshot = snapshot(MonthlyCharges {
            base_rent: 100000.0,
            ..MonthlyCharges::default()
        });
        let items = charge_items(&snapshot);
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].get("label").and_then(Value::as_str),
            Some("Alquiler")
        );
    }

    #[test]
    fn filenames_are_shell_safe() {
        assert_eq!(
            settlement_filename("Gomez", 6, 2024),
            "settlement_Gomez_6_2024.pdf"
        );
        assert_eq!(
            settlement_filename("de la Cruz", 11, 2025),
            "settlement_de_la_Cruz_11_2025.pdf"
        );
        assert_eq!(settlement_filename("", 1, 2024), "settlement_tenant_1_2024.pdf");
    }
}
