use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

fn default_true() -> bool {
    true
}
fn default_zero_amount() -> f64 {
    0.0
}
fn default_term_months() -> i64 {
    24
}
fn default_update_interval_months() -> i64 {
    12
}
fn default_months_ahead() -> i64 {
    6
}
fn default_limit_100() -> i64 {
    100
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateTenantInput {
    #[validate(length(min = 1, max = 255))]
    pub first_name: String,
    #[validate(length(min = 1, max = 255))]
    pub last_name: String,
    #[validate(length(min = 7, max = 8))]
    pub national_id: String,
    #[validate(length(min = 1, max = 50))]
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdateTenantInput {
    #[validate(length(min = 1, max = 255))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub last_name: Option<String>,
    #[validate(length(min = 7, max = 8))]
    pub national_id: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreatePropertyInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 500))]
    pub address: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdatePropertyInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 500))]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateLeaseInput {
    pub property_id: String,
    pub tenant_id: String,
    pub starts_on: String,
    #[serde(default = "default_term_months")]
    #[validate(range(min = 1, max = 120))]
    pub term_months: i64,
    #[validate(range(exclusive_min = 0.0))]
    pub base_rent: f64,
    #[serde(default = "default_zero_amount")]
    #[validate(range(min = 0.0))]
    pub common_charges: f64,
    #[serde(default = "default_zero_amount")]
    #[validate(range(min = 0.0))]
    pub electricity: f64,
    #[serde(default = "default_zero_amount")]
    #[validate(range(min = 0.0))]
    pub water: f64,
    #[serde(default = "default_zero_amount")]
    #[validate(range(min = 0.0))]
    pub other_charges: f64,
    #[serde(default = "default_update_interval_months")]
    #[validate(range(min = 1, max = 60))]
    pub update_interval_months: i64,
    pub rent_index_id: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdateLeaseInput {
    pub property_id: Option<String>,
    pub tenant_id: Option<String>,
    pub starts_on: Option<String>,
    #[validate(range(min = 1, max = 120))]
    pub term_months: Option<i64>,
    #[validate(range(exclusive_min = 0.0))]
    pub base_rent: Option<f64>,
    #[validate(range(min = 0.0))]
    pub common_charges: Option<f64>,
    #[validate(range(min = 0.0))]
    pub electricity: Option<f64>,
    #[validate(range(min = 0.0))]
    pub water: Option<f64>,
    #[validate(range(min = 0.0))]
    pub other_charges: Option<f64>,
    #[validate(range(min = 1, max = 60))]
    pub update_interval_months: Option<i64>,
    pub rent_index_id: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct ApplyAdjustmentInput {
    #[validate(range(exclusive_min = 0.0))]
    pub new_rent: f64,
    pub index_applied: String,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
    pub applied_on: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateRentIndexInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TenantsQuery {
    pub search: Option<String>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PropertiesQuery {
    pub search: Option<String>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct LeasesQuery {
    pub property_id: Option<String>,
    pub tenant_id: Option<String>,
    pub is_active: Option<bool>,
    pub status: Option<String>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpcomingUpdatesQuery {
    #[serde(default = "default_months_ahead")]
    pub months_ahead: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct SettlementsQuery {
    #[validate(range(min = 1, max = 12))]
    pub month: u32,
    #[validate(range(min = 2000, max = 2100))]
    pub year: i32,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct RentIndicesQuery {
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TenantPath {
    pub tenant_id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PropertyPath {
    pub property_id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct LeasePath {
    pub lease_id: String,
}

pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, 500)
}

pub fn serialize_to_map<T>(value: &T) -> serde_json::Map<String, serde_json::Value>
where
    T: serde::Serialize,
{
    let json = serde_json::to_value(value)
        .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));
    json.as_object().cloned().unwrap_or_default()
}

pub fn remove_nulls(
    mut map: serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    map.retain(|_, value| !value.is_null());
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_input_fills_contract_defaults() {
        let input: CreateLeaseInput = serde_json::from_value(serde_json::json!({
            "property_id": "550e8400-e29b-41d4-a716-446655440000",
            "tenant_id": "650e8400-e29b-41d4-a716-446655440000",
            "starts_on": "2024-01-15",
            "base_rent": 250000.0,
        }))
        .unwrap();
        assert_eq!(input.term_months, 24);
        assert_eq!(input.update_interval_months, 12);
        assert_eq!(input.common_charges, 0.0);
        assert!(input.is_active);
        assert!(validate_input(&input).is_ok());
    }

    #[test]
    fn lease_input_rejects_zero_rent_and_bad_interval() {
        let zero_rent: CreateLeaseInput = serde_json::from_value(serde_json::json!({
            "property_id": "550e8400-e29b-41d4-a716-446655440000",
            "tenant_id": "650e8400-e29b-41d4-a716-446655440000",
            "starts_on": "2024-01-15",
            "base_rent": 0.0,
        }))
        .unwrap();
        assert!(validate_input(&zero_rent).is_err());

        let bad_interval: CreateLeaseInput = serde_json::from_value(serde_json::json!({
            "property_id": "550e8400-e29b-41d4-a716-446655440000",
            "tenant_id": "650e8400-e29b-41d4-a716-446655440000",
            "starts_on": "2024-01-15",
            "base_rent": 250000.0,
            "update_interval_months": 61,
        }))
        .unwrap();
        assert!(validate_input(&bad_interval).is_err());
    }

    #[test]
    fn remove_nulls_drops_absent_patch_fields() {
        let patch = UpdateLeaseInput {
            property_id: None,
            tenant_id: None,
            starts_on: None,
            term_months: Some(36),
            base_rent: None,
            common_charges: None,
            electricity: None,
            water: None,
            other_charges: None,
            update_interval_months: None,
            rent_index_id: None,
            is_active: None,
        };
        let map = remove_nulls(serialize_to_map(&patch));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("term_months"), Some(&serde_json::json!(36)));
    }

    #[test]
    fn limits_are_clamped() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(100), 100);
        assert_eq!(clamp_limit(10_000), 500);
    }
}
