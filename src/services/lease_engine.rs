use chrono::{Months, NaiveDate};
use serde_json::{Map, Value};
use thiserror::Error;

/// Leases within this many days of their end date are flagged as due soon.
pub const DUE_SOON_WINDOW_DAYS: i64 = 30;

/// Fixed day of the month on which every billing period falls due.
pub const DUE_DAY_OF_MONTH: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("invalid interval: {0}")]
    InvalidInterval(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseStatus {
    Active,
    DueSoon,
    Expired,
}

impl LeaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::DueSoon => "due_soon",
            Self::Expired => "expired",
        }
    }
}

/// Per-month charge lines of a lease. Missing lines are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MonthlyCharges {
    pub base_rent: f64,
    pub common_charges: f64,
    pub electricity: f64,
    pub water: f64,
    pub other_charges: f64,
}

/// Read-only snapshot of the lease fields the computations below need.
///
/// Callers supply the reference date explicitly on every call; nothing in
/// this module reads the system clock, so results are reproducible for any
/// date handed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeaseSnapshot {
    pub starts_on: NaiveDate,
    pub term_months: u32,
    pub update_interval_months: u32,
    pub is_active: bool,
    pub charges: MonthlyCharges,
}

impl LeaseSnapshot {
    /// Build a snapshot from a JSON lease row as the table repository
    /// returns it. Charge columns that are null or absent count as zero;
    /// a missing or unparsable start date is an error, as are non-positive
    /// term or update-interval values.
    pub fn from_row(row: &Map<String, Value>) -> Result<Self, EngineError> {
        let starts_on = row_date(row, "starts_on")?;
        let term_months = row_positive_months(row, "term_months")?;
        let update_interval_months = row_positive_months(row, "update_interval_months")?;
        Ok(Self {
            starts_on,
            term_months,
            update_interval_months,
            is_active: row.get("is_active").and_then(Value::as_bool).unwrap_or(false),
            charges: MonthlyCharges {
                base_rent: row_amount(row, "base_rent"),
                common_charges: row_amount(row, "common_charges"),
                electricity: row_amount(row, "electricity"),
                water: row_amount(row, "water"),
                other_charges: row_amount(row, "other_charges"),
            },
        })
    }

    pub fn ends_on(&self) -> Result<NaiveDate, EngineError> {
        end_of_term(self.starts_on, self.term_months)
    }
}

/// The one calendar-aware month-add primitive. Every derived date in the
/// service goes through here so month-length overflow is handled exactly
/// once: the day of month is preserved where possible and otherwise clamped
/// to the last day of the target month (Jan 31 + 1 month = Feb 28/29).
pub fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate, EngineError> {
    date.checked_add_months(Months::new(months)).ok_or_else(|| {
        EngineError::InvalidDate(format!("{date} + {months} months is out of range"))
    })
}

/// Contract end date: start date plus the term, in calendar months.
pub fn end_of_term(starts_on: NaiveDate, term_months: u32) -> Result<NaiveDate, EngineError> {
    if term_months == 0 {
        return Err(EngineError::InvalidInterval(
            "term_months must be at least 1".to_string(),
        ));
    }
    add_months(starts_on, term_months)
}

/// Whole days from `today` until `ends_on`; negative once the end date has
/// passed. Dates are day-precision, so a lease ending today has 0 days
/// remaining and still counts as due soon rather than expired.
pub fn days_remaining(ends_on: NaiveDate, today: NaiveDate) -> i64 {
    (ends_on - today).num_days()
}

/// Lifecycle status from the end date alone. The active flag is deliberately
/// not consulted: an early-terminated lease keeps its date-derived status and
/// the flag is honored where occupancy and billing decisions are made.
pub fn status_from_end_date(ends_on: NaiveDate, today: NaiveDate) -> LeaseStatus {
    let remaining = days_remaining(ends_on, today);
    if remaining < 0 {
        LeaseStatus::Expired
    } else if remaining <= DUE_SOON_WINDOW_DAYS {
        LeaseStatus::DueSoon
    } else {
        LeaseStatus::Active
    }
}

/// Status of a lease snapshot as of `today`, recomputing the end date from
/// the start date and term rather than trusting any stored copy.
pub fn derive_status(lease: &LeaseSnapshot, today: NaiveDate) -> Result<LeaseStatus, EngineError> {
    Ok(status_from_end_date(lease.ends_on()?, today))
}

/// Total monthly charge: the sum of all five lines. Negative or non-finite
/// lines are rejected rather than silently summed.
pub fn monthly_total(charges: &MonthlyCharges) -> Result<f64, EngineError> {
    let lines = [
        ("base_rent", charges.base_rent),
        ("common_charges", charges.common_charges),
        ("electricity", charges.electricity),
        ("water", charges.water),
        ("other_charges", charges.other_charges),
    ];
    let mut total = 0.0;
    for (name, amount) in lines {
        if !amount.is_finite() || amount < 0.0 {
            return Err(EngineError::InvalidAmount(format!(
                "{name} must be a non-negative amount, got {amount}"
            )));
        }
        total += amount;
    }
    Ok(total)
}

/// Fixed due date for a billing period: the 10th of the given month.
pub fn billing_due_date(month: u32, year: i32) -> Result<NaiveDate, EngineError> {
    NaiveDate::from_ymd_opt(year, month, DUE_DAY_OF_MONTH).ok_or_else(|| {
        EngineError::InvalidDate(format!("no day {DUE_DAY_OF_MONTH} in {year}-{month:02}"))
    })
}

/// Whether the lease is billable in the given period.
///
/// Inactive leases never bill, and neither does a lease whose end date is
/// already behind `reference_date` (the real current date, not the billing
/// month — past periods of a lease that has since ended are not regenerated).
/// Otherwise the lease bills iff its term spans the period's due date. Pure
/// in all arguments, so re-running a settlement batch for the same period
/// yields the same documents.
pub fn is_due_in_month(
    lease: &LeaseSnapshot,
    month: u32,
    year: i32,
    reference_date: NaiveDate,
) -> Result<bool, EngineError> {
    if !lease.is_active {
        return Ok(false);
    }
    let ends_on = lease.ends_on()?;
    if ends_on < reference_date {
        return Ok(false);
    }
    let due_on = billing_due_date(month, year)?;
    Ok(lease.starts_on <= due_on && due_on <= ends_on)
}

/// Next rent-update date: the first `starts_on + k * update_interval_months`
/// (k = 1, 2, …) on or after `today`. Candidates are always computed from the
/// start date so month-end clamping never compounds. Returns `None` when the
/// first such candidate falls on or after the contract end date — no update
/// is scheduled at or past the end of the contract.
pub fn next_update_on(
    lease: &LeaseSnapshot,
    today: NaiveDate,
) -> Result<Option<NaiveDate>, EngineError> {
    if lease.update_interval_months == 0 {
        return Err(EngineError::InvalidInterval(
            "update_interval_months must be at least 1".to_string(),
        ));
    }
    let ends_on = lease.ends_on()?;
    for k in 1u32.. {
        let months = k.checked_mul(lease.update_interval_months).ok_or_else(|| {
            EngineError::InvalidDate("update schedule is out of calendar range".to_string())
        })?;
        let candidate = add_months(lease.starts_on, months)?;
        if candidate >= ends_on {
            return Ok(None);
        }
        if candidate >= today {
            return Ok(Some(candidate));
        }
    }
    unreachable!("candidate dates increase monotonically");
}

pub fn parse_date(value: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| EngineError::InvalidDate(format!("expected YYYY-MM-DD, got {value:?}")))
}

fn row_date(row: &Map<String, Value>, key: &str) -> Result<NaiveDate, EngineError> {
    match row.get(key) {
        Some(Value::String(raw)) => parse_date(raw),
        Some(Value::Null) | None => Err(EngineError::InvalidDate(format!("{key} is missing"))),
        Some(other) => Err(EngineError::InvalidDate(format!(
            "{key} is not a date string: {other}"
        ))),
    }
}

fn row_positive_months(row: &Map<String, Value>, key: &str) -> Result<u32, EngineError> {
    let raw = match row.get(key) {
        Some(Value::Number(num)) => num.as_i64(),
        Some(Value::String(raw)) => raw.trim().parse::<i64>().ok(),
        _ => None,
    };
    match raw {
        Some(months) if months >= 1 => u32::try_from(months).map_err(|_| {
            EngineError::InvalidInterval(format!("{key} is out of range: {months}"))
        }),
        Some(months) => Err(EngineError::InvalidInterval(format!(
            "{key} must be at least 1, got {months}"
        ))),
        None => Err(EngineError::InvalidInterval(format!("{key} is missing"))),
    }
}

// Numeric columns come back as JSON numbers, but text payloads occasionally
// carry them as strings; accept both. Null and absent both mean zero.
fn row_amount(row: &Map<String, Value>, key: &str) -> f64 {
    match row.get(key) {
        Some(Value::Number(num)) => num.as_f64().unwrap_or(0.0),
        Some(Value::String(raw)) => raw.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn lease(starts_on: NaiveDate, term_months: u32) -> LeaseSnapshot {
        LeaseSnapshot {
            starts_on,
            term_months,
            update_interval_months: 12,
            is_active: true,
            charges: MonthlyCharges::default(),
        }
    }

    #[test]
    fn adds_months_preserving_day() {
        assert_eq!(
            add_months(date(2024, 1, 15), 12).unwrap(),
            date(2025, 1, 15)
        );
    }

    #[test]
    fn adds_months_clamping_to_month_end() {
        assert_eq!(add_months(date(2024, 1, 31), 1).unwrap(), date(2024, 2, 29));
        assert_eq!(add_months(date(2023, 1, 31), 1).unwrap(), date(2023, 2, 28));
        assert_eq!(add_months(date(2023, 8, 31), 1).unwrap(), date(2023, 9, 30));
    }

    #[test]
    fn end_of_term_rejects_zero_term() {
        assert_eq!(
            end_of_term(date(2024, 1, 15), 0),
            Err(EngineError::InvalidInterval(
                "term_months must be at least 1".to_string()
            ))
        );
    }

    #[test]
    fn status_boundaries() {
        let today = date(2024, 6, 1);
        assert_eq!(status_from_end_date(today, today), LeaseStatus::DueSoon);
        assert_eq!(
            status_from_end_date(date(2024, 5, 31), today),
            LeaseStatus::Expired
        );
        assert_eq!(
            status_from_end_date(date(2024, 7, 1), today), // today + 30
            LeaseStatus::DueSoon
        );
        assert_eq!(
            status_from_end_date(date(2024, 7, 2), today), // today + 31
            LeaseStatus::Active
        );
    }

    #[test]
    fn status_never_moves_backward_as_time_passes() {
        let ends_on = date(2024, 12, 31);
        let mut today = date(2024, 1, 1);
        let mut rank = 0;
        while today <= date(2025, 3, 1) {
            let next_rank = match status_from_end_date(ends_on, today) {
                LeaseStatus::Active => 0,
                LeaseStatus::DueSoon => 1,
                LeaseStatus::Expired => 2,
            };
            assert!(next_rank >= rank, "status went backward on {today}");
            rank = next_rank;
            today += chrono::Duration::days(1);
        }
        assert_eq!(rank, 2);
    }

    #[test]
    fn derive_status_recomputes_end_from_term() {
        let lease = lease(date(2024, 1, 15), 12);
        assert_eq!(lease.ends_on().unwrap(), date(2025, 1, 15));
        assert_eq!(
            derive_status(&lease, date(2024, 6, 1)).unwrap(),
            LeaseStatus::Active
        );
        assert_eq!(
            derive_status(&lease, date(2025, 1, 15)).unwrap(),
            LeaseStatus::DueSoon
        );
        assert_eq!(
            derive_status(&lease, date(2025, 1, 16)).unwrap(),
            LeaseStatus::Expired
        );
    }

    #[test]
    fn monthly_total_sums_all_lines() {
        let charges = MonthlyCharges {
            base_rent: 250_000.0,
            common_charges: 40_000.0,
            electricity: 12_500.5,
            water: 8_000.0,
            other_charges: 1_000.0,
        };
        assert_eq!(monthly_total(&charges).unwrap(), 311_501.5);
    }

    #[test]
    fn monthly_total_treats_defaults_as_zero() {
        assert_eq!(monthly_total(&MonthlyCharges::default()).unwrap(), 0.0);
        let rent_only = MonthlyCharges {
            base_rent: 180_000.0,
            ..MonthlyCharges::default()
        };
        assert_eq!(monthly_total(&rent_only).unwrap(), 180_000.0);
    }

    #[test]
    fn monthly_total_rejects_negative_lines() {
        let charges = MonthlyCharges {
            water: -1.0,
            ..MonthlyCharges::default()
        };
        assert!(matches!(
            monthly_total(&charges),
            Err(EngineError::InvalidAmount(_))
        ));
    }

    #[test]
    fn billing_due_date_is_the_tenth() {
        assert_eq!(billing_due_date(6, 2024).unwrap(), date(2024, 6, 10));
        assert!(matches!(
            billing_due_date(13, 2024),
            Err(EngineError::InvalidDate(_))
        ));
    }

    #[test]
    fn due_in_month_when_term_spans_the_tenth() {
        // starts 2024-01-15, 12 months -> ends 2025-01-15
        let lease = lease(date(2024, 1, 15), 12);
        let reference = date(2024, 3, 1);
        assert!(is_due_in_month(&lease, 6, 2024, reference).unwrap());
        // January 10th 2024 is before the start date
        assert!(!is_due_in_month(&lease, 1, 2024, reference).unwrap());
        // February 10th 2025 is after the end date
        assert!(!is_due_in_month(&lease, 2, 2025, date(2025, 1, 1)).unwrap());
    }

    #[test]
    fn due_in_month_excludes_inactive_and_already_ended_leases() {
        let mut inactive = lease(date(2024, 1, 15), 12);
        inactive.is_active = false;
        assert!(!is_due_in_month(&inactive, 6, 2024, date(2024, 3, 1)).unwrap());

        // Ended before the reference date: even a historically valid period
        // is excluded.
        let ended = lease(date(2023, 1, 1), 12);
        assert!(!is_due_in_month(&ended, 6, 2023, date(2024, 6, 1)).unwrap());
    }

    #[test]
    fn due_in_month_is_repeatable() {
        let lease = lease(date(2024, 1, 15), 12);
        let first = is_due_in_month(&lease, 6, 2024, date(2024, 3, 1)).unwrap();
        let second = is_due_in_month(&lease, 6, 2024, date(2024, 3, 1)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn next_update_skips_past_candidates() {
        let mut lease = lease(date(2024, 1, 15), 24);
        lease.update_interval_months = 6;
        // candidates: 2024-07-15, 2025-01-15, 2025-07-15; ends 2026-01-15
        assert_eq!(
            next_update_on(&lease, date(2024, 8, 1)).unwrap(),
            Some(date(2025, 1, 15))
        );
        assert_eq!(
            next_update_on(&lease, date(2024, 2, 1)).unwrap(),
            Some(date(2024, 7, 15))
        );
    }

    #[test]
    fn no_update_scheduled_at_or_past_contract_end() {
        let mut half_yearly = lease(date(2024, 1, 15), 12);
        half_yearly.update_interval_months = 6;
        // 2024-07-15 has passed; the next candidate 2025-01-15 lands exactly
        // on the end date, so nothing is pending.
        assert_eq!(next_update_on(&half_yearly, date(2024, 8, 1)).unwrap(), None);

        let mut long_interval = lease(date(2024, 1, 15), 12);
        long_interval.update_interval_months = 18;
        assert_eq!(
            next_update_on(&long_interval, date(2024, 2, 1)).unwrap(),
            None
        );
    }

    #[test]
    fn next_update_rejects_zero_interval() {
        let mut lease = lease(date(2024, 1, 15), 12);
        lease.update_interval_months = 0;
        assert!(matches!(
            next_update_on(&lease, date(2024, 2, 1)),
            Err(EngineError::InvalidInterval(_))
        ));
    }

    #[test]
    fn snapshot_from_row_defaults_missing_charges_to_zero() {
        let row = json!({
            "starts_on": "2024-01-15",
            "term_months": 24,
            "update_interval_months": 12,
            "is_active": true,
            "base_rent": 250000,
            "electricity": Value::Null,
        });
        let snapshot = LeaseSnapshot::from_row(row.as_object().unwrap()).unwrap();
        assert_eq!(snapshot.charges.base_rent, 250_000.0);
        assert_eq!(snapshot.charges.electricity, 0.0);
        assert_eq!(snapshot.charges.water, 0.0);
        assert_eq!(monthly_total(&snapshot.charges).unwrap(), 250_000.0);
    }

    #[test]
    fn snapshot_from_row_rejects_bad_rows() {
        let no_date = json!({ "term_months": 24, "update_interval_months": 12 });
        assert!(matches!(
            LeaseSnapshot::from_row(no_date.as_object().unwrap()),
            Err(EngineError::InvalidDate(_))
        ));

        let bad_term = json!({
            "starts_on": "2024-01-15",
            "term_months": 0,
            "update_interval_months": 12,
        });
        assert!(matches!(
            LeaseSnapshot::from_row(bad_term.as_object().unwrap()),
            Err(EngineError::InvalidInterval(_))
        ));

        let garbled = json!({
            "starts_on": "15/01/2024",
            "term_months": 24,
            "update_interval_months": 12,
        });
        assert!(matches!(
            LeaseSnapshot::from_row(garbled.as_object().unwrap()),
            Err(EngineError::InvalidDate(_))
        ));
    }
}
