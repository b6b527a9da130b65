use axum::{routing::get, Router};

use crate::state::AppState;

pub mod dashboard;
pub mod health;
pub mod leases;
pub mod properties;
pub mod rent_indices;
pub mod settlements;
pub mod tenants;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(tenants::router())
        .merge(properties::router())
        .merge(leases::router())
        .merge(dashboard::router())
        .merge(settlements::router())
        .merge(rent_indices::router())
}
