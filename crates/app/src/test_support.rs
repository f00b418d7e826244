use std::time::Duration;

use chrono::Utc;
use customer_crud_core::Customer;
use customer_crud_storage::Database;

use crate::{router::AppState, telemetry};

pub async fn setup_db() -> Database {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("connect");
    db.run_migrations().await.expect("migrations");
    db
}

pub async fn setup_state() -> AppState {
    setup_state_with_db().await.0
}

/// Builds state over one in-memory store and hands back that store for seeding.
pub async fn setup_state_with_db() -> (AppState, Database) {
    let metrics = telemetry::init_metrics().expect("metrics init");
    let db = setup_db().await;
    let state = AppState::new(metrics, db.clone(), db.clone(), Duration::from_secs(3600));
    (state, db)
}

pub fn customer(firstname: &str, lastname: &str, email: &str, bank_account: &str) -> Customer {
    Customer::create(
        firstname,
        lastname,
        "1990-04-12",
        "+31612345678",
        email,
        bank_account,
        Utc::now(),
    )
    .expect("valid customer")
}
