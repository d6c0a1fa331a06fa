// ============================================================================
// OLYMPUS CLOUD - RENTAL TRANSACTION ENGINE
// ============================================================================
// Module: engine/src/lib.rs
// Description: Facade bundling the five transactional engines (C1-C5) that
// issue, track, return, extend, and account for rentals and purchases. No
// HTTP surface lives here - callers (API gateways, background jobs,
// schedulers) reach the domain through plain async methods on `RentalEngine`.
// ============================================================================

pub mod config;
pub mod models;
mod retry;
pub mod services;

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::Mutex;

use olympus_shared::events::EventPublisher;

pub use config::RentalEngineConfig;
use services::{InventoryService, JournalService, PurchaseService, RentalService, TransactionService};

/// Entry point into the transactional engine. Holds one `Arc` per service so
/// the engine itself can be cloned cheaply and shared across tasks.
#[derive(Clone)]
pub struct RentalEngine {
    pub inventory: Arc<InventoryService>,
    pub transactions: Arc<TransactionService>,
    pub rentals: Arc<RentalService>,
    pub purchases: Arc<PurchaseService>,
    pub journal: Arc<JournalService>,
}

impl RentalEngine {
    pub fn new(pool: PgPool, event_publisher: Arc<Mutex<EventPublisher>>, config: RentalEngineConfig) -> Self {
        let inventory = Arc::new(InventoryService::new(pool.clone(), event_publisher.clone()));
        let transactions = Arc::new(TransactionService::new(pool.clone()));
        let journal = Arc::new(JournalService::new(pool.clone()));

        let rentals = Arc::new(RentalService::new(
            pool.clone(),
            inventory.clone(),
            transactions.clone(),
            event_publisher.clone(),
            config.clone(),
        ));

        let purchases = Arc::new(PurchaseService::new(
            pool,
            inventory.clone(),
            transactions.clone(),
            event_publisher,
            config,
        ));

        Self { inventory, transactions, rentals, purchases, journal }
    }
}
