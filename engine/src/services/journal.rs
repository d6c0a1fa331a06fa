// ============================================================================
// EVENT JOURNAL (C5)
// ============================================================================
// Module: engine/src/services/journal.rs
// Description: Durable, append-only, per-transaction audit trail. Distinct
// from `olympus_shared::events::EventPublisher` (Redis pub/sub broadcast for
// other services) - this is the canonical record, written in the same
// transaction as the mutation it describes, so a rolled-back operation never
// leaves a journal entry behind.
// ============================================================================

use olympus_shared::error::Result;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::TransactionEvent;

pub struct JournalService {
    pool: PgPool,
}

impl JournalService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one event to the journal, sharing the transaction scope of
    /// the mutation it describes.
    pub async fn record(
        tx: &mut Transaction<'_, Postgres>,
        transaction_header_id: Uuid,
        event_type: &str,
        description: &str,
        actor: Option<Uuid>,
        payload: serde_json::Value,
    ) -> Result<TransactionEvent> {
        let event = sqlx::query_as::<_, TransactionEvent>(
            r#"INSERT INTO transaction_events
                   (transaction_header_id, event_type, description, actor, payload)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, transaction_header_id, event_type, description, actor,
                         payload, created_at"#,
        )
        .bind(transaction_header_id)
        .bind(event_type)
        .bind(description)
        .bind(actor)
        .bind(payload)
        .fetch_one(&mut **tx)
        .await?;

        Ok(event)
    }

    /// Retrieve every event for a header, ordered by occurrence.
    pub async fn history(&self, transaction_header_id: Uuid) -> Result<Vec<TransactionEvent>> {
        let events = sqlx::query_as::<_, TransactionEvent>(
            r#"SELECT id, transaction_header_id, event_type, description, actor, payload, created_at
               FROM transaction_events
               WHERE transaction_header_id = $1
               ORDER BY created_at ASC, id ASC"#,
        )
        .bind(transaction_header_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Retrieve events for a header filtered to a single event type,
    /// preserving occurrence order.
    pub async fn history_by_type(
        &self,
        transaction_header_id: Uuid,
        event_type: &str,
    ) -> Result<Vec<TransactionEvent>> {
        let events = sqlx::query_as::<_, TransactionEvent>(
            r#"SELECT id, transaction_header_id, event_type, description, actor, payload, created_at
               FROM transaction_events
               WHERE transaction_header_id = $1 AND event_type = $2
               ORDER BY created_at ASC, id ASC"#,
        )
        .bind(transaction_header_id)
        .bind(event_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}

pub mod event_types {
    pub const HEADER_CREATED: &str = "HeaderCreated";
    pub const PAYMENT_RECORDED: &str = "PaymentRecorded";
    pub const STATUS_CHANGED: &str = "StatusChanged";
    pub const RENTAL_CREATED: &str = "RENTAL_CREATED";
    pub const RENTAL_PICKUP: &str = "RENTAL_PICKUP";
    pub const RENTAL_RETURNED: &str = "RENTAL_RETURNED";
    pub const RENTAL_EXTENDED: &str = "RENTAL_EXTENDED";
    pub const INSPECTION_RECORDED: &str = "InspectionRecorded";
    pub const PURCHASE_CREATED: &str = "PurchaseCreated";
    pub const PURCHASE_RETURN_CREATED: &str = "PURCHASE_RETURN_CREATED";
    pub const PURCHASE_RETURN_APPROVED: &str = "PurchaseReturnApproved";
    pub const VENDOR_CREDIT_PROCESSED: &str = "VENDOR_CREDIT_PROCESSED";
}
