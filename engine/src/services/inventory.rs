// ============================================================================
// INVENTORY LEDGER (C1)
// ============================================================================
// Module: engine/src/services/inventory.rs
// Description: Stock level accounting and serialized-unit reservation.
// Every mutation re-checks the on_hand = available + on_rent + damaged
// invariant before commit and fails closed (Integrity) if it is violated.
// ============================================================================

use std::sync::Arc;

use olympus_shared::error::{ConflictCode, Error, Result};
use olympus_shared::events::{
    inventory_events, DomainEvent, EventPublisher, LowStockAlertEvent, StockAdjustedEvent,
    UnitsReleasedEvent, UnitsReservedEvent,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::sync::Mutex;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::models::{ConditionRating, InventoryUnitStatus, StockLevel, StockMovement, StockMovementType};

pub struct InventoryService {
    pool: PgPool,
    event_publisher: Arc<Mutex<EventPublisher>>,
}

impl InventoryService {
    pub fn new(pool: PgPool, event_publisher: Arc<Mutex<EventPublisher>>) -> Self {
        Self { pool, event_publisher }
    }

    /// Lock (creating if absent) the stock level row for `(item_id, location_id)`.
    async fn lock_stock_level(
        tx: &mut Transaction<'_, Postgres>,
        item_id: Uuid,
        location_id: Uuid,
    ) -> Result<StockLevel> {
        if let Some(row) = sqlx::query_as::<_, StockLevel>(
            r#"SELECT id, item_id, location_id, quantity_on_hand, quantity_available,
                      quantity_on_rent, quantity_damaged, updated_at
               FROM stock_levels WHERE item_id = $1 AND location_id = $2 FOR UPDATE"#,
        )
        .bind(item_id)
        .bind(location_id)
        .fetch_optional(&mut **tx)
        .await?
        {
            return Ok(row);
        }

        sqlx::query_as::<_, StockLevel>(
            r#"INSERT INTO stock_levels (item_id, location_id)
               VALUES ($1, $2)
               ON CONFLICT (item_id, location_id) DO UPDATE SET item_id = EXCLUDED.item_id
               RETURNING id, item_id, location_id, quantity_on_hand, quantity_available,
                         quantity_on_rent, quantity_damaged, updated_at"#,
        )
        .bind(item_id)
        .bind(location_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::from)
    }

    /// Apply `(delta_available, delta_on_rent, delta_damaged)` to a stock
    /// level in its own transaction, recording a `StockMovement`.
    #[instrument(skip(self))]
    pub async fn adjust_stock(
        &self,
        item_id: Uuid,
        location_id: Uuid,
        delta_available: i32,
        delta_on_rent: i32,
        delta_damaged: i32,
        movement_type: StockMovementType,
        transaction_header_id: Option<Uuid>,
        transaction_line_id: Option<Uuid>,
    ) -> Result<StockMovement> {
        crate::retry::with_retry(|| {
            self.adjust_stock_attempt(
                item_id,
                location_id,
                delta_available,
                delta_on_rent,
                delta_damaged,
                movement_type,
                transaction_header_id,
                transaction_line_id,
            )
        })
        .await
    }

    async fn adjust_stock_attempt(
        &self,
        item_id: Uuid,
        location_id: Uuid,
        delta_available: i32,
        delta_on_rent: i32,
        delta_damaged: i32,
        movement_type: StockMovementType,
        transaction_header_id: Option<Uuid>,
        transaction_line_id: Option<Uuid>,
    ) -> Result<StockMovement> {
        let mut tx = self.pool.begin().await?;
        let movement = self
            .adjust_stock_in_tx(
                &mut tx,
                item_id,
                location_id,
                delta_available,
                delta_on_rent,
                delta_damaged,
                movement_type,
                transaction_header_id,
                transaction_line_id,
            )
            .await?;
        tx.commit().await?;

        self.publish_stock_adjusted(item_id, location_id, &movement).await;
        Ok(movement)
    }

    /// Same as [`adjust_stock`], but participates in a caller-owned
    /// transaction (used by the rental/purchase engines so the stock
    /// mutation and the business transaction commit atomically).
    pub async fn adjust_stock_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        item_id: Uuid,
        location_id: Uuid,
        delta_available: i32,
        delta_on_rent: i32,
        delta_damaged: i32,
        movement_type: StockMovementType,
        transaction_header_id: Option<Uuid>,
        transaction_line_id: Option<Uuid>,
    ) -> Result<StockMovement> {
        let before = Self::lock_stock_level(tx, item_id, location_id).await?;

        let new_available = before.quantity_available + delta_available;
        let new_on_rent = before.quantity_on_rent + delta_on_rent;
        let new_damaged = before.quantity_damaged + delta_damaged;

        // Materialization, write-off, and vendor-return restock change the
        // physical unit count; rent-out/return/sale movements only transfer
        // quantity between buckets and leave on_hand untouched.
        let new_on_hand = if matches!(
            movement_type,
            StockMovementType::PurchaseReceipt | StockMovementType::WriteOff | StockMovementType::ReturnRestock
        ) {
            before.quantity_on_hand + delta_available + delta_on_rent + delta_damaged
        } else {
            before.quantity_on_hand
        };

        if new_available < 0 || new_on_rent < 0 || new_damaged < 0 || new_on_hand < 0 {
            return Err(Error::conflict(
                ConflictCode::InsufficientStock,
                format!(
                    "insufficient stock for item {item_id} at location {location_id}: \
                     requested change (avail {delta_available}, on_rent {delta_on_rent}, damaged {delta_damaged}) \
                     would underflow current levels"
                ),
            ));
        }

        if new_on_hand != new_available + new_on_rent + new_damaged {
            return Err(Error::Integrity(format!(
                "stock level invariant violated for item {item_id} at location {location_id}: \
                 on_hand {new_on_hand} != available {new_available} + on_rent {new_on_rent} + damaged {new_damaged}"
            )));
        }

        sqlx::query(
            r#"UPDATE stock_levels
               SET quantity_on_hand = $1, quantity_available = $2,
                   quantity_on_rent = $3, quantity_damaged = $4, updated_at = now()
               WHERE id = $5"#,
        )
        .bind(new_on_hand)
        .bind(new_available)
        .bind(new_on_rent)
        .bind(new_damaged)
        .bind(before.id)
        .execute(&mut **tx)
        .await?;

        let quantity_change = delta_available + delta_on_rent + delta_damaged;
        let movement = sqlx::query_as::<_, StockMovement>(
            r#"INSERT INTO stock_movements
                   (stock_level_id, movement_type, quantity_change, quantity_before,
                    quantity_after, transaction_header_id, transaction_line_id)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id, stock_level_id, movement_type, quantity_change,
                         quantity_before, quantity_after, transaction_header_id,
                         transaction_line_id, created_at"#,
        )
        .bind(before.id)
        .bind(movement_type)
        .bind(quantity_change)
        .bind(before.quantity_on_hand)
        .bind(new_on_hand)
        .bind(transaction_header_id)
        .bind(transaction_line_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(movement)
    }

    async fn publish_stock_adjusted(&self, item_id: Uuid, location_id: Uuid, movement: &StockMovement) {
        let event = match DomainEvent::builder(
            inventory_events::STOCK_ADJUSTED.to_string(),
            item_id,
            "Item".to_string(),
        )
        .data(StockAdjustedEvent {
            item_id,
            location_id,
            adjustment_type: format!("{:?}", movement.movement_type),
            quantity_change: Decimal::from(movement.quantity_change),
            quantity_on_hand_after: Decimal::from(movement.quantity_after),
            reason: None,
        }) {
            Ok(builder) => builder.build(),
            Err(e) => {
                warn!(error = %e, "failed to serialize stock adjustment event");
                return;
            }
        };

        if let Err(e) = self.event_publisher.lock().await.publish(&event).await {
            warn!(error = %e, "failed to publish stock adjusted event");
        }
    }

    /// Reserve `quantity` serialized [`InventoryUnit`]s for a rental line,
    /// using `SELECT ... FOR UPDATE SKIP LOCKED` so concurrent callers race
    /// for disjoint unit sets rather than blocking on each other.
    #[instrument(skip(self))]
    pub async fn reserve_units(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        item_id: Uuid,
        location_id: Uuid,
        quantity: i32,
        transaction_line_id: Uuid,
    ) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"SELECT id FROM inventory_units
               WHERE item_id = $1 AND location_id = $2 AND status = 'AVAILABLE'
               ORDER BY created_at
               FOR UPDATE SKIP LOCKED
               LIMIT $3"#,
        )
        .bind(item_id)
        .bind(location_id)
        .bind(quantity as i64)
        .fetch_all(&mut **tx)
        .await?;

        let unit_ids: Vec<Uuid> = rows.iter().map(|r| r.get::<Uuid, _>("id")).collect();

        if unit_ids.len() < quantity as usize {
            return Err(Error::conflict(
                ConflictCode::InsufficientUnits,
                format!(
                    "requested {quantity} serialized units of item {item_id} at location {location_id}, \
                     only {} available",
                    unit_ids.len()
                ),
            ));
        }

        sqlx::query(
            r#"UPDATE inventory_units
               SET status = 'RENTED', current_rental_line_id = $1, updated_at = now()
               WHERE id = ANY($2)"#,
        )
        .bind(transaction_line_id)
        .bind(&unit_ids)
        .execute(&mut **tx)
        .await?;

        Ok(unit_ids)
    }

    /// Release previously-reserved units back into circulation on return.
    /// `A`/`B` condition units return to `AVAILABLE`; `C`/`D`/`F` move to
    /// `DAMAGED` pending repair disposition.
    #[instrument(skip(self))]
    pub async fn release_units(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        unit_ids: &[Uuid],
        condition: ConditionRating,
    ) -> Result<()> {
        if unit_ids.is_empty() {
            return Ok(());
        }

        let new_status = if matches!(condition, ConditionRating::A | ConditionRating::B) {
            InventoryUnitStatus::Available
        } else {
            InventoryUnitStatus::Damaged
        };

        sqlx::query(
            r#"UPDATE inventory_units
               SET status = $1, current_rental_line_id = NULL, updated_at = now()
               WHERE id = ANY($2)"#,
        )
        .bind(new_status)
        .bind(unit_ids)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Emit a `UnitsReleasedEvent` after the owning transaction has
    /// committed. Called by the rental engine alongside its own return
    /// event, not from inside `release_units` (which may run several times
    /// within a single still-open transaction).
    pub async fn notify_units_released(
        &self,
        item_id: Uuid,
        location_id: Uuid,
        unit_ids: Vec<Uuid>,
        transaction_id: Uuid,
        new_state: InventoryUnitStatus,
    ) {
        let event = match DomainEvent::builder(
            inventory_events::UNITS_RELEASED.to_string(),
            item_id,
            "Item".to_string(),
        )
        .data(UnitsReleasedEvent {
            item_id,
            location_id,
            unit_ids,
            transaction_id,
            new_state: format!("{new_state:?}"),
        }) {
            Ok(builder) => builder.build(),
            Err(e) => {
                warn!(error = %e, "failed to serialize units released event");
                return;
            }
        };

        if let Err(e) = self.event_publisher.lock().await.publish(&event).await {
            warn!(error = %e, "failed to publish units released event");
        }
    }

    pub async fn notify_units_reserved(
        &self,
        item_id: Uuid,
        location_id: Uuid,
        unit_ids: Vec<Uuid>,
        transaction_id: Uuid,
    ) {
        let event = match DomainEvent::builder(
            inventory_events::UNITS_RESERVED.to_string(),
            item_id,
            "Item".to_string(),
        )
        .data(UnitsReservedEvent {
            item_id,
            location_id,
            unit_ids,
            transaction_id,
        }) {
            Ok(builder) => builder.build(),
            Err(e) => {
                warn!(error = %e, "failed to serialize units reserved event");
                return;
            }
        };

        if let Err(e) = self.event_publisher.lock().await.publish(&event).await {
            warn!(error = %e, "failed to publish units reserved event");
        }
    }

    /// Create `quantity` new `AVAILABLE` units for an item at a location,
    /// from a purchase receipt. One unit per entry in `serial_numbers` when
    /// the item requires serialization; otherwise `quantity` units sharing
    /// `batch_code`.
    #[instrument(skip(self))]
    pub async fn materialize_units(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        item_id: Uuid,
        location_id: Uuid,
        quantity: i32,
        unit_cost: Decimal,
        batch_code: Option<String>,
        serial_numbers: Option<Vec<String>>,
        transaction_header_id: Option<Uuid>,
        transaction_line_id: Option<Uuid>,
    ) -> Result<Vec<Uuid>> {
        if let Some(serials) = &serial_numbers {
            if serials.len() != quantity as usize {
                return Err(Error::validation(
                    "serial_numbers",
                    format!("expected {quantity} serial numbers, got {}", serials.len()),
                    "SERIAL_COUNT_MISMATCH",
                ));
            }
        }

        let mut unit_ids = Vec::with_capacity(quantity as usize);
        for i in 0..quantity {
            let serial = serial_numbers.as_ref().map(|s| s[i as usize].clone());
            let id: Uuid = sqlx::query_scalar(
                r#"INSERT INTO inventory_units
                       (item_id, location_id, serial_number, batch_code, status, unit_cost)
                   VALUES ($1, $2, $3, $4, 'AVAILABLE', $5)
                   RETURNING id"#,
            )
            .bind(item_id)
            .bind(location_id)
            .bind(serial)
            .bind(batch_code.clone())
            .bind(unit_cost)
            .fetch_one(&mut **tx)
            .await?;
            unit_ids.push(id);
        }

        self.adjust_stock_in_tx(
            tx,
            item_id,
            location_id,
            quantity,
            0,
            0,
            StockMovementType::PurchaseReceipt,
            transaction_header_id,
            transaction_line_id,
        )
        .await?;

        Ok(unit_ids)
    }

    pub async fn maybe_alert_low_stock(&self, item_id: Uuid, location_id: Uuid, threshold: i32) {
        let Ok(row) = sqlx::query_as::<_, (i32,)>(
            "SELECT quantity_available FROM stock_levels WHERE item_id = $1 AND location_id = $2",
        )
        .bind(item_id)
        .bind(location_id)
        .fetch_one(&self.pool)
        .await
        else {
            return;
        };

        if row.0 > threshold {
            return;
        }

        let event = match DomainEvent::builder(
            inventory_events::LOW_STOCK_ALERT.to_string(),
            item_id,
            "Item".to_string(),
        )
        .data(LowStockAlertEvent {
            item_id,
            location_id,
            quantity_available: Decimal::from(row.0),
            threshold: Decimal::from(threshold),
        }) {
            Ok(builder) => builder.build(),
            Err(e) => {
                warn!(error = %e, "failed to serialize low stock alert");
                return;
            }
        };

        if let Err(e) = self.event_publisher.lock().await.publish(&event).await {
            warn!(error = %e, "failed to publish low stock alert");
        }
    }
}
