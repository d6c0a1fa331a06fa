// ============================================================================
// RENTAL ENGINE (C3)
// ============================================================================
// Module: engine/src/services/rental.rs
// Description: Create/pickup/return/extend a rental and answer availability
// queries. Each public operation is exactly one database transaction; on any
// error the transaction is dropped without `commit()`, which rolls it back
// and leaves no journal entry behind.
// ============================================================================

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use olympus_shared::error::{ConflictCode, Error, FieldError, Result};
use olympus_shared::events::{
    rental_events, DomainEvent, EventPublisher, RentalCreatedEvent, RentalExtendedEvent,
    RentalReturnedEvent,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

use crate::config::RentalEngineConfig;
use crate::models::{
    ConditionRating, CreateRentalRequest, CustomerStatus, Disposition, ExtendRentalRequest,
    InventoryUnitStatus, LineSpec, ProcessReturnRequest, RentalPeriodUnit, RentalStatus,
    StockMovementType, TransactionHeader, TransactionLine, TransactionStatus, TransactionSummary,
    TransactionTotals, TransactionType,
};
use crate::services::inventory::InventoryService;
use crate::services::journal::{event_types, JournalService};
use crate::services::transaction::TransactionService;

pub struct RentalService {
    pool: PgPool,
    inventory: Arc<InventoryService>,
    transactions: Arc<TransactionService>,
    event_publisher: Arc<Mutex<EventPublisher>>,
    config: RentalEngineConfig,
}

struct ItemPricing {
    item_id: Uuid,
    sku: String,
    description: Option<String>,
    is_rentable: bool,
    requires_serial_number: bool,
    base_rate: Option<Decimal>,
    security_deposit: Option<Decimal>,
}

impl RentalService {
    pub fn new(
        pool: PgPool,
        inventory: Arc<InventoryService>,
        transactions: Arc<TransactionService>,
        event_publisher: Arc<Mutex<EventPublisher>>,
        config: RentalEngineConfig,
    ) -> Self {
        Self { pool, inventory, transactions, event_publisher, config }
    }

    fn period_days(unit: RentalPeriodUnit) -> i64 {
        match unit {
            RentalPeriodUnit::Day => 1,
            RentalPeriodUnit::Week => 7,
            RentalPeriodUnit::Month => 30,
        }
    }

    async fn load_item_pricing(&self, item_id: Uuid) -> Result<ItemPricing> {
        let row = sqlx::query(
            r#"SELECT id, sku, name, is_rentable, requires_serial_number,
                      rental_rate_per_period, security_deposit
               FROM items WHERE id = $1"#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found(format!("item {item_id} not found")))?;

        Ok(ItemPricing {
            item_id: row.get("id"),
            sku: row.get("sku"),
            description: row.get("name"),
            is_rentable: row.get("is_rentable"),
            requires_serial_number: row.get("requires_serial_number"),
            base_rate: row.get("rental_rate_per_period"),
            security_deposit: row.get("security_deposit"),
        })
    }

    async fn best_rate_for_periods(&self, item_id: Uuid, base_rate: Decimal, periods: i32) -> Decimal {
        let tiered: Option<Decimal> = sqlx::query_scalar(
            r#"SELECT rate_per_period FROM item_tiered_rates
               WHERE item_id = $1 AND min_periods <= $2
               ORDER BY min_periods DESC LIMIT 1"#,
        )
        .bind(item_id)
        .bind(periods)
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten();

        tiered.unwrap_or(base_rate)
    }

    /// Reserved quantity for overlapping active rental lines of an item at
    /// a location, within `[start, end]`.
    async fn reserved_quantity(
        &self,
        item_id: Uuid,
        location_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        exclude_line_id: Option<Uuid>,
    ) -> Result<i32> {
        let reserved: Option<i64> = sqlx::query_scalar(
            r#"SELECT SUM(tl.quantity)
               FROM transaction_lines tl
               JOIN transaction_headers th ON th.id = tl.transaction_header_id
               WHERE tl.item_id = $1 AND th.location_id = $2
                 AND th.transaction_type = 'RENTAL'
                 AND th.status IN ('PENDING', 'IN_PROGRESS')
                 AND tl.rental_start_date <= $4 AND tl.rental_end_date >= $3
                 AND ($5::uuid IS NULL OR tl.id != $5)"#,
        )
        .bind(item_id)
        .bind(location_id)
        .bind(start)
        .bind(end)
        .bind(exclude_line_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(reserved.unwrap_or(0) as i32)
    }

    async fn inventory_at_location(&self, item_id: Uuid, location_id: Uuid) -> Result<i32> {
        let on_hand: Option<i32> = sqlx::query_scalar(
            "SELECT quantity_on_hand FROM stock_levels WHERE item_id = $1 AND location_id = $2",
        )
        .bind(item_id)
        .bind(location_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(on_hand.unwrap_or(0))
    }

    pub async fn check_availability(
        &self,
        item_id: Uuid,
        location_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        requested_quantity: i32,
    ) -> Result<crate::models::AvailabilityReport> {
        let inventory = self.inventory_at_location(item_id, location_id).await?;
        let reserved = self.reserved_quantity(item_id, location_id, start, end, None).await?;
        let available = inventory - reserved;

        let mut alternative_windows = Vec::new();
        if available < requested_quantity {
            let window_len = (end - start).num_days().max(0);
            let mut probe_start = end + Duration::days(1);
            for _ in 0..30 {
                let probe_end = probe_start + Duration::days(window_len);
                let probe_reserved = self
                    .reserved_quantity(item_id, location_id, probe_start, probe_end, None)
                    .await?;
                if inventory - probe_reserved >= requested_quantity {
                    alternative_windows.push(crate::models::AvailabilityWindow {
                        start: probe_start,
                        end: probe_end,
                    });
                    if alternative_windows.len() >= 3 {
                        break;
                    }
                }
                probe_start += Duration::days(1);
            }
        }

        Ok(crate::models::AvailabilityReport {
            item_id,
            location_id,
            inventory_at_location: inventory,
            reserved,
            available,
            alternative_windows,
        })
    }

    #[instrument(skip(self, request))]
    pub async fn create_rental(&self, request: CreateRentalRequest) -> Result<TransactionSummary> {
        crate::retry::with_retry(|| self.create_rental_attempt(request.clone())).await
    }

    async fn create_rental_attempt(&self, request: CreateRentalRequest) -> Result<TransactionSummary> {
        let customer_status: Option<CustomerStatus> =
            sqlx::query_scalar("SELECT status FROM customers WHERE id = $1")
                .bind(request.customer_id)
                .fetch_optional(&self.pool)
                .await?;
        let customer_status = customer_status
            .ok_or_else(|| Error::not_found(format!("customer {} not found", request.customer_id)))?;
        if customer_status == CustomerStatus::Blacklisted {
            return Err(Error::conflict(
                ConflictCode::InvalidTransition,
                "customer is blacklisted and cannot open new rentals",
            ));
        }

        let mut priced_lines = Vec::with_capacity(request.items.len());
        let mut field_errors = Vec::new();

        for (idx, item_req) in request.items.iter().enumerate() {
            if item_req.rental_end_date < item_req.rental_start_date {
                field_errors.push(FieldError::new(
                    format!("items[{idx}].rental_end_date"),
                    "rental_end_date must not precede rental_start_date",
                    "INVALID_DATE_RANGE",
                ));
                continue;
            }

            let pricing = match self.load_item_pricing(item_req.item_id).await {
                Ok(p) => p,
                Err(_) => {
                    field_errors.push(FieldError::new(
                        format!("items[{idx}].item_id"),
                        "item not found",
                        "ITEM_NOT_FOUND",
                    ));
                    continue;
                }
            };
            if !pricing.is_rentable {
                field_errors.push(FieldError::new(
                    format!("items[{idx}].item_id"),
                    "item is not rentable",
                    "ITEM_NOT_RENTABLE",
                ));
                continue;
            }

            let availability = self
                .check_availability(
                    item_req.item_id,
                    request.location_id,
                    item_req.rental_start_date,
                    item_req.rental_end_date,
                    item_req.quantity,
                )
                .await?;
            if availability.available < item_req.quantity {
                return Err(Error::conflict(
                    ConflictCode::Overbooked,
                    format!(
                        "item {} requested quantity {} exceeds available {} for the window {}..{}",
                        item_req.item_id, item_req.quantity, availability.available,
                        item_req.rental_start_date, item_req.rental_end_date
                    ),
                ));
            }

            let unit = RentalPeriodUnit::from(item_req.rental_period_type);
            let duration_days = (item_req.rental_end_date - item_req.rental_start_date).num_days() + 1;
            let period_days = Self::period_days(unit) * item_req.rental_period_value as i64;
            let periods = ((duration_days as f64) / (period_days as f64)).ceil().max(1.0) as i32;

            let base_rate = item_req
                .unit_rate
                .or(pricing.base_rate)
                .ok_or_else(|| Error::validation(format!("items[{idx}].unit_rate"), "no rate available for item", "MISSING_RATE"))?;
            let rate = self.best_rate_for_periods(item_req.item_id, base_rate, periods).await;

            let discount = item_req.discount_value.unwrap_or(Decimal::ZERO);
            let gross = rate * Decimal::from(item_req.quantity) * Decimal::from(periods);
            let line_total = gross - discount;
            let tax = line_total * self.config.default_tax_rate / Decimal::from(100);

            priced_lines.push((
                LineSpec {
                    item_id: pricing.item_id,
                    sku: pricing.sku.clone(),
                    description: pricing.description.clone(),
                    quantity: item_req.quantity,
                    unit_price: rate,
                    discount_amount: discount,
                    tax_amount: tax,
                    line_total,
                    rental_start_date: Some(item_req.rental_start_date),
                    rental_end_date: Some(item_req.rental_end_date),
                    rental_period: Some(item_req.rental_period_value),
                    rental_period_unit: Some(unit),
                    daily_rate: Some(rate / Decimal::from(period_days.max(1))),
                },
                pricing,
                item_req.clone(),
            ));
        }

        if !field_errors.is_empty() {
            return Err(Error::Validation(field_errors));
        }

        let subtotal: Decimal = priced_lines.iter().map(|(l, _, _)| l.line_total).sum();
        let tax_amount: Decimal = priced_lines.iter().map(|(l, _, _)| l.tax_amount).sum();
        let total_amount = subtotal + tax_amount;
        let deposit_amount = request.deposit_amount.unwrap_or_else(|| {
            priced_lines
                .iter()
                .map(|(l, pricing, _)| {
                    pricing
                        .security_deposit
                        .unwrap_or(l.unit_price * self.config.security_deposit_percent / Decimal::from(100))
                        * Decimal::from(l.quantity)
                })
                .sum()
        });

        let mut tx = self.pool.begin().await?;

        let header = self
            .transactions
            .create_header(
                &mut tx,
                TransactionType::Rental,
                request.transaction_date,
                Some(request.customer_id),
                None,
                request.location_id,
                None,
                deposit_amount,
                None,
            )
            .await?;

        let line_specs: Vec<LineSpec> = priced_lines.iter().map(|(l, _, _)| l.clone()).collect();
        let persisted_lines = self.transactions.append_lines(&mut tx, header.id, line_specs).await?;

        let discount_amount: Decimal = priced_lines.iter().map(|(l, _, _)| l.discount_amount).sum();
        self.transactions
            .update_header_totals(&mut tx, header.id, subtotal, discount_amount, tax_amount, total_amount)
            .await?;

        let mut reserved_units: Vec<(Uuid, Uuid, Uuid, Vec<Uuid>)> = Vec::new();
        for (persisted, (_, pricing, item_req)) in persisted_lines.iter().zip(priced_lines.iter()) {
            self.inventory
                .adjust_stock_in_tx(
                    &mut tx,
                    pricing.item_id,
                    request.location_id,
                    -item_req.quantity,
                    item_req.quantity,
                    0,
                    StockMovementType::RentalOut,
                    Some(header.id),
                    Some(persisted.id),
                )
                .await?;

            if pricing.requires_serial_number {
                let unit_ids = self
                    .inventory
                    .reserve_units(&mut tx, pricing.item_id, request.location_id, item_req.quantity, persisted.id)
                    .await?;
                reserved_units.push((pricing.item_id, request.location_id, persisted.id, unit_ids));
            }
        }

        JournalService::record(
            &mut tx,
            header.id,
            event_types::RENTAL_CREATED,
            "rental created",
            None,
            serde_json::json!({
                "customer_id": request.customer_id,
                "location_id": request.location_id,
                "total_amount": total_amount,
                "line_count": persisted_lines.len(),
            }),
        )
        .await?;

        tx.commit().await?;

        if let Ok(builder) = DomainEvent::builder(rental_events::RENTAL_CREATED.to_string(), header.id, "Rental".to_string())
            .data(RentalCreatedEvent {
                transaction_id: header.id,
                transaction_number: header.transaction_number.clone(),
                customer_id: request.customer_id,
                location_id: request.location_id,
                rental_start_date: request.items[0].rental_start_date.and_hms_opt(0, 0, 0).unwrap().and_utc(),
                rental_end_date: request.items[0].rental_end_date.and_hms_opt(0, 0, 0).unwrap().and_utc(),
                subtotal,
                tax_amount,
                total_amount,
                deposit_amount,
                line_count: persisted_lines.len(),
            })
        {
            let _ = self.event_publisher.lock().await.publish(&builder.build()).await;
        }

        for (item_id, location_id, line_id, unit_ids) in reserved_units {
            self.inventory.notify_units_reserved(item_id, location_id, unit_ids, line_id).await;
        }

        Ok(TransactionSummary {
            transaction_id: header.id,
            transaction_number: header.transaction_number,
            status: header.status,
            totals: TransactionTotals {
                subtotal,
                discount_amount: priced_lines.iter().map(|(l, _, _)| l.discount_amount).sum(),
                tax_amount,
                total_amount,
                deposit_amount,
            },
        })
    }

    /// Transition a rental header `PENDING -> IN_PROGRESS` and stamp the
    /// pickup date. Idempotent: calling again once already picked up is a
    /// no-op that returns the current summary without a duplicate event.
    #[instrument(skip(self))]
    pub async fn pickup(&self, rental_id: Uuid) -> Result<TransactionSummary> {
        crate::retry::with_retry(|| self.pickup_attempt(rental_id)).await
    }

    async fn pickup_attempt(&self, rental_id: Uuid) -> Result<TransactionSummary> {
        let mut tx = self.pool.begin().await?;

        let header = sqlx::query_as::<_, TransactionHeader>(
            r#"SELECT id, transaction_number, transaction_type, status, payment_status,
                      payment_method, customer_id, supplier_id, location_id, transaction_date,
                      subtotal, discount_amount, tax_amount, shipping_amount, total_amount,
                      paid_amount, deposit_amount, reference_transaction_id, extension_count,
                      total_extension_charges, notes, created_at, updated_at, created_by, updated_by
               FROM transaction_headers WHERE id = $1 FOR UPDATE"#,
        )
        .bind(rental_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::not_found(format!("rental {rental_id} not found")))?;

        if header.status != TransactionStatus::Pending {
            tx.rollback().await.ok();
            return self.summarize(rental_id).await;
        }

        sqlx::query("UPDATE transaction_headers SET status = 'IN_PROGRESS', updated_at = now() WHERE id = $1")
            .bind(rental_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"INSERT INTO rental_lifecycles (transaction_header_id, actual_pickup_date)
               VALUES ($1, CURRENT_DATE)
               ON CONFLICT (transaction_header_id) DO UPDATE SET actual_pickup_date = CURRENT_DATE, updated_at = now()"#,
        )
        .bind(rental_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE transaction_lines SET current_rental_status = 'IN_PROGRESS', updated_at = now() WHERE transaction_header_id = $1",
        )
        .bind(rental_id)
        .execute(&mut *tx)
        .await?;

        JournalService::record(&mut tx, rental_id, event_types::RENTAL_PICKUP, "rental picked up", None, serde_json::json!({}))
            .await?;

        tx.commit().await?;

        let line_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transaction_lines WHERE transaction_header_id = $1")
            .bind(rental_id)
            .fetch_one(&self.pool)
            .await?;

        if let Ok(builder) = DomainEvent::builder(rental_events::RENTAL_PICKUP.to_string(), rental_id, "Rental".to_string())
            .data(olympus_shared::events::RentalPickupEvent {
                transaction_id: rental_id,
                picked_up_at: Utc::now(),
                line_count: line_count as usize,
            })
        {
            let _ = self.event_publisher.lock().await.publish(&builder.build()).await;
        }

        self.summarize(rental_id).await
    }

    async fn summarize(&self, header_id: Uuid) -> Result<TransactionSummary> {
        let header = self.transactions.get_header(header_id).await?;
        Ok(TransactionSummary {
            transaction_id: header.id,
            transaction_number: header.transaction_number,
            status: header.status,
            totals: TransactionTotals {
                subtotal: header.subtotal,
                discount_amount: header.discount_amount,
                tax_amount: header.tax_amount,
                total_amount: header.total_amount,
                deposit_amount: header.deposit_amount,
            },
        })
    }

    /// Recompute every active rental line's `current_rental_status` against
    /// today's date (daily reconciliation sweep / on-demand refresh).
    pub async fn reconcile_lifecycle(&self, header_id: Uuid) -> Result<RentalStatus> {
        let lines = self.transactions.get_lines(header_id).await?;
        let today = Utc::now().date_naive();

        let mut statuses = Vec::with_capacity(lines.len());
        for line in &lines {
            let status = RentalStatus::compute_line_status(line, today, self.config.grace_period_days);
            if Some(status) != line.current_rental_status {
                sqlx::query("UPDATE transaction_lines SET current_rental_status = $1, updated_at = now() WHERE id = $2")
                    .bind(status)
                    .bind(line.id)
                    .execute(&self.pool)
                    .await?;
            }
            statuses.push(status);
        }

        Ok(RentalStatus::aggregate(&statuses))
    }

    /// Full detail view for a rental header, using the engine's configured
    /// grace period to derive `current_rental_status` and `days_overdue`.
    pub async fn get_detail(&self, header_id: Uuid) -> Result<crate::models::TransactionDetail> {
        self.transactions.get_detail(header_id, self.config.grace_period_days).await
    }

    #[instrument(skip(self, request))]
    pub async fn process_return(&self, request: ProcessReturnRequest) -> Result<TransactionSummary> {
        crate::retry::with_retry(|| self.process_return_attempt(request.clone())).await
    }

    async fn process_return_attempt(&self, request: ProcessReturnRequest) -> Result<TransactionSummary> {
        let header = self.transactions.get_header(request.rental_id).await?;
        if header.transaction_type != TransactionType::Rental {
            return Err(Error::not_found(format!("rental {} not found", request.rental_id)));
        }
        if header.status != TransactionStatus::InProgress {
            return Err(Error::conflict(
                ConflictCode::InvalidTransition,
                format!("rental {} is not in progress (status {:?})", request.rental_id, header.status),
            ));
        }

        let lines = self.transactions.get_lines(request.rental_id).await?;
        let mut field_errors = Vec::new();
        for item in &request.items {
            let Some(line) = lines.iter().find(|l| l.id == item.line_id) else {
                field_errors.push(FieldError::new(
                    format!("items[{}].line_id", item.line_id),
                    "line not found on this rental",
                    "LINE_NOT_FOUND",
                ));
                continue;
            };
            if item.quantity_returned + line.returned_quantity > line.quantity {
                field_errors.push(FieldError::new(
                    format!("items[{}].quantity_returned", item.line_id),
                    format!(
                        "returning {} would exceed original quantity {} (already returned {})",
                        item.quantity_returned, line.quantity, line.returned_quantity
                    ),
                    "EXCESSIVE_RETURN_QUANTITY",
                ));
            }
        }
        if !field_errors.is_empty() {
            return Err(Error::Validation(field_errors));
        }

        let mut tx = self.pool.begin().await?;

        let mut total_late_fees = Decimal::ZERO;
        let mut total_damage_charges = Decimal::ZERO;
        let mut released: Vec<(Uuid, Uuid, Vec<Uuid>, ConditionRating)> = Vec::new();

        for item in &request.items {
            let line = lines.iter().find(|l| l.id == item.line_id).unwrap();
            let condition: ConditionRating = item.condition_rating.into();
            let repair_cost = item.repair_cost_estimate.unwrap_or(Decimal::ZERO);

            let disposition = match condition {
                ConditionRating::A | ConditionRating::B => Disposition::ReturnToStock,
                ConditionRating::C | ConditionRating::D => Disposition::SendToRepair,
                ConditionRating::F => Disposition::WriteOff,
            };
            let return_to_stock = matches!(disposition, Disposition::ReturnToStock);

            sqlx::query(
                r#"INSERT INTO transaction_inspections
                       (transaction_line_id, condition_rating, damage_description,
                        repair_cost_estimate, disposition, return_to_stock)
                   VALUES ($1, $2, $3, $4, $5, $6)"#,
            )
            .bind(item.line_id)
            .bind(condition)
            .bind(&item.damage_description)
            .bind(repair_cost)
            .bind(disposition)
            .bind(return_to_stock)
            .execute(&mut *tx)
            .await?;

            let new_returned = line.returned_quantity + item.quantity_returned;
            let mut updated_line = line.clone();
            updated_line.returned_quantity = new_returned;
            let new_status = RentalStatus::compute_line_status(&updated_line, request.return_date, self.config.grace_period_days);
            sqlx::query(
                "UPDATE transaction_lines SET returned_quantity = $1, return_condition = $2, current_rental_status = $3, updated_at = now() WHERE id = $4",
            )
            .bind(new_returned)
            .bind(condition)
            .bind(new_status)
            .bind(line.id)
            .execute(&mut *tx)
            .await?;

            if let Some(end) = line.rental_end_date {
                if request.return_date > end + Duration::days(self.config.grace_period_days) {
                    let days_late = (request.return_date - (end + Duration::days(self.config.grace_period_days))).num_days();
                    let daily_rate = line.daily_rate.unwrap_or(Decimal::ZERO);
                    total_late_fees += daily_rate * self.config.late_fee_multiplier * Decimal::from(days_late) * Decimal::from(item.quantity_returned);
                }
            }
            total_damage_charges += repair_cost;

            let (good_qty, damaged_qty) = if return_to_stock {
                (item.quantity_returned, 0)
            } else {
                (0, item.quantity_returned)
            };

            self.inventory
                .adjust_stock_in_tx(
                    &mut tx,
                    line.item_id,
                    header.location_id,
                    good_qty,
                    -item.quantity_returned,
                    damaged_qty,
                    StockMovementType::RentalReturn,
                    Some(header.id),
                    Some(line.id),
                )
                .await?;

            let unit_ids: Vec<Uuid> = sqlx::query_scalar(
                "SELECT id FROM inventory_units WHERE current_rental_line_id = $1",
            )
            .bind(line.id)
            .fetch_all(&mut *tx)
            .await?;

            if !unit_ids.is_empty() {
                self.inventory.release_units(&mut tx, &unit_ids, condition).await?;
                released.push((line.item_id, header.location_id, unit_ids, condition));
            }
        }

        let all_lines_done: bool = sqlx::query_scalar(
            "SELECT COUNT(*) = 0 FROM transaction_lines WHERE transaction_header_id = $1 AND returned_quantity < quantity",
        )
        .bind(request.rental_id)
        .fetch_one(&mut *tx)
        .await?;

        let deposit_refund = (header.deposit_amount - total_late_fees - total_damage_charges).max(Decimal::ZERO);

        sqlx::query(
            r#"INSERT INTO rental_lifecycles (transaction_header_id, actual_return_date, late_fees, damage_charges, deposit_refund_amount)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (transaction_header_id) DO UPDATE
               SET actual_return_date = $2, late_fees = $3, damage_charges = $4, deposit_refund_amount = $5, updated_at = now()"#,
        )
        .bind(request.rental_id)
        .bind(request.return_date)
        .bind(total_late_fees)
        .bind(total_damage_charges)
        .bind(deposit_refund)
        .execute(&mut *tx)
        .await?;

        if all_lines_done {
            sqlx::query("UPDATE transaction_headers SET status = 'COMPLETED', updated_at = now() WHERE id = $1")
                .bind(request.rental_id)
                .execute(&mut *tx)
                .await?;
        }

        JournalService::record(
            &mut tx,
            request.rental_id,
            event_types::RENTAL_RETURNED,
            "rental items returned",
            None,
            serde_json::json!({
                "late_fees": total_late_fees,
                "damage_charges": total_damage_charges,
                "deposit_refund_amount": deposit_refund,
                "fully_returned": all_lines_done,
            }),
        )
        .await?;

        tx.commit().await?;

        if let Ok(builder) = DomainEvent::builder(rental_events::RENTAL_RETURNED.to_string(), request.rental_id, "Rental".to_string())
            .data(RentalReturnedEvent {
                transaction_id: request.rental_id,
                returned_at: Utc::now(),
                lines_returned: request.items.len(),
                fully_returned: all_lines_done,
                late_fees: total_late_fees,
                damage_charges: total_damage_charges,
                deposit_refund_amount: deposit_refund,
            })
        {
            let _ = self.event_publisher.lock().await.publish(&builder.build()).await;
        }
        for (item_id, location_id, unit_ids, condition) in released {
            let new_state = if matches!(condition, ConditionRating::A | ConditionRating::B) {
                InventoryUnitStatus::Available
            } else {
                InventoryUnitStatus::Damaged
            };
            self.inventory.notify_units_released(item_id, location_id, unit_ids, request.rental_id, new_state).await;
        }

        self.summarize(request.rental_id).await
    }

    #[instrument(skip(self, request))]
    pub async fn extend_rental(&self, request: ExtendRentalRequest) -> Result<TransactionSummary> {
        crate::retry::with_retry(|| self.extend_rental_attempt(request.clone())).await
    }

    async fn extend_rental_attempt(&self, request: ExtendRentalRequest) -> Result<TransactionSummary> {
        let header = self.transactions.get_header(request.rental_id).await?;
        if header.extension_count >= self.config.max_extensions {
            return Err(Error::conflict(
                ConflictCode::ExtensionLimitExceeded,
                format!(
                    "rental {} has reached the maximum of {} extensions",
                    request.rental_id, self.config.max_extensions
                ),
            ));
        }

        let lines = self.transactions.get_lines(request.rental_id).await?;
        let active_lines: Vec<&TransactionLine> = lines
            .iter()
            .filter(|l| l.returned_quantity < l.quantity && l.rental_end_date.is_some())
            .collect();

        for line in &active_lines {
            let old_end = line.rental_end_date.unwrap();
            if request.new_end_date <= old_end {
                return Err(Error::validation(
                    "new_end_date",
                    "new_end_date must be after the current rental_end_date",
                    "INVALID_EXTENSION_WINDOW",
                ));
            }
            let reserved = self
                .reserved_quantity(line.item_id, header.location_id, old_end + Duration::days(1), request.new_end_date, Some(line.id))
                .await?;
            let inventory = self.inventory_at_location(line.item_id, header.location_id).await?;
            if inventory - reserved < line.quantity {
                return Err(Error::conflict(
                    ConflictCode::Overbooked,
                    format!("line {} cannot be extended to {}: window already committed", line.id, request.new_end_date),
                ));
            }
        }

        let mut extension_charge = Decimal::ZERO;
        for line in &active_lines {
            let old_end = line.rental_end_date.unwrap();
            let days = (request.new_end_date - old_end).num_days();
            let rate = line.daily_rate.unwrap_or(Decimal::ZERO);
            extension_charge += rate * Decimal::from(days) * Decimal::from(line.quantity);
        }

        let mut tx = self.pool.begin().await?;

        for line in &active_lines {
            let old_end = line.rental_end_date.unwrap();
            sqlx::query(
                "UPDATE transaction_lines SET rental_end_date = $1, current_rental_status = 'EXTENDED', updated_at = now() WHERE id = $2",
            )
            .bind(request.new_end_date)
            .bind(line.id)
            .execute(&mut *tx)
            .await?;

            JournalService::record(
                &mut tx,
                request.rental_id,
                event_types::RENTAL_EXTENDED,
                "rental line extended",
                None,
                serde_json::json!({
                    "line_id": line.id,
                    "previous_end_date": old_end,
                    "new_end_date": request.new_end_date,
                }),
            )
            .await?;

            if let Ok(builder) = DomainEvent::builder(rental_events::RENTAL_EXTENDED.to_string(), request.rental_id, "Rental".to_string())
                .data(RentalExtendedEvent {
                    transaction_id: request.rental_id,
                    line_id: line.id,
                    previous_end_date: old_end.and_hms_opt(0, 0, 0).unwrap().and_utc(),
                    new_end_date: request.new_end_date.and_hms_opt(0, 0, 0).unwrap().and_utc(),
                    extension_charges: extension_charge,
                    extension_count: header.extension_count + 1,
                })
            {
                let _ = self.event_publisher.lock().await.publish(&builder.build()).await;
            }
        }

        sqlx::query(
            r#"UPDATE transaction_headers
               SET extension_count = extension_count + 1,
                   total_extension_charges = total_extension_charges + $1,
                   total_amount = total_amount + $1,
                   updated_at = now()
               WHERE id = $2"#,
        )
        .bind(extension_charge)
        .bind(request.rental_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.summarize(request.rental_id).await
    }
}
