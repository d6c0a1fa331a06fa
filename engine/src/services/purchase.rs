// ============================================================================
// PURCHASE & RETURNS ENGINE (C4)
// ============================================================================
// Module: engine/src/services/purchase.rs
// Description: Purchase receipt (with inventory materialization) and vendor
// returns: window/amount validation, proportional line amounts, restocking
// fees, approval, and vendor credit issuance.
// ============================================================================

use std::sync::Arc;

use chrono::{Duration, Utc};
use olympus_shared::error::{ConflictCode, Error, FieldError, Result};
use olympus_shared::events::{
    purchase_events, DomainEvent, EventPublisher, PurchaseCreatedEvent, PurchaseReturnApprovedEvent,
    PurchaseReturnCreatedEvent, VendorCreditProcessedEvent,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

use crate::config::RentalEngineConfig;
use crate::models::{
    ConditionRating, CreatePurchaseRequest, CreatePurchaseReturnRequest, Disposition, LineSpec,
    StockMovementType, TransactionStatus, TransactionSummary, TransactionTotals, TransactionType,
};
use crate::services::inventory::InventoryService;
use crate::services::journal::{event_types, JournalService};
use crate::services::transaction::TransactionService;

pub struct PurchaseService {
    pool: PgPool,
    inventory: Arc<InventoryService>,
    transactions: Arc<TransactionService>,
    event_publisher: Arc<Mutex<EventPublisher>>,
    config: RentalEngineConfig,
}

impl PurchaseService {
    pub fn new(
        pool: PgPool,
        inventory: Arc<InventoryService>,
        transactions: Arc<TransactionService>,
        event_publisher: Arc<Mutex<EventPublisher>>,
        config: RentalEngineConfig,
    ) -> Self {
        Self { pool, inventory, transactions, event_publisher, config }
    }

    #[instrument(skip(self, request))]
    pub async fn create_purchase(&self, request: CreatePurchaseRequest) -> Result<TransactionSummary> {
        crate::retry::with_retry(|| self.create_purchase_attempt(request.clone())).await
    }

    async fn create_purchase_attempt(&self, request: CreatePurchaseRequest) -> Result<TransactionSummary> {
        let mut line_specs = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let sku: String = sqlx::query_scalar("SELECT sku FROM items WHERE id = $1")
                .bind(item.item_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| Error::not_found(format!("item {} not found", item.item_id)))?;

            let line_total = item.unit_cost * Decimal::from(item.quantity);
            let tax = line_total * self.config.default_tax_rate / Decimal::from(100);
            line_specs.push((
                LineSpec {
                    item_id: item.item_id,
                    sku,
                    description: None,
                    quantity: item.quantity,
                    unit_price: item.unit_cost,
                    discount_amount: Decimal::ZERO,
                    tax_amount: tax,
                    line_total,
                    rental_start_date: None,
                    rental_end_date: None,
                    rental_period: None,
                    rental_period_unit: None,
                    daily_rate: None,
                },
                item.serial_numbers.clone(),
            ));
        }

        let subtotal: Decimal = line_specs.iter().map(|(l, _)| l.line_total).sum();
        let tax_amount: Decimal = line_specs.iter().map(|(l, _)| l.tax_amount).sum();
        let total_amount = subtotal + tax_amount;

        let mut tx = self.pool.begin().await?;

        let header = self
            .transactions
            .create_header(
                &mut tx,
                TransactionType::Purchase,
                request.transaction_date,
                None,
                Some(request.supplier_id),
                request.location_id,
                None,
                Decimal::ZERO,
                None,
            )
            .await?;

        let specs: Vec<LineSpec> = line_specs.iter().map(|(l, _)| l.clone()).collect();
        let persisted_lines = self.transactions.append_lines(&mut tx, header.id, specs).await?;

        self.transactions
            .update_header_totals(&mut tx, header.id, subtotal, Decimal::ZERO, tax_amount, total_amount)
            .await?;

        let mut units_materialized = 0usize;
        if request.auto_complete {
            let batch_prefix = request
                .reference_number
                .clone()
                .unwrap_or_else(|| header.id.to_string()[..8].to_string());
            let batch_code = format!("PO-{batch_prefix}-{}", request.transaction_date.format("%Y%m%d"));

            for (persisted, (_, serials)) in persisted_lines.iter().zip(line_specs.iter()) {
                let unit_ids = self
                    .inventory
                    .materialize_units(
                        &mut tx,
                        persisted.item_id,
                        request.location_id,
                        persisted.quantity,
                        persisted.unit_price,
                        serials.is_none().then(|| batch_code.clone()),
                        serials.clone(),
                        Some(header.id),
                        Some(persisted.id),
                    )
                    .await?;
                units_materialized += unit_ids.len();
            }

            sqlx::query("UPDATE transaction_headers SET status = 'COMPLETED', updated_at = now() WHERE id = $1")
                .bind(header.id)
                .execute(&mut *tx)
                .await?;
        }

        JournalService::record(
            &mut tx,
            header.id,
            event_types::PURCHASE_CREATED,
            "purchase created",
            None,
            serde_json::json!({ "supplier_id": request.supplier_id, "total_amount": total_amount, "units_materialized": units_materialized }),
        )
        .await?;

        tx.commit().await?;

        if let Ok(builder) = DomainEvent::builder(purchase_events::PURCHASE_CREATED.to_string(), header.id, "Purchase".to_string())
            .data(PurchaseCreatedEvent {
                transaction_id: header.id,
                transaction_number: header.transaction_number.clone(),
                supplier_id: request.supplier_id,
                location_id: request.location_id,
                total_amount,
                units_materialized,
            })
        {
            let _ = self.event_publisher.lock().await.publish(&builder.build()).await;
        }

        Ok(TransactionSummary {
            transaction_id: header.id,
            transaction_number: header.transaction_number,
            status: if request.auto_complete { TransactionStatus::Completed } else { TransactionStatus::Pending },
            totals: TransactionTotals {
                subtotal,
                discount_amount: Decimal::ZERO,
                tax_amount,
                total_amount,
                deposit_amount: Decimal::ZERO,
            },
        })
    }

    #[instrument(skip(self, request))]
    pub async fn create_return(&self, request: CreatePurchaseReturnRequest) -> Result<TransactionSummary> {
        crate::retry::with_retry(|| self.create_return_attempt(request.clone())).await
    }

    async fn create_return_attempt(&self, request: CreatePurchaseReturnRequest) -> Result<TransactionSummary> {
        let original = self.transactions.get_header(request.original_purchase_id).await?;
        if original.transaction_type != TransactionType::Purchase {
            return Err(Error::not_found(format!("purchase {} not found", request.original_purchase_id)));
        }
        if original.status == TransactionStatus::Cancelled {
            return Err(Error::conflict(ConflictCode::InvalidTransition, "cannot return against a cancelled purchase"));
        }

        let deadline = original.transaction_date + Duration::days(self.config.return_period_days);
        if Utc::now().date_naive() > deadline && !request.return_reason.bypasses_return_window() {
            return Err(Error::conflict(
                ConflictCode::ReturnWindowExpired,
                format!("return window closed on {deadline}"),
            ));
        }

        let original_lines = self.transactions.get_lines(request.original_purchase_id).await?;

        let already_returned: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"SELECT tl.item_id, COALESCE(SUM(-tl.quantity), 0)
               FROM transaction_lines tl
               JOIN transaction_headers th ON th.id = tl.transaction_header_id
               WHERE th.reference_transaction_id = $1 AND th.status != 'CANCELLED'
               GROUP BY tl.item_id"#,
        )
        .bind(request.original_purchase_id)
        .fetch_all(&self.pool)
        .await?;
        let already_returned_for = |item_id: Uuid| {
            already_returned.iter().find(|(id, _)| *id == item_id).map(|(_, q)| *q).unwrap_or(0)
        };

        let mut field_errors = Vec::new();
        let mut line_specs = Vec::new();

        for (idx, req_item) in request.items.iter().enumerate() {
            let Some(original_line) = original_lines.iter().find(|l| l.item_id == req_item.item_id) else {
                field_errors.push(FieldError::new(
                    format!("items[{idx}].item_id"),
                    "item not present on the original purchase",
                    "ITEM_NOT_IN_PURCHASE",
                ));
                continue;
            };

            let already = already_returned_for(req_item.item_id);
            let available_to_return = original_line.quantity as i64 - already;
            if req_item.quantity as i64 > available_to_return {
                field_errors.push(FieldError::new(
                    format!("items[{idx}].quantity"),
                    format!("requested {} exceeds available-to-return {available_to_return}", req_item.quantity),
                    "EXCESSIVE_QUANTITY",
                ));
                continue;
            }

            let ratio = Decimal::from(req_item.quantity) / Decimal::from(original_line.quantity);
            line_specs.push((req_item, original_line, ratio));
        }

        if !field_errors.is_empty() {
            return Err(Error::Validation(field_errors));
        }

        let subtotal: Decimal = line_specs.iter().map(|(_, orig, ratio)| -(orig.line_total * ratio)).sum();
        let tax_amount: Decimal = line_specs.iter().map(|(_, orig, ratio)| -(orig.tax_amount * ratio)).sum();
        let mut restocking_fee = Decimal::ZERO;
        if request.return_reason.incurs_restocking_fee() {
            restocking_fee = subtotal.abs() * self.config.restocking_fee_percent / Decimal::from(100);
        }
        let total_amount = subtotal + tax_amount + restocking_fee;

        let mut tx = self.pool.begin().await?;

        let header = self
            .transactions
            .create_header(
                &mut tx,
                TransactionType::Return,
                Utc::now().date_naive(),
                None,
                Some(original.supplier_id.unwrap_or_default()),
                request.location_id.unwrap_or(original.location_id),
                Some(request.original_purchase_id),
                Decimal::ZERO,
                None,
            )
            .await?;

        let specs: Vec<LineSpec> = line_specs
            .iter()
            .map(|(req_item, orig, ratio)| LineSpec {
                item_id: orig.item_id,
                sku: orig.sku.clone(),
                description: orig.description.clone(),
                quantity: -req_item.quantity,
                unit_price: orig.unit_price,
                discount_amount: Decimal::ZERO,
                tax_amount: -(orig.tax_amount * ratio),
                line_total: -(orig.line_total * ratio),
                rental_start_date: None,
                rental_end_date: None,
                rental_period: None,
                rental_period_unit: None,
                daily_rate: None,
            })
            .collect();
        let persisted_lines = self.transactions.append_lines(&mut tx, header.id, specs).await?;

        self.transactions
            .update_header_totals(&mut tx, header.id, subtotal, Decimal::ZERO, tax_amount, total_amount)
            .await?;

        // Pull the returned quantity out of `available` the moment the return
        // is recorded - it is no longer sellable/rentable pending disposition.
        // `process_vendor_credit` restocks the eligible portion via
        // `ReturnRestock`; what's never restocked stays written off from here.
        for persisted in &persisted_lines {
            let qty = persisted.quantity.unsigned_abs() as i32;
            self.inventory
                .adjust_stock_in_tx(
                    &mut tx,
                    persisted.item_id,
                    header.location_id,
                    -qty,
                    0,
                    0,
                    StockMovementType::WriteOff,
                    Some(header.id),
                    Some(persisted.id),
                )
                .await?;
        }

        if request.requires_inspection {
            for persisted in &persisted_lines {
                sqlx::query("UPDATE transaction_lines SET inspection_status = 'PENDING', updated_at = now() WHERE id = $1")
                    .bind(persisted.id)
                    .execute(&mut *tx)
                    .await?;
            }
        } else {
            for (persisted, (req_item, _, _)) in persisted_lines.iter().zip(line_specs.iter()) {
                let condition: ConditionRating = req_item.condition.into();
                sqlx::query("UPDATE transaction_lines SET return_condition = $1, updated_at = now() WHERE id = $2")
                    .bind(condition)
                    .bind(persisted.id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let auto_approved =
            total_amount.abs() <= self.config.auto_approve_threshold || request.return_reason.auto_approves_regardless_of_amount();
        if auto_approved {
            sqlx::query("UPDATE transaction_headers SET status = 'PROCESSING', updated_at = now() WHERE id = $1")
                .bind(header.id)
                .execute(&mut *tx)
                .await?;
        }

        JournalService::record(
            &mut tx,
            header.id,
            event_types::PURCHASE_RETURN_CREATED,
            "purchase return created",
            None,
            serde_json::json!({
                "original_purchase_id": request.original_purchase_id,
                "return_reason": format!("{:?}", request.return_reason),
                "total_amount": total_amount,
                "restocking_fee": restocking_fee,
                "auto_approved": auto_approved,
            }),
        )
        .await?;

        tx.commit().await?;

        if let Ok(builder) = DomainEvent::builder(purchase_events::PURCHASE_RETURN_CREATED.to_string(), header.id, "PurchaseReturn".to_string())
            .data(PurchaseReturnCreatedEvent {
                transaction_id: header.id,
                transaction_number: header.transaction_number.clone(),
                original_purchase_id: request.original_purchase_id,
                return_reason: format!("{:?}", request.return_reason),
                total_amount,
                restocking_fee,
                auto_approved,
            })
        {
            let _ = self.event_publisher.lock().await.publish(&builder.build()).await;
        }

        Ok(TransactionSummary {
            transaction_id: header.id,
            transaction_number: header.transaction_number,
            status: if auto_approved { TransactionStatus::Processing } else { TransactionStatus::Pending },
            totals: TransactionTotals {
                subtotal,
                discount_amount: Decimal::ZERO,
                tax_amount,
                total_amount,
                deposit_amount: Decimal::ZERO,
            },
        })
    }

    /// Manually approve a return that did not qualify for auto-approval.
    pub async fn approve_return(&self, return_id: Uuid, approved_by: Option<Uuid>) -> Result<TransactionSummary> {
        crate::retry::with_retry(|| self.approve_return_attempt(return_id, approved_by)).await
    }

    async fn approve_return_attempt(&self, return_id: Uuid, approved_by: Option<Uuid>) -> Result<TransactionSummary> {
        let mut tx = self.pool.begin().await?;
        self.transactions.transition_status(&mut tx, return_id, TransactionStatus::Processing).await?;

        JournalService::record(
            &mut tx,
            return_id,
            event_types::PURCHASE_RETURN_APPROVED,
            "purchase return approved",
            approved_by,
            serde_json::json!({}),
        )
        .await?;
        tx.commit().await?;

        if let Ok(builder) = DomainEvent::builder(purchase_events::PURCHASE_RETURN_APPROVED.to_string(), return_id, "PurchaseReturn".to_string())
            .data(PurchaseReturnApprovedEvent { transaction_id: return_id, approved_by })
        {
            let _ = self.event_publisher.lock().await.publish(&builder.build()).await;
        }

        let header = self.transactions.get_header(return_id).await?;
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

    /// Issue the vendor credit once a processing return's inspections are
    /// all complete. Lines whose recorded condition meets
    /// `min_condition_for_credit` are restocked - pristine condition (`A`)
    /// goes straight back to `available`, anything else eligible goes to
    /// `damaged` pending repair. Lines below the threshold stay written off
    /// from the quantity already pulled out of stock at return creation.
    #[instrument(skip(self))]
    pub async fn process_vendor_credit(&self, return_id: Uuid) -> Result<TransactionSummary> {
        crate::retry::with_retry(|| self.process_vendor_credit_attempt(return_id)).await
    }

    async fn process_vendor_credit_attempt(&self, return_id: Uuid) -> Result<TransactionSummary> {
        let header = self.transactions.get_header(return_id).await?;
        if header.transaction_type != TransactionType::Return {
            return Err(Error::not_found(format!("purchase return {return_id} not found")));
        }
        if header.status != TransactionStatus::Processing {
            return Err(Error::conflict(
                ConflictCode::InvalidTransition,
                format!("return {return_id} must be PROCESSING to issue credit, is {:?}", header.status),
            ));
        }

        let lines = self.transactions.get_lines(return_id).await?;
        let pending: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transaction_lines WHERE transaction_header_id = $1 AND inspection_status = 'PENDING'",
        )
        .bind(return_id)
        .fetch_one(&self.pool)
        .await?;
        if pending > 0 {
            return Err(Error::conflict(
                ConflictCode::InvalidTransition,
                "all line inspections must be completed before vendor credit can be issued",
            ));
        }

        let mut tx = self.pool.begin().await?;

        for line in &lines {
            let qty = line.quantity.unsigned_abs() as i32;
            let Some(condition) = line.return_condition else {
                continue;
            };
            if !condition.meets_or_exceeds(self.config.min_condition_for_credit) {
                continue;
            }
            let (delta_available, delta_damaged) =
                if condition == ConditionRating::A { (qty, 0) } else { (0, qty) };
            self.inventory
                .adjust_stock_in_tx(
                    &mut tx,
                    line.item_id,
                    header.location_id,
                    delta_available,
                    0,
                    delta_damaged,
                    StockMovementType::ReturnRestock,
                    Some(return_id),
                    Some(line.id),
                )
                .await?;
        }

        let credit_note_number = format!("CR-{}", &return_id.to_string()[..8]);
        sqlx::query(
            r#"UPDATE transaction_headers
               SET payment_status = 'REFUNDED', paid_amount = $1, status = 'COMPLETED', updated_at = now()
               WHERE id = $2"#,
        )
        .bind(header.total_amount)
        .bind(return_id)
        .execute(&mut *tx)
        .await?;

        JournalService::record(
            &mut tx,
            return_id,
            event_types::VENDOR_CREDIT_PROCESSED,
            "vendor credit processed",
            None,
            serde_json::json!({ "credit_note_number": credit_note_number, "amount": header.total_amount }),
        )
        .await?;

        tx.commit().await?;

        if let Ok(builder) = DomainEvent::builder(purchase_events::VENDOR_CREDIT_PROCESSED.to_string(), return_id, "PurchaseReturn".to_string())
            .data(VendorCreditProcessedEvent {
                transaction_id: return_id,
                supplier_id: header.supplier_id.unwrap_or_default(),
                credit_note_number,
                amount: header.total_amount,
            })
        {
            let _ = self.event_publisher.lock().await.publish(&builder.build()).await;
        }

        Ok(TransactionSummary {
            transaction_id: header.id,
            transaction_number: header.transaction_number,
            status: TransactionStatus::Completed,
            totals: TransactionTotals {
                subtotal: header.subtotal,
                discount_amount: header.discount_amount,
                tax_amount: header.tax_amount,
                total_amount: header.total_amount,
                deposit_amount: header.deposit_amount,
            },
        })
    }

    /// Complete a line's inspection, recording its condition and
    /// disposition ahead of vendor credit issuance.
    pub async fn complete_line_inspection(
        &self,
        line_id: Uuid,
        condition: ConditionRating,
        disposition: Disposition,
        repair_cost_estimate: Decimal,
        damage_description: Option<String>,
    ) -> Result<()> {
        crate::retry::with_retry(|| {
            self.complete_line_inspection_attempt(line_id, condition, disposition, repair_cost_estimate, damage_description.clone())
        })
        .await
    }

    async fn complete_line_inspection_attempt(
        &self,
        line_id: Uuid,
        condition: ConditionRating,
        disposition: Disposition,
        repair_cost_estimate: Decimal,
        damage_description: Option<String>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO transaction_inspections
                   (transaction_line_id, condition_rating, damage_description, repair_cost_estimate, disposition, return_to_stock)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(line_id)
        .bind(condition)
        .bind(&damage_description)
        .bind(repair_cost_estimate)
        .bind(disposition)
        .bind(matches!(disposition, Disposition::ReturnToStock))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE transaction_lines SET return_condition = $1, inspection_status = 'COMPLETED', updated_at = now() WHERE id = $2",
        )
        .bind(condition)
        .bind(line_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Full detail view for a purchase or purchase-return header. Neither
    /// carries a rental end date, so the grace period is irrelevant here.
    pub async fn get_detail(&self, header_id: Uuid) -> Result<crate::models::TransactionDetail> {
        self.transactions.get_detail(header_id, 0).await
    }
}
