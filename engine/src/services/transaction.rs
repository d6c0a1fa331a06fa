// ============================================================================
// TRANSACTION STORE (C2)
// ============================================================================
// Module: engine/src/services/transaction.rs
// Description: Header/line persistence, payment recording, and the
// concurrency-safe transaction numbering scheme shared by every transaction
// type.
// ============================================================================

use chrono::{NaiveDate, Utc};
use olympus_shared::error::{ConflictCode, Error, Result};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{
    LineSpec, PaymentMethod, PaymentStatus, RentalLifecycle, RentalStatus, TransactionDetail,
    TransactionEvent, TransactionHeader, TransactionInspection, TransactionLine, TransactionStatus,
    TransactionType,
};

pub struct TransactionService {
    pool: PgPool,
}

impl TransactionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Draw the next `{PREFIX}-{YYYYMMDD}-{NNNN}` transaction number for a
    /// `(type, date)` bucket. The single atomic `UPDATE ... RETURNING`
    /// guarantees uniqueness and monotonicity under concurrent issuance
    /// without a dedicated sequence per bucket.
    pub async fn next_transaction_number(
        tx: &mut Transaction<'_, Postgres>,
        transaction_type: TransactionType,
        date: NaiveDate,
    ) -> Result<String> {
        let next_value: i32 = sqlx::query_scalar(
            r#"INSERT INTO transaction_number_counters (transaction_type, bucket_date, next_value)
               VALUES ($1, $2, 2)
               ON CONFLICT (transaction_type, bucket_date)
               DO UPDATE SET next_value = transaction_number_counters.next_value + 1
               RETURNING next_value - 1"#,
        )
        .bind(transaction_type)
        .bind(date)
        .fetch_one(&mut **tx)
        .await?;

        Ok(format!(
            "{}-{}-{:04}",
            transaction_type.number_prefix(),
            date.format("%Y%m%d"),
            next_value
        ))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_header(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        transaction_type: TransactionType,
        transaction_date: NaiveDate,
        customer_id: Option<Uuid>,
        supplier_id: Option<Uuid>,
        location_id: Uuid,
        reference_transaction_id: Option<Uuid>,
        deposit_amount: Decimal,
        created_by: Option<Uuid>,
    ) -> Result<TransactionHeader> {
        let transaction_number = Self::next_transaction_number(tx, transaction_type, transaction_date).await?;

        let header = sqlx::query_as::<_, TransactionHeader>(
            r#"INSERT INTO transaction_headers
                   (transaction_number, transaction_type, status, payment_status,
                    customer_id, supplier_id, location_id, transaction_date,
                    deposit_amount, reference_transaction_id, created_by, updated_by)
               VALUES ($1, $2, 'PENDING', 'PENDING', $3, $4, $5, $6, $7, $8, $9, $9)
               RETURNING id, transaction_number, transaction_type, status, payment_status,
                         payment_method, customer_id, supplier_id, location_id, transaction_date,
                         subtotal, discount_amount, tax_amount, shipping_amount, total_amount,
                         paid_amount, deposit_amount, reference_transaction_id, extension_count,
                         total_extension_charges, notes, created_at, updated_at, created_by, updated_by"#,
        )
        .bind(&transaction_number)
        .bind(transaction_type)
        .bind(customer_id)
        .bind(supplier_id)
        .bind(location_id)
        .bind(transaction_date)
        .bind(deposit_amount)
        .bind(reference_transaction_id)
        .bind(created_by)
        .fetch_one(&mut **tx)
        .await?;

        Ok(header)
    }

    /// Append lines to a header, assigning `line_number` sequentially
    /// starting at the current maximum + 1 (1 for a fresh header).
    pub async fn append_lines(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        header_id: Uuid,
        lines: Vec<LineSpec>,
    ) -> Result<Vec<TransactionLine>> {
        let mut next_number: i32 =
            sqlx::query_scalar("SELECT COALESCE(MAX(line_number), 0) + 1 FROM transaction_lines WHERE transaction_header_id = $1")
                .bind(header_id)
                .fetch_one(&mut **tx)
                .await?;

        let mut persisted = Vec::with_capacity(lines.len());
        for line in lines {
            let rental_status = if line.rental_start_date.is_some() {
                Some(crate::models::RentalStatus::InProgress)
            } else {
                None
            };

            let row = sqlx::query_as::<_, TransactionLine>(
                r#"INSERT INTO transaction_lines
                       (transaction_header_id, line_number, item_id, sku, description, quantity,
                        unit_price, discount_amount, tax_amount, line_total, rental_start_date,
                        rental_end_date, rental_period, rental_period_unit, current_rental_status,
                        daily_rate)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                   RETURNING id, transaction_header_id, line_number, item_id, sku, description,
                             quantity, unit_price, discount_amount, tax_amount, line_total,
                             rental_start_date, rental_end_date, rental_period, rental_period_unit,
                             current_rental_status, daily_rate, returned_quantity, return_condition,
                             inspection_status, created_at, updated_at"#,
            )
            .bind(header_id)
            .bind(next_number)
            .bind(line.item_id)
            .bind(&line.sku)
            .bind(&line.description)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.discount_amount)
            .bind(line.tax_amount)
            .bind(line.line_total)
            .bind(line.rental_start_date)
            .bind(line.rental_end_date)
            .bind(line.rental_period)
            .bind(line.rental_period_unit)
            .bind(rental_status)
            .bind(line.daily_rate)
            .fetch_one(&mut **tx)
            .await?;

            persisted.push(row);
            next_number += 1;
        }

        Ok(persisted)
    }

    /// Write computed line-aggregate totals onto a header after its lines
    /// are appended. `create_header` itself only knows the deposit amount;
    /// subtotal/tax/total depend on the priced lines and are always known
    /// only after pricing, so this is a deliberate second write rather than
    /// a parameter to `create_header`.
    pub async fn update_header_totals(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        header_id: Uuid,
        subtotal: Decimal,
        discount_amount: Decimal,
        tax_amount: Decimal,
        total_amount: Decimal,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE transaction_headers
               SET subtotal = $1, discount_amount = $2, tax_amount = $3, total_amount = $4, updated_at = now()
               WHERE id = $5"#,
        )
        .bind(subtotal)
        .bind(discount_amount)
        .bind(tax_amount)
        .bind(total_amount)
        .bind(header_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Record a payment (or, for returns, a refund - passed as a negative
    /// `amount`) against a header, recomputing `payment_status`.
    pub async fn record_payment(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        header_id: Uuid,
        amount: Decimal,
        _method: Option<PaymentMethod>,
        _reference: Option<String>,
    ) -> Result<TransactionHeader> {
        let header = sqlx::query_as::<_, TransactionHeader>(
            r#"SELECT id, transaction_number, transaction_type, status, payment_status,
                      payment_method, customer_id, supplier_id, location_id, transaction_date,
                      subtotal, discount_amount, tax_amount, shipping_amount, total_amount,
                      paid_amount, deposit_amount, reference_transaction_id, extension_count,
                      total_extension_charges, notes, created_at, updated_at, created_by, updated_by
               FROM transaction_headers WHERE id = $1 FOR UPDATE"#,
        )
        .bind(header_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| Error::not_found(format!("transaction header {header_id} not found")))?;

        let is_return = header.transaction_type == TransactionType::Return;
        let new_paid = header.paid_amount + amount;

        if is_return {
            if new_paid > Decimal::ZERO {
                return Err(Error::conflict(
                    ConflictCode::InvalidTransition,
                    "refund would make paid_amount positive on a return transaction",
                ));
            }
        } else if new_paid > header.total_amount {
            return Err(Error::conflict(
                ConflictCode::InvalidTransition,
                format!(
                    "payment of {amount} would bring paid_amount to {new_paid}, exceeding total_amount {}",
                    header.total_amount
                ),
            ));
        }

        let new_status = PaymentStatus::derive(new_paid, header.total_amount, is_return);

        let updated = sqlx::query_as::<_, TransactionHeader>(
            r#"UPDATE transaction_headers
               SET paid_amount = $1, payment_status = $2, updated_at = now()
               WHERE id = $3
               RETURNING id, transaction_number, transaction_type, status, payment_status,
                         payment_method, customer_id, supplier_id, location_id, transaction_date,
                         subtotal, discount_amount, tax_amount, shipping_amount, total_amount,
                         paid_amount, deposit_amount, reference_transaction_id, extension_count,
                         total_extension_charges, notes, created_at, updated_at, created_by, updated_by"#,
        )
        .bind(new_paid)
        .bind(new_status)
        .bind(header_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(updated)
    }

    /// Transition a (non-rental) header's status, validating against the
    /// allowed graph before writing.
    pub async fn transition_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        header_id: Uuid,
        target: TransactionStatus,
    ) -> Result<TransactionHeader> {
        let current: TransactionStatus =
            sqlx::query_scalar("SELECT status FROM transaction_headers WHERE id = $1 FOR UPDATE")
                .bind(header_id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| Error::not_found(format!("transaction header {header_id} not found")))?;

        if !current.can_transition_to(target) {
            return Err(Error::conflict(
                ConflictCode::InvalidTransition,
                format!("cannot transition transaction {header_id} from {current:?} to {target:?}"),
            ));
        }

        let header = sqlx::query_as::<_, TransactionHeader>(
            r#"UPDATE transaction_headers SET status = $1, updated_at = now() WHERE id = $2
               RETURNING id, transaction_number, transaction_type, status, payment_status,
                         payment_method, customer_id, supplier_id, location_id, transaction_date,
                         subtotal, discount_amount, tax_amount, shipping_amount, total_amount,
                         paid_amount, deposit_amount, reference_transaction_id, extension_count,
                         total_extension_charges, notes, created_at, updated_at, created_by, updated_by"#,
        )
        .bind(target)
        .bind(header_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(header)
    }

    pub async fn get_header(&self, header_id: Uuid) -> Result<TransactionHeader> {
        sqlx::query_as::<_, TransactionHeader>(
            r#"SELECT id, transaction_number, transaction_type, status, payment_status,
                      payment_method, customer_id, supplier_id, location_id, transaction_date,
                      subtotal, discount_amount, tax_amount, shipping_amount, total_amount,
                      paid_amount, deposit_amount, reference_transaction_id, extension_count,
                      total_extension_charges, notes, created_at, updated_at, created_by, updated_by
               FROM transaction_headers WHERE id = $1"#,
        )
        .bind(header_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found(format!("transaction header {header_id} not found")))
    }

    pub async fn get_lines(&self, header_id: Uuid) -> Result<Vec<TransactionLine>> {
        let lines = sqlx::query_as::<_, TransactionLine>(
            r#"SELECT id, transaction_header_id, line_number, item_id, sku, description, quantity,
                      unit_price, discount_amount, tax_amount, line_total, rental_start_date,
                      rental_end_date, rental_period, rental_period_unit, current_rental_status,
                      daily_rate, returned_quantity, return_condition, inspection_status,
                      created_at, updated_at
               FROM transaction_lines WHERE transaction_header_id = $1 ORDER BY line_number"#,
        )
        .bind(header_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Assemble the full detail view for a header: lines, journal events,
    /// inspections recorded against any of its lines, its rental lifecycle
    /// row (if any), and the computed fields a detail response owes the
    /// caller - aggregate rental status, days overdue, and balance due.
    /// `grace_period_days` only affects rental headers; it's ignored for
    /// every other transaction type since their lines carry no end date.
    pub async fn get_detail(&self, header_id: Uuid, grace_period_days: i64) -> Result<TransactionDetail> {
        let header = self.get_header(header_id).await?;
        let lines = self.get_lines(header_id).await?;

        let events = sqlx::query_as::<_, TransactionEvent>(
            r#"SELECT id, transaction_header_id, event_type, description, actor, payload, created_at
               FROM transaction_events
               WHERE transaction_header_id = $1
               ORDER BY created_at ASC, id ASC"#,
        )
        .bind(header_id)
        .fetch_all(&self.pool)
        .await?;

        let inspections = sqlx::query_as::<_, TransactionInspection>(
            r#"SELECT i.id, i.transaction_line_id, i.condition_rating, i.damage_description,
                      i.repair_cost_estimate, i.disposition, i.return_to_stock, i.inspected_at
               FROM transaction_inspections i
               JOIN transaction_lines l ON l.id = i.transaction_line_id
               WHERE l.transaction_header_id = $1
               ORDER BY i.inspected_at ASC"#,
        )
        .bind(header_id)
        .fetch_all(&self.pool)
        .await?;

        let lifecycle = sqlx::query_as::<_, RentalLifecycle>(
            r#"SELECT transaction_header_id, expected_pickup_date, actual_pickup_date,
                      expected_return_date, actual_return_date, late_fees, damage_charges,
                      deposit_refund_amount, extension_summary, created_at, updated_at
               FROM rental_lifecycles WHERE transaction_header_id = $1"#,
        )
        .bind(header_id)
        .fetch_optional(&self.pool)
        .await?;

        let today = Utc::now().date_naive();
        let line_statuses: Vec<RentalStatus> = lines
            .iter()
            .map(|line| RentalStatus::compute_line_status(line, today, grace_period_days))
            .collect();
        let current_rental_status = if line_statuses.is_empty() { None } else { Some(RentalStatus::aggregate(&line_statuses)) };

        let days_overdue = lines
            .iter()
            .filter_map(|line| line.rental_end_date)
            .map(|end| (today - end).num_days())
            .filter(|&d| d > 0)
            .max()
            .unwrap_or(0);

        let balance_due = (header.total_amount - header.paid_amount).max(Decimal::ZERO);

        Ok(TransactionDetail {
            header,
            lines,
            events,
            inspections,
            lifecycle,
            current_rental_status,
            days_overdue,
            balance_due,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_number_format() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let formatted = format!("{}-{}-{:04}", TransactionType::Purchase.number_prefix(), date.format("%Y%m%d"), 1);
        assert_eq!(formatted, "PUR-20250101-0001");
    }
}
