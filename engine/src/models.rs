// ============================================================================
// RENTAL ENGINE - DOMAIN MODELS
// ============================================================================
// Module: engine/src/models.rs
// Description: Core domain model for customers, items, stock, and
// transactions (purchase/sale/rental/return).
// ============================================================================

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// ============================================================================
// PARTIES & CATALOG TAXONOMY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "customer_status", rename_all = "UPPERCASE")]
pub enum CustomerStatus {
    Active,
    Inactive,
    Blacklisted,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: CustomerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UnitOfMeasurement {
    pub id: Uuid,
    pub name: String,
    pub abbreviation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Brand {
    pub id: Uuid,
    pub name: String,
}

/// A tiered rental rate: quantized discount for longer commitments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type)]
pub struct TieredRate {
    pub min_periods: i32,
    pub rate_per_period: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Item {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub unit_of_measurement_id: Option<Uuid>,
    pub is_rentable: bool,
    pub is_sellable: bool,
    pub requires_serial_number: bool,
    pub rental_rate_per_period: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub security_deposit: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Tiered rates live in their own table (item_id, min_periods, rate_per_period);
// loaded as a Vec<TieredRate> alongside the Item when pricing a rental line.

// ============================================================================
// INVENTORY LEDGER (C1)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StockLevel {
    pub id: Uuid,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub quantity_on_hand: i32,
    pub quantity_available: i32,
    pub quantity_on_rent: i32,
    pub quantity_damaged: i32,
    pub updated_at: DateTime<Utc>,
}

impl StockLevel {
    /// `on_hand = available + on_rent + damaged`, the conservation invariant
    /// every mutation must re-check before commit.
    pub fn is_balanced(&self) -> bool {
        self.quantity_on_hand
            == self.quantity_available + self.quantity_on_rent + self.quantity_damaged
    }

    pub fn all_nonnegative(&self) -> bool {
        self.quantity_on_hand >= 0
            && self.quantity_available >= 0
            && self.quantity_on_rent >= 0
            && self.quantity_damaged >= 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "inventory_unit_status", rename_all = "UPPERCASE")]
pub enum InventoryUnitStatus {
    Available,
    Rented,
    Damaged,
    InRepair,
    Retired,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InventoryUnit {
    pub id: Uuid,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub serial_number: Option<String>,
    pub batch_code: Option<String>,
    pub status: InventoryUnitStatus,
    pub unit_cost: Option<Decimal>,
    pub current_rental_line_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "stock_movement_type", rename_all = "UPPERCASE")]
pub enum StockMovementType {
    PurchaseReceipt,
    RentalOut,
    RentalReturn,
    SaleOut,
    SaleReturn,
    Adjustment,
    WriteOff,
    /// A vendor-return quantity re-admitted to stock once its inspected
    /// condition clears the credit threshold - the counterpart to the
    /// `WriteOff` a return provisionally records at creation.
    ReturnRestock,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StockMovement {
    pub id: Uuid,
    pub stock_level_id: Uuid,
    pub movement_type: StockMovementType,
    pub quantity_change: i32,
    pub quantity_before: i32,
    pub quantity_after: i32,
    pub transaction_header_id: Option<Uuid>,
    pub transaction_line_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// TRANSACTIONS (C2 / C3 / C4)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_type", rename_all = "UPPERCASE")]
pub enum TransactionType {
    Purchase,
    Sale,
    Rental,
    Return,
}

impl TransactionType {
    /// `{PREFIX}-{YYYYMMDD}-{NNNN}` numbering prefix, per the wire-critical
    /// format in the external contract.
    pub fn number_prefix(self) -> &'static str {
        match self {
            TransactionType::Purchase => "PUR",
            TransactionType::Sale => "SAL",
            TransactionType::Rental => "RENT",
            TransactionType::Return => "RET",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Processing,
    OnHold,
    InProgress,
    Completed,
    Cancelled,
}

impl TransactionStatus {
    /// Non-rental status graph from §4.2. Rental headers use the richer
    /// aggregation in [`RentalStatus`] instead.
    pub fn can_transition_to(self, target: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, target),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, OnHold)
                | (Processing, Cancelled)
                | (OnHold, Processing)
                | (OnHold, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn derive(paid_amount: Decimal, total_amount: Decimal, is_return: bool) -> Self {
        if is_return && paid_amount != Decimal::ZERO {
            return PaymentStatus::Refunded;
        }
        if paid_amount <= Decimal::ZERO {
            PaymentStatus::Pending
        } else if paid_amount < total_amount {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Paid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    StoreCredit,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TransactionHeader {
    pub id: Uuid,
    pub transaction_number: String,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub customer_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub location_id: Uuid,
    pub transaction_date: NaiveDate,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub shipping_amount: Decimal,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub deposit_amount: Decimal,
    pub reference_transaction_id: Option<Uuid>,
    pub extension_count: i32,
    pub total_extension_charges: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rental_period_unit", rename_all = "UPPERCASE")]
pub enum RentalPeriodUnit {
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rental_status", rename_all = "UPPERCASE")]
pub enum RentalStatus {
    InProgress,
    Late,
    Extended,
    PartialReturn,
    LatePartialReturn,
    Completed,
}

impl RentalStatus {
    /// Header-level aggregation precedence from §4.3.3, highest wins.
    pub fn aggregate(line_statuses: &[RentalStatus]) -> RentalStatus {
        use RentalStatus::*;
        let any = |s: RentalStatus| line_statuses.iter().any(|&x| x == s);
        let any_late = any(Late) || any(LatePartialReturn);
        let any_partial = any(PartialReturn) || any(LatePartialReturn);

        if any_late && any_partial {
            LatePartialReturn
        } else if any_late {
            Late
        } else if any_partial {
            PartialReturn
        } else if !line_statuses.is_empty() && line_statuses.iter().all(|&s| s == Completed) {
            Completed
        } else if any(Extended) {
            Extended
        } else {
            InProgress
        }
    }

    /// Per-line state derived from today's date, independent of any
    /// persisted `current_rental_status`. Used to refresh lines on a
    /// reconciliation sweep, on the real return path, or before computing
    /// header-level aggregation.
    pub fn compute_line_status(line: &TransactionLine, today: NaiveDate, grace_period_days: i64) -> RentalStatus {
        if line.returned_quantity >= line.quantity {
            return RentalStatus::Completed;
        }

        let is_late = line
            .rental_end_date
            .map(|end| today > end + Duration::days(grace_period_days))
            .unwrap_or(false);
        let is_partial = line.returned_quantity > 0;

        match (is_late, is_partial) {
            (true, true) => RentalStatus::LatePartialReturn,
            (true, false) => RentalStatus::Late,
            (false, true) => RentalStatus::PartialReturn,
            (false, false) => line.current_rental_status.unwrap_or(RentalStatus::InProgress),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "condition_rating", rename_all = "UPPERCASE")]
pub enum ConditionRating {
    A,
    B,
    C,
    D,
    F,
}

impl ConditionRating {
    pub fn as_index(self) -> u8 {
        match self {
            ConditionRating::A => 0,
            ConditionRating::B => 1,
            ConditionRating::C => 2,
            ConditionRating::D => 3,
            ConditionRating::F => 4,
        }
    }

    /// true when this rating is at least as good as `threshold` (lower index = better).
    pub fn meets_or_exceeds(self, threshold: ConditionRating) -> bool {
        self.as_index() <= threshold.as_index()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TransactionLine {
    pub id: Uuid,
    pub transaction_header_id: Uuid,
    pub line_number: i32,
    pub item_id: Uuid,
    pub sku: String,
    pub description: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
    pub rental_start_date: Option<NaiveDate>,
    pub rental_end_date: Option<NaiveDate>,
    pub rental_period: Option<i32>,
    pub rental_period_unit: Option<RentalPeriodUnit>,
    pub current_rental_status: Option<RentalStatus>,
    pub daily_rate: Option<Decimal>,
    pub returned_quantity: i32,
    pub return_condition: Option<ConditionRating>,
    pub inspection_status: Option<InspectionStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "inspection_status", rename_all = "UPPERCASE")]
pub enum InspectionStatus {
    Pending,
    Completed,
}

/// A unit-quantity line to be appended to a header, in caller-specified
/// order. `line_number` is assigned sequentially by the store starting at 1.
#[derive(Debug, Clone)]
pub struct LineSpec {
    pub item_id: Uuid,
    pub sku: String,
    pub description: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
    pub rental_start_date: Option<NaiveDate>,
    pub rental_end_date: Option<NaiveDate>,
    pub rental_period: Option<i32>,
    pub rental_period_unit: Option<RentalPeriodUnit>,
    pub daily_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TransactionEvent {
    pub id: Uuid,
    pub transaction_header_id: Uuid,
    pub event_type: String,
    pub description: String,
    pub actor: Option<Uuid>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RentalLifecycle {
    pub transaction_header_id: Uuid,
    pub expected_pickup_date: Option<NaiveDate>,
    pub actual_pickup_date: Option<NaiveDate>,
    pub expected_return_date: Option<NaiveDate>,
    pub actual_return_date: Option<NaiveDate>,
    pub late_fees: Decimal,
    pub damage_charges: Decimal,
    pub deposit_refund_amount: Decimal,
    pub extension_summary: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "disposition", rename_all = "UPPERCASE")]
pub enum Disposition {
    ReturnToStock,
    SendToRepair,
    WriteOff,
    ReturnToVendor,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TransactionInspection {
    pub id: Uuid,
    pub transaction_line_id: Uuid,
    pub condition_rating: ConditionRating,
    pub damage_description: Option<String>,
    pub repair_cost_estimate: Decimal,
    pub disposition: Disposition,
    pub return_to_stock: bool,
    pub inspected_at: DateTime<Utc>,
}

// ============================================================================
// REQUEST / RESPONSE SHAPES (§6 EXTERNAL INTERFACES)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RentalPeriodType {
    Daily,
    Weekly,
    Monthly,
}

impl From<RentalPeriodType> for RentalPeriodUnit {
    fn from(value: RentalPeriodType) -> Self {
        match value {
            RentalPeriodType::Daily => RentalPeriodUnit::Day,
            RentalPeriodType::Weekly => RentalPeriodUnit::Week,
            RentalPeriodType::Monthly => RentalPeriodUnit::Month,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RentalItemRequest {
    pub item_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub unit_rate: Option<Decimal>,
    #[validate(range(min = 1))]
    pub rental_period_value: i32,
    pub rental_period_type: RentalPeriodType,
    pub rental_start_date: NaiveDate,
    pub rental_end_date: NaiveDate,
    pub discount_value: Option<Decimal>,
    pub serial_numbers: Option<Vec<String>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateRentalRequest {
    pub transaction_date: NaiveDate,
    pub customer_id: Uuid,
    pub location_id: Uuid,
    pub payment_method: PaymentMethod,
    #[validate(length(min = 1))]
    #[validate(nested)]
    pub items: Vec<RentalItemRequest>,
    pub delivery_required: bool,
    pub delivery_address: Option<String>,
    pub delivery_date: Option<NaiveDate>,
    pub pickup_required: bool,
    pub pickup_date: Option<NaiveDate>,
    pub deposit_amount: Option<Decimal>,
    pub reference_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionRatingWire {
    A,
    B,
    C,
    D,
    F,
}

impl From<ConditionRatingWire> for ConditionRating {
    fn from(value: ConditionRatingWire) -> Self {
        match value {
            ConditionRatingWire::A => ConditionRating::A,
            ConditionRatingWire::B => ConditionRating::B,
            ConditionRatingWire::C => ConditionRating::C,
            ConditionRatingWire::D => ConditionRating::D,
            ConditionRatingWire::F => ConditionRating::F,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnLineRequest {
    pub line_id: Uuid,
    pub quantity_returned: i32,
    pub condition_rating: ConditionRatingWire,
    pub damage_description: Option<String>,
    pub repair_cost_estimate: Option<Decimal>,
    pub photo_refs: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessReturnRequest {
    pub rental_id: Uuid,
    pub return_date: NaiveDate,
    pub items: Vec<ReturnLineRequest>,
    pub inspector_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendRentalRequest {
    pub rental_id: Uuid,
    pub new_end_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnReason {
    Defective,
    Damaged,
    WrongItem,
    Excess,
    Expired,
    Recall,
}

impl ReturnReason {
    pub fn bypasses_return_window(self) -> bool {
        matches!(self, ReturnReason::Defective | ReturnReason::Recall)
    }

    pub fn incurs_restocking_fee(self) -> bool {
        matches!(self, ReturnReason::Excess | ReturnReason::WrongItem)
    }

    pub fn auto_approves_regardless_of_amount(self) -> bool {
        matches!(self, ReturnReason::Defective | ReturnReason::Recall)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseReturnLineRequest {
    pub item_id: Uuid,
    pub quantity: i32,
    pub condition: ConditionRatingWire,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePurchaseReturnRequest {
    pub original_purchase_id: Uuid,
    pub return_reason: ReturnReason,
    pub rma_number: Option<String>,
    pub items: Vec<PurchaseReturnLineRequest>,
    pub requires_inspection: bool,
    pub location_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseLineRequest {
    pub item_id: Uuid,
    pub quantity: i32,
    pub unit_cost: Decimal,
    pub serial_numbers: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePurchaseRequest {
    pub transaction_date: NaiveDate,
    pub supplier_id: Uuid,
    pub location_id: Uuid,
    pub reference_number: Option<String>,
    pub items: Vec<PurchaseLineRequest>,
    pub auto_complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub deposit_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub transaction_id: Uuid,
    pub transaction_number: String,
    pub status: TransactionStatus,
    pub totals: TransactionTotals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageEnvelope<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i32,
    pub page_size: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionDetail {
    pub header: TransactionHeader,
    pub lines: Vec<TransactionLine>,
    pub events: Vec<TransactionEvent>,
    pub inspections: Vec<TransactionInspection>,
    pub lifecycle: Option<RentalLifecycle>,
    pub current_rental_status: Option<RentalStatus>,
    pub days_overdue: i64,
    pub balance_due: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub inventory_at_location: i32,
    pub reserved: i32,
    pub available: i32,
    pub alternative_windows: Vec<AvailabilityWindow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_level_balance_invariant() {
        let balanced = StockLevel {
            id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            quantity_on_hand: 5,
            quantity_available: 3,
            quantity_on_rent: 2,
            quantity_damaged: 0,
            updated_at: Utc::now(),
        };
        assert!(balanced.is_balanced());
        assert!(balanced.all_nonnegative());

        let mut unbalanced = balanced.clone();
        unbalanced.quantity_on_hand = 6;
        assert!(!unbalanced.is_balanced());
    }

    #[test]
    fn condition_rating_ordering() {
        assert!(ConditionRating::A.meets_or_exceeds(ConditionRating::C));
        assert!(ConditionRating::B.meets_or_exceeds(ConditionRating::C));
        assert!(ConditionRating::C.meets_or_exceeds(ConditionRating::C));
        assert!(!ConditionRating::D.meets_or_exceeds(ConditionRating::C));
        assert!(!ConditionRating::F.meets_or_exceeds(ConditionRating::C));
    }

    #[test]
    fn rental_status_aggregation_precedence() {
        use RentalStatus::*;
        assert_eq!(RentalStatus::aggregate(&[Late, PartialReturn]), LatePartialReturn);
        assert_eq!(RentalStatus::aggregate(&[Late, InProgress]), Late);
        assert_eq!(RentalStatus::aggregate(&[PartialReturn, InProgress]), PartialReturn);
        assert_eq!(RentalStatus::aggregate(&[Completed, Completed]), Completed);
        assert_eq!(RentalStatus::aggregate(&[Extended, InProgress]), Extended);
        assert_eq!(RentalStatus::aggregate(&[InProgress]), InProgress);
    }

    #[test]
    fn payment_status_derivation() {
        let total = Decimal::new(10000, 2);
        assert_eq!(
            PaymentStatus::derive(Decimal::ZERO, total, false),
            PaymentStatus::Pending
        );
        assert_eq!(
            PaymentStatus::derive(Decimal::new(5000, 2), total, false),
            PaymentStatus::Partial
        );
        assert_eq!(PaymentStatus::derive(total, total, false), PaymentStatus::Paid);
        assert_eq!(
            PaymentStatus::derive(Decimal::new(-3000, 2), total, true),
            PaymentStatus::Refunded
        );
    }

    #[test]
    fn transaction_number_prefixes() {
        assert_eq!(TransactionType::Purchase.number_prefix(), "PUR");
        assert_eq!(TransactionType::Sale.number_prefix(), "SAL");
        assert_eq!(TransactionType::Rental.number_prefix(), "RENT");
        assert_eq!(TransactionType::Return.number_prefix(), "RET");
    }

    #[test]
    fn non_rental_status_transitions() {
        assert!(TransactionStatus::Pending.can_transition_to(TransactionStatus::Processing));
        assert!(TransactionStatus::Processing.can_transition_to(TransactionStatus::OnHold));
        assert!(!TransactionStatus::Completed.can_transition_to(TransactionStatus::Processing));
        assert!(!TransactionStatus::Cancelled.can_transition_to(TransactionStatus::Pending));
    }
}
