// ============================================================================
// OLYMPUS CLOUD - EVENT TYPE DEFINITIONS
// ============================================================================
// Module: shared/src/events/types.rs
// Description: Strongly-typed event payloads for the rental transaction domain
// Date: 2025-01-18
// ============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// INVENTORY EVENTS (C1)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustedEvent {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub adjustment_type: String,
    pub quantity_change: Decimal,
    pub quantity_on_hand_after: Decimal,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitsReservedEvent {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub unit_ids: Vec<Uuid>,
    pub transaction_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitsReleasedEvent {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub unit_ids: Vec<Uuid>,
    pub transaction_id: Uuid,
    pub new_state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowStockAlertEvent {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub quantity_available: Decimal,
    pub threshold: Decimal,
}

// ============================================================================
// RENTAL LIFECYCLE EVENTS (C2 / C3)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalCreatedEvent {
    pub transaction_id: Uuid,
    pub transaction_number: String,
    pub customer_id: Uuid,
    pub location_id: Uuid,
    pub rental_start_date: DateTime<Utc>,
    pub rental_end_date: DateTime<Utc>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub deposit_amount: Decimal,
    pub line_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalPickupEvent {
    pub transaction_id: Uuid,
    pub picked_up_at: DateTime<Utc>,
    pub line_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalReturnedEvent {
    pub transaction_id: Uuid,
    pub returned_at: DateTime<Utc>,
    pub lines_returned: usize,
    pub fully_returned: bool,
    pub late_fees: Decimal,
    pub damage_charges: Decimal,
    pub deposit_refund_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalExtendedEvent {
    pub transaction_id: Uuid,
    pub line_id: Uuid,
    pub previous_end_date: DateTime<Utc>,
    pub new_end_date: DateTime<Utc>,
    pub extension_charges: Decimal,
    pub extension_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionCompletedEvent {
    pub transaction_line_id: Uuid,
    pub condition_rating: String,
    pub disposition: String,
    pub repair_cost_estimate: Decimal,
}

// ============================================================================
// PURCHASE & VENDOR RETURN EVENTS (C4)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseCreatedEvent {
    pub transaction_id: Uuid,
    pub transaction_number: String,
    pub supplier_id: Uuid,
    pub location_id: Uuid,
    pub total_amount: Decimal,
    pub units_materialized: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseReturnCreatedEvent {
    pub transaction_id: Uuid,
    pub transaction_number: String,
    pub original_purchase_id: Uuid,
    pub return_reason: String,
    pub total_amount: Decimal,
    pub restocking_fee: Decimal,
    pub auto_approved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseReturnApprovedEvent {
    pub transaction_id: Uuid,
    pub approved_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorCreditProcessedEvent {
    pub transaction_id: Uuid,
    pub supplier_id: Uuid,
    pub credit_note_number: String,
    pub amount: Decimal,
}

// ============================================================================
// EVENT TYPE CONSTANTS
// ============================================================================

pub mod inventory_events {
    pub const STOCK_ADJUSTED: &str = "StockAdjusted";
    pub const UNITS_RESERVED: &str = "UnitsReserved";
    pub const UNITS_RELEASED: &str = "UnitsReleased";
    pub const LOW_STOCK_ALERT: &str = "LowStockAlert";
}

pub mod rental_events {
    pub const RENTAL_CREATED: &str = "RentalCreated";
    pub const RENTAL_PICKUP: &str = "RentalPickup";
    pub const RENTAL_RETURNED: &str = "RentalReturned";
    pub const RENTAL_EXTENDED: &str = "RentalExtended";
    pub const INSPECTION_COMPLETED: &str = "InspectionCompleted";
}

pub mod purchase_events {
    pub const PURCHASE_CREATED: &str = "PurchaseCreated";
    pub const PURCHASE_RETURN_CREATED: &str = "PurchaseReturnCreated";
    pub const PURCHASE_RETURN_APPROVED: &str = "PurchaseReturnApproved";
    pub const VENDOR_CREDIT_PROCESSED: &str = "VendorCreditProcessed";
}
