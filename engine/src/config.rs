// ============================================================================
// RENTAL ENGINE - BUSINESS RULE CONFIGURATION
// ============================================================================
// Module: engine/src/config.rs
// Description: Configurable business constants for the rental, purchase,
// and return workflows. Injected at engine construction; never read from
// global mutable state.
// ============================================================================

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::models::ConditionRating;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalEngineConfig {
    /// Window, in days, during which a purchase may be returned.
    pub return_period_days: i64,
    /// Restocking fee applied to EXCESS / WRONG_ITEM purchase returns.
    pub restocking_fee_percent: Decimal,
    /// Minimum condition rating eligible for return-to-stock / vendor credit.
    #[serde(with = "condition_rating_serde")]
    pub min_condition_for_credit: ConditionRating,
    /// Purchase returns at or below this absolute amount auto-approve.
    pub auto_approve_threshold: Decimal,
    /// Days of tolerance after `rental_end_date` before late fees accrue.
    pub grace_period_days: i64,
    /// Multiplier applied to the daily rate for each day late.
    pub late_fee_multiplier: Decimal,
    /// Maximum number of extensions permitted per rental header.
    pub max_extensions: i32,
    /// Fraction of rental value held as a security deposit when not
    /// otherwise specified per item.
    pub security_deposit_percent: Decimal,
    /// Default tax rate applied when no location/item override exists.
    pub default_tax_rate: Decimal,
    /// Soft per-operation timeout, mirrored into cooperative cancellation.
    pub operation_timeout_seconds: u64,
}

mod condition_rating_serde {
    use super::ConditionRating;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &ConditionRating, s: S) -> Result<S::Ok, S::Error> {
        let letter = match value {
            ConditionRating::A => "A",
            ConditionRating::B => "B",
            ConditionRating::C => "C",
            ConditionRating::D => "D",
            ConditionRating::F => "F",
        };
        s.serialize_str(letter)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<ConditionRating, D::Error> {
        let s = String::deserialize(d)?;
        match s.as_str() {
            "A" => Ok(ConditionRating::A),
            "B" => Ok(ConditionRating::B),
            "C" => Ok(ConditionRating::C),
            "D" => Ok(ConditionRating::D),
            "F" => Ok(ConditionRating::F),
            other => Err(serde::de::Error::custom(format!(
                "unrecognized condition rating: {other}"
            ))),
        }
    }
}

impl RentalEngineConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("return_period_days", 30)?
            .set_default("restocking_fee_percent", "15")?
            .set_default("min_condition_for_credit", "C")?
            .set_default("auto_approve_threshold", "1000")?
            .set_default("grace_period_days", 1)?
            .set_default("late_fee_multiplier", "1.5")?
            .set_default("max_extensions", 3)?
            .set_default("security_deposit_percent", "20")?
            .set_default("default_tax_rate", "10")?
            .set_default("operation_timeout_seconds", 30)?
            .add_source(Environment::with_prefix("RENTAL_ENGINE").separator("__"))
            .add_source(File::with_name("rental_engine").required(false))
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_extensions < 0 {
            return Err("max_extensions must be non-negative".to_string());
        }
        if self.return_period_days < 0 {
            return Err("return_period_days must be non-negative".to_string());
        }
        if self.restocking_fee_percent < Decimal::ZERO || self.restocking_fee_percent > dec!(100) {
            return Err("restocking_fee_percent must be between 0 and 100".to_string());
        }
        if self.default_tax_rate < Decimal::ZERO {
            return Err("default_tax_rate must be non-negative".to_string());
        }
        Ok(())
    }
}

impl Default for RentalEngineConfig {
    fn default() -> Self {
        Self {
            return_period_days: 30,
            restocking_fee_percent: dec!(15),
            min_condition_for_credit: ConditionRating::C,
            auto_approve_threshold: dec!(1000),
            grace_period_days: 1,
            late_fee_multiplier: dec!(1.5),
            max_extensions: 3,
            security_deposit_percent: dec!(20),
            default_tax_rate: dec!(10),
            operation_timeout_seconds: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_constants() {
        let config = RentalEngineConfig::default();
        assert_eq!(config.return_period_days, 30);
        assert_eq!(config.restocking_fee_percent, dec!(15));
        assert_eq!(config.min_condition_for_credit, ConditionRating::C);
        assert_eq!(config.auto_approve_threshold, dec!(1000));
        assert_eq!(config.grace_period_days, 1);
        assert_eq!(config.late_fee_multiplier, dec!(1.5));
        assert_eq!(config.max_extensions, 3);
        assert_eq!(config.security_deposit_percent, dec!(20));
        assert_eq!(config.default_tax_rate, dec!(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_negative_max_extensions() {
        let mut config = RentalEngineConfig::default();
        config.max_extensions = -1;
        assert!(config.validate().is_err());
    }
}
