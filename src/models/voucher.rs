use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherType {
    Percentage,
    FixedAmount,
    FreeShipping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherStatus {
    Active,
    Inactive,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub code: String,        // stored uppercase, matched case-insensitively
    pub description: String,
    pub voucher_type: VoucherType,
    pub value: f64,          // percent for Percentage, amount otherwise
    pub min_order_value: f64,
    pub max_discount: Option<f64>,       // cap for percentage vouchers
    pub total_usage_limit: Option<i64>,  // None = unlimited
    pub usage_count: i64,
    pub per_user_limit: Option<i64>,
    pub status: VoucherStatus,

    pub applicable_categories: Vec<String>,
    pub applicable_products: Vec<String>,
    pub excluded_products: Vec<String>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub start_date: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub end_date: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// Per-user grant of a voucher, with its own counters independent of
/// the voucher's global usage_count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserVoucher {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub user_id: String,
    pub voucher_id: ObjectId,
    pub usage_limit: i64,
    pub usage_count: i64,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub granted_at: DateTime<Utc>,
}

/// Append-only ledger entry, written once a voucher is consumed by a
/// finalized order. Per-user limits are enforced by counting these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoucherUsage {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub voucher_id: ObjectId,
    pub user_id: String,
    pub order_id: ObjectId,
    pub discount_amount: f64,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub used_at: DateTime<Utc>,
}

/// Rule failures for voucher application. Structured results for the
/// caller to render; infrastructure faults go through AppError instead.
#[derive(Debug, Clone, PartialEq)]
pub enum VoucherError {
    NotFound,
    NotYetActive,
    Expired,
    LimitReached,
    PerUserLimitReached,
    BelowMinimum { min_order_value: f64 },
    NotApplicable,
    Validation(String),
}

impl VoucherError {
    pub fn message(&self) -> String {
        match self {
            VoucherError::NotFound => "Voucher code not found.".to_string(),
            VoucherError::NotYetActive => "This voucher is not active yet.".to_string(),
            VoucherError::Expired => "This voucher has expired.".to_string(),
            VoucherError::LimitReached => "This voucher has reached its usage limit.".to_string(),
            VoucherError::PerUserLimitReached => {
                "You have already used this voucher the maximum number of times.".to_string()
            }
            VoucherError::BelowMinimum { min_order_value } => {
                format!("Order subtotal must be at least {:.0} to use this voucher.", min_order_value)
            }
            VoucherError::NotApplicable => {
                "This voucher does not apply to the items in your order.".to_string()
            }
            VoucherError::Validation(msg) => msg.clone(),
        }
    }
}

impl Voucher {
    /// The date window binds regardless of the stored status field.
    pub fn check_window(&self, now: DateTime<Utc>) -> Result<(), VoucherError> {
        if now.timestamp_millis() < self.start_date.timestamp_millis() {
            return Err(VoucherError::NotYetActive);
        }
        if now.timestamp_millis() > self.end_date.timestamp_millis() {
            return Err(VoucherError::Expired);
        }
        Ok(())
    }

    pub fn global_limit_reached(&self) -> bool {
        match self.total_usage_limit {
            Some(limit) => self.usage_count >= limit,
            None => false,
        }
    }

    /// Discount for an eligible order. `shipping_fee` is only consulted
    /// for free-shipping vouchers, where the discount is the waived fee.
    pub fn compute_discount(&self, order_subtotal: f64, shipping_fee: f64) -> f64 {
        match self.voucher_type {
            VoucherType::Percentage => {
                let raw = order_subtotal * self.value / 100.0;
                match self.max_discount {
                    Some(cap) => raw.min(cap),
                    None => raw,
                }
            }
            VoucherType::FixedAmount => self.value.min(order_subtotal),
            VoucherType::FreeShipping => shipping_fee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn voucher(voucher_type: VoucherType, value: f64) -> Voucher {
        let now = Utc::now();
        Voucher {
            _id: None,
            code: "SAVE10".to_string(),
            description: "test voucher".to_string(),
            voucher_type,
            value,
            min_order_value: 0.0,
            max_discount: None,
            total_usage_limit: None,
            usage_count: 0,
            per_user_limit: None,
            status: VoucherStatus::Active,
            applicable_categories: vec![],
            applicable_products: vec![],
            excluded_products: vec![],
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(1),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn percentage_discount_is_capped_at_max_discount() {
        let mut v = voucher(VoucherType::Percentage, 10.0);
        v.max_discount = Some(50_000.0);
        assert_eq!(v.compute_discount(1_000_000.0, 0.0), 50_000.0);
    }

    #[test]
    fn percentage_discount_uncapped_without_max_discount() {
        let v = voucher(VoucherType::Percentage, 10.0);
        assert_eq!(v.compute_discount(1_000_000.0, 0.0), 100_000.0);
    }

    #[test]
    fn fixed_amount_never_exceeds_subtotal() {
        let v = voucher(VoucherType::FixedAmount, 75_000.0);
        assert_eq!(v.compute_discount(50_000.0, 0.0), 50_000.0);
        assert_eq!(v.compute_discount(200_000.0, 0.0), 75_000.0);
    }

    #[test]
    fn free_shipping_waives_the_supplied_fee() {
        let v = voucher(VoucherType::FreeShipping, 0.0);
        assert_eq!(v.compute_discount(500_000.0, 25_000.0), 25_000.0);
    }

    #[test]
    fn future_start_date_is_not_yet_active_even_when_status_is_active() {
        let mut v = voucher(VoucherType::Percentage, 10.0);
        let now = Utc::now();
        v.status = VoucherStatus::Active;
        v.start_date = now + Duration::days(2);
        v.end_date = now + Duration::days(10);
        assert_eq!(v.check_window(now), Err(VoucherError::NotYetActive));
    }

    #[test]
    fn past_end_date_is_expired() {
        let mut v = voucher(VoucherType::Percentage, 10.0);
        let now = Utc::now();
        v.start_date = now - Duration::days(10);
        v.end_date = now - Duration::days(1);
        assert_eq!(v.check_window(now), Err(VoucherError::Expired));
    }

    #[test]
    fn usage_cap_checks_respect_unlimited_vouchers() {
        let mut v = voucher(VoucherType::Percentage, 10.0);
        v.usage_count = 10_000;
        assert!(!v.global_limit_reached());
        v.total_usage_limit = Some(10_000);
        assert!(v.global_limit_reached());
    }
}
