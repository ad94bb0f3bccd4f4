use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime},
    Collection, Database,
};

use crate::errors::{AppError, Result};
use crate::models::order::OrderItem;
use crate::models::voucher::{UserVoucher, Voucher, VoucherError, VoucherStatus, VoucherUsage};

pub enum VoucherApplyResult {
    Approved {
        voucher: Voucher,
        discount_amount: f64,
    },
    Rejected(VoucherError),
}

/// Codes are stored uppercase and matched case-insensitively.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// The full eligibility rule chain over an already-fetched voucher.
/// Pure; the service supplies the ledger count and grant record.
/// Returns the discount amount for an eligible order.
pub fn evaluate_voucher(
    voucher: &Voucher,
    now: DateTime<Utc>,
    order_subtotal: f64,
    items: &[OrderItem],
    prior_user_uses: i64,
    grant: Option<&UserVoucher>,
    shipping_fee: f64,
) -> std::result::Result<f64, VoucherError> {
    // Date window binds regardless of the stored status field.
    voucher.check_window(now)?;

    // A voucher an admin switched off is indistinguishable from a
    // nonexistent one as far as shoppers are concerned.
    if voucher.status != VoucherStatus::Active {
        return Err(VoucherError::NotFound);
    }

    if voucher.global_limit_reached() {
        return Err(VoucherError::LimitReached);
    }

    if let Some(limit) = voucher.per_user_limit {
        if prior_user_uses >= limit {
            return Err(VoucherError::PerUserLimitReached);
        }
    }

    // Non-public vouchers carry a grant with its own counters.
    if let Some(grant) = grant {
        if grant.usage_count >= grant.usage_limit {
            return Err(VoucherError::PerUserLimitReached);
        }
    }

    if order_subtotal < voucher.min_order_value {
        return Err(VoucherError::BelowMinimum {
            min_order_value: voucher.min_order_value,
        });
    }

    if items
        .iter()
        .any(|item| voucher.excluded_products.contains(&item.product_id))
    {
        return Err(VoucherError::NotApplicable);
    }

    let restricted =
        !voucher.applicable_categories.is_empty() || !voucher.applicable_products.is_empty();
    if restricted {
        let matches = items.iter().any(|item| {
            voucher.applicable_products.contains(&item.product_id)
                || item
                    .category_id
                    .as_ref()
                    .is_some_and(|c| voucher.applicable_categories.contains(c))
        });
        if !matches {
            return Err(VoucherError::NotApplicable);
        }
    }

    Ok(voucher.compute_discount(order_subtotal, shipping_fee))
}

#[derive(Clone)]
pub struct VoucherService {
    db: Database,
}

impl VoucherService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn vouchers(&self) -> Collection<Voucher> {
        self.db.collection("vouchers")
    }

    fn grants(&self) -> Collection<UserVoucher> {
        self.db.collection("user_vouchers")
    }

    fn usages(&self) -> Collection<VoucherUsage> {
        self.db.collection("voucher_usages")
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Option<Voucher>> {
        let code = normalize_code(code);
        Ok(self.vouchers().find_one(doc! { "code": code }).await?)
    }

    async fn count_user_redemptions(&self, user_id: &str, voucher_id: ObjectId) -> Result<i64> {
        let count = self
            .usages()
            .count_documents(doc! { "user_id": user_id, "voucher_id": voucher_id })
            .await?;
        Ok(count as i64)
    }

    async fn find_grant(&self, user_id: &str, voucher_id: ObjectId) -> Result<Option<UserVoucher>> {
        Ok(self
            .grants()
            .find_one(doc! { "user_id": user_id, "voucher_id": voucher_id })
            .await?)
    }

    /// Dry-run preview: validates the code against the order and computes
    /// the discount. Nothing is mutated; consumption happens only at
    /// order finalization.
    pub async fn apply_voucher(
        &self,
        code: &str,
        user_id: &str,
        order_subtotal: f64,
        items: &[OrderItem],
        shipping_fee: f64,
    ) -> Result<VoucherApplyResult> {
        let now = Utc::now();

        if normalize_code(code).is_empty() {
            return Ok(VoucherApplyResult::Rejected(VoucherError::Validation(
                "Voucher code is required".to_string(),
            )));
        }

        let Some(voucher) = self.find_by_code(code).await? else {
            return Ok(VoucherApplyResult::Rejected(VoucherError::NotFound));
        };
        let Some(voucher_id) = voucher._id else {
            return Ok(VoucherApplyResult::Rejected(VoucherError::NotFound));
        };

        let prior_uses = self.count_user_redemptions(user_id, voucher_id).await?;
        let grant = self.find_grant(user_id, voucher_id).await?;

        match evaluate_voucher(
            &voucher,
            now,
            order_subtotal,
            items,
            prior_uses,
            grant.as_ref(),
            shipping_fee,
        ) {
            Ok(discount_amount) => Ok(VoucherApplyResult::Approved {
                voucher,
                discount_amount,
            }),
            Err(e) => Ok(VoucherApplyResult::Rejected(e)),
        }
    }

    /// Consumes a voucher for a finalized order: bumps the global counter,
    /// appends the ledger entry and bumps the grant counter when one
    /// exists. Plain single-document updates; two redemptions racing near
    /// a usage cap can both pass the preview check, and a storage fault
    /// between the order insert and these updates leaves a finalized
    /// order whose usage never reached the ledger (known limitation, no
    /// cross-document transaction here).
    pub async fn consume_voucher(
        &self,
        voucher: &Voucher,
        user_id: &str,
        order_id: ObjectId,
        discount_amount: f64,
    ) -> Result<()> {
        let voucher_id = voucher._id.ok_or(AppError::DocumentNotFound)?;
        let now = Utc::now();
        let now_bson = BsonDateTime::from_millis(now.timestamp_millis());

        self.vouchers()
            .update_one(
                doc! { "_id": voucher_id },
                doc! {
                    "$inc": { "usage_count": 1 },
                    "$set": { "updated_at": now_bson },
                },
            )
            .await?;

        let usage = VoucherUsage {
            _id: None,
            voucher_id,
            user_id: user_id.to_string(),
            order_id,
            discount_amount,
            used_at: now,
        };
        self.usages().insert_one(&usage).await?;

        self.grants()
            .update_one(
                doc! { "user_id": user_id, "voucher_id": voucher_id },
                doc! { "$inc": { "usage_count": 1 } },
            )
            .await?;

        tracing::info!(
            "Voucher {} consumed by user {} (discount {})",
            voucher.code,
            user_id,
            discount_amount
        );
        Ok(())
    }

    pub async fn create_voucher(&self, mut voucher: Voucher) -> Result<Voucher> {
        voucher.code = normalize_code(&voucher.code);

        let existing = self
            .vouchers()
            .find_one(doc! { "code": &voucher.code })
            .await?;
        if existing.is_some() {
            return Err(AppError::DuplicateKey);
        }

        let result = self.vouchers().insert_one(&voucher).await?;
        voucher._id = result.inserted_id.as_object_id();
        Ok(voucher)
    }

    /// Publicly listable vouchers: active status, inside the date window,
    /// with remaining global capacity.
    pub async fn list_active(&self) -> Result<Vec<Voucher>> {
        let now = Utc::now();
        let now_bson = BsonDateTime::from_millis(now.timestamp_millis());

        let cursor = self
            .vouchers()
            .find(doc! {
                "status": "active",
                "start_date": { "$lte": now_bson },
                "end_date": { "$gte": now_bson },
            })
            .await?;
        let vouchers: Vec<Voucher> = cursor.try_collect().await?;

        Ok(vouchers
            .into_iter()
            .filter(|v| !v.global_limit_reached())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::voucher::VoucherType;
    use chrono::Duration;

    fn item(product_id: &str, category_id: Option<&str>, price: f64) -> OrderItem {
        OrderItem {
            product_id: product_id.to_string(),
            category_id: category_id.map(|c| c.to_string()),
            name: product_id.to_string(),
            price,
            quantity: 1,
        }
    }

    fn voucher() -> Voucher {
        let now = Utc::now();
        Voucher {
            _id: Some(ObjectId::new()),
            code: "SAVE10".to_string(),
            description: "10% off".to_string(),
            voucher_type: VoucherType::Percentage,
            value: 10.0,
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
            end_date: now + Duration::days(30),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn code_normalization_is_case_insensitive() {
        assert_eq!(normalize_code("save10"), "SAVE10");
        assert_eq!(normalize_code("  Save10 "), "SAVE10");
        assert_eq!(normalize_code("SAVE10"), "SAVE10");
    }

    #[test]
    fn eligible_order_gets_the_computed_discount() {
        let v = voucher();
        let items = vec![item("p1", Some("books"), 300_000.0)];
        let discount = evaluate_voucher(&v, Utc::now(), 300_000.0, &items, 0, None, 0.0);
        assert_eq!(discount, Ok(30_000.0));
    }

    #[test]
    fn subtotal_below_minimum_is_rejected() {
        let mut v = voucher();
        v.min_order_value = 200_000.0;
        let items = vec![item("p1", None, 150_000.0)];
        assert_eq!(
            evaluate_voucher(&v, Utc::now(), 150_000.0, &items, 0, None, 0.0),
            Err(VoucherError::BelowMinimum {
                min_order_value: 200_000.0
            })
        );
    }

    #[test]
    fn global_usage_cap_is_enforced() {
        let mut v = voucher();
        v.total_usage_limit = Some(100);
        v.usage_count = 100;
        let items = vec![item("p1", None, 100_000.0)];
        assert_eq!(
            evaluate_voucher(&v, Utc::now(), 100_000.0, &items, 0, None, 0.0),
            Err(VoucherError::LimitReached)
        );
    }

    #[test]
    fn per_user_limit_counts_the_usage_ledger() {
        let mut v = voucher();
        v.per_user_limit = Some(2);
        let items = vec![item("p1", None, 100_000.0)];
        assert!(evaluate_voucher(&v, Utc::now(), 100_000.0, &items, 1, None, 0.0).is_ok());
        assert_eq!(
            evaluate_voucher(&v, Utc::now(), 100_000.0, &items, 2, None, 0.0),
            Err(VoucherError::PerUserLimitReached)
        );
    }

    #[test]
    fn exhausted_grant_is_rejected_independently_of_global_counters() {
        let v = voucher();
        let grant = UserVoucher {
            _id: None,
            user_id: "u1".to_string(),
            voucher_id: v._id.unwrap(),
            usage_limit: 1,
            usage_count: 1,
            granted_at: Utc::now(),
        };
        let items = vec![item("p1", None, 100_000.0)];
        assert_eq!(
            evaluate_voucher(&v, Utc::now(), 100_000.0, &items, 0, Some(&grant), 0.0),
            Err(VoucherError::PerUserLimitReached)
        );
    }

    #[test]
    fn excluded_product_in_cart_blocks_the_voucher() {
        let mut v = voucher();
        v.excluded_products = vec!["gift-card".to_string()];
        let items = vec![
            item("p1", None, 100_000.0),
            item("gift-card", None, 50_000.0),
        ];
        assert_eq!(
            evaluate_voucher(&v, Utc::now(), 150_000.0, &items, 0, None, 0.0),
            Err(VoucherError::NotApplicable)
        );
    }

    #[test]
    fn restricted_voucher_needs_at_least_one_matching_item() {
        let mut v = voucher();
        v.applicable_categories = vec!["books".to_string()];

        let no_match = vec![item("p1", Some("toys"), 100_000.0)];
        assert_eq!(
            evaluate_voucher(&v, Utc::now(), 100_000.0, &no_match, 0, None, 0.0),
            Err(VoucherError::NotApplicable)
        );

        let with_match = vec![
            item("p1", Some("toys"), 100_000.0),
            item("p2", Some("books"), 50_000.0),
        ];
        assert!(evaluate_voucher(&v, Utc::now(), 150_000.0, &with_match, 0, None, 0.0).is_ok());
    }

    #[test]
    fn inactive_status_reads_as_not_found() {
        let mut v = voucher();
        v.status = VoucherStatus::Inactive;
        let items = vec![item("p1", None, 100_000.0)];
        assert_eq!(
            evaluate_voucher(&v, Utc::now(), 100_000.0, &items, 0, None, 0.0),
            Err(VoucherError::NotFound)
        );
    }

    #[test]
    fn window_check_precedes_status_check() {
        let mut v = voucher();
        let now = Utc::now();
        v.status = VoucherStatus::Active;
        v.start_date = now + Duration::days(1);
        v.end_date = now + Duration::days(10);
        let items = vec![item("p1", None, 100_000.0)];
        assert_eq!(
            evaluate_voucher(&v, now, 100_000.0, &items, 0, None, 0.0),
            Err(VoucherError::NotYetActive)
        );
    }

    #[test]
    fn percentage_cap_applies_through_the_full_chain() {
        let mut v = voucher();
        v.max_discount = Some(50_000.0);
        let items = vec![item("p1", None, 1_000_000.0)];
        assert_eq!(
            evaluate_voucher(&v, Utc::now(), 1_000_000.0, &items, 0, None, 0.0),
            Ok(50_000.0)
        );
    }
}
