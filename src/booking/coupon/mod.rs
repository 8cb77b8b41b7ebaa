// Coupon Validator
//
// Checks a typed coupon code against its menu exclusions, validity window and
// usage cap, and computes the discount it authorizes for a payable amount.
// Read-only; the use count is only incremented when a booking commits.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::booking::error::{BookingResult, CouponRejection};
use crate::booking::models::{Coupon, Menu};
use crate::booking::store::CatalogRepository;
use crate::booking::types::{CouponId, DiscountType, SalonId};

/// A coupon that passed validation, with the discount it grants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCoupon {
    pub coupon_id: CouponId,
    pub code: String,
    pub discount: i64,
}

/// Discount a coupon grants on `payable`, always within `0..=payable`
///
/// Fixed coupons take their value off (never below zero). Percentage coupons
/// take `floor(payable * pct / 100)` with the percentage clamped to 0..=100.
pub fn discount_for(coupon: &Coupon, payable: i64) -> i64 {
    let payable = payable.max(0);
    let discount = match coupon.discount_type {
        DiscountType::Fixed => coupon.discount_value.max(0),
        DiscountType::Percentage => {
            let percent = coupon.discount_value.clamp(0, 100);
            // Widened so large amounts cannot overflow before the division
            ((payable as i128 * percent as i128) / 100) as i64
        }
    };
    discount.clamp(0, payable)
}

/// Decide whether a looked-up coupon may be used for `menu` at `now`.
///
/// The menu exclusion is checked first so the caller can name the menu.
pub fn check<'a>(
    code: &str,
    coupon: Option<&'a Coupon>,
    menu: &Menu,
    now: DateTime<Utc>,
) -> Result<&'a Coupon, CouponRejection> {
    let coupon = coupon
        .filter(|c| c.lifecycle().is_active())
        .ok_or_else(|| CouponRejection::NotFound {
            code: code.to_string(),
        })?;

    if coupon.excluded_menu_ids.contains(&menu.id) {
        return Err(CouponRejection::ExcludedForMenu {
            code: coupon.code.clone(),
            menu_id: menu.id,
            menu_name: menu.name.clone(),
        });
    }

    if !coupon.is_within_window(now) {
        return Err(CouponRejection::Expired {
            code: coupon.code.clone(),
        });
    }

    if !coupon.has_uses_left() {
        return Err(CouponRejection::Exhausted {
            code: coupon.code.clone(),
            max_use_count: coupon.max_use_count.unwrap_or_default(),
        });
    }

    Ok(coupon)
}

pub struct CouponValidator {
    catalog: Arc<dyn CatalogRepository>,
}

impl CouponValidator {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    /// Validate `code` for a booking of `menu` in `salon_id`.
    ///
    /// The outer result carries store failures; the inner one carries the
    /// rejection reason so pricing can continue without the coupon.
    pub async fn validate(
        &self,
        code: &str,
        salon_id: SalonId,
        menu: &Menu,
        payable: i64,
        now: DateTime<Utc>,
    ) -> BookingResult<Result<AppliedCoupon, CouponRejection>> {
        let code = code.trim();
        let coupon = self.catalog.coupon_by_code(salon_id, code).await?;

        let outcome = check(code, coupon.as_ref(), menu, now).map(|coupon| AppliedCoupon {
            coupon_id: coupon.id,
            code: coupon.code.clone(),
            discount: discount_for(coupon, payable),
        });

        match &outcome {
            Ok(applied) => tracing::debug!(
                code = %applied.code,
                discount = applied.discount,
                "Coupon accepted"
            ),
            Err(rejection) => tracing::warn!(
                code,
                menu_id = menu.id,
                reason = rejection.error_code(),
                "Coupon rejected"
            ),
        }
        Ok(outcome)
    }
}
