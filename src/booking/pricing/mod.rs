// Pricing Engine
//
// Composes menu and option prices, the staff premium, a coupon discount and a
// point redemption into one payable amount. The order of the steps is fixed:
// 1. subtotal = menu + every option (repeats priced individually)
// 2. payable = subtotal + staff premium
// 3. coupon discount, clamped to [0, payable]
// 4. points = min(requested, balance, payable - coupon)
// 5. final = max(0, payable - coupon - points)

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::booking::coupon::{AppliedCoupon, CouponValidator};
use crate::booking::error::{BookingError, BookingResult, CouponRejection};
use crate::booking::metrics::PerformanceMetrics;
use crate::booking::models::{Menu, MenuOption};
use crate::booking::points::PointLedger;
use crate::booking::types::{CouponId, CustomerId, SalonId};

/// Result of a pricing calculation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceBreakdown {
    pub subtotal: i64,
    pub staff_premium: i64,
    pub payable_before_discounts: i64,
    pub coupon_discount: i64,
    pub points_applied: i64,
    pub final_price: i64,
    pub coupon_id: Option<CouponId>,
    /// Why a typed coupon was not applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_rejection: Option<CouponRejection>,
}

/// Everything pricing needs to know about one booking
#[derive(Debug, Clone)]
pub struct PricingRequest<'a> {
    pub salon_id: SalonId,
    pub customer_id: CustomerId,
    pub menu: &'a Menu,
    pub options: &'a [MenuOption],
    pub staff_premium: i64,
    pub points_requested: i64,
    pub coupon_code: Option<&'a str>,
    pub now: DateTime<Utc>,
}

/// Menu effective price plus the effective price of every option occurrence
pub fn subtotal(menu: &Menu, options: &[MenuOption]) -> i64 {
    menu.effective_price() + options.iter().map(MenuOption::effective_price).sum::<i64>()
}

/// Redemption clamp: never more than requested, held, or owed
pub fn points_to_apply(requested: i64, balance: i64, owed: i64) -> i64 {
    requested.min(balance).min(owed).max(0)
}

/// Steps 2-5 for already-resolved inputs
pub fn compose(
    subtotal: i64,
    staff_premium: i64,
    coupon: Option<&AppliedCoupon>,
    points_requested: i64,
    point_balance: i64,
) -> PriceBreakdown {
    let payable_before_discounts = subtotal + staff_premium;
    let coupon_discount = coupon
        .map(|c| c.discount.clamp(0, payable_before_discounts.max(0)))
        .unwrap_or(0);
    let points_applied = points_to_apply(
        points_requested,
        point_balance,
        payable_before_discounts - coupon_discount,
    );
    let final_price = (payable_before_discounts - coupon_discount - points_applied).max(0);

    PriceBreakdown {
        subtotal,
        staff_premium,
        payable_before_discounts,
        coupon_discount,
        points_applied,
        final_price,
        coupon_id: coupon.map(|c| c.coupon_id),
        coupon_rejection: None,
    }
}

pub struct PricingEngine {
    coupons: Arc<CouponValidator>,
    points: Arc<PointLedger>,
    metrics: Option<PerformanceMetrics>,
}

impl PricingEngine {
    pub fn new(coupons: Arc<CouponValidator>, points: Arc<PointLedger>) -> Self {
        Self {
            coupons,
            points,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: PerformanceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Price a booking. An inapplicable coupon never fails pricing; its
    /// reason is returned in `coupon_rejection`.
    pub async fn price(&self, request: PricingRequest<'_>) -> BookingResult<PriceBreakdown> {
        if request.points_requested < 0 {
            return Err(BookingError::InvalidArgument(format!(
                "requested points cannot be negative, got {}",
                request.points_requested
            )));
        }

        let _timer = self.metrics.as_ref().map(|m| m.start_pricing_calculation());

        let subtotal = subtotal(request.menu, request.options);
        let payable = subtotal + request.staff_premium;

        let (coupon, coupon_rejection) = match request.coupon_code {
            Some(code) => match self
                .coupons
                .validate(code, request.salon_id, request.menu, payable, request.now)
                .await?
            {
                Ok(applied) => (Some(applied), None),
                Err(rejection) => (None, Some(rejection)),
            },
            None => (None, None),
        };

        let balance = if request.points_requested > 0 {
            self.points.balance(request.customer_id).await?
        } else {
            0
        };

        let mut breakdown = compose(
            subtotal,
            request.staff_premium,
            coupon.as_ref(),
            request.points_requested,
            balance,
        );
        breakdown.coupon_rejection = coupon_rejection;

        tracing::debug!(
            customer_id = request.customer_id,
            subtotal = breakdown.subtotal,
            coupon_discount = breakdown.coupon_discount,
            points_applied = breakdown.points_applied,
            final_price = breakdown.final_price,
            "Priced booking"
        );
        Ok(breakdown)
    }
}
