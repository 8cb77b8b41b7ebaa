// Notification seam
//
// Delivers the point authorization code to the customer after a booking that
// redeems points commits. Delivery failures never undo a booking.

use async_trait::async_trait;

use crate::booking::error::BookingResult;
use crate::booking::types::{CustomerId, ReservationId};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver_auth_code(
        &self,
        customer_id: CustomerId,
        reservation_id: ReservationId,
        code: &str,
    ) -> BookingResult<()>;
}

/// Writes deliveries to the log instead of sending them anywhere
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn deliver_auth_code(
        &self,
        customer_id: CustomerId,
        reservation_id: ReservationId,
        _code: &str,
    ) -> BookingResult<()> {
        tracing::info!(
            customer_id,
            %reservation_id,
            "Point authorization code issued"
        );
        Ok(())
    }
}
