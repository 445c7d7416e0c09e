//! Catalog order payment state.
//!
//! ```text
//!   pending ──PaymentConfirmed──► paid    (PaymentConfirmed again: replay)
//!      │
//!      └────PaymentFailed─────► failed  (PaymentFailed again: replay)
//! ```
//!
//! A proof rejection does not fail the order: the customer may upload
//! another proof while the order is still pending.

use atelier_schemas::OrderStatus;

use crate::{Step, TransitionError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    /// An admin approved a payment proof, or the provider reported success.
    PaymentConfirmed,
    /// The provider reported failure, or an admin gave up on the order.
    PaymentFailed,
}

pub fn next(status: OrderStatus, event: &OrderEvent) -> Result<Step<OrderStatus>, TransitionError> {
    use OrderEvent::*;
    use OrderStatus::*;

    match (status, event) {
        (Pending, PaymentConfirmed) => Ok(Step::Moved(Paid)),
        (Pending, PaymentFailed) => Ok(Step::Moved(Failed)),
        (Paid, PaymentConfirmed) => Ok(Step::Unchanged(Paid)),
        (Failed, PaymentFailed) => Ok(Step::Unchanged(Failed)),
        (from, ev) => Err(TransitionError::illegal("order", from, ev)),
    }
}
