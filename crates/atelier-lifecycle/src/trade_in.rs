//! Trade-in submissions.
//!
//! The back office offers store credit for a submitted item; the customer
//! accepts or declines. Credit is granted only when the admin marks an
//! accepted trade-in completed (the item has been received).

use atelier_schemas::{Cents, TradeIn, TradeInStatus};
use chrono::{DateTime, Utc};

use crate::{Step, TransitionError};

const MACHINE: &str = "trade-in";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeInEvent {
    Offer { credit: Cents },
    Reject { note: Option<String> },
    Accept,
    Decline,
    Complete,
}

pub fn next(status: TradeInStatus, event: &TradeInEvent) -> Result<Step<TradeInStatus>, TransitionError> {
    use TradeInEvent::*;
    use TradeInStatus as S;

    match (status, event) {
        (S::Submitted, Offer { credit }) if !credit.is_positive() => Err(
            TransitionError::guarded(MACHINE, status, event, "offered credit must be positive"),
        ),
        (S::Submitted, Offer { .. }) => Ok(Step::Moved(S::Offered)),
        (S::Submitted, Reject { .. }) => Ok(Step::Moved(S::Rejected)),
        (S::Offered, Accept) => Ok(Step::Moved(S::Accepted)),
        (S::Offered, Decline) => Ok(Step::Moved(S::Declined)),
        (S::Accepted, Complete) => Ok(Step::Moved(S::Completed)),
        (from, ev) => Err(TransitionError::illegal(MACHINE, from, ev)),
    }
}

pub fn apply(
    trade_in: &mut TradeIn,
    event: &TradeInEvent,
    now: DateTime<Utc>,
) -> Result<Step<TradeInStatus>, TransitionError> {
    let step = next(trade_in.status, event)?;
    match event {
        TradeInEvent::Offer { credit } => trade_in.offered_credit = Some(*credit),
        TradeInEvent::Reject { note } => trade_in.admin_note = note.clone(),
        _ => {}
    }
    trade_in.status = step.status();
    trade_in.updated_at_utc = now;
    Ok(step)
}
