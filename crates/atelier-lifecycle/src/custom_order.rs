//! Custom order negotiation between a customer and one artisan.
//!
//! ```text
//!  draft ─Submit─► pending ─Quote─► quoted ─Accept─► accepted ─StartProduction─► in_production
//!                              ▲      │                                              │
//!                              └Quote─┘                                          Complete
//!                                                                                    ▼
//!                                     delivered ◄──────────Deliver────────────── completed
//! ```
//!
//! Customers and artisans may cancel while nothing is agreed yet (draft,
//! pending, quoted). Once a quote is accepted only an admin can cancel.

use atelier_schemas::{Cents, CustomOrder, CustomOrderStatus};
use chrono::{DateTime, Utc};

use crate::{Actor, Step, TransitionError};

const MACHINE: &str = "custom order";

/// Longest lead time an artisan may quote.
pub const MAX_LEAD_TIME_DAYS: i32 = 365;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomOrderEvent {
    Submit,
    Quote {
        amount: Cents,
        lead_time_days: i32,
        note: Option<String>,
    },
    Accept,
    StartProduction,
    Complete,
    Deliver,
    Cancel,
}

impl CustomOrderEvent {
    fn allowed_actors(&self) -> &'static [Actor] {
        use CustomOrderEvent::*;
        match self {
            Submit | Accept => &[Actor::Customer],
            Quote { .. } | StartProduction | Complete => &[Actor::Artisan],
            Deliver => &[Actor::Artisan, Actor::Admin],
            Cancel => &[Actor::Customer, Actor::Artisan, Actor::Admin],
        }
    }
}

pub fn next(
    status: CustomOrderStatus,
    event: &CustomOrderEvent,
    actor: Actor,
) -> Result<Step<CustomOrderStatus>, TransitionError> {
    use CustomOrderEvent::*;
    use CustomOrderStatus::*;

    if !event.allowed_actors().contains(&actor) {
        return Err(TransitionError::guarded(
            MACHINE,
            status,
            event,
            "actor may not perform this action",
        ));
    }

    match (status, event) {
        (Draft, Submit) => Ok(Step::Moved(Pending)),

        (Pending | Quoted, Quote { amount, lead_time_days, .. }) => {
            if !amount.is_positive() {
                return Err(TransitionError::guarded(MACHINE, status, event, "quote must be positive"));
            }
            if !(1..=MAX_LEAD_TIME_DAYS).contains(lead_time_days) {
                return Err(TransitionError::guarded(
                    MACHINE,
                    status,
                    event,
                    "lead time must be between 1 and 365 days",
                ));
            }
            Ok(Step::Moved(Quoted))
        }

        (Quoted, Accept) => Ok(Step::Moved(Accepted)),
        (Accepted, StartProduction) => Ok(Step::Moved(InProduction)),
        (InProduction, Complete) => Ok(Step::Moved(Completed)),
        (Completed, Deliver) => Ok(Step::Moved(Delivered)),

        (Draft | Pending | Quoted, Cancel) => Ok(Step::Moved(Cancelled)),
        (Accepted | InProduction | Completed, Cancel) if actor == Actor::Admin => {
            Ok(Step::Moved(Cancelled))
        }
        (Accepted | InProduction | Completed, Cancel) => Err(TransitionError::guarded(
            MACHINE,
            status,
            event,
            "only an admin can cancel after a quote is accepted",
        )),

        (from, ev) => Err(TransitionError::illegal(MACHINE, from, ev)),
    }
}

/// Applies `event` to `order` in place, including the quote fields.
///
/// On error `order` is left untouched.
pub fn apply(
    order: &mut CustomOrder,
    event: &CustomOrderEvent,
    actor: Actor,
    now: DateTime<Utc>,
) -> Result<Step<CustomOrderStatus>, TransitionError> {
    let step = next(order.status, event, actor)?;

    if let CustomOrderEvent::Quote {
        amount,
        lead_time_days,
        note,
    } = event
    {
        order.quote = Some(*amount);
        order.lead_time_days = Some(*lead_time_days);
        order.artisan_note = note.clone();
    }

    order.status = step.status();
    order.updated_at_utc = now;
    Ok(step)
}
