//! Artisan account standing.
//!
//! New accounts start `pending`. An admin approves them once the artisan has
//! verified their email address; suspension can happen at any time and is
//! lifted by reinstating, which again requires a verified email.

use atelier_schemas::ArtisanStatus;

use crate::{Step, TransitionError};

const MACHINE: &str = "artisan";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtisanEvent {
    Approve,
    Suspend,
    Reinstate,
}

pub fn next(
    status: ArtisanStatus,
    event: &ArtisanEvent,
    email_verified: bool,
) -> Result<Step<ArtisanStatus>, TransitionError> {
    use ArtisanEvent::*;
    use ArtisanStatus::*;

    match (status, event) {
        (Pending, Approve) | (Suspended, Reinstate) if !email_verified => Err(
            TransitionError::guarded(MACHINE, status, event, "email address not verified"),
        ),
        (Pending, Approve) => Ok(Step::Moved(Active)),
        (Suspended, Reinstate) => Ok(Step::Moved(Active)),
        (Pending | Active, Suspend) => Ok(Step::Moved(Suspended)),
        (from, ev) => Err(TransitionError::illegal(MACHINE, from, ev)),
    }
}
