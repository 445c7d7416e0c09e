//! Status machines for every stateful record in the marketplace.
//!
//! Each machine is a pure `next(status, event, ..)` function. Persisting the
//! result is the caller's job and must be a compare-and-set on the status the
//! transition was computed from, so two concurrent writers cannot both win.
//!
//! Illegal events return [`TransitionError`]; replays that are known to be
//! harmless (a duplicate payment callback) return [`Step::Unchanged`].

pub mod artisan;
pub mod custom_order;
pub mod order;
pub mod payment_proof;
pub mod trade_in;
pub mod verification;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Who is driving a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Customer,
    Artisan,
    Admin,
    /// An external payment provider callback.
    Provider,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::Customer => "customer",
            Actor::Artisan => "artisan",
            Actor::Admin => "admin",
            Actor::Provider => "provider",
        }
    }
}

/// Outcome of a legal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<S> {
    /// The status changes to the carried value.
    Moved(S),
    /// The event was a replay; the status stays as carried.
    Unchanged(S),
}

impl<S: Copy> Step<S> {
    pub fn status(&self) -> S {
        match self {
            Step::Moved(s) | Step::Unchanged(s) => *s,
        }
    }

    pub fn is_move(&self) -> bool {
        matches!(self, Step::Moved(_))
    }
}

/// An event that cannot be applied in the current status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    /// Which machine refused (`"order"`, `"custom order"`, ...).
    pub machine: &'static str,
    pub from: String,
    pub event: String,
    /// Extra detail when the event is legal in this status but a guard failed.
    pub reason: Option<&'static str>,
}

impl TransitionError {
    pub(crate) fn illegal(machine: &'static str, from: impl fmt::Display, event: impl fmt::Debug) -> Self {
        Self {
            machine,
            from: from.to_string(),
            event: format!("{event:?}"),
            reason: None,
        }
    }

    pub(crate) fn guarded(
        machine: &'static str,
        from: impl fmt::Display,
        event: impl fmt::Debug,
        reason: &'static str,
    ) -> Self {
        Self {
            reason: Some(reason),
            ..Self::illegal(machine, from, event)
        }
    }
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "illegal {} transition: {} + {}",
            self.machine, self.from, self.event
        )?;
        if let Some(reason) = self.reason {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

impl std::error::Error for TransitionError {}
