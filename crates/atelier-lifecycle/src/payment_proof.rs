use atelier_schemas::ProofStatus;

use crate::{Step, TransitionError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofEvent {
    Approve,
    Reject,
}

/// A proof is reviewed exactly once.
pub fn next(status: ProofStatus, event: &ProofEvent) -> Result<Step<ProofStatus>, TransitionError> {
    match (status, event) {
        (ProofStatus::Submitted, ProofEvent::Approve) => Ok(Step::Moved(ProofStatus::Approved)),
        (ProofStatus::Submitted, ProofEvent::Reject) => Ok(Step::Moved(ProofStatus::Rejected)),
        (from, ev) => Err(TransitionError::illegal("payment proof", from, ev)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reviewed_proof_is_final() {
        assert_eq!(
            next(ProofStatus::Submitted, &ProofEvent::Reject).unwrap().status(),
            ProofStatus::Rejected
        );
        assert!(next(ProofStatus::Rejected, &ProofEvent::Approve).is_err());
        assert!(next(ProofStatus::Approved, &ProofEvent::Approve).is_err());
    }
}
