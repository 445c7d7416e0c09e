//! Cross-machine flows the server drives: a proof approval confirms the
//! order, a rejection leaves it payable, and a cancelled commission stays
//! cancelled whoever asks next.

use atelier_lifecycle::custom_order::{self, CustomOrderEvent};
use atelier_lifecycle::order::{self, OrderEvent};
use atelier_lifecycle::payment_proof::{self, ProofEvent};
use atelier_lifecycle::{Actor, Step};
use atelier_schemas::{CustomOrderStatus, OrderStatus, ProofStatus};

#[test]
fn rejected_proof_then_approved_proof_pays_order() {
    let mut order_status = OrderStatus::Pending;

    let first = payment_proof::next(ProofStatus::Submitted, &ProofEvent::Reject).unwrap();
    assert_eq!(first.status(), ProofStatus::Rejected);
    // Rejection does not touch the order.
    assert_eq!(order_status, OrderStatus::Pending);

    let second = payment_proof::next(ProofStatus::Submitted, &ProofEvent::Approve).unwrap();
    assert_eq!(second.status(), ProofStatus::Approved);
    order_status = order::next(order_status, &OrderEvent::PaymentConfirmed)
        .unwrap()
        .status();
    assert_eq!(order_status, OrderStatus::Paid);

    // A late provider callback for the same payment is a replay.
    assert!(matches!(
        order::next(order_status, &OrderEvent::PaymentConfirmed),
        Ok(Step::Unchanged(OrderStatus::Paid))
    ));
}

#[test]
fn cancelled_commission_is_terminal_for_everyone() {
    let s = custom_order::next(CustomOrderStatus::Quoted, &CustomOrderEvent::Cancel, Actor::Customer)
        .unwrap()
        .status();
    assert_eq!(s, CustomOrderStatus::Cancelled);

    for actor in [Actor::Customer, Actor::Artisan, Actor::Admin] {
        assert!(custom_order::next(s, &CustomOrderEvent::Cancel, actor).is_err());
        assert!(custom_order::next(s, &CustomOrderEvent::Accept, actor).is_err());
    }
}

#[test]
fn transition_error_message_names_machine_and_states() {
    let err = custom_order::next(
        CustomOrderStatus::Draft,
        &CustomOrderEvent::StartProduction,
        Actor::Artisan,
    )
    .unwrap_err();
    let msg = err.to_string();
    assert!(msg.starts_with("illegal custom order transition: draft + StartProduction"), "{msg}");
}
