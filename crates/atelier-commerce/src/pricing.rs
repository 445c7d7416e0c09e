//! Checkout pricing.
//!
//! Order of application:
//! 1. subtotal = sum of line totals
//! 2. VIP discount on the subtotal (basis points, rounded down)
//! 3. shipping: flat fee, waived when the discounted subtotal reaches the threshold
//! 4. store credit, capped at what is left to pay

use std::fmt;

use atelier_schemas::Cents;
use serde::{Deserialize, Serialize};

use crate::cart::PricedLine;
use crate::vip::VipTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingPolicy {
    pub flat_fee: Cents,
    pub free_threshold: Option<Cents>,
}

impl ShippingPolicy {
    pub fn fee_for(&self, discounted_subtotal: Cents) -> Cents {
        match self.free_threshold {
            Some(t) if discounted_subtotal >= t => Cents::ZERO,
            _ => self.flat_fee,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutQuote {
    pub subtotal: Cents,
    pub discount: Cents,
    pub shipping: Cents,
    pub store_credit_applied: Cents,
    pub total: Cents,
    pub vip_tier: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    NoLines,
    NegativeAmount,
    Overflow,
}

impl PricingError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoLines => "empty_cart",
            Self::NegativeAmount => "negative_amount",
            Self::Overflow => "amount_overflow",
        }
    }
}

impl fmt::Display for PricingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoLines => write!(f, "nothing to price"),
            Self::NegativeAmount => write!(f, "prices, fees and credit must not be negative"),
            Self::Overflow => write!(f, "checkout total overflows"),
        }
    }
}

impl std::error::Error for PricingError {}

pub fn quote_checkout(
    lines: &[PricedLine],
    tier: &VipTier,
    shipping: &ShippingPolicy,
    store_credit: Cents,
) -> Result<CheckoutQuote, PricingError> {
    if lines.is_empty() {
        return Err(PricingError::NoLines);
    }
    if store_credit.is_negative()
        || shipping.flat_fee.is_negative()
        || lines.iter().any(|l| l.line_total.is_negative())
    {
        return Err(PricingError::NegativeAmount);
    }

    let subtotal = lines.iter().try_fold(Cents::ZERO, |acc, l| {
        acc.raw()
            .checked_add(l.line_total.raw())
            .map(Cents::new)
            .ok_or(PricingError::Overflow)
    })?;
    let discount = subtotal.portion_bps(tier.discount_bps);
    let discounted = subtotal - discount;
    let shipping_fee = shipping.fee_for(discounted);
    let due = discounted
        .raw()
        .checked_add(shipping_fee.raw())
        .map(Cents::new)
        .ok_or(PricingError::Overflow)?;
    let store_credit_applied = store_credit.min(due);

    Ok(CheckoutQuote {
        subtotal,
        discount,
        shipping: shipping_fee,
        store_credit_applied,
        total: due - store_credit_applied,
        vip_tier: tier.name.clone(),
    })
}
