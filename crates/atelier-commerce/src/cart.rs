//! Cart editing.
//!
//! Quantities are bounded by the product's current stock and the per-line
//! maximum from config. Stock is checked again at checkout: a cart is a
//! wish list, not a reservation.

use std::collections::HashMap;
use std::fmt;

use atelier_schemas::{Cart, CartLine, Cents, Product, ProductStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    InvalidQuantity(i32),
    ProductUnavailable(Uuid),
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },
    LineLimit {
        product_id: Uuid,
        max: i32,
    },
    LineNotFound(Uuid),
    EmptyCart,
    Overflow,
}

impl CartError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidQuantity(_) => "invalid_quantity",
            Self::ProductUnavailable(_) => "product_unavailable",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::LineLimit { .. } => "line_limit",
            Self::LineNotFound(_) => "line_not_found",
            Self::EmptyCart => "empty_cart",
            Self::Overflow => "amount_overflow",
        }
    }
}

impl fmt::Display for CartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidQuantity(q) => write!(f, "quantity must be positive (got {q})"),
            Self::ProductUnavailable(id) => write!(f, "product {id} is not available"),
            Self::InsufficientStock {
                product_id,
                requested,
                available,
            } => write!(
                f,
                "product {product_id}: requested {requested}, only {available} in stock"
            ),
            Self::LineLimit { product_id, max } => {
                write!(f, "product {product_id}: at most {max} per order")
            }
            Self::LineNotFound(id) => write!(f, "product {id} is not in the cart"),
            Self::EmptyCart => write!(f, "cart is empty"),
            Self::Overflow => write!(f, "cart total overflows"),
        }
    }
}

impl std::error::Error for CartError {}

fn ensure_orderable(product: &Product, quantity: i32, max_per_line: i32) -> Result<(), CartError> {
    if quantity <= 0 {
        return Err(CartError::InvalidQuantity(quantity));
    }
    if product.status != ProductStatus::Active {
        return Err(CartError::ProductUnavailable(product.id));
    }
    if quantity > max_per_line {
        return Err(CartError::LineLimit {
            product_id: product.id,
            max: max_per_line,
        });
    }
    if quantity > product.stock {
        return Err(CartError::InsufficientStock {
            product_id: product.id,
            requested: quantity,
            available: product.stock.max(0),
        });
    }
    Ok(())
}

/// Adds `quantity` of `product`, merging with an existing line.
pub fn add_line(cart: &mut Cart, product: &Product, quantity: i32, max_per_line: i32) -> Result<(), CartError> {
    if quantity <= 0 {
        return Err(CartError::InvalidQuantity(quantity));
    }
    let existing = cart
        .lines
        .iter()
        .find(|l| l.product_id == product.id)
        .map_or(0, |l| l.quantity);
    let wanted = existing.checked_add(quantity).ok_or(CartError::Overflow)?;
    ensure_orderable(product, wanted, max_per_line)?;

    match cart.lines.iter_mut().find(|l| l.product_id == product.id) {
        Some(line) => line.quantity = wanted,
        None => cart.lines.push(CartLine {
            product_id: product.id,
            quantity: wanted,
        }),
    }
    Ok(())
}

/// Replaces a line's quantity. Zero removes the line.
pub fn set_quantity(cart: &mut Cart, product: &Product, quantity: i32, max_per_line: i32) -> Result<(), CartError> {
    if quantity == 0 {
        return remove_line(cart, product.id);
    }
    ensure_orderable(product, quantity, max_per_line)?;
    match cart.lines.iter_mut().find(|l| l.product_id == product.id) {
        Some(line) => line.quantity = quantity,
        None => cart.lines.push(CartLine {
            product_id: product.id,
            quantity,
        }),
    }
    Ok(())
}

pub fn remove_line(cart: &mut Cart, product_id: Uuid) -> Result<(), CartError> {
    let before = cart.lines.len();
    cart.lines.retain(|l| l.product_id != product_id);
    if cart.lines.len() == before {
        return Err(CartError::LineNotFound(product_id));
    }
    Ok(())
}

/// A cart line joined with the product it refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub artisan_id: Uuid,
    pub name: String,
    pub unit_price: Cents,
    pub quantity: i32,
    pub line_total: Cents,
}

/// Re-validates every line against current products and prices it.
///
/// Used at checkout; the first failing line aborts.
pub fn price_lines(
    cart: &Cart,
    products: &HashMap<Uuid, Product>,
    max_per_line: i32,
) -> Result<Vec<PricedLine>, CartError> {
    if cart.is_empty() {
        return Err(CartError::EmptyCart);
    }
    cart.lines
        .iter()
        .map(|line| {
            let product = products
                .get(&line.product_id)
                .ok_or(CartError::ProductUnavailable(line.product_id))?;
            ensure_orderable(product, line.quantity, max_per_line)?;
            let line_total = product
                .price
                .checked_mul_qty(line.quantity as i64)
                .ok_or(CartError::Overflow)?;
            Ok(PricedLine {
                product_id: product.id,
                artisan_id: product.artisan_id,
                name: product.name.clone(),
                unit_price: product.price,
                quantity: line.quantity,
                line_total,
            })
        })
        .collect()
}
