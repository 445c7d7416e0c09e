//! atelier-commerce
//!
//! Storefront rules that do not need a database:
//! - category taxonomy and catalog search
//! - cart editing against product stock
//! - VIP tiers by lifetime spend
//! - checkout pricing (discount, shipping, store credit)
//! - cache tags to revalidate after catalog changes
//!
//! Pure deterministic logic: no IO, no clock.

pub mod cart;
pub mod catalog;
pub mod pricing;
pub mod revalidate;
pub mod vip;

pub use cart::{add_line, price_lines, remove_line, set_quantity, CartError, PricedLine};
pub use catalog::{
    query, slugify, CategoryNode, Page, PageLimits, ProductQuery, ProductSort, Taxonomy,
    TaxonomyError,
};
pub use pricing::{quote_checkout, CheckoutQuote, PricingError, ShippingPolicy};
pub use revalidate::{tag_strings, tags_for, CacheTag, CatalogChange};
pub use vip::{VipProgress, VipTier, VipTierError, VipTiers};
