//! Cache tags invalidated by catalog mutations.
//!
//! The storefront caches pages per tag; after a write the daemon broadcasts
//! the tags from [`tags_for`] so front-ends can drop stale pages.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Serialize, Serializer};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CacheTag {
    Catalog,
    Product(Uuid),
    Category(String),
    Artisan(Uuid),
    Passport(Uuid),
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog => write!(f, "catalog"),
            Self::Product(id) => write!(f, "product:{id}"),
            Self::Category(slug) => write!(f, "category:{slug}"),
            Self::Artisan(id) => write!(f, "artisan:{id}"),
            Self::Passport(id) => write!(f, "passport:{id}"),
        }
    }
}

impl Serialize for CacheTag {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogChange {
    ProductCreated {
        product_id: Uuid,
        artisan_id: Uuid,
        category_slug: String,
    },
    /// `previous_category_slug` is set when the product moved category.
    ProductUpdated {
        product_id: Uuid,
        artisan_id: Uuid,
        category_slug: String,
        previous_category_slug: Option<String>,
    },
    StockChanged {
        product_id: Uuid,
        artisan_id: Uuid,
    },
    PassportUpdated {
        product_id: Uuid,
    },
    /// Ancestors are included so parent listings refresh too.
    CategoryCreated {
        slug: String,
        ancestor_slugs: Vec<String>,
    },
    /// Approval or suspension changes which products are listed.
    ArtisanStatusChanged {
        artisan_id: Uuid,
    },
}

pub fn tags_for(change: &CatalogChange) -> BTreeSet<CacheTag> {
    let mut tags = BTreeSet::new();
    match change {
        CatalogChange::ProductCreated {
            product_id,
            artisan_id,
            category_slug,
        } => {
            tags.insert(CacheTag::Catalog);
            tags.insert(CacheTag::Product(*product_id));
            tags.insert(CacheTag::Artisan(*artisan_id));
            tags.insert(CacheTag::Category(category_slug.clone()));
        }
        CatalogChange::ProductUpdated {
            product_id,
            artisan_id,
            category_slug,
            previous_category_slug,
        } => {
            tags.insert(CacheTag::Catalog);
            tags.insert(CacheTag::Product(*product_id));
            tags.insert(CacheTag::Artisan(*artisan_id));
            tags.insert(CacheTag::Category(category_slug.clone()));
            if let Some(prev) = previous_category_slug {
                tags.insert(CacheTag::Category(prev.clone()));
            }
        }
        CatalogChange::StockChanged {
            product_id,
            artisan_id,
        } => {
            tags.insert(CacheTag::Product(*product_id));
            tags.insert(CacheTag::Artisan(*artisan_id));
        }
        CatalogChange::PassportUpdated { product_id } => {
            tags.insert(CacheTag::Product(*product_id));
            tags.insert(CacheTag::Passport(*product_id));
        }
        CatalogChange::CategoryCreated {
            slug,
            ancestor_slugs,
        } => {
            tags.insert(CacheTag::Catalog);
            tags.insert(CacheTag::Category(slug.clone()));
            tags.extend(ancestor_slugs.iter().cloned().map(CacheTag::Category));
        }
        CatalogChange::ArtisanStatusChanged { artisan_id } => {
            tags.insert(CacheTag::Catalog);
            tags.insert(CacheTag::Artisan(*artisan_id));
        }
    }
    tags
}

/// Wire form of a tag set, sorted.
pub fn tag_strings(tags: &BTreeSet<CacheTag>) -> Vec<String> {
    tags.iter().map(ToString::to_string).collect()
}
