//! Category taxonomy and catalog search.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use atelier_schemas::{Cents, Category, Product, ProductStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// URL slug from a display name: lower-case ASCII alphanumerics separated by
/// single dashes.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        "item".to_string()
    } else {
        out
    }
}

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaxonomyError {
    DuplicateSlug(String),
    UnknownParent { category: Uuid, parent: Uuid },
    Cycle(Uuid),
}

impl fmt::Display for TaxonomyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateSlug(s) => write!(f, "duplicate category slug: {s}"),
            Self::UnknownParent { category, parent } => {
                write!(f, "category {category} references unknown parent {parent}")
            }
            Self::Cycle(id) => write!(f, "category {id} is its own ancestor"),
        }
    }
}

impl std::error::Error for TaxonomyError {}

/// Nested view of the taxonomy for navigation menus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

/// Validated category forest.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    by_id: BTreeMap<Uuid, Category>,
    by_slug: HashMap<String, Uuid>,
    /// Parent id (None for roots) to children sorted by (position, name).
    children: HashMap<Option<Uuid>, Vec<Uuid>>,
}

impl Taxonomy {
    pub fn build(categories: Vec<Category>) -> Result<Self, TaxonomyError> {
        let mut t = Taxonomy::default();

        for c in categories {
            if t.by_slug.insert(c.slug.clone(), c.id).is_some() {
                return Err(TaxonomyError::DuplicateSlug(c.slug));
            }
            t.by_id.insert(c.id, c);
        }

        for c in t.by_id.values() {
            if let Some(parent) = c.parent_id {
                if !t.by_id.contains_key(&parent) {
                    return Err(TaxonomyError::UnknownParent {
                        category: c.id,
                        parent,
                    });
                }
            }
            t.children.entry(c.parent_id).or_default().push(c.id);
        }

        // Every chain of parents must reach a root within `len` steps.
        let limit = t.by_id.len();
        for c in t.by_id.values() {
            let mut cursor = c.parent_id;
            let mut steps = 0;
            while let Some(p) = cursor {
                steps += 1;
                if p == c.id || steps > limit {
                    return Err(TaxonomyError::Cycle(c.id));
                }
                cursor = t.by_id.get(&p).and_then(|pc| pc.parent_id);
            }
        }

        let by_id = &t.by_id;
        for ids in t.children.values_mut() {
            ids.sort_by(|a, b| {
                let (ca, cb) = (&by_id[a], &by_id[b]);
                (ca.position, &ca.name).cmp(&(cb.position, &cb.name))
            });
        }

        Ok(t)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&Category> {
        self.by_id.get(&id)
    }

    pub fn by_slug(&self, slug: &str) -> Option<&Category> {
        self.by_slug.get(slug).and_then(|id| self.by_id.get(id))
    }

    /// Direct children in display order.
    pub fn children(&self, id: Option<Uuid>) -> Vec<&Category> {
        self.children
            .get(&id)
            .map(|ids| ids.iter().filter_map(|i| self.by_id.get(i)).collect())
            .unwrap_or_default()
    }

    /// Path from the root down to `id`, inclusive. Empty when unknown.
    pub fn breadcrumb(&self, id: Uuid) -> Vec<&Category> {
        let mut path = Vec::new();
        let mut cursor = self.by_id.get(&id);
        while let Some(c) = cursor {
            path.push(c);
            cursor = c.parent_id.and_then(|p| self.by_id.get(&p));
        }
        path.reverse();
        path
    }

    /// `id` and every category below it.
    pub fn descendants(&self, id: Uuid) -> BTreeSet<Uuid> {
        let mut out = BTreeSet::new();
        if !self.by_id.contains_key(&id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if out.insert(cur) {
                if let Some(kids) = self.children.get(&Some(cur)) {
                    stack.extend(kids.iter().copied());
                }
            }
        }
        out
    }

    pub fn tree(&self) -> Vec<CategoryNode> {
        self.subtree(None)
    }

    fn subtree(&self, parent: Option<Uuid>) -> Vec<CategoryNode> {
        self.children(parent)
            .into_iter()
            .map(|c| CategoryNode {
                category: c.clone(),
                children: self.subtree(Some(c.id)),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Product search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductQuery {
    /// Case-insensitive substring of name or description.
    pub text: Option<String>,
    /// Category slug; products in sub-categories match too.
    pub category: Option<String>,
    pub artisan_id: Option<Uuid>,
    pub min_price: Option<Cents>,
    pub max_price: Option<Cents>,
    pub sort: ProductSort,
    /// 1-based.
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_per_page: u32,
    pub max_per_page: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_per_page: 24,
            max_per_page: 96,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: usize,
    pub total_pages: u32,
}

/// Filters, sorts and paginates the storefront-visible products.
pub fn query(products: &[Product], taxonomy: &Taxonomy, q: &ProductQuery, limits: PageLimits) -> Page<Product> {
    let per_page = q
        .per_page
        .unwrap_or(limits.default_per_page)
        .clamp(1, limits.max_per_page.max(1));
    let page = q.page.unwrap_or(1).max(1);

    let category_filter: Option<BTreeSet<Uuid>> = q.category.as_deref().map(|slug| {
        taxonomy
            .by_slug(slug)
            .map(|c| taxonomy.descendants(c.id))
            .unwrap_or_default()
    });
    let needle = q
        .text
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut hits: Vec<&Product> = products
        .iter()
        .filter(|p| p.status == ProductStatus::Active)
        .filter(|p| category_filter.as_ref().map_or(true, |set| set.contains(&p.category_id)))
        .filter(|p| q.artisan_id.map_or(true, |a| p.artisan_id == a))
        .filter(|p| q.min_price.map_or(true, |m| p.price >= m))
        .filter(|p| q.max_price.map_or(true, |m| p.price <= m))
        .filter(|p| {
            needle.as_ref().map_or(true, |n| {
                p.name.to_lowercase().contains(n) || p.description.to_lowercase().contains(n)
            })
        })
        .collect();

    match q.sort {
        ProductSort::Newest => hits.sort_by(|a, b| b.created_at_utc.cmp(&a.created_at_utc).then(a.id.cmp(&b.id))),
        ProductSort::PriceAsc => hits.sort_by(|a, b| a.price.cmp(&b.price).then(a.name.cmp(&b.name))),
        ProductSort::PriceDesc => hits.sort_by(|a, b| b.price.cmp(&a.price).then(a.name.cmp(&b.name))),
        ProductSort::Name => hits.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase())),
    }

    let total = hits.len();
    let total_pages = total.div_ceil(per_page as usize) as u32;
    let start = (page as usize - 1).saturating_mul(per_page as usize);
    let items = hits
        .into_iter()
        .skip(start)
        .take(per_page as usize)
        .cloned()
        .collect();

    Page {
        items,
        page,
        per_page,
        total,
        total_pages,
    }
}
