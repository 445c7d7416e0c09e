use atelier_lifecycle::TransitionError;
use thiserror::Error;
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness rule or a compare-and-set lost.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Status CAS lost against a concurrent writer.
    pub fn stale(entity: &'static str, id: Uuid, expected: impl std::fmt::Display) -> Self {
        StoreError::Conflict(format!("{entity} {id} is no longer {expected}"))
    }

    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "not_found",
            StoreError::Conflict(_) => "conflict",
            StoreError::InsufficientStock { .. } => "insufficient_stock",
            StoreError::Transition(_) => "illegal_transition",
            StoreError::Backend(_) => "storage_error",
        }
    }
}
