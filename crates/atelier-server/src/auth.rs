//! Request identity.
//!
//! Customers and artisans are identified by headers an upstream gateway
//! sets after authenticating them. The back office uses a bearer token and
//! fails closed when none is configured.

use std::sync::Arc;

use atelier_schemas::{Artisan, ArtisanStatus, Customer};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

pub const CUSTOMER_HEADER: &str = "x-customer-id";
pub const ARTISAN_HEADER: &str = "x-artisan-id";

fn header_uuid(parts: &Parts, name: &str) -> Result<Uuid, ApiError> {
    let raw = parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::unauthorized(format!("missing {name} header")))?;
    raw.to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or_else(|| ApiError::unauthorized(format!("{name} is not a uuid")))
}

/// The calling customer, loaded from the store.
pub struct CurrentCustomer(pub Customer);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentCustomer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, st: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let id = header_uuid(parts, CUSTOMER_HEADER)?;
        match st.store.get_customer(id).await {
            Ok(c) => Ok(Self(c)),
            Err(atelier_store::StoreError::NotFound { .. }) => Err(ApiError::unauthorized("unknown customer")),
            Err(e) => Err(e.into()),
        }
    }
}

/// The calling artisan in any status.
pub struct CurrentArtisan(pub Artisan);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentArtisan {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, st: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let id = header_uuid(parts, ARTISAN_HEADER)?;
        match st.store.get_artisan(id).await {
            Ok(a) => Ok(Self(a)),
            Err(atelier_store::StoreError::NotFound { .. }) => Err(ApiError::unauthorized("unknown artisan")),
            Err(e) => Err(e.into()),
        }
    }
}

/// An approved artisan; pending and suspended accounts get 403.
pub struct ActiveArtisan(pub Artisan);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ActiveArtisan {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, st: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let CurrentArtisan(a) = CurrentArtisan::from_request_parts(parts, st).await?;
        if a.status != ArtisanStatus::Active {
            return Err(ApiError::forbidden(
                "artisan_not_active",
                format!("artisan account is {}", a.status),
            ));
        }
        Ok(Self(a))
    }
}

/// Back-office caller holding the admin bearer token.
pub struct Admin;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, st: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let Some(expected) = st.secrets.admin_token.as_deref() else {
            return Err(ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "admin_disabled",
                "back office is disabled: no admin token configured",
            ));
        };
        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
        if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
            return Err(ApiError::unauthorized("invalid bearer token"));
        }
        Ok(Admin)
    }
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
