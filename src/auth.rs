use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;

/// Header set by the authenticating proxy in front of the service.
pub const DRIVER_HEADER: &str = "x-driver-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedDriver {
    pub id: i64,
}

/// Driver on whose behalf the request is made, if the request carries one.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentDriver(pub Option<AuthenticatedDriver>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentDriver
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(driver) = parts.extensions.get::<AuthenticatedDriver>() {
            return Ok(Self(Some(*driver)));
        }

        let Some(raw) = parts.headers.get(DRIVER_HEADER) else {
            return Ok(Self(None));
        };
        let id = raw
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse::<i64>().ok())
            .ok_or(AppError::Unauthorized)?;
        Ok(Self(Some(AuthenticatedDriver { id })))
    }
}

impl CurrentDriver {
    pub fn require_driver(&self) -> Result<AuthenticatedDriver, AppError> {
        self.0.ok_or(AppError::Unauthorized)
    }
}
