//! Request extractors shared by the handlers.

use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::ControlError;
use crate::types::DeveloperId;

/// Header carrying the calling developer's id.
///
/// Set by the authenticating proxy in front of the control plane.
pub const DEVELOPER_HEADER: &str = "x-developer-id";

/// The developer a request acts for.
#[derive(Debug, Clone, Copy)]
pub struct DeveloperIdentity(pub DeveloperId);

impl<S> FromRequestParts<S> for DeveloperIdentity
where
    S: Send + Sync,
{
    type Rejection = ControlError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts.headers.get(DEVELOPER_HEADER).ok_or_else(|| {
            ControlError::Unauthenticated(format!("missing {DEVELOPER_HEADER} header"))
        })?;

        value
            .to_str()
            .ok()
            .and_then(|raw| raw.trim().parse().ok())
            .map(Self)
            .ok_or_else(|| {
                ControlError::Unauthenticated(format!("malformed {DEVELOPER_HEADER} header"))
            })
    }
}

/// JSON body whose rejection is a 400 in the usual error shape.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ControlError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ControlError::validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Path parameters whose rejection is a 400 in the usual error shape.
#[derive(Debug)]
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ControlError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ControlError::validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}
