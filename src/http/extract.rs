//! Request extractors: bearer authentication and validated JSON bodies.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts},
    Json,
};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

use super::AppState;
use crate::access::Principal;
use crate::EcommerceError;

/// The authenticated caller. Rejects requests without a valid token.
pub struct CurrentPrincipal(pub Principal);

/// The caller when a token was sent, `None` for anonymous requests. A token
/// that is sent but invalid is still rejected.
pub struct MaybePrincipal(pub Option<Principal>);

#[async_trait]
impl FromRequestParts<AppState> for MaybePrincipal {
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer_token(parts)? {
            None => Ok(Self(None)),
            Some(token) => state.services.accounts.authenticate(token).await.map(|p| Self(Some(p))),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentPrincipal {
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let MaybePrincipal(principal) = MaybePrincipal::from_request_parts(parts, state).await?;
        principal
            .map(Self)
            .ok_or_else(|| EcommerceError::Unauthenticated("credentials were not provided".into()))
    }
}

/// Accepts `Bearer <token>` and `Token <token>`.
fn bearer_token(parts: &Parts) -> Result<Option<&str>, EcommerceError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let malformed = || EcommerceError::Unauthenticated("malformed authorization header".into());
    let value = value.to_str().map_err(|_| malformed())?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("Token "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(malformed)?;
    Ok(Some(token))
}

/// JSON body that also passes its `validator` rules. Both failures are
/// reported as validation errors.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = EcommerceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| EcommerceError::validation("body", rejection.body_text()))?;
        value.validate().map_err(first_field_error)?;
        Ok(Self(value))
    }
}

/// Reports the alphabetically first failing field.
fn first_field_error(errors: ValidationErrors) -> EcommerceError {
    let fields = errors.field_errors();
    let Some((field, errs)) = fields.into_iter().min_by_key(|(field, _)| *field) else {
        return EcommerceError::validation("body", "invalid request body");
    };
    let message = errs
        .first()
        .map(|e| e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| format!("failed {} check", e.code)))
        .unwrap_or_else(|| "invalid value".to_string());
    EcommerceError::validation(field, message)
}
