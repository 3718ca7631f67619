//! JSON body extractor that also runs `validator` constraints.

use axum::Json;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::ServerError;

/// Like [`axum::Json`], but rejects with [`ServerError::Validation`] (422)
/// both when the body does not parse and when it violates its constraints.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ServerError::Validation(rejection.body_text()))?;
        value
            .validate()
            .map_err(|errors| ServerError::Validation(errors.to_string()))?;
        Ok(Self(value))
    }
}
