use crate::error::SubtrackError;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::future::Future;

/// The authenticated user behind a request.
///
/// Session issuance lives outside this crate; whatever authenticates the
/// request inserts a `SessionPrincipal` into the request extensions, and
/// handlers extract it from there. Requests without one are rejected with
/// 401.
///
/// # Example
///
/// ```rust,ignore
/// async fn my_handler(principal: SessionPrincipal) -> Json<Data> {
///     load_for_user(&principal.user_id).await
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPrincipal {
    pub user_id: String,
}

impl SessionPrincipal {
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

impl<S> FromRequestParts<S> for SessionPrincipal
where
    S: Send + Sync,
{
    type Rejection = SubtrackError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let principal = parts.extensions.get::<SessionPrincipal>().cloned();
        async move {
            principal.ok_or_else(|| SubtrackError::unauthorized("unauthorized request"))
        }
    }
}
