//! Identity Middleware
//!
//! Sessions are issued and verified by the gateway in front of this
//! service, which forwards the authenticated user ID in a trusted header.
//! This middleware only lifts that header into a request extension.

use axum::{
    extract::{FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use crate::shared::error::AppError;

/// Header carrying the authenticated user ID
pub const USER_ID_HEADER: &str = "x-user-id";

/// Longest accepted user ID
const MAX_USER_ID_LEN: usize = 31;

/// Authenticated user extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub userid: String,
}

/// Insert [`AuthUser`] when the identity header holds a plausible user ID.
/// Requests without one continue anonymously.
pub async fn identity_middleware(mut request: Request, next: Next) -> Response {
    let userid = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_USER_ID_LEN)
        .map(str::to_string);

    if let Some(userid) = userid {
        request.extensions_mut().insert(AuthUser { userid });
    }

    next.run(request).await
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Missing user identity".into()))
    }
}
