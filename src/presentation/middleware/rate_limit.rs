//! Rate Limiting Middleware
//!
//! Every request is counted under three tags, each with its own limit:
//!
//! - `ip`: the client address
//! - `user`: the authenticated user, when there is one
//! - `user_ip`: the (user, address) pair
//!
//! Tags whose value is unknown are left out. If the counter store is
//! unavailable the request is let through and the failure logged, so a
//! Redis outage degrades limiting instead of the whole service.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use crate::application::services::{Limit, RateLimitError, RateLimiter, Tag};
use crate::config::RateLimitSettings;
use crate::presentation::middleware::auth::AuthUser;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// The limiter plus the per-tag limits of HTTP requests.
#[derive(Clone)]
pub struct HttpRateLimit {
    limiter: RateLimiter,
    ip: Limit,
    user: Limit,
    user_ip: Limit,
}

impl HttpRateLimit {
    pub fn new(limiter: RateLimiter, settings: &RateLimitSettings) -> Self {
        Self {
            limiter,
            ip: settings.ip.into(),
            user: settings.user.into(),
            user_ip: settings.user_ip.into(),
        }
    }

    /// Tags of one request. Empty values are dropped by the limiter.
    pub fn tags(&self, ip: Option<&str>, userid: Option<&str>) -> Vec<Tag> {
        let ip = ip.unwrap_or_default();
        let userid = userid.unwrap_or_default();
        let user_ip = if ip.is_empty() || userid.is_empty() {
            String::new()
        } else {
            format!("{}|{}", userid, ip)
        };

        vec![
            Tag::new("ip", ip, self.ip),
            Tag::new("user", userid, self.user),
            Tag::new("user_ip", user_ip, self.user_ip),
        ]
    }

    pub async fn check(&self, ip: Option<&str>, userid: Option<&str>) -> Result<(), RateLimitError> {
        self.limiter.check(&self.tags(ip, userid)).await
    }
}

/// Client address, preferring proxy headers over the socket peer.
///
/// The forwarding headers are only trustworthy behind a known proxy.
fn client_ip(request: &Request, peer: Option<IpAddr>) -> Option<String> {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim);
    if let Some(ip) = forwarded.filter(|ip| ip.parse::<IpAddr>().is_ok()) {
        return Some(ip.to_string());
    }

    let real_ip = request
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim);
    if let Some(ip) = real_ip.filter(|ip| ip.parse::<IpAddr>().is_ok()) {
        return Some(ip.to_string());
    }

    peer.map(|ip| ip.to_string())
}

/// Rate limiting middleware. Must run inside the identity middleware so
/// the user tag is known.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip());
    let ip = client_ip(&request, peer);
    let userid = request
        .extensions()
        .get::<AuthUser>()
        .map(|u| u.userid.clone());

    if ip.is_none() {
        warn!("Could not determine client address for rate limiting");
    }

    match state.rate_limit.check(ip.as_deref(), userid.as_deref()).await {
        Ok(()) => next.run(request).await,
        Err(RateLimitError::Store(e)) => {
            error!(error = %e, "Rate limiter unavailable; letting request through");
            next.run(request).await
        }
        Err(limited) => {
            warn!(ip = ?ip, userid = ?userid, error = %limited, "Rate limit exceeded");
            AppError::from(limited).into_response()
        }
    }
}
