//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - Database repositories (PostgreSQL)
//! - KV store (Redis)
//! - Pub/sub and event streams (Redis)
//! - Prometheus metrics

pub mod cache;
pub mod database;
pub mod messaging;
pub mod metrics;
pub mod repositories;
