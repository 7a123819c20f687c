//! Shared Utilities
//!
//! Common utilities used across all layers.

pub mod clock;
pub mod drain;
pub mod error;
pub mod ids;
pub mod snowflake;
pub mod validation;
