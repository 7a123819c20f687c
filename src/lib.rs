//! # Chat Core Library
//!
//! The messaging coordination core of a chat platform:
//! - Friend graph with invitations and mirrored edges
//! - Direct chats kept in step with the friend graph through events
//! - Group chats with bounded membership
//! - Presence tracking and presence-aware fanout
//! - Sliding-window rate limiting
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Core entities, value objects and repository traits
//! - **Application Layer**: Services and DTOs
//! - **Infrastructure Layer**: PostgreSQL and Redis implementations
//! - **Presentation Layer**: Minimal HTTP surface and middleware
//!
//! ## Module Structure
//!
//! ```text
//! chat_core/
//! +-- config/         Configuration management
//! +-- domain/         Domain entities, value objects, events and traits
//! +-- application/    Application services and DTOs
//! +-- infrastructure/ Database, KV, pub/sub, streams and metrics
//! +-- presentation/   HTTP routes and middleware
//! +-- shared/         Common utilities (errors, clock, IDs, drains)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Business services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP handlers and middleware
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and wiring
pub mod startup;

// Telemetry and observability
pub mod telemetry;
