//! # Configuration
//!
//! Typed settings for the server, the stores and every tunable of the core:
//! invitation lifetime, event stream consumption, presence TTL and fanout
//! timeout, the three HTTP rate limit tags and the maintenance workers.
//!
//! Sources, lowest priority first: built-in defaults, `config/default.toml`,
//! `config/{RUN_ENV}.toml`, `APP__`-prefixed environment variables (plus a
//! few bare ones such as `DATABASE_URL`). A `.env` file is read first.
//!
//! ```rust,ignore
//! use chat_core::config::Settings;
//!
//! let settings = Settings::load()?;
//! let ttl = settings.presence.ttl();
//! ```

mod settings;

pub use settings::*;
