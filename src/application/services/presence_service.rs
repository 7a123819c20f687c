//! Presence Tracker
//!
//! Ephemeral `user -> location` records with a fixed TTL. A ping replaces
//! the record and restarts its TTL; nothing else extends it, so a user that
//! stays silent for longer than the TTL is offline.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::domain::{Location, LocationFilter};
use crate::infrastructure::cache::{keys, KvStore};
use crate::shared::error::AppError;

/// Default lifetime of a presence record
pub const PRESENCE_TTL: Duration = Duration::from_secs(60);

/// TTL-keyed presence over the KV store.
#[derive(Clone)]
pub struct PresenceTracker {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl PresenceTracker {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// Record that `userid` is at `raw_location`.
    ///
    /// Locations other than `dm` and `gdm` are ignored; the parsed location
    /// is returned when a record was written.
    #[instrument(skip(self), level = "debug")]
    pub async fn set_presence(
        &self,
        userid: &str,
        raw_location: &str,
    ) -> Result<Option<Location>, AppError> {
        let location = match raw_location.parse::<Location>() {
            Ok(location) => location,
            Err(_) => {
                debug!(userid, raw_location, "Ignoring presence ping with invalid location");
                return Ok(None);
            }
        };

        self.kv
            .set_ex(&keys::presence(userid), location.as_str(), self.ttl)
            .await?;

        Ok(Some(location))
    }

    /// The subset of `candidates` currently present at a location matching
    /// `filter`, in candidate order. Offline users are simply absent.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()), level = "debug")]
    pub async fn get_presence(
        &self,
        filter: &LocationFilter,
        candidates: &[String],
    ) -> Result<Vec<String>, AppError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = candidates.iter().map(keys::presence).collect();
        let values = self.kv.get_many(&keys).await?;

        Ok(candidates
            .iter()
            .zip(values)
            .filter_map(|(userid, value)| match value {
                Some(stored) if filter.matches(&stored) => Some(userid.clone()),
                _ => None,
            })
            .collect())
    }

    /// Drop the record, e.g. when the connection closes.
    pub async fn clear_presence(&self, userid: &str) -> Result<(), AppError> {
        self.kv.delete(&keys::presence(userid)).await?;
        Ok(())
    }
}
