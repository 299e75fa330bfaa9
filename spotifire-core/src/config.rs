//! Session configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default name of the per-session dispatch thread.
pub const DEFAULT_DISPATCH_THREAD_NAME: &str = "spotifire-dispatch";

/// Tunables for a [`Session`](crate::Session).
///
/// Every field has a default, so `{}` is a valid configuration:
///
/// ```json
/// {
///   "dispatch_thread_name": "spotifire-dispatch",
///   "drain_on_close": true,
///   "catch_handler_panics": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name given to the dispatch thread.
    pub dispatch_thread_name: String,
    /// Deliver events still queued when the session closes.
    /// When false they are dropped.
    pub drain_on_close: bool,
    /// Contain panicking handlers so the queue keeps running.
    pub catch_handler_panics: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dispatch_thread_name: DEFAULT_DISPATCH_THREAD_NAME.to_string(),
            drain_on_close: true,
            catch_handler_panics: true,
        }
    }
}

impl SessionConfig {
    /// Parse a JSON configuration, filling in defaults for missing fields.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
