use std::{collections::HashMap, fmt::Debug};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{config::CookieConfig, error::Result, id::SessionId};

/// A session as the store sees it: id, values and the cookie attributes it was created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    /// Bumped on every save. A payload cookie is only honoured while its generation matches.
    #[serde(default)]
    pub generation: u64,
    pub values: HashMap<String, Value>,
    pub options: CookieConfig,
}

impl SessionRecord {
    pub fn new(id: SessionId, options: CookieConfig) -> Self {
        Self {
            id,
            generation: 0,
            values: HashMap::new(),
            options,
        }
    }
}

/// Persistence for session records.
///
/// Implementations must:
///
/// - return from [`get`](SessionStore::get) exactly the `generation`, `values` and `options`
///   last passed to [`set`](SessionStore::set) for that id;
/// - apply [`set`](SessionStore::set) as an atomic upsert per id (last write wins, never a mix of
///   two writes);
/// - report a missing record as `Ok(None)` and connectivity problems as
///   [`Error::StoreUnavailable`](crate::Error::StoreUnavailable).
///
/// Deadlines and retries are enforced by the [`SessionManager`](crate::SessionManager) around
/// every call.
#[async_trait]
pub trait SessionStore: Debug + Send + Sync + 'static {
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>>;

    async fn set(&self, record: &SessionRecord) -> Result<()>;

    /// Removing an id that does not exist is not an error.
    async fn purge(&self, id: &SessionId) -> Result<()>;
}
