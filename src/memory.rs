//! An in-memory session store, geared towards testing and local development.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    crypter::Crypter,
    error::{Error, Result},
    id::SessionId,
    store::{SessionRecord, SessionStore},
};

/// The record shape kept by the store: `values` and `options` are serialized JSON, and `values`
/// is additionally encrypted when the store was built with a [`Crypter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub generation: u64,
    pub values: String,
    pub options: String,
}

/// An in-memory session store.
///
/// # Limitations
///
/// This store won't persist data between server restarts.
/// It also won't synchronize data between multiple server instances.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<SessionId, StoredRecord>>>,
    crypter: Option<Crypter>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("encrypted", &self.crypter.is_some())
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Creates a new (empty) store keeping session values as plain JSON.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new (empty) store that encrypts session values at rest.
    pub fn encrypted(crypter: Crypter) -> Self {
        Self {
            records: Arc::default(),
            crypter: Some(crypter),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// The raw stored shape of a record, as a backing database would hold it.
    pub async fn raw(&self, id: &SessionId) -> Option<StoredRecord> {
        self.records.lock().await.get(id).cloned()
    }

    fn encode(&self, record: &SessionRecord) -> Result<StoredRecord> {
        let values = serde_json::to_string(&record.values)?;
        let values = match &self.crypter {
            Some(crypter) => crypter.encrypt(&values)?,
            None => values,
        };
        Ok(StoredRecord {
            id: record.id.to_string(),
            generation: record.generation,
            values,
            options: serde_json::to_string(&record.options)?,
        })
    }

    fn decode(&self, stored: &StoredRecord) -> Result<SessionRecord> {
        // A record that no longer decrypts is a server-side problem (e.g. a rotated key), not a
        // forged cookie.
        let values = match &self.crypter {
            Some(crypter) => crypter.decrypt(&stored.values).map_err(|_| {
                Error::Format(format!("stored values of session {} failed to decrypt", stored.id))
            })?,
            None => stored.values.clone(),
        };
        Ok(SessionRecord {
            id: SessionId::parse(&stored.id)?,
            generation: stored.generation,
            values: serde_json::from_str(&values)
                .map_err(|err| Error::Format(format!("invalid values: {err}")))?,
            options: serde_json::from_str(&stored.options)
                .map_err(|err| Error::Format(format!("invalid options: {err}")))?,
        })
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    #[tracing::instrument(name = "Load session record", level = tracing::Level::TRACE, skip_all)]
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        let guard = self.records.lock().await;
        guard.get(id).map(|stored| self.decode(stored)).transpose()
    }

    #[tracing::instrument(name = "Upsert session record", level = tracing::Level::TRACE, skip_all)]
    async fn set(&self, record: &SessionRecord) -> Result<()> {
        let stored = self.encode(record)?;
        self.records.lock().await.insert(record.id.clone(), stored);
        Ok(())
    }

    #[tracing::instrument(name = "Purge session record", level = tracing::Level::TRACE, skip_all)]
    async fn purge(&self, id: &SessionId) -> Result<()> {
        self.records.lock().await.remove(id);
        Ok(())
    }
}
