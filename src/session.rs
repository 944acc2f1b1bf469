use std::collections::HashMap;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tower_cookies::Cookies;

use crate::{
    config::CookieConfig,
    error::{Error, Result},
    id::SessionId,
    manager::SessionManager,
    store::SessionRecord,
};

/// Where a [`Session`] is in its request-long lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Newly created; nothing has been persisted yet.
    Fresh,
    /// Hydrated from the store and untouched since.
    Loaded,
    /// Changed in memory, not yet saved.
    Mutated,
    /// Persisted and the cookie re-emitted.
    Saved,
    /// Purged from the store and the cookie cleared. Terminal.
    Destroyed,
}

/// The session attached to the current request.
///
/// Obtained from [`SessionManager::resolve`]. Owned by the request handler: values are changed in
/// memory and only reach the store and the client on [`Session::save`].
pub struct Session {
    record: SessionRecord,
    state: SessionState,
    // Set by `cycle_id` until a save or destroy has purged it.
    retired_id: Option<SessionId>,
    // Attributes of the cookie the client currently holds, or was last sent.
    issued: CookieConfig,
    persisted: bool,
    manager: SessionManager,
    cookies: Cookies,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.record.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn fresh(record: SessionRecord, manager: SessionManager, cookies: Cookies) -> Self {
        Self {
            issued: record.options.clone(),
            record,
            state: SessionState::Fresh,
            retired_id: None,
            persisted: false,
            manager,
            cookies,
        }
    }

    pub(crate) fn loaded(record: SessionRecord, manager: SessionManager, cookies: Cookies) -> Self {
        Self {
            issued: record.options.clone(),
            record,
            state: SessionState::Loaded,
            retired_id: None,
            persisted: true,
            manager,
            cookies,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.record.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether this session was created for this request rather than loaded from the store.
    pub fn is_new(&self) -> bool {
        !self.persisted
    }

    pub fn is_empty(&self) -> bool {
        self.record.values.is_empty()
    }

    pub fn options(&self) -> &CookieConfig {
        &self.record.options
    }

    /// Adjust the cookie attributes; they are validated and persisted on the next save.
    ///
    /// Renaming the cookie makes the next save clear the cookie under the previous name.
    pub fn options_mut(&mut self) -> Result<&mut CookieConfig> {
        self.touch()?;
        Ok(&mut self.record.options)
    }

    /// Deserialize the value stored under `key`.
    ///
    /// `Ok(None)` means the key is not present, which is distinct from a stored `null`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get_value(key)?
            .map(|value| {
                T::deserialize(value).map_err(|err| Error::Format(format!("value for {key:?}: {err}")))
            })
            .transpose()
    }

    pub fn get_value(&self, key: &str) -> Result<Option<&Value>> {
        self.ensure_alive()?;
        Ok(self.record.values.get(key))
    }

    pub fn values(&self) -> Result<&HashMap<String, Value>> {
        self.ensure_alive()?;
        Ok(&self.record.values)
    }

    /// Insert `value` under `key`, returning the previous value if there was one.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<Option<Value>> {
        let value = serde_json::to_value(value)?;
        self.touch()?;
        Ok(self.record.values.insert(key.into(), value))
    }

    pub fn remove(&mut self, key: &str) -> Result<Option<Value>> {
        self.touch()?;
        Ok(self.record.values.remove(key))
    }

    pub fn delete_all(&mut self) -> Result<()> {
        self.touch()?;
        self.record.values.clear();
        Ok(())
    }

    /// Move the session to a freshly generated id, keeping its values.
    ///
    /// The record under the old id is purged by the next [`Session::save`]. Call this after a
    /// privilege change (e.g. login) so a previously issued cookie cannot ride along.
    pub async fn cycle_id(&mut self) -> Result<()> {
        self.ensure_alive()?;
        let id = self.manager.generate_id().await?;
        let old = std::mem::replace(&mut self.record.id, id);
        if self.persisted && self.retired_id.is_none() {
            self.retired_id = Some(old);
        }
        self.state = SessionState::Mutated;
        Ok(())
    }

    /// Persist the session, then stamp the cookie on the response.
    ///
    /// The cookie is only emitted once the store has accepted the record, so a client never
    /// holds a token for a record that does not exist. If purging the id retired by
    /// [`Session::cycle_id`] fails, the purge is attempted again by the next save.
    pub async fn save(&mut self) -> Result<()> {
        self.ensure_alive()?;
        self.record.options.validate()?;
        self.record.generation = self.record.generation.wrapping_add(1);
        let value = self.manager.encode(&self.record)?;

        self.manager.persist(&self.record).await?;
        self.persisted = true;
        self.purge_retired().await?;

        if self.issued.name != self.record.options.name {
            self.cookies.remove(self.issued.removal_cookie());
        }
        self.cookies.add(self.record.options.build_cookie(value));
        self.issued = self.record.options.clone();
        self.state = SessionState::Saved;
        Ok(())
    }

    /// Purge the session from the store and tell the client to drop the cookie.
    ///
    /// Every later call on this session fails with [`Error::Destroyed`].
    pub async fn destroy(&mut self) -> Result<()> {
        self.ensure_alive()?;
        self.manager.purge(&self.record.id).await?;
        self.purge_retired().await?;

        if self.issued.name != self.record.options.name {
            self.cookies.remove(self.issued.removal_cookie());
        }
        self.cookies.remove(self.record.options.removal_cookie());
        self.record.values.clear();
        self.state = SessionState::Destroyed;
        Ok(())
    }

    async fn purge_retired(&mut self) -> Result<()> {
        if let Some(retired) = &self.retired_id {
            self.manager.purge(retired).await?;
        }
        self.retired_id = None;
        Ok(())
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.state == SessionState::Destroyed {
            return Err(Error::Destroyed);
        }
        Ok(())
    }

    fn touch(&mut self) -> Result<()> {
        self.ensure_alive()?;
        self.state = SessionState::Mutated;
        Ok(())
    }
}
