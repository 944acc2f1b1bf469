use std::{future::Future, sync::Arc};

use tower_cookies::Cookies;

use crate::{
    config::{CookieConfig, SessionConfig},
    crypter::Crypter,
    error::{Error, Result},
    format::{self, CookieValue},
    id::SessionId,
    sealed::SealedCookies,
    session::Session,
    store::{SessionRecord, SessionStore},
};

/// Resolves request cookies into [`Session`]s and coordinates them with the store.
///
/// Built once at startup and shared by every request; cloning is cheap.
#[derive(Debug, Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    store: Box<dyn SessionStore>,
    crypter: Crypter,
    config: SessionConfig,
}

impl SessionManager {
    /// Fails with [`Error::ConfigInvalid`] if `config` does not validate.
    pub fn new<S: SessionStore>(store: S, crypter: Crypter, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                store: Box::new(store),
                crypter,
                config,
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn crypter(&self) -> &Crypter {
        &self.inner.crypter
    }

    /// Resolve the session for this request using the configured cookie attributes.
    pub async fn resolve(&self, cookies: &Cookies) -> Result<Session> {
        self.resolve_with(cookies, self.inner.config.cookie.clone())
            .await
    }

    /// Resolve the session for this request.
    ///
    /// A missing, undecodable or stale cookie yields a new session carrying `options` (unless
    /// strict mode is on). A loaded session keeps the options it was saved with.
    ///
    /// In [`TokenMode::Payload`](crate::TokenMode::Payload) the store stays authoritative: a
    /// cookie from an earlier save of the same session is treated as stale.
    pub async fn resolve_with(&self, cookies: &Cookies, options: CookieConfig) -> Result<Session> {
        options.validate()?;

        let Some(cookie) = cookies.get(&options.name) else {
            return self.fresh(cookies, options).await;
        };

        let decoded = match format::decode(&self.inner.crypter, self.inner.config.mode, cookie.value()) {
            Ok(decoded) => decoded,
            Err(err) if err.is_client_fault() => {
                if self.inner.config.strict {
                    return Err(Error::AuthenticationFailed);
                }
                tracing::warn!(err = %err, "session cookie rejected, starting a new session");
                return self.fresh(cookies, options).await;
            }
            Err(err) => return Err(err),
        };

        let Some(mut record) = self.load(decoded.id()).await? else {
            if self.inner.config.strict {
                return Err(Error::NotFound);
            }
            tracing::debug!("session cookie names an unknown id, starting a new session");
            return self.fresh(cookies, options).await;
        };

        if let CookieValue::Payload {
            generation, values, ..
        } = decoded
        {
            if generation != record.generation {
                if self.inner.config.strict {
                    return Err(Error::AuthenticationFailed);
                }
                tracing::warn!(
                    presented = generation,
                    stored = record.generation,
                    "session cookie predates the stored session, starting a new session"
                );
                return self.fresh(cookies, options).await;
            }
            record.values = values;
        }
        Ok(Session::loaded(record, self.clone(), cookies.clone()))
    }

    /// Application cookies on this request, sealed with the session crypter.
    pub fn sealed_cookies(&self, cookies: &Cookies) -> SealedCookies {
        SealedCookies::new(cookies.clone(), self.inner.crypter.clone())
    }

    /// Draw a random id that no stored record uses yet.
    ///
    /// Each candidate is probed with a store lookup; a collision draws again, up to the
    /// configured number of attempts. A store failure during the probe is returned as is.
    pub async fn generate_id(&self) -> Result<SessionId> {
        let attempts = self.inner.config.id_attempts;
        for _ in 0..attempts {
            let id = SessionId::random();
            if self.load(&id).await?.is_none() {
                return Ok(id);
            }
            tracing::warn!("generated session id collides with a stored session, drawing again");
        }
        tracing::error!(attempts, "could not generate an unused session id");
        Err(Error::IdSpaceExhausted(attempts))
    }

    async fn fresh(&self, cookies: &Cookies, options: CookieConfig) -> Result<Session> {
        let id = self.generate_id().await?;
        Ok(Session::fresh(
            SessionRecord::new(id, options),
            self.clone(),
            cookies.clone(),
        ))
    }

    pub(crate) fn encode(&self, record: &SessionRecord) -> Result<String> {
        let value = format::encode(&self.inner.crypter, self.inner.config.mode, record)?;
        let max = self.inner.config.max_cookie_bytes;
        if value.len() > max {
            return Err(Error::CookieTooLarge {
                size: value.len(),
                max,
            });
        }
        Ok(value)
    }

    pub(crate) async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        let store = &self.inner.store;
        self.call_store("get", || store.get(id)).await
    }

    pub(crate) async fn persist(&self, record: &SessionRecord) -> Result<()> {
        let store = &self.inner.store;
        self.call_store("set", || store.set(record)).await
    }

    pub(crate) async fn purge(&self, id: &SessionId) -> Result<()> {
        let store = &self.inner.store;
        self.call_store("purge", || store.purge(id)).await
    }

    // Every store call gets its own deadline. Unavailable and timed-out calls are retried with
    // exponential backoff, anything else is returned immediately.
    async fn call_store<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = &self.inner.config.store;
        let mut attempt = 0;
        loop {
            let outcome = match tokio::time::timeout(policy.timeout, call()).await {
                Ok(outcome) => outcome,
                Err(_elapsed) => Err(Error::Timeout(policy.timeout)),
            };
            match outcome {
                Err(err) if err.is_retryable() && attempt < policy.retries => {
                    let delay = policy.delay(attempt);
                    tracing::warn!(err = %err, op, attempt, ?delay, "session store call failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        tracing::error!(err = %err, op, "session store call failed");
                    }
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            }
        }
    }
}
