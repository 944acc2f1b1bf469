use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tower_cookies::{Cookie, cookie};

use crate::error::{Error, Result};

pub const DEFAULT_COOKIE_NAME: &str = "id";

/// Upper bound on a relative cookie lifetime; browsers cap `Max-Age` at 400 days.
pub const MAX_COOKIE_LIFETIME: Duration = Duration::days(400);

/// When the session cookie expires on the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expiry {
    /// No `Max-Age` or `Expires`: the browser drops the cookie when it closes.
    #[default]
    OnSessionEnd,
    /// `Max-Age` of this many seconds, counted from each save. Zero or negative expires the
    /// cookie immediately.
    OnInactivity(#[serde(with = "seconds")] Duration),
    /// A fixed point in time, emitted as-is in `Expires`.
    AtDateTime(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
}

/// The `SameSite` attribute of the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl From<SameSite> for cookie::SameSite {
    fn from(value: SameSite) -> Self {
        match value {
            SameSite::Strict => cookie::SameSite::Strict,
            SameSite::Lax => cookie::SameSite::Lax,
            SameSite::None => cookie::SameSite::None,
        }
    }
}

/// Attributes of the session cookie.
///
/// Persisted next to each session so a reloaded session re-emits the cookie exactly as it was
/// first configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    pub(crate) name: Cow<'static, str>,
    pub(crate) expiry: Expiry,
    pub(crate) secure: bool,
    pub(crate) http_only: bool,
    pub(crate) same_site: SameSite,
    pub(crate) path: Cow<'static, str>,
    pub(crate) domain: Option<Cow<'static, str>>,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.into(),
            expiry: Expiry::OnSessionEnd,
            secure: true,
            http_only: true,
            same_site: SameSite::Strict,
            path: "/".into(),
            domain: None,
        }
    }
}

impl CookieConfig {
    #[must_use]
    pub fn with_name<N: Into<Cow<'static, str>>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: Expiry) -> Self {
        self.expiry = expiry;
        self
    }

    /// Shorthand for [`Expiry::OnInactivity`].
    #[must_use]
    pub fn with_max_age(self, max_age: Duration) -> Self {
        self.with_expiry(Expiry::OnInactivity(max_age))
    }

    /// Shorthand for [`Expiry::AtDateTime`].
    #[must_use]
    pub fn with_expires(self, expires: OffsetDateTime) -> Self {
        self.with_expiry(Expiry::AtDateTime(expires))
    }

    /// Makes the cookie last until the browser session ends.
    #[must_use]
    pub fn without_expiry(self) -> Self {
        self.with_expiry(Expiry::OnSessionEnd)
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    #[must_use]
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    #[must_use]
    pub fn with_path<P: Into<Cow<'static, str>>>(mut self, path: P) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn with_domain<D: Into<Cow<'static, str>>>(mut self, domain: D) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn without_domain(mut self) -> Self {
        self.domain = None;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expiry(&self) -> Expiry {
        self.expiry
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn http_only(&self) -> bool {
        self.http_only
    }

    pub fn same_site(&self) -> SameSite {
        self.same_site
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::ConfigInvalid("cookie name must not be empty"));
        }
        if !self.name.bytes().all(is_token_byte) {
            return Err(Error::ConfigInvalid(
                "cookie name contains characters outside the RFC 6265 token set",
            ));
        }
        if !self.path.starts_with('/') {
            return Err(Error::ConfigInvalid("cookie path must start with '/'"));
        }
        if self.same_site == SameSite::None && !self.secure {
            return Err(Error::ConfigInvalid("SameSite=None requires a secure cookie"));
        }
        if let Expiry::OnInactivity(max_age) = self.expiry {
            if max_age > MAX_COOKIE_LIFETIME {
                return Err(Error::ConfigInvalid("cookie max_age must not exceed 400 days"));
            }
        }
        Ok(())
    }

    // Max-Age and Expires always agree: one is derived from the other at stamping time.
    pub(crate) fn build_cookie(&self, value: String) -> Cookie<'static> {
        let now = OffsetDateTime::now_utc();
        let mut cookie_builder = Cookie::build((self.name.clone(), value))
            .http_only(self.http_only)
            .same_site(self.same_site.into())
            .secure(self.secure)
            .path(self.path.clone());

        match self.expiry {
            Expiry::OnSessionEnd => {}
            Expiry::OnInactivity(max_age) if max_age <= Duration::ZERO => {
                cookie_builder = cookie_builder
                    .max_age(Duration::ZERO)
                    .expires(OffsetDateTime::UNIX_EPOCH);
            }
            Expiry::OnInactivity(max_age) => {
                cookie_builder = cookie_builder.max_age(max_age);
                if let Some(expires) = now.checked_add(max_age) {
                    cookie_builder = cookie_builder.expires(expires);
                }
            }
            Expiry::AtDateTime(expires) => {
                let max_age = std::cmp::max(expires - now, Duration::ZERO);
                cookie_builder = cookie_builder.max_age(max_age).expires(expires);
            }
        }

        if let Some(domain) = self.domain.clone() {
            cookie_builder = cookie_builder.domain(domain);
        }

        cookie_builder.build()
    }

    pub(crate) fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::new(self.name.clone(), "");
        cookie.set_path(self.path.clone());
        if let Some(domain) = self.domain.clone() {
            cookie.set_domain(domain);
        }
        cookie
    }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
}

/// What the encrypted cookie value carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenMode {
    /// Only the session id; values live in the store.
    #[default]
    Id,
    /// The id together with the session values, wrapped in a versioned envelope.
    Payload,
}

/// Deadline and retry policy applied to every store call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorePolicy {
    #[serde(with = "humantime_serde")]
    pub(crate) timeout: std::time::Duration,
    pub(crate) retries: u32,
    #[serde(with = "humantime_serde")]
    pub(crate) backoff: std::time::Duration,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self {
            timeout: std::time::Duration::from_secs(5),
            retries: 2,
            backoff: std::time::Duration::from_millis(50),
        }
    }
}

impl StorePolicy {
    /// Deadline for a single store call.
    #[must_use]
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How many times an unavailable or timed-out call is attempted again.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Delay before the first retry; doubled for each further attempt.
    #[must_use]
    pub fn with_backoff(mut self, backoff: std::time::Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub(crate) fn delay(&self, attempt: u32) -> std::time::Duration {
        self.backoff.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Configures a [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub(crate) cookie: CookieConfig,
    pub(crate) mode: TokenMode,
    pub(crate) strict: bool,
    pub(crate) max_cookie_bytes: usize,
    pub(crate) id_attempts: usize,
    pub(crate) store: StorePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie: CookieConfig::default(),
            mode: TokenMode::Id,
            strict: false,
            max_cookie_bytes: 4096,
            id_attempts: 8,
            store: StorePolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Cookie attributes given to sessions created by [`SessionManager::resolve`](crate::SessionManager::resolve).
    #[must_use]
    pub fn with_cookie(mut self, cookie: CookieConfig) -> Self {
        self.cookie = cookie;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: TokenMode) -> Self {
        self.mode = mode;
        self
    }

    /// Fail closed: reject undecodable cookies and unknown ids instead of starting a new session.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    #[must_use]
    pub fn with_max_cookie_bytes(mut self, max_cookie_bytes: usize) -> Self {
        self.max_cookie_bytes = max_cookie_bytes;
        self
    }

    /// Upper bound on ids drawn before [`Error::IdSpaceExhausted`] is returned.
    #[must_use]
    pub fn with_id_attempts(mut self, id_attempts: usize) -> Self {
        self.id_attempts = id_attempts;
        self
    }

    #[must_use]
    pub fn with_store_policy(mut self, store: StorePolicy) -> Self {
        self.store = store;
        self
    }

    pub fn cookie(&self) -> &CookieConfig {
        &self.cookie
    }

    pub fn mode(&self) -> TokenMode {
        self.mode
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    pub fn validate(&self) -> Result<()> {
        self.cookie.validate()?;
        if self.id_attempts == 0 {
            return Err(Error::ConfigInvalid("id_attempts must be at least 1"));
        }
        if self.store.timeout.is_zero() {
            return Err(Error::ConfigInvalid("store timeout must be non-zero"));
        }
        if self.max_cookie_bytes == 0 {
            return Err(Error::ConfigInvalid("max_cookie_bytes must be non-zero"));
        }
        Ok(())
    }
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(value.whole_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        i64::deserialize(d).map(Duration::seconds)
    }
}
