//! Application cookies sealed with the session [`Crypter`].
//!
//! The session cookie is not the only value worth protecting: [`SealedCookies`] encrypts and
//! authenticates the value of any cookie the application sets, while leaving its attributes
//! (path, expiry, flags) as given.

use tower_cookies::{Cookie, Cookies};

use crate::{crypter::Crypter, error::Result};

/// A view of the request's cookie jar whose values are sealed with a [`Crypter`].
///
/// Cloning is cheap; every clone writes to the same jar.
#[derive(Clone)]
pub struct SealedCookies {
    cookies: Cookies,
    crypter: Crypter,
}

impl std::fmt::Debug for SealedCookies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedCookies")
            .field("crypter", &self.crypter)
            .finish_non_exhaustive()
    }
}

impl SealedCookies {
    pub fn new(cookies: Cookies, crypter: Crypter) -> Self {
        Self { cookies, crypter }
    }

    /// Seal the value of `cookie` and add it to the response.
    pub fn add(&self, mut cookie: Cookie<'static>) -> Result<()> {
        let sealed = self.crypter.encrypt(cookie.value())?;
        cookie.set_value(sealed);
        self.cookies.add(cookie);
        Ok(())
    }

    /// The cookie named `name` with its value opened.
    ///
    /// `Ok(None)` when the request carries no such cookie. A value that does not open under the
    /// configured key fails with [`Error::AuthenticationFailed`](crate::Error::AuthenticationFailed).
    pub fn get(&self, name: &str) -> Result<Option<Cookie<'static>>> {
        let Some(cookie) = self.cookies.get(name) else {
            return Ok(None);
        };
        let mut cookie = cookie.into_owned();
        let opened = self.crypter.decrypt(cookie.value()).inspect_err(|_| {
            tracing::debug!(name, "sealed cookie failed to open");
        })?;
        cookie.set_value(opened);
        Ok(Some(cookie))
    }

    /// Tell the client to drop `cookie`. Path and domain must match the ones it was added with.
    pub fn remove(&self, cookie: Cookie<'static>) {
        self.cookies.remove(cookie);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Key};

    fn sealed() -> (SealedCookies, Cookies) {
        let cookies = Cookies::default();
        let crypter = Crypter::ctr_hmac(&Key::generate()).expect("ctr crypter builds");
        (SealedCookies::new(cookies.clone(), crypter), cookies)
    }

    #[test]
    fn value_is_sealed_and_attributes_kept() {
        let (sealed, cookies) = sealed();
        let cookie = Cookie::build(("hello", "123")).path("/").secure(false).build();
        sealed.add(cookie).expect("add succeeds");

        let raw = cookies.get("hello").expect("cookie is set");
        assert_ne!(raw.value(), "123");
        assert_eq!(raw.path(), Some("/"));

        let opened = sealed.get("hello").expect("opens").expect("cookie is present");
        assert_eq!(opened.value(), "123");
    }

    #[test]
    fn missing_cookie_is_none() {
        let (sealed, _) = sealed();
        assert!(sealed.get("hello").expect("no error").is_none());
    }

    #[test]
    fn plain_or_foreign_values_do_not_open() {
        let (sealed, cookies) = sealed();
        cookies.add(Cookie::new("hello", "123"));
        assert!(matches!(sealed.get("hello"), Err(Error::AuthenticationFailed)));

        let (other, _) = self::sealed();
        let foreign = Cookies::default();
        SealedCookies::new(foreign.clone(), other.crypter.clone())
            .add(Cookie::new("hello", "123"))
            .expect("add succeeds");
        let token = foreign.get("hello").expect("cookie is set").value().to_owned();
        cookies.add(Cookie::new("hello", token));
        assert!(matches!(sealed.get("hello"), Err(Error::AuthenticationFailed)));
    }

    #[test]
    fn remove_drops_the_cookie() {
        let (sealed, cookies) = sealed();
        sealed.add(Cookie::new("hello", "123")).expect("add succeeds");
        sealed.remove(Cookie::new("hello", ""));
        assert!(cookies.get("hello").is_none());
    }
}
