#![allow(dead_code)]

// Shared helpers for integration tests.
//
// These helpers intentionally use `tower_cookies::Cookie` parsing/encoding to match what the
// middleware emits in `Set-Cookie` and what browsers send back in `Cookie`.
use std::{
    convert::Infallible,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::body::Body;
use http::{HeaderMap, Request, Response, header};
use http_body_util::BodyExt as _;
use tower_cookies::{Cookie, Cookies};
use tower_sessions_sealed::{
    Crypter, Error, Key, MemoryStore, Result, SessionConfig, SessionId, SessionManager,
    SessionManagerLayer, SessionRecord, SessionStore,
};

pub async fn body_string(body: Body) -> String {
    // Collect an Axum body into a UTF-8 string for assertions.
    let bytes = body
        .collect()
        .await
        .expect("body collects successfully")
        .to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn parts(req: &Request<Body>) -> (SessionManager, Cookies) {
    let manager = req
        .extensions()
        .get::<SessionManager>()
        .cloned()
        .expect("request includes SessionManager extension");
    let cookies = req
        .extensions()
        .get::<Cookies>()
        .cloned()
        .expect("request includes Cookies extension");
    (manager, cookies)
}

pub async fn handler(req: Request<Body>) -> std::result::Result<Response<Body>, Infallible> {
    // Basic handler used by many tests: bump a counter, save, and echo the previous value.
    let (manager, cookies) = parts(&req);
    let mut session = manager
        .resolve(&cookies)
        .await
        .expect("resolve succeeds");
    let count: u64 = session
        .get("count")
        .expect("session get succeeds")
        .unwrap_or(0);
    session
        .set("count", count + 1)
        .expect("session set succeeds");
    session.save().await.expect("session save succeeds");

    Ok(Response::new(Body::from(count.to_string())))
}

pub async fn noop_handler(req: Request<Body>) -> std::result::Result<Response<Body>, Infallible> {
    // Handler that resolves the session but never saves it.
    let (manager, cookies) = parts(&req);
    let session = manager
        .resolve(&cookies)
        .await
        .expect("resolve succeeds");
    Ok(Response::new(Body::from(session.id().to_string())))
}

pub fn make_layer(config: SessionConfig) -> (Key, MemoryStore, SessionManagerLayer) {
    // Create a GCM session layer over a fresh memory store and return the key and store for tests
    // that need to inspect cookie values or stored records.
    let key = Key::generate();
    let store = MemoryStore::new();
    let crypter = Crypter::gcm(&key).expect("gcm crypter builds");
    let layer = SessionManagerLayer::with_store(store.clone(), crypter, config)
        .expect("session config is valid");
    (key, store, layer)
}

pub fn get_session_cookie(res: &Response<Body>) -> Cookie<'static> {
    // Convenience: parse the session cookie from a response.
    get_session_cookie_from_headers(res.headers())
}

pub fn get_session_cookie_from_headers(headers: &HeaderMap) -> Cookie<'static> {
    // Parse the `Set-Cookie` header into a `Cookie` structure.
    let set_cookie = headers
        .get(header::SET_COOKIE)
        .expect("response includes set-cookie header");
    let set_cookie = set_cookie
        .to_str()
        .expect("set-cookie header is valid utf-8");
    Cookie::parse_encoded(set_cookie)
        .expect("set-cookie parses successfully")
        .into_owned()
}

pub fn get_all_cookies(headers: &HeaderMap) -> Vec<Cookie<'static>> {
    // Parse every `Set-Cookie` header, for responses that touch more than one cookie.
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| {
            let value = value.to_str().expect("set-cookie header is valid utf-8");
            Cookie::parse_encoded(value)
                .expect("set-cookie parses successfully")
                .into_owned()
        })
        .collect()
}

pub fn cookie_header_value(cookie: &Cookie<'_>) -> String {
    // Encode a cookie for use in a `Cookie` request header.
    cookie.encoded().to_string()
}

pub fn request_with_cookie(uri: &str, cookie: &Cookie<'_>) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, cookie_header_value(cookie))
        .body(Body::empty())
        .expect("request builds successfully")
}

pub fn request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request builds successfully")
}

/// Wraps a [`MemoryStore`] and counts calls, optionally stalling or failing them.
#[derive(Debug, Clone, Default)]
pub struct InstrumentedStore {
    pub inner: MemoryStore,
    pub gets: Arc<AtomicUsize>,
    pub sets: Arc<AtomicUsize>,
    pub purges: Arc<AtomicUsize>,
    pub delay: Option<Duration>,
    pub unavailable: bool,
}

impl InstrumentedStore {
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn purges(&self) -> usize {
        self.purges.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable {
            return Err(Error::StoreUnavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for InstrumentedStore {
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        self.inner.get(id).await
    }

    async fn set(&self, record: &SessionRecord) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        self.inner.set(record).await
    }

    async fn purge(&self, id: &SessionId) -> Result<()> {
        self.purges.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        self.inner.purge(id).await
    }
}
