use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use http::{Request, Response};
use tower_cookies::CookieManager;
use tower_layer::Layer;
use tower_service::Service;

use crate::{
    config::SessionConfig,
    crypter::Crypter,
    error::Result,
    manager::SessionManager,
    store::SessionStore,
};

/// Installs a cookie jar and the shared [`SessionManager`] into every request.
///
/// Handlers take both out of the request extensions (or use the [`Session`](crate::Session)
/// extractor) and call [`SessionManager::resolve`] themselves; nothing is saved implicitly.
#[derive(Debug, Clone)]
pub struct SessionManagerLayer {
    manager: SessionManager,
}

impl SessionManagerLayer {
    pub fn new(manager: SessionManager) -> Self {
        Self { manager }
    }

    /// Shorthand for building the [`SessionManager`] and the layer in one go.
    pub fn with_store<S: SessionStore>(
        store: S,
        crypter: Crypter,
        config: SessionConfig,
    ) -> Result<Self> {
        SessionManager::new(store, crypter, config).map(Self::new)
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }
}

#[derive(Debug, Clone)]
pub struct SessionService<S> {
    inner: S,
    manager: SessionManager,
}

impl<S> Layer<S> for SessionManagerLayer {
    type Service = CookieManager<SessionService<S>>;

    fn layer(&self, inner: S) -> Self::Service {
        CookieManager::new(SessionService {
            inner,
            manager: self.manager.clone(),
        })
    }
}

impl<ReqBody, ResBody, S> Service<Request<ReqBody>> for SessionService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Default + Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let manager = self.manager.clone();

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if req.extensions().get::<tower_cookies::Cookies>().is_none() {
                tracing::error!("cookie jar missing from request extensions");
                let mut res = Response::default();
                *res.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
                return Ok(res);
            }

            req.extensions_mut().insert(manager);
            inner.call(req).await
        })
    }
}
