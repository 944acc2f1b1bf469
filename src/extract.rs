use axum_core::extract::FromRequestParts;
use http::{StatusCode, request::Parts};
use tower_cookies::Cookies;

use crate::{Error, SealedCookies, Session, SessionManager};

fn layer_parts(parts: &Parts) -> Result<(SessionManager, Cookies), (StatusCode, &'static str)> {
    let manager = parts.extensions.get::<SessionManager>().cloned().ok_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        "Can't extract session. Is `SessionManagerLayer` enabled?",
    ))?;
    let cookies = parts.extensions.get::<Cookies>().cloned().ok_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        "Can't extract cookies. Is `SessionManagerLayer` enabled?",
    ))?;
    Ok((manager, cookies))
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let (manager, cookies) = layer_parts(parts)?;

        manager.resolve(&cookies).await.map_err(|err| {
            tracing::error!(err = %err, "failed to resolve session");
            rejection(&err)
        })
    }
}

impl<S> FromRequestParts<S> for SealedCookies
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let (manager, cookies) = layer_parts(parts)?;
        Ok(manager.sealed_cookies(&cookies))
    }
}

fn rejection(err: &Error) -> (StatusCode, &'static str) {
    match err {
        Error::AuthenticationFailed | Error::NotFound => {
            (StatusCode::UNAUTHORIZED, "Invalid session")
        }
        Error::StoreUnavailable(_) | Error::Timeout(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Session store is unavailable",
        ),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Failed to resolve session"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn rejection_statuses() {
        assert_eq!(rejection(&Error::AuthenticationFailed).0, StatusCode::UNAUTHORIZED);
        assert_eq!(rejection(&Error::NotFound).0, StatusCode::UNAUTHORIZED);
        assert_eq!(
            rejection(&Error::Timeout(Duration::from_secs(1))).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            rejection(&Error::ConfigInvalid("name")).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            rejection(&Error::Format("stored values failed to decrypt".into())).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
