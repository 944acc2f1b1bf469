use std::net::SocketAddr;

use axum::{Router, http::StatusCode, routing::get};
use time::Duration;
use tower_sessions_sealed::{
    CookieConfig, Crypter, Key, MemoryStore, SameSite, Session, SessionConfig,
    SessionManagerLayer, TokenMode,
};
use tracing_subscriber::EnvFilter;

async fn index(mut session: Session) -> Result<String, StatusCode> {
    let n: usize = session
        .get("n")
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .unwrap_or(0);
    session
        .set("n", n + 1)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    session
        .save()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(format!("n={n}"))
}

async fn login(mut session: Session) -> Result<&'static str, StatusCode> {
    session
        .cycle_id()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    session
        .set("user", "demo")
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    session
        .save()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok("logged in")
}

async fn logout(mut session: Session) -> Result<&'static str, StatusCode> {
    session
        .destroy()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok("logged out")
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_sessions_sealed=debug")),
        )
        .init();

    let key = Key::generate();
    let cookie = CookieConfig::default()
        // Default: "id"
        .with_name("id")
        // Default: true
        .with_http_only(true)
        // Default: SameSite::Strict
        .with_same_site(SameSite::Strict)
        // Default: no expiry (browser-session cookie)
        .with_max_age(Duration::hours(1))
        // Default: true (set to false for local HTTP development)
        .with_secure(false)
        // Default: "/"
        .with_path("/")
        // Default: None
        .without_domain();
    let config = SessionConfig::default()
        .with_cookie(cookie)
        // Default: TokenMode::Id
        .with_mode(TokenMode::Id)
        // Default: false
        .with_strict(false)
        // Default: 4096
        .with_max_cookie_bytes(4096);

    let crypter = Crypter::gcm(&key).expect("crypter builds from a generated key");
    let store = MemoryStore::encrypted(
        Crypter::ctr_hmac(&key).expect("crypter builds from a generated key"),
    );
    let session_layer =
        SessionManagerLayer::with_store(store, crypter, config).expect("session config is valid");

    let app = Router::new()
        .route("/", get(index))
        .route("/login", get(login))
        .route("/logout", get(logout))
        .layer(session_layer);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("tcp listener binds successfully");
    let local_addr = listener.local_addr().expect("local address is available");
    tracing::info!(%local_addr, "listening");

    axum::serve(listener, app)
        .await
        .expect("server runs successfully");
}
