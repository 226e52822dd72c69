#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::path::PathBuf;

use guildhall_server::{build_router, init_tracing, AppConfig};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let defaults = AppConfig::default();
    let database_url = std::env::var("GUILDHALL_DATABASE_URL").ok();
    if database_url.is_none() {
        tracing::warn!(
            "GUILDHALL_DATABASE_URL is not set; records live in process memory only"
        );
    }
    let identity_key_base64 = std::env::var("GUILDHALL_IDENTITY_KEY").ok();
    if identity_key_base64.is_none() {
        tracing::warn!(
            "GUILDHALL_IDENTITY_KEY is not set; a random per-process key will reject externally minted tokens"
        );
    }
    let max_image_bytes = std::env::var("GUILDHALL_MAX_IMAGE_BYTES").map_or_else(
        |_| Ok(defaults.max_image_bytes),
        |value| {
            value.parse::<usize>().map_err(|e| {
                anyhow::anyhow!("invalid GUILDHALL_MAX_IMAGE_BYTES value {value:?}: {e}")
            })
        },
    )?;
    let allowed_origins = std::env::var("GUILDHALL_ALLOWED_ORIGINS").map_or_else(
        |_| defaults.allowed_origins.clone(),
        |value| {
            value
                .split(',')
                .map(|origin| origin.trim().to_owned())
                .filter(|origin| !origin.is_empty())
                .collect()
        },
    );

    let app_config = AppConfig {
        image_root: std::env::var("GUILDHALL_IMAGE_ROOT")
            .map_or_else(|_| PathBuf::from("./data/images"), PathBuf::from),
        public_base_url: std::env::var("GUILDHALL_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| defaults.public_base_url.clone()),
        identity_key_base64,
        allowed_origins,
        max_image_bytes,
        database_url,
        ..defaults
    };

    let app = build_router(&app_config)?;
    let addr = std::env::var("GUILDHALL_BIND_ADDR")
        .unwrap_or_else(|_| String::from("0.0.0.0:3000"))
        .parse::<SocketAddr>()
        .map_err(|e| anyhow::anyhow!("invalid GUILDHALL_BIND_ADDR: {e}"))?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "guildhall-server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
