use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::anyhow;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use guildhall_core::{ChannelKind, MemberRole};
use object_store::local::LocalFileSystem;
use pasetors::{keys::SymmetricKey, version4::V4};
use rand::rand_core::{Rng, UnwrapErr};
use rand::rngs::SysRng;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::{OnceCell, RwLock};

pub const DEFAULT_JSON_BODY_LIMIT_BYTES: usize = 1_048_576;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RATE_LIMIT_REQUESTS_PER_MINUTE: u32 = 60;
// One file per mutation, capped at the limit the original deployment used.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10_000_000;
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    pub rate_limit_requests_per_minute: u32,
    pub max_image_bytes: usize,
    pub image_root: PathBuf,
    pub public_base_url: String,
    pub allowed_origins: Vec<String>,
    pub identity_key_base64: Option<String>,
    pub database_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_JSON_BODY_LIMIT_BYTES,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            rate_limit_requests_per_minute: DEFAULT_RATE_LIMIT_REQUESTS_PER_MINUTE,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            image_root: PathBuf::from("./data/images"),
            public_base_url: String::from(DEFAULT_PUBLIC_BASE_URL),
            allowed_origins: vec![
                String::from("http://127.0.0.1:5173"),
                String::from("http://localhost:5173"),
            ],
            identity_key_base64: None,
            database_url: None,
        }
    }
}

#[derive(Clone)]
pub(crate) struct RuntimeLimits {
    pub(crate) max_image_bytes: usize,
    pub(crate) public_base_url: String,
}

/// Shared application state. With a database URL configured all reads and
/// writes go to Postgres; without one the nested in-memory maps are the
/// store, which is also what the test suite runs against.
#[derive(Clone)]
pub struct AppState {
    pub(crate) db_pool: Option<PgPool>,
    pub(crate) db_init: Arc<OnceCell<()>>,
    pub(crate) profiles: Arc<RwLock<HashMap<String, ProfileRecord>>>,
    pub(crate) profile_ids_by_email: Arc<RwLock<HashMap<String, String>>>,
    pub(crate) servers: Arc<RwLock<HashMap<String, ServerRecord>>>,
    pub(crate) identity_key: Arc<SymmetricKey<V4>>,
    pub(crate) image_store: Arc<LocalFileSystem>,
    pub(crate) runtime: Arc<RuntimeLimits>,
}

impl AppState {
    pub(crate) fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let identity_key = match &config.identity_key_base64 {
            Some(encoded) => {
                let key_bytes = STANDARD
                    .decode(encoded)
                    .map_err(|e| anyhow!("identity key decode failed: {e}"))?;
                SymmetricKey::<V4>::from(&key_bytes)
                    .map_err(|e| anyhow!("identity key init failed: {e}"))?
            }
            None => {
                let mut key_bytes = [0_u8; 32];
                UnwrapErr(SysRng).fill_bytes(&mut key_bytes);
                SymmetricKey::<V4>::from(&key_bytes)
                    .map_err(|e| anyhow!("identity key init failed: {e}"))?
            }
        };

        let db_pool = if let Some(database_url) = &config.database_url {
            Some(
                PgPoolOptions::new()
                    .max_connections(10)
                    .connect_lazy(database_url)
                    .map_err(|e| anyhow!("postgres pool init failed: {e}"))?,
            )
        } else {
            None
        };

        std::fs::create_dir_all(&config.image_root)
            .map_err(|e| anyhow!("image root init failed: {e}"))?;
        let image_store = LocalFileSystem::new_with_prefix(&config.image_root)
            .map_err(|e| anyhow!("image store init failed: {e}"))?;

        Ok(Self {
            db_pool,
            db_init: Arc::new(OnceCell::new()),
            profiles: Arc::new(RwLock::new(HashMap::new())),
            profile_ids_by_email: Arc::new(RwLock::new(HashMap::new())),
            servers: Arc::new(RwLock::new(HashMap::new())),
            identity_key: Arc::new(identity_key),
            image_store: Arc::new(image_store),
            runtime: Arc::new(RuntimeLimits {
                max_image_bytes: config.max_image_bytes,
                public_base_url: config.public_base_url.trim_end_matches('/').to_owned(),
            }),
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ProfileRecord {
    pub(crate) profile_id: String,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) image_url: Option<String>,
    pub(crate) created_at_unix: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct ServerRecord {
    pub(crate) name: String,
    pub(crate) image_url: String,
    pub(crate) invite_code: String,
    pub(crate) created_by_profile_id: String,
    pub(crate) created_at_unix: i64,
    pub(crate) channels: HashMap<String, ChannelRecord>,
    pub(crate) members: HashMap<String, MemberRecord>,
}

#[derive(Debug, Clone)]
pub(crate) struct ChannelRecord {
    pub(crate) channel_id: String,
    pub(crate) name: String,
    pub(crate) kind: ChannelKind,
    pub(crate) created_by_profile_id: String,
    pub(crate) created_at_unix: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct MemberRecord {
    pub(crate) member_id: String,
    pub(crate) profile_id: String,
    pub(crate) role: MemberRole,
    pub(crate) created_at_unix: i64,
}
