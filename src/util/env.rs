//! Process configuration read from the environment.
//!
//! Variables are loaded once (optionally seeded from a `.env` file) and deserialized into [`Env`]
//! through serde, so defaults and renames live on the struct rather than being scattered over
//! `std::env::var` calls.

use std::sync::LazyLock;

use serde::Deserialize;
use serde::de::value::{Error as ValueError, MapDeserializer};
use thiserror::Error;
use tokio::sync::OnceCell;

static ENV_VARS: LazyLock<OnceCell<Env>> = LazyLock::new(OnceCell::new);
pub async fn get_var(var: Var) -> EnvResult<&'static str> {
    let vars = ENV_VARS.get_or_try_init(|| async { Env::new() }).await?;
    Ok(match var {
        Var::DatabaseUrl if vars.database_url.is_empty() => {
            return Err(EnvErr::Missing("DATABASE_URL"));
        }
        Var::DatabaseUrl => &vars.database_url,
        Var::ServerApiPort => &vars.server_api_port,
        Var::PhotoStorageUrl => &vars.photo_storage_url,
        Var::PhotoBucket => &vars.photo_bucket,
        Var::SessionStorePath => &vars.session_store_path,
        Var::AuthProviderUrl => &vars.auth_provider_url,
        Var::AuthApiKey => &vars.auth_api_key,
        Var::AuthAccessToken => &vars.auth_access_token,
        Var::CorsAllowOrigins => &vars.cors_allow_origins,
        Var::LogFilter => &vars.log_filter,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Env {
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "default_port")]
    pub server_api_port: String,
    #[serde(default)]
    pub photo_storage_url: String,
    #[serde(default = "default_bucket")]
    pub photo_bucket: String,
    #[serde(default = "default_session_path")]
    pub session_store_path: String,
    #[serde(default)]
    pub auth_provider_url: String,
    #[serde(default)]
    pub auth_api_key: String,
    #[serde(default)]
    pub auth_access_token: String,
    #[serde(default)]
    pub cors_allow_origins: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Env {
    pub fn new() -> EnvResult<Self> {
        // a missing .env is fine; values may come from the real environment
        _ = dotenvy::dotenv();
        Self::from_vars(std::env::vars())
    }

    /// Builds the config from an explicit set of `(KEY, value)` pairs.
    ///
    /// Every field is a plain string: empty values are dropped before deserializing so that
    /// `FOO=` in a `.env` falls back to the default, and an empty string means "unset".
    pub fn from_vars<I>(vars: I) -> EnvResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let filtered = vars.into_iter().filter(|(_, v)| !v.trim().is_empty());
        let deserializer: MapDeserializer<'_, _, ValueError> = MapDeserializer::new(filtered);

        Ok(Env::deserialize(deserializer)?)
    }
}

#[inline]
fn default_port() -> String {
    String::from("3000")
}

#[inline]
fn default_bucket() -> String {
    String::from("user-photos")
}

#[inline]
fn default_session_path() -> String {
    String::from(".union-scoring/session.json")
}

#[inline]
fn default_log_filter() -> String {
    String::from("union_scoring=debug,tower_http=debug,axum=debug,sqlx=info,info")
}

#[derive(Debug)]
pub enum Var {
    DatabaseUrl,
    ServerApiPort,
    PhotoStorageUrl,
    PhotoBucket,
    SessionStorePath,
    AuthProviderUrl,
    AuthApiKey,
    AuthAccessToken,
    CorsAllowOrigins,
    LogFilter,
}

#[macro_export]
macro_rules! var {
    ($ev:expr) => {
        $crate::util::env::get_var($ev)
    };
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error("failed to deserialize environment: {0}")]
    Deserialize(#[from] ValueError),

    #[error("required environment variable '{0}' is not set")]
    Missing(&'static str),
}
