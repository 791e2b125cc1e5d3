use std::sync::LazyLock;

use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::util::env;
use crate::util::env::Var;
use crate::var;

pub mod models;
pub mod repositories;

pub mod prelude {
    pub use crate::db::{StoreError, StoreResult, db_pool, run_migrations};

    pub use crate::db::models::connection::{
        ConnectionEvent, ConnectionFilter, ConnectionKey, EventOrder, NewConnectionEvent, UserId,
        UserType,
    };
    pub use crate::db::models::profile::Profile;
    pub use crate::db::models::score::{MonthlyScore, RankingEntry};
    pub use crate::db::models::{POINTS_PER_CONNECTION, UNKNOWN_USER_NAME};

    pub use crate::db::repositories::ConnectionGateway;
    pub use crate::db::repositories::connection::ConnectionRepository;
    pub use crate::db::repositories::memory::MemoryGateway;
}

static DB_POOL: LazyLock<OnceCell<Db>> = LazyLock::new(OnceCell::new);
pub async fn db_pool() -> StoreResult<&'static PgPool> {
    Ok(&DB_POOL
        .get_or_try_init(|| async { Db::new_pool().await })
        .await?
        .pool)
}

struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn new_pool() -> StoreResult<Self> {
        let db_url = var!(Var::DatabaseUrl).await?;
        let pool = sqlx::PgPool::connect(db_url).await?;

        tracing::debug!("database pool ready");
        Ok(Self { pool })
    }
}

/// Brings the schema up to date; safe to call on every start.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub type StoreResult<T> = core::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),

    #[error(transparent)]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    EnvError(#[from] env::EnvErr),

    #[error("invalid stored value for '{field}': {value}")]
    InvalidValue { field: &'static str, value: String },
}
