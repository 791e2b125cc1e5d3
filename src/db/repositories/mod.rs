use std::sync::Arc;

use async_trait::async_trait;

use crate::db::StoreResult;
use crate::db::models::connection::{
    ConnectionEvent, ConnectionFilter, ConnectionKey, NewConnectionEvent, UserId,
};
use crate::db::models::profile::Profile;

pub mod connection;
pub mod memory;

pub mod sql_fragment {
    pub const CONNECTION_FIELDS: &str = r#"
        id,
        user_id,
        user_type,
        user_name,
        user_photo,
        connection_date,
        year,
        month,
        day,
        points_earned,
        created_at
    "#;

    pub const PROFILE_FIELDS: &str = r#"
        id,
        first_name,
        last_name,
        photo_url
    "#;
}

/// Everything the scoring engine needs from persistent storage.
///
/// `insert` is an atomic insert-if-absent on the `(user_id, user_type, connection_date)` key: a
/// conflicting row turns the call into a no-op that returns `Ok(None)`.
#[async_trait]
pub trait ConnectionGateway: Send + Sync {
    async fn find_one(&self, key: &ConnectionKey) -> StoreResult<Option<ConnectionEvent>>;

    async fn insert(&self, event: &NewConnectionEvent) -> StoreResult<Option<ConnectionEvent>>;

    async fn find_many(&self, filter: &ConnectionFilter) -> StoreResult<Vec<ConnectionEvent>>;

    /// Batch profile lookup; ids without a profile are simply absent from the result.
    async fn find_profiles(&self, ids: &[UserId]) -> StoreResult<Vec<Profile>>;
}

#[async_trait]
impl<G> ConnectionGateway for Arc<G>
where
    G: ConnectionGateway + ?Sized,
{
    async fn find_one(&self, key: &ConnectionKey) -> StoreResult<Option<ConnectionEvent>> {
        (**self).find_one(key).await
    }

    async fn insert(&self, event: &NewConnectionEvent) -> StoreResult<Option<ConnectionEvent>> {
        (**self).insert(event).await
    }

    async fn find_many(&self, filter: &ConnectionFilter) -> StoreResult<Vec<ConnectionEvent>> {
        (**self).find_many(filter).await
    }

    async fn find_profiles(&self, ids: &[UserId]) -> StoreResult<Vec<Profile>> {
        (**self).find_profiles(ids).await
    }
}
