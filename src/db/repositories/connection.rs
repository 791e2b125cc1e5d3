use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use super::{ConnectionGateway, sql_fragment};
use crate::db::StoreResult;
use crate::db::models::connection::{
    ConnectionEvent, ConnectionFilter, ConnectionKey, ConnectionRow, EventOrder,
    NewConnectionEvent, UserId,
};
use crate::db::models::profile::Profile;

/// Postgres-backed gateway over `user_daily_connections` and `users`.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionRepository {
    pool: &'static PgPool,
}

impl ConnectionRepository {
    const TABLE_NAME: &'static str = "user_daily_connections";

    pub fn new(pool: &'static PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &'static PgPool {
        self.pool
    }
}

#[async_trait]
impl ConnectionGateway for ConnectionRepository {
    #[instrument(skip(self), fields(user_id = %key.user_id, user_type = %key.user_type))]
    async fn find_one(&self, key: &ConnectionKey) -> StoreResult<Option<ConnectionEvent>> {
        let row = sqlx::query_as::<_, ConnectionRow>(&format!(
            r#"
            SELECT {} FROM {}
            WHERE user_id = $1
            AND user_type = $2
            AND connection_date = $3
            LIMIT 1
            "#,
            sql_fragment::CONNECTION_FIELDS,
            Self::TABLE_NAME
        ))
        .bind(key.user_id.as_str())
        .bind(key.user_type.as_str())
        .bind(key.connection_date)
        .fetch_optional(self.pool)
        .await?;

        row.map(ConnectionEvent::try_from).transpose()
    }

    #[instrument(skip(self, event), fields(user_id = %event.user_id, date = %event.connection_date))]
    async fn insert(&self, event: &NewConnectionEvent) -> StoreResult<Option<ConnectionEvent>> {
        let row = sqlx::query_as::<_, ConnectionRow>(&format!(
            r#"
            INSERT INTO {} (
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
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (user_id, user_type, connection_date)
            DO NOTHING
            RETURNING {}
            "#,
            Self::TABLE_NAME,
            sql_fragment::CONNECTION_FIELDS
        ))
        .bind(event.id)
        .bind(event.user_id.as_str())
        .bind(event.user_type.as_str())
        .bind(&event.user_name)
        .bind(event.user_photo.as_deref())
        .bind(event.connection_date)
        .bind(event.year())
        .bind(event.month() as i32)
        .bind(event.day() as i32)
        .bind(event.points_earned)
        .bind(event.created_at)
        .fetch_optional(self.pool)
        .await;

        match row {
            Ok(Some(row)) => Ok(Some(row.try_into()?)),
            Ok(None) => {
                tracing::debug!("connection already present for key, insert skipped");
                Ok(None)
            }
            Err(e) => {
                tracing::error!(error = ?e, "failure during connection insertion");
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self), fields(year = filter.year, month = filter.month))]
    async fn find_many(&self, filter: &ConnectionFilter) -> StoreResult<Vec<ConnectionEvent>> {
        let mut query: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM {} WHERE year = ",
            sql_fragment::CONNECTION_FIELDS,
            Self::TABLE_NAME
        ));
        query.push_bind(filter.year);
        query.push(" AND month = ").push_bind(filter.month as i32);

        if let Some(user_id) = &filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id.as_str());
        }
        if let Some(user_type) = filter.user_type {
            query.push(" AND user_type = ").push_bind(user_type.as_str());
        }

        query.push(match filter.order {
            EventOrder::ConnectionDateDesc => " ORDER BY connection_date DESC, created_at DESC",
            EventOrder::PointsDesc => " ORDER BY points_earned DESC, created_at ASC",
        });

        let rows = query
            .build_query_as::<ConnectionRow>()
            .fetch_all(self.pool)
            .await?;

        tracing::trace!(count = rows.len(), "fetched connection rows");
        rows.into_iter().map(ConnectionEvent::try_from).collect()
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn find_profiles(&self, ids: &[UserId]) -> StoreResult<Vec<Profile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = ids.iter().map(|id| id.0.clone()).collect();
        let profiles = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {} FROM users WHERE id = ANY($1)",
            sql_fragment::PROFILE_FIELDS
        ))
        .bind(&ids[..])
        .fetch_all(self.pool)
        .await?;

        Ok(profiles)
    }
}
