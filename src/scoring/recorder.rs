use tracing::instrument;
use uuid::Uuid;

use super::{ConnectionResult, MonthWindow, ScoringService};
use crate::db::StoreResult;
use crate::db::models::connection::{ConnectionKey, NewConnectionEvent};
use crate::db::models::{POINTS_PER_CONNECTION, UNKNOWN_USER_NAME};
use crate::db::repositories::ConnectionGateway;
use crate::identity::Identity;

impl<G> ScoringService<G>
where
    G: ConnectionGateway,
{
    /// Records today's connection for `identity`, at most once per calendar day.
    ///
    /// The storage insert is conflict-free on `(user_id, user_type, connection_date)`, so
    /// concurrent calls for the same user and day persist a single row and every other caller
    /// sees "already connected".
    #[instrument(skip(self, identity), fields(user_id = %identity.user_id, user_type = %identity.user_type))]
    pub async fn record_connection(&self, identity: &Identity) -> ConnectionResult {
        match self.try_record(identity).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = ?e, "failed to record connection");
                ConnectionResult::failed()
            }
        }
    }

    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn has_connected_today(&self, identity: &Identity) -> bool {
        match self.gateway.find_one(&self.today_key(identity)).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                tracing::error!(error = ?e, "failed to check today's connection");
                false
            }
        }
    }

    async fn try_record(&self, identity: &Identity) -> StoreResult<ConnectionResult> {
        let key = self.today_key(identity);
        if self.gateway.find_one(&key).await?.is_some() {
            tracing::debug!(date = %key.connection_date, "already connected today");
            return Ok(ConnectionResult::already_connected());
        }

        let user_name = match identity.name.trim() {
            "" => UNKNOWN_USER_NAME.to_owned(),
            name => name.to_owned(),
        };

        let event = NewConnectionEvent {
            id: Uuid::new_v4(),
            user_id: key.user_id,
            user_type: key.user_type,
            user_name,
            user_photo: self.resolve_photo(identity).await,
            connection_date: key.connection_date,
            points_earned: POINTS_PER_CONNECTION,
            created_at: self.clock.now(),
        };

        let Some(stored) = self.gateway.insert(&event).await? else {
            // a concurrent call won between the check and the insert
            tracing::debug!(date = %event.connection_date, "connection inserted concurrently");
            return Ok(ConnectionResult::already_connected());
        };

        let month = self
            .user_score(
                Some(identity),
                Some(MonthWindow::containing(stored.connection_date)),
            )
            .await;

        tracing::info!(
            date = %stored.connection_date,
            total_points_month = month.total_points,
            connection_days = month.connection_days,
            "connection recorded"
        );

        Ok(ConnectionResult::recorded(
            i64::from(stored.points_earned),
            month,
        ))
    }

    /// Best photo for a new event. Connected users' canonical profile photo takes precedence over
    /// whatever the session carried; lookup failures keep the session photo.
    async fn resolve_photo(&self, identity: &Identity) -> Option<String> {
        if !identity.is_connected() {
            return identity.photo.clone();
        }

        match self
            .gateway
            .find_profiles(std::slice::from_ref(&identity.user_id))
            .await
        {
            Ok(profiles) => profiles
                .iter()
                .find(|p| p.id == identity.user_id)
                .and_then(|p| p.photo_reference())
                .and_then(|reference| self.photos.public_url(reference))
                .or_else(|| identity.photo.clone()),
            Err(e) => {
                tracing::warn!(error = ?e, "failed to fetch profile photo");
                identity.photo.clone()
            }
        }
    }

    fn today_key(&self, identity: &Identity) -> ConnectionKey {
        ConnectionKey {
            user_id: identity.user_id.clone(),
            user_type: identity.user_type,
            connection_date: self.clock.today(),
        }
    }
}
