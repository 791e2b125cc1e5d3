use tracing::instrument;

use super::{MonthWindow, ScoringService};
use crate::db::StoreResult;
use crate::db::models::connection::{ConnectionEvent, ConnectionFilter, EventOrder};
use crate::db::models::score::MonthlyScore;
use crate::db::repositories::ConnectionGateway;
use crate::identity::Identity;

impl<G> ScoringService<G>
where
    G: ConnectionGateway,
{
    /// Totals for one user within `window` (the current month when `None`).
    ///
    /// Returns a zeroed score when there is no identity or when the lookup fails.
    #[instrument(skip(self, identity), fields(user_id = identity.map(|i| i.user_id.to_string())))]
    pub async fn user_score(
        &self,
        identity: Option<&Identity>,
        window: Option<MonthWindow>,
    ) -> MonthlyScore {
        let Some(identity) = identity else {
            return MonthlyScore::default();
        };
        let window = window.unwrap_or_else(|| self.current_window());

        match self.user_events(identity, window).await {
            Ok(events) => MonthlyScore::from_events(&events),
            Err(e) => {
                tracing::error!(error = ?e, %window, "failed to fetch user score");
                MonthlyScore::default()
            }
        }
    }

    /// The user's events within `window`, most recent first. Empty on failure.
    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn user_connections(
        &self,
        identity: &Identity,
        window: Option<MonthWindow>,
    ) -> Vec<ConnectionEvent> {
        let window = window.unwrap_or_else(|| self.current_window());

        match self.user_events(identity, window).await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(error = ?e, %window, "failed to fetch user connections");
                Vec::new()
            }
        }
    }

    async fn user_events(
        &self,
        identity: &Identity,
        window: MonthWindow,
    ) -> StoreResult<Vec<ConnectionEvent>> {
        let filter = ConnectionFilter::month(window.year, window.month)
            .for_user(identity.user_id.clone(), identity.user_type)
            .order_by(EventOrder::ConnectionDateDesc);

        self.gateway.find_many(&filter).await
    }
}
