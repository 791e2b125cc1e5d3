use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::instrument;

use super::{MonthWindow, ScoringService};
use crate::db::StoreResult;
use crate::db::models::UNKNOWN_USER_NAME;
use crate::db::models::connection::{
    ConnectionEvent, ConnectionFilter, EventOrder, UserId, UserType,
};
use crate::db::models::profile::Profile;
use crate::db::models::score::RankingEntry;
use crate::db::repositories::ConnectionGateway;
use crate::util::photo::PhotoStorage;

/// Per-user accumulation of one window's events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserTally {
    pub user_id: UserId,
    pub user_type: UserType,
    pub user_name: String,
    pub user_photo: Option<String>,
    pub total_points: i64,
    pub connection_days: i64,
    pub first_connection: NaiveDate,
}

impl<G> ScoringService<G>
where
    G: ConnectionGateway,
{
    /// Leaderboard for `window` (the current month when `None`).
    ///
    /// Empty when there are no events or when the events cannot be fetched.
    #[instrument(skip(self))]
    pub async fn monthly_ranking(&self, window: Option<MonthWindow>) -> Vec<RankingEntry> {
        let window = window.unwrap_or_else(|| self.current_window());

        match self.try_ranking(window).await {
            Ok(ranking) => {
                tracing::debug!(%window, users = ranking.len(), "ranking built");
                ranking
            }
            Err(e) => {
                tracing::warn!(error = ?e, %window, "failed to build ranking");
                Vec::new()
            }
        }
    }

    async fn try_ranking(&self, window: MonthWindow) -> StoreResult<Vec<RankingEntry>> {
        let filter =
            ConnectionFilter::month(window.year, window.month).order_by(EventOrder::PointsDesc);
        let events = self.gateway.find_many(&filter).await?;
        let mut tallies = tally_events(&events);

        let missing: Vec<UserId> = tallies
            .iter()
            .filter(|t| t.user_type == UserType::Connected && t.user_photo.is_none())
            .map(|t| t.user_id.clone())
            .collect();

        if !missing.is_empty() {
            tracing::debug!(count = missing.len(), "fetching profiles for ranking");
            match self.gateway.find_profiles(&missing).await {
                Ok(profiles) => apply_profiles(&mut tallies, &profiles, &self.photos),
                Err(e) => {
                    tracing::warn!(error = ?e, "profile lookup failed, keeping snapshots");
                }
            }
        }

        Ok(rank_tallies(tallies))
    }
}

/// Groups events by user in first-seen order. Display metadata comes from the first event seen
/// for each user.
pub fn tally_events(events: &[ConnectionEvent]) -> Vec<UserTally> {
    let mut index: HashMap<&UserId, usize> = HashMap::new();
    let mut tallies: Vec<UserTally> = Vec::new();

    for event in events {
        let slot = *index.entry(&event.user_id).or_insert_with(|| {
            tallies.push(UserTally {
                user_id: event.user_id.clone(),
                user_type: event.user_type,
                user_name: match event.user_name.trim() {
                    "" => UNKNOWN_USER_NAME.to_owned(),
                    name => name.to_owned(),
                },
                user_photo: event.user_photo.clone().filter(|p| !p.trim().is_empty()),
                total_points: 0,
                connection_days: 0,
                first_connection: event.connection_date,
            });
            tallies.len() - 1
        });

        let tally = &mut tallies[slot];
        tally.total_points += i64::from(event.points_earned);
        tally.connection_days += 1;
        tally.first_connection = tally.first_connection.min(event.connection_date);
    }

    tallies
}

/// Overlays canonical profile data on connected users' tallies.
pub fn apply_profiles(tallies: &mut [UserTally], profiles: &[Profile], photos: &PhotoStorage) {
    for profile in profiles {
        let Some(tally) = tallies
            .iter_mut()
            .find(|t| t.user_type == UserType::Connected && t.user_id == profile.id)
        else {
            continue;
        };

        tally.user_photo = profile
            .photo_reference()
            .and_then(|reference| photos.public_url(reference));

        let canonical = profile.display_name();
        if !canonical.is_empty() {
            tally.user_name = canonical;
        }
    }
}

/// Orders by points (highest first), then earliest first connection, then name, then id, and
/// assigns 1-based ranks.
pub fn rank_tallies(mut tallies: Vec<UserTally>) -> Vec<RankingEntry> {
    tallies.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then_with(|| a.first_connection.cmp(&b.first_connection))
            .then_with(|| a.user_name.cmp(&b.user_name))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    tallies
        .into_iter()
        .enumerate()
        .map(|(i, t)| RankingEntry {
            rank: i as i64 + 1,
            user_id: t.user_id,
            user_name: t.user_name,
            user_photo: t.user_photo,
            total_points: t.total_points,
            connection_days: t.connection_days,
            current_streak: t.connection_days,
        })
        .collect()
}
