use serde::{Deserialize, Serialize};

use super::connection::{ConnectionEvent, UserId};

/// Month-to-date totals for one user. Derived on demand, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyScore {
    pub total_points: i64,
    pub connection_days: i64,
    /// Equal to `connection_days` within the window, not a run of consecutive days.
    pub current_streak: i64,
}

impl MonthlyScore {
    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a ConnectionEvent>,
    {
        let (total_points, connection_days) = events
            .into_iter()
            .fold((0i64, 0i64), |(points, days), event| {
                (points + i64::from(event.points_earned), days + 1)
            });

        Self {
            total_points,
            connection_days,
            current_streak: connection_days,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub rank: i64,
    pub user_id: UserId,
    pub user_name: String,
    pub user_photo: Option<String>,
    pub total_points: i64,
    pub connection_days: i64,
    pub current_streak: i64,
}
