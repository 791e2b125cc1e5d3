//! Daily connection scoring: recording at most one point per user per day, month-to-date totals
//! and the monthly leaderboard.
//!
//! Every public operation absorbs storage errors. Reads degrade to zero/empty results and writes
//! report `success = false`, so callers always get a well-formed value back.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::models::score::MonthlyScore;
use crate::db::repositories::ConnectionGateway;
use crate::util::photo::PhotoStorage;

pub mod aggregate;
pub mod ranking;
pub mod recorder;
pub mod window;

#[cfg(test)]
mod tests;

pub use window::{Clock, FixedClock, LocalClock, MonthWindow, WindowError};

pub const MSG_RECORDED: &str = "connection recorded";
pub const MSG_ALREADY_CONNECTED: &str = "already connected today";
pub const MSG_FAILED: &str = "error while recording connection";

pub struct ScoringService<G> {
    gateway: G,
    clock: Arc<dyn Clock>,
    photos: PhotoStorage,
}

impl<G> ScoringService<G>
where
    G: ConnectionGateway,
{
    pub fn new(gateway: G, photos: PhotoStorage) -> Self {
        Self {
            gateway,
            clock: Arc::new(LocalClock),
            photos,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn current_window(&self) -> MonthWindow {
        MonthWindow::containing(self.clock.today())
    }

    /// Completes a partial `(year, month)` from the service clock.
    pub fn window(&self, year: Option<i32>, month: Option<u32>) -> Result<MonthWindow, WindowError> {
        MonthWindow::resolve(year, month, self.clock.today())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionOutcome {
    Recorded,
    AlreadyConnected,
    Failed,
}

/// Result of a connection attempt.
///
/// Both negative outcomes carry zeroed totals; `outcome` tells them apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionResult {
    pub outcome: ConnectionOutcome,
    pub success: bool,
    pub message: String,
    pub points_today: i64,
    pub total_points_month: i64,
    pub connection_days: i64,
}

impl ConnectionResult {
    pub fn recorded(points_today: i64, month: MonthlyScore) -> Self {
        Self {
            outcome: ConnectionOutcome::Recorded,
            success: true,
            message: MSG_RECORDED.to_owned(),
            points_today,
            total_points_month: month.total_points,
            connection_days: month.connection_days,
        }
    }

    pub fn already_connected() -> Self {
        Self::negative(ConnectionOutcome::AlreadyConnected, MSG_ALREADY_CONNECTED)
    }

    pub fn failed() -> Self {
        Self::negative(ConnectionOutcome::Failed, MSG_FAILED)
    }

    fn negative(outcome: ConnectionOutcome, message: &str) -> Self {
        Self {
            outcome,
            success: false,
            message: message.to_owned(),
            points_today: 0,
            total_points_month: 0,
            connection_days: 0,
        }
    }
}
