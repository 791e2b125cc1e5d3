use core::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        UserId(value)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId(value.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Separates authenticated accounts from anonymous local identities, whose id spaces are
/// otherwise unrelated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Connected,
    Local,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Connected => "connected",
            UserType::Local => "local",
        }
    }
}

impl FromStr for UserType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(UserType::Connected),
            "local" => Ok(UserType::Local),
            other => Err(StoreError::InvalidValue {
                field: "user_type",
                value: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user's scoring event for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub id: Uuid,
    pub user_id: UserId,
    pub user_type: UserType,
    pub user_name: String,
    pub user_photo: Option<String>,
    pub connection_date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub points_earned: i32,
    pub created_at: DateTime<Utc>,
}

impl ConnectionEvent {
    pub fn key(&self) -> ConnectionKey {
        ConnectionKey {
            user_id: self.user_id.clone(),
            user_type: self.user_type,
            connection_date: self.connection_date,
        }
    }
}

/// Raw `user_daily_connections` row as returned by postgres.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConnectionRow {
    pub id: Uuid,
    pub user_id: String,
    pub user_type: String,
    pub user_name: String,
    pub user_photo: Option<String>,
    pub connection_date: NaiveDate,
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub points_earned: i32,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ConnectionRow> for ConnectionEvent {
    type Error = StoreError;

    fn try_from(row: ConnectionRow) -> Result<Self, Self::Error> {
        let month = u32::try_from(row.month).map_err(|_| StoreError::InvalidValue {
            field: "month",
            value: row.month.to_string(),
        })?;
        let day = u32::try_from(row.day).map_err(|_| StoreError::InvalidValue {
            field: "day",
            value: row.day.to_string(),
        })?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id.into(),
            user_type: row.user_type.parse()?,
            user_name: row.user_name,
            user_photo: row.user_photo,
            connection_date: row.connection_date,
            year: row.year,
            month,
            day,
            points_earned: row.points_earned,
            created_at: row.created_at,
        })
    }
}

/// Insertable event. Date components are always derived from `connection_date`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConnectionEvent {
    pub id: Uuid,
    pub user_id: UserId,
    pub user_type: UserType,
    pub user_name: String,
    pub user_photo: Option<String>,
    pub connection_date: NaiveDate,
    pub points_earned: i32,
    pub created_at: DateTime<Utc>,
}

impl NewConnectionEvent {
    pub fn year(&self) -> i32 {
        self.connection_date.year()
    }

    pub fn month(&self) -> u32 {
        self.connection_date.month()
    }

    pub fn day(&self) -> u32 {
        self.connection_date.day()
    }

    pub fn key(&self) -> ConnectionKey {
        ConnectionKey {
            user_id: self.user_id.clone(),
            user_type: self.user_type,
            connection_date: self.connection_date,
        }
    }

    pub fn into_event(self) -> ConnectionEvent {
        ConnectionEvent {
            year: self.year(),
            month: self.month(),
            day: self.day(),
            id: self.id,
            user_id: self.user_id,
            user_type: self.user_type,
            user_name: self.user_name,
            user_photo: self.user_photo,
            connection_date: self.connection_date,
            points_earned: self.points_earned,
            created_at: self.created_at,
        }
    }
}

/// Natural key of a connection event: one row per user per calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub user_id: UserId,
    pub user_type: UserType,
    pub connection_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventOrder {
    #[default]
    ConnectionDateDesc,
    PointsDesc,
}

/// Equality filter over one `(year, month)` window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionFilter {
    pub user_id: Option<UserId>,
    pub user_type: Option<UserType>,
    pub year: i32,
    pub month: u32,
    pub order: EventOrder,
}

impl ConnectionFilter {
    pub fn month(year: i32, month: u32) -> Self {
        Self {
            user_id: None,
            user_type: None,
            year,
            month,
            order: EventOrder::default(),
        }
    }

    pub fn for_user(mut self, user_id: UserId, user_type: UserType) -> Self {
        self.user_id = Some(user_id);
        self.user_type = Some(user_type);
        self
    }

    pub fn order_by(mut self, order: EventOrder) -> Self {
        self.order = order;
        self
    }

    pub fn matches(&self, event: &ConnectionEvent) -> bool {
        event.year == self.year
            && event.month == self.month
            && self.user_id.as_ref().is_none_or(|id| *id == event.user_id)
            && self.user_type.is_none_or(|t| t == event.user_type)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn row(user_type: &str, month: i32) -> ConnectionRow {
        ConnectionRow {
            id: Uuid::new_v4(),
            user_id: String::from("u-1"),
            user_type: user_type.to_owned(),
            user_name: String::from("Ada Lovelace"),
            user_photo: None,
            connection_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            year: 2025,
            month,
            day: 10,
            points_earned: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_conversion() {
        let event = ConnectionEvent::try_from(row("connected", 3)).unwrap();
        assert_eq!(event.user_type, UserType::Connected);
        assert_eq!(event.month, 3);

        assert!(matches!(
            ConnectionEvent::try_from(row("admin", 3)),
            Err(StoreError::InvalidValue { field: "user_type", .. })
        ));
        assert!(matches!(
            ConnectionEvent::try_from(row("local", -1)),
            Err(StoreError::InvalidValue { field: "month", .. })
        ));
    }

    #[test]
    fn test_new_event_derives_date_parts() {
        let event = NewConnectionEvent {
            id: Uuid::new_v4(),
            user_id: "local-1".into(),
            user_type: UserType::Local,
            user_name: String::from("Local User"),
            user_photo: None,
            connection_date: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            points_earned: 1,
            created_at: Utc::now(),
        }
        .into_event();

        assert_eq!((event.year, event.month, event.day), (2024, 2, 29));
    }

    #[test]
    fn test_filter_matches() {
        let event = ConnectionEvent::try_from(row("local", 3)).unwrap();

        assert!(ConnectionFilter::month(2025, 3).matches(&event));
        assert!(!ConnectionFilter::month(2025, 4).matches(&event));
        assert!(
            ConnectionFilter::month(2025, 3)
                .for_user("u-1".into(), UserType::Local)
                .matches(&event)
        );
        assert!(
            !ConnectionFilter::month(2025, 3)
                .for_user("u-1".into(), UserType::Connected)
                .matches(&event)
        );
    }
}
