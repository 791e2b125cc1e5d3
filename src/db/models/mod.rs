pub mod connection;
pub mod profile;
pub mod score;

/// Points granted for a single day's connection.
pub const POINTS_PER_CONNECTION: i32 = 1;

/// Fallback display name for events written without one.
pub const UNKNOWN_USER_NAME: &str = "Unknown User";
