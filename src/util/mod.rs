pub mod env;
pub mod photo;
pub mod telemetry;
