pub mod api;
pub mod db;
pub mod identity;
pub mod scoring;
pub mod util;
