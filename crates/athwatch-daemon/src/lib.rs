pub mod bridge;
pub mod config;
pub mod daemon;
pub mod error;
pub mod schedule;
pub mod scraper;
