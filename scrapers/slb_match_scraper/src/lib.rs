pub mod calendar_scraper;
pub mod config;
pub mod datetime;
pub mod error;
pub mod espn_scraper;
pub mod formatter;
pub mod rate_limit;
pub mod repository;
pub mod retry;
pub mod service;
pub mod sources;
pub mod types;
pub mod utils;
