pub mod api;
pub mod config;
pub mod export;
pub mod fetcher;
pub mod humanize;
pub mod ledger;
pub mod observability;
pub mod scheduler;
pub mod task;
