pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod error_pages;
pub mod form_utils;
pub mod handlers;
pub mod mail;
pub mod models;
pub mod server;
pub mod session;
pub mod sort_utils;
pub mod state;
pub mod tasks;
pub mod timezone;
pub mod xsrf;

/// Application version from Cargo.toml (single source of truth)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
