//! # Region Admin Telegram Bot
//!
//! A Telegram admin console for a two-level region → district hierarchy
//! stored in PostgreSQL, with a bulk CSV importer.

pub mod bot;
pub mod config;
pub mod db;
pub mod dialogue;
pub mod errors;
pub mod importer;
pub mod localization;
pub mod models;
pub mod store;
