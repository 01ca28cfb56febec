//! Read-later Telegram bot: long-polls updates, fans them out to a bounded worker
//! pool and keeps a per-user list of saved pages.

pub mod config;
pub mod consumer;
pub mod db;
pub mod fetcher;
pub mod handlers;
pub mod model;
pub mod state;
pub mod telegram;
