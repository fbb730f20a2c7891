//! Slack workspace archiver: pulls channel history, threads, users,
//! memberships and files into a local SQLite archive.

pub mod api;
pub mod cli;
pub mod config;
pub mod models;
pub mod store;
pub mod sync;
