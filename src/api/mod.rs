pub mod auth;
pub mod client;
pub mod conversations;
pub mod error;
pub mod files;
pub mod users;

pub use client::SlackClient;
pub use error::ApiError;
