pub mod db;
pub mod models;
pub mod operations;
pub mod progress;
pub mod schema;

pub use db::{create_store_pool, get_connection, StoreConnection, StorePool};
