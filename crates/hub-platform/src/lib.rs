pub mod config;
pub mod db;
pub mod pg_store;
pub mod redis_bus;

pub use config::ServiceConfig;
pub use db::connect_database;
pub use pg_store::PgStore;
pub use redis_bus::{NOTIFICATIONS_CHANNEL, RedisBus};
