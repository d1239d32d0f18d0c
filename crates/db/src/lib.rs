pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod warehouse;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use fixtures::DemoSeedSummary;
pub use warehouse::{connect_warehouse, Warehouse, WarehouseError};
