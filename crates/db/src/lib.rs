pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod unit_of_work;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{DemoSeed, SeedResult};
pub use repositories::RepositoryError;
pub use unit_of_work::UnitOfWork;
