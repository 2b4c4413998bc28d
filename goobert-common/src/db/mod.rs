//! Statistics database: schema, models and queries

pub mod init;
pub mod models;
pub mod stats;

pub use init::*;
pub use models::*;
pub use stats::StatsDb;
