//! Data warehouse loader for landflow
//!
//! Once the cluster is up, [`load`] creates the transactions star schema
//! (see [`schema`]) and copies each table from its CSV extract in the
//! landing bucket.
//!
//! The loader only talks to a [`Warehouse`]; [`PgWarehouse`] is the client
//! that ships with the crate.

pub mod error;
pub mod loader;
pub mod postgres;
pub mod schema;

pub use error::{Result, WarehouseError};
pub use loader::{LoadPlan, LoadReport, LoadSource, load};
pub use postgres::{ConnectionSettings, PgWarehouse};
pub use schema::{STAR_SCHEMA, Table, TableRole};

use async_trait::async_trait;

/// A SQL endpoint the loader can drive
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run one statement, discarding any rows
    async fn execute(&self, statement: &str) -> Result<()>;

    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool>;
}
