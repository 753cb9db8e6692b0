//! Warehouse client over the Postgres wire protocol
//!
//! Redshift speaks the same protocol, so one client covers both.

use crate::Warehouse;
use crate::error::{Result, WarehouseError};
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

const TABLE_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                            WHERE table_schema = $1 AND table_name = $2)";

#[derive(Clone)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub connect_timeout: Duration,
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

pub struct PgWarehouse {
    pool: PgPool,
}

impl PgWarehouse {
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .database(&settings.database)
            .username(&settings.username)
            .password(&settings.password);

        // statements run one after another, a single connection is enough
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(settings.connect_timeout)
            .connect_with(options)
            .await
            .map_err(|e| WarehouseError::Connection(e.to_string()))?;

        info!(host = %settings.host, database = %settings.database, "Connected to warehouse");
        Ok(Self { pool })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn execute(&self, statement: &str) -> Result<()> {
        debug!(statement, "Executing");
        sqlx::raw_sql(statement)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| WarehouseError::from_sqlx(statement, e))
    }

    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(TABLE_EXISTS)
            .bind(schema)
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| WarehouseError::from_sqlx(TABLE_EXISTS, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let settings = ConnectionSettings {
            host: "dw.example".to_string(),
            port: 5439,
            database: "san_francisco".to_string(),
            username: "loader".to_string(),
            password: "hunter2".to_string(),
            connect_timeout: Duration::from_secs(10),
        };
        let debug = format!("{:?}", settings);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("hunter2"));
    }
}
