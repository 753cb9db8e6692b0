//! Create the star schema if needed and bulk-load it from object storage

use crate::Warehouse;
use crate::error::Result;
use crate::schema::{STAR_SCHEMA, Table, table_ident};
use tracing::{info, instrument};

/// Where the CSV extracts live and how the warehouse may read them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSource {
    pub bucket: String,
    /// Prepended to `<table>.csv`
    pub key_prefix: String,
    /// Role attached to the cluster with read access to the bucket
    pub role_arn: String,
    pub region: String,
}

impl LoadSource {
    pub fn object_url(&self, table: &str) -> String {
        format!("s3://{}/{}{}.csv", self.bucket, self.key_prefix, table)
    }
}

#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub schema: String,
    pub source: LoadSource,
    pub tables: &'static [Table],
}

impl LoadPlan {
    /// Plan for the full star schema
    pub fn new(schema: impl Into<String>, source: LoadSource) -> Self {
        Self {
            schema: schema.into(),
            source,
            tables: STAR_SCHEMA,
        }
    }

    pub fn create_schema_sql(&self) -> String {
        format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema)
    }

    pub fn copy_sql(&self, table: &Table) -> String {
        format!(
            "COPY {}.{} FROM '{}' IAM_ROLE '{}' CSV IGNOREHEADER 1 REGION '{}'",
            self.schema,
            table_ident(table.name),
            literal(&self.source.object_url(table.name)),
            literal(&self.source.role_arn),
            literal(&self.source.region),
        )
    }
}

fn literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// What a load did to each table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub created: Vec<&'static str>,
    /// Tables that were already there
    pub existing: Vec<&'static str>,
    pub loaded: Vec<&'static str>,
}

/// Run `plan` against `warehouse`.
///
/// Schema and tables are created only when absent, so a rerun never fails on
/// DDL. A concurrent creator winning the race is treated like "already
/// there". Any other error stops the load at that statement.
#[instrument(skip_all, fields(schema = %plan.schema, bucket = %plan.source.bucket))]
pub async fn load<W>(warehouse: &W, plan: &LoadPlan) -> Result<LoadReport>
where
    W: Warehouse + ?Sized,
{
    let mut report = LoadReport::default();

    match warehouse.execute(&plan.create_schema_sql()).await {
        Err(err) if err.is_already_exists() => {}
        other => other?,
    }

    for table in plan.tables {
        if warehouse.table_exists(&plan.schema, table.name).await? {
            info!(table = table.name, "Table already exists, skipping");
            report.existing.push(table.name);
            continue;
        }
        match warehouse.execute(&table.create_sql(&plan.schema)).await {
            Ok(()) => {
                info!(table = table.name, "Created table");
                report.created.push(table.name);
            }
            Err(err) if err.is_already_exists() => {
                info!(table = table.name, "Table appeared concurrently, skipping");
                report.existing.push(table.name);
            }
            Err(err) => return Err(err),
        }
    }

    for table in plan.tables {
        warehouse.execute(&plan.copy_sql(table)).await?;
        info!(
            table = table.name,
            from = %plan.source.object_url(table.name),
            "Loaded table"
        );
        report.loaded.push(table.name);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PROGRAM, TYPE};

    fn plan() -> LoadPlan {
        LoadPlan::new(
            "report",
            LoadSource {
                bucket: "sf-transactions-12345".to_string(),
                key_prefix: "extract/".to_string(),
                role_arn: "arn:aws:iam::123456789012:role/S3RedshiftRole".to_string(),
                region: "ca-central-1".to_string(),
            },
        )
    }

    #[test]
    fn test_copy_sql() {
        assert_eq!(
            plan().copy_sql(&PROGRAM),
            "COPY report.program FROM 's3://sf-transactions-12345/extract/program.csv' \
             IAM_ROLE 'arn:aws:iam::123456789012:role/S3RedshiftRole' \
             CSV IGNOREHEADER 1 REGION 'ca-central-1'"
        );
    }

    #[test]
    fn test_copy_sql_quotes_reserved_table() {
        let sql = plan().copy_sql(&TYPE);
        assert!(sql.starts_with("COPY report.\"type\" FROM 's3://sf-transactions-12345/extract/type.csv'"));
    }

    #[test]
    fn test_literals_are_escaped() {
        let mut plan = plan();
        plan.source.key_prefix = "o'brien/".to_string();
        assert!(plan.copy_sql(&PROGRAM).contains("'s3://sf-transactions-12345/o''brien/program.csv'"));
    }
}
