//! The transactions star schema
//!
//! Four dimension tables and one fact table that references each of them.
//! Table names double as the object keys of the CSV extracts
//! (`<prefix><table>.csv`).

use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableRole {
    Dimension,
    Fact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
    /// Dimension table this column points at
    pub references: Option<&'static str>,
}

const fn col(name: &'static str, sql_type: &'static str) -> Column {
    Column {
        name,
        sql_type,
        references: None,
    }
}

const fn fk(name: &'static str, table: &'static str) -> Column {
    Column {
        name,
        sql_type: "INTEGER",
        references: Some(table),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub role: TableRole,
    /// The first column is the primary key
    pub columns: &'static [Column],
}

impl Table {
    pub fn primary_key(&self) -> &'static str {
        self.columns[0].name
    }

    /// Dimension tables this one references
    pub fn references(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().filter_map(|c| c.references)
    }

    /// `CREATE TABLE` statement for this table inside `schema`.
    ///
    /// Every non-key column is `NOT NULL`. Foreign keys name the referenced
    /// table's primary key, which by convention is `<table>_id`.
    pub fn create_sql(&self, schema: &str) -> String {
        let mut sql = format!("CREATE TABLE {}.{} (\n", schema, quote(self.name));
        for (i, column) in self.columns.iter().enumerate() {
            let constraint = if i == 0 { "PRIMARY KEY" } else { "NOT NULL" };
            let _ = write!(
                sql,
                "    {} {} {}",
                quote(column.name),
                column.sql_type,
                constraint
            );
            if let Some(table) = column.references {
                let _ = write!(
                    sql,
                    " REFERENCES {}.{} ({}_id)",
                    schema,
                    quote(table),
                    table
                );
            }
            sql.push_str(if i + 1 < self.columns.len() { ",\n" } else { "\n" });
        }
        sql.push(')');
        sql
    }
}

/// `type`, `character`, `object` and `transaction` are reserved words in
/// some dialects
fn quote(identifier: &str) -> String {
    const RESERVED: &[&str] = &["type", "character", "object", "transaction"];
    if RESERVED.contains(&identifier) {
        format!("\"{}\"", identifier)
    } else {
        identifier.to_string()
    }
}

/// Quoted form of a table name for use in generated SQL
pub fn table_ident(name: &str) -> String {
    quote(name)
}

pub const PROGRAM: Table = Table {
    name: "program",
    role: TableRole::Dimension,
    columns: &[
        col("program_id", "INTEGER"),
        col("program", "VARCHAR(100)"),
        col("program_code", "VARCHAR(50)"),
        col("department", "VARCHAR(100)"),
        col("department_code", "VARCHAR(50)"),
        col("organization_group", "VARCHAR(100)"),
        col("organization_group_code", "VARCHAR(50)"),
        col("related_govt_units", "VARCHAR(10)"),
    ],
};

pub const TYPE: Table = Table {
    name: "type",
    role: TableRole::Dimension,
    columns: &[
        col("type_id", "INTEGER"),
        col("sub_object", "VARCHAR(100)"),
        col("sub_object_code", "VARCHAR(50)"),
        col("object", "VARCHAR(100)"),
        col("object_code", "VARCHAR(50)"),
        col("character", "VARCHAR(100)"),
        col("character_code", "VARCHAR(50)"),
    ],
};

pub const FUND: Table = Table {
    name: "fund",
    role: TableRole::Dimension,
    columns: &[
        col("fund_id", "INTEGER"),
        col("fund_category", "VARCHAR(100)"),
        col("fund_category_code", "VARCHAR(50)"),
        col("fund", "VARCHAR(100)"),
        col("fund_code", "VARCHAR(50)"),
        col("fund_type", "VARCHAR(100)"),
        col("fund_type_code", "VARCHAR(50)"),
    ],
};

pub const FINANCE: Table = Table {
    name: "finance",
    role: TableRole::Dimension,
    columns: &[
        col("finance_id", "INTEGER"),
        col("revenue_or_spending", "VARCHAR(20)"),
    ],
};

pub const TRANSACTION: Table = Table {
    name: "transaction",
    role: TableRole::Fact,
    columns: &[
        col("transaction_id", "INTEGER"),
        col("fiscal_year", "INTEGER"),
        fk("program_id", "program"),
        fk("type_id", "type"),
        fk("fund_id", "fund"),
        fk("finance_id", "finance"),
        col("amount", "NUMERIC(20,2)"),
    ],
};

/// Every table in creation and load order: dimensions before the fact
pub const STAR_SCHEMA: &[Table] = &[PROGRAM, TYPE, FUND, FINANCE, TRANSACTION];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions_precede_fact() {
        let fact = STAR_SCHEMA
            .iter()
            .position(|t| t.role == TableRole::Fact)
            .unwrap();
        assert_eq!(fact, STAR_SCHEMA.len() - 1);
        for table in &STAR_SCHEMA[..fact] {
            assert_eq!(table.role, TableRole::Dimension);
        }
    }

    #[test]
    fn test_fact_references_every_dimension() {
        let refs: Vec<_> = TRANSACTION.references().collect();
        assert_eq!(refs, vec!["program", "type", "fund", "finance"]);
        for dim in refs {
            let table = STAR_SCHEMA.iter().find(|t| t.name == dim).unwrap();
            assert_eq!(table.primary_key(), format!("{dim}_id"));
        }
    }

    #[test]
    fn test_create_sql() {
        let sql = FINANCE.create_sql("report");
        assert_eq!(
            sql,
            "CREATE TABLE report.finance (\n    finance_id INTEGER PRIMARY KEY,\n    revenue_or_spending VARCHAR(20) NOT NULL\n)"
        );
    }

    #[test]
    fn test_create_sql_quotes_reserved_names() {
        let sql = TRANSACTION.create_sql("report");
        assert!(sql.starts_with("CREATE TABLE report.\"transaction\" ("));
        assert!(sql.contains("type_id INTEGER NOT NULL REFERENCES report.\"type\" (type_id)"));
        assert!(sql.contains("amount NUMERIC(20,2) NOT NULL\n)"));
    }
}
