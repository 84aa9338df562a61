//! Table enumeration for a source database

use crate::bcp::SourceConnection;
use crate::error::{validate_identifier, Result};
use crate::process;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Lists the base tables of a database
#[async_trait]
pub trait TableCatalog: Send + Sync {
    /// Distinct base-table names in any of `schemas`, sorted
    async fn tables(&self, database: &str, schemas: &[String]) -> Result<Vec<String>>;
}

/// `INFORMATION_SCHEMA` query listing base tables in the given schemas
pub fn tables_query(database: &str, schemas: &[String]) -> Result<String> {
    validate_identifier(database)?;
    let schemas = schemas
        .iter()
        .map(|schema| validate_identifier(schema).map(|s| format!("'{}'", s)))
        .collect::<Result<Vec<_>>>()?;

    Ok(format!(
        "SET NOCOUNT ON; SELECT DISTINCT(TABLE_NAME) FROM {database}.INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_SCHEMA IN ({schemas})",
        database = database,
        schemas = schemas.join(", "),
    ))
}

/// Parse headerless `sqlcmd -h -1 -W` output into table names
pub fn parse_table_list(output: &str) -> Vec<String> {
    let mut tables: Vec<String> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !(line.starts_with('(') && line.ends_with("affected)")))
        .map(str::to_string)
        .collect();
    tables.sort();
    tables.dedup();
    tables
}

/// Catalog backed by the `sqlcmd` utility
#[derive(Debug, Clone)]
pub struct SqlcmdCatalog {
    program: PathBuf,
    connection: SourceConnection,
}

impl SqlcmdCatalog {
    pub fn new(connection: SourceConnection) -> Self {
        Self {
            program: PathBuf::from("sqlcmd"),
            connection,
        }
    }

    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn args(&self, query: String) -> Vec<String> {
        let mut args = self.connection.args("-E");
        args.extend(["-h".to_string(), "-1".to_string(), "-W".to_string(), "-Q".to_string(), query]);
        args
    }
}

#[async_trait]
impl TableCatalog for SqlcmdCatalog {
    #[instrument(skip(self))]
    async fn tables(&self, database: &str, schemas: &[String]) -> Result<Vec<String>> {
        let query = tables_query(database, schemas)?;
        let output = process::run(&self.program, &self.args(query)).await?;
        let tables = parse_table_list(&output);
        debug!(count = tables.len(), "Listed source tables");
        Ok(tables)
    }
}

/// Catalog answering from a fixed list, for callers that already know the tables
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    tables: Vec<String>,
}

impl StaticCatalog {
    pub fn new<I, T>(tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl TableCatalog for StaticCatalog {
    async fn tables(&self, _database: &str, _schemas: &[String]) -> Result<Vec<String>> {
        let mut tables = self.tables.clone();
        tables.sort();
        tables.dedup();
        Ok(tables)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_query() {
        let query = tables_query("jade", &["dbo".to_string(), "sales".to_string()]).unwrap();
        assert!(query.contains("FROM jade.INFORMATION_SCHEMA.TABLES"));
        assert!(query.contains("TABLE_SCHEMA IN ('dbo', 'sales')"));
        assert!(query.contains("TABLE_TYPE = 'BASE TABLE'"));
    }

    #[test]
    fn test_tables_query_rejects_injection() {
        assert!(tables_query("jade", &["dbo') OR 1=1 --".to_string()]).is_err());
        assert!(tables_query("ja de", &["dbo".to_string()]).is_err());
    }

    #[test]
    fn test_parse_table_list() {
        let output = "orders\r\ncustomers\n\n(2 rows affected)\norders\n";
        assert_eq!(parse_table_list(output), vec!["customers", "orders"]);
        assert!(parse_table_list("").is_empty());
    }

    #[test]
    fn test_sqlcmd_args() {
        let catalog = SqlcmdCatalog::new(SourceConnection::trusted());
        let args = catalog.args("SELECT 1".to_string());
        assert_eq!(args, vec!["-E", "-h", "-1", "-W", "-Q", "SELECT 1"]);
    }

    #[tokio::test]
    async fn test_static_catalog_sorted() {
        let catalog = StaticCatalog::new(["b", "a", "b"]);
        assert_eq!(catalog.tables("db", &[]).await.unwrap(), vec!["a", "b"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sqlcmd_catalog_runs_program() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("sqlcmd");
        std::fs::write(&script, "#!/bin/sh\nprintf 'zeta\\nalpha\\n'\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let catalog = SqlcmdCatalog::new(SourceConnection::trusted()).program(&script);
        let tables = catalog.tables("jade", &["dbo".to_string()]).await.unwrap();
        assert_eq!(tables, vec!["alpha", "zeta"]);
    }
}
