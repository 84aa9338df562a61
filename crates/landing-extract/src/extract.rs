//! Extraction plan: format files and data dumps for every schema × table
//!
//! Output lands under `<root>/<YYYYMMDD>/<database>`; bcp's own output and
//! rejected rows go to `<root>/logs/output/<date>/` and `<root>/logs/error/<date>/`.

use crate::bcp::{BcpCommand, ExtractWindow, SourceConnection, TableRef};
use crate::catalog::TableCatalog;
use crate::error::{validate_identifier, ExtractError, Result};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use landing_common::dates;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

pub const DEFAULT_SCHEMA: &str = "dbo";

/// Whole tables or a change window
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExtractMode {
    #[default]
    Full,
    Incremental(ExtractWindow),
}

#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub database: String,
    /// Explicit table list; the catalog is consulted when absent
    pub tables: Option<Vec<String>>,
    pub schemas: Vec<String>,
    pub mode: ExtractMode,
    pub include_format: bool,
    pub root_dir: PathBuf,
    /// `YYYYMMDD`; today (UTC) when absent
    pub date: Option<String>,
    pub connection: SourceConnection,
    /// Tables dumped concurrently
    pub parallelism: usize,
}

impl ExtractRequest {
    pub fn new(database: impl Into<String>, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            tables: None,
            schemas: vec![DEFAULT_SCHEMA.to_string()],
            mode: ExtractMode::Full,
            include_format: true,
            root_dir: root_dir.into(),
            date: None,
            connection: SourceConnection::trusted(),
            parallelism: 1,
        }
    }

    pub fn tables<I, T>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tables = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    pub fn schemas<I, T>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.schemas = schemas.into_iter().map(Into::into).collect();
        self
    }

    pub fn mode(mut self, mode: ExtractMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn include_format(mut self, include: bool) -> Self {
        self.include_format = include;
        self
    }

    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn connection(mut self, connection: SourceConnection) -> Self {
        self.connection = connection;
        self
    }

    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.database)?;
        if self.schemas.is_empty() {
            return Err(ExtractError::config("at least one schema is required"));
        }
        for schema in &self.schemas {
            validate_identifier(schema)?;
        }
        if let Some(tables) = &self.tables {
            for table in tables {
                validate_identifier(table)?;
            }
        }
        if self.parallelism == 0 {
            return Err(ExtractError::config("parallelism must be at least 1"));
        }
        if let Some(date) = &self.date {
            check_date(date)?;
        }
        Ok(())
    }

    /// Date stamp of this run
    pub fn resolved_date(&self) -> String {
        self.date.clone().unwrap_or_else(dates::today)
    }

    /// `<root>/<date>/<database>`
    pub fn output_dir(&self, date: &str) -> PathBuf {
        self.root_dir.join(date).join(&self.database)
    }
}

fn check_date(date: &str) -> Result<()> {
    let well_formed = date.len() == 8 && NaiveDate::parse_from_str(date, dates::DEFAULT_DATE_FORMAT).is_ok();
    if well_formed {
        Ok(())
    } else {
        Err(ExtractError::config(format!("invalid date '{}', expected YYYYMMDD", date)))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableFailure {
    pub schema: String,
    pub table: String,
    pub error: String,
}

/// Result of one extraction run
#[derive(Debug, Clone, Serialize)]
pub struct ExtractSummary {
    pub database: String,
    pub date: String,
    pub output_dir: PathBuf,
    /// Files produced, in schema then table order
    pub files: Vec<PathBuf>,
    pub failures: Vec<TableFailure>,
}

impl ExtractSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Object-key prefix for landing the produced files
    pub fn key_prefix(&self) -> String {
        format!("{}/{}", self.database, self.date)
    }
}

/// Which files to produce for each table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Products {
    FormatOnly,
    Dump { with_format: bool },
}

/// Per-run context shared by all table jobs
struct Plan<'a> {
    request: &'a ExtractRequest,
    output_dir: PathBuf,
    output_logs: PathBuf,
    error_logs: PathBuf,
    products: Products,
    /// Prefix file names with the schema so same-named tables stay apart
    qualify_files: bool,
}

/// Drives `bcp` over the tables a catalog reports
pub struct Extractor<C> {
    catalog: C,
    bcp_program: PathBuf,
}

impl<C: TableCatalog> Extractor<C> {
    pub fn new(catalog: C) -> Self {
        Self {
            catalog,
            bcp_program: PathBuf::from("bcp"),
        }
    }

    pub fn bcp_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.bcp_program = program.into();
        self
    }

    /// Format files (when requested) and data dumps
    #[instrument(skip_all, fields(database = %request.database))]
    pub async fn extract(&self, request: &ExtractRequest) -> Result<ExtractSummary> {
        let products = Products::Dump {
            with_format: request.include_format,
        };
        self.run(request, products).await
    }

    /// Format files only; the mode is ignored
    #[instrument(skip_all, fields(database = %request.database))]
    pub async fn extract_format_only(&self, request: &ExtractRequest) -> Result<ExtractSummary> {
        self.run(request, Products::FormatOnly).await
    }

    async fn run(&self, request: &ExtractRequest, products: Products) -> Result<ExtractSummary> {
        request.validate()?;
        let date = request.resolved_date();
        let logs = request.root_dir.join("logs");
        let plan = Plan {
            request,
            output_dir: request.output_dir(&date),
            output_logs: logs.join("output").join(&date),
            error_logs: logs.join("error").join(&date),
            products,
            qualify_files: request.schemas.len() > 1,
        };
        tokio::fs::create_dir_all(&plan.output_dir).await?;

        let mut jobs = Vec::new();
        for schema in &request.schemas {
            let tables = match &request.tables {
                Some(tables) => tables.clone(),
                None => self.catalog.tables(&request.database, std::slice::from_ref(schema)).await?,
            };
            for table in tables {
                jobs.push(TableRef::new(&request.database, schema, &table)?);
            }
        }
        if jobs.is_empty() {
            return Err(ExtractError::NoTables {
                database: request.database.clone(),
                schemas: request.schemas.clone(),
            });
        }
        info!(tables = jobs.len(), output = %plan.output_dir.display(), "Starting extraction");

        let results: Vec<_> = stream::iter(jobs)
            .map(|table| {
                let plan = &plan;
                async move {
                    let result = self.extract_table(plan, &table).await;
                    (table, result)
                }
            })
            .buffered(request.parallelism)
            .collect()
            .await;

        let mut summary = ExtractSummary {
            database: request.database.clone(),
            date,
            output_dir: plan.output_dir.clone(),
            files: Vec::new(),
            failures: Vec::new(),
        };
        for (table, result) in results {
            match result {
                Ok(files) => summary.files.extend(files),
                Err(e) => {
                    warn!(table = %table, error = %e, "Table extraction failed");
                    summary.failures.push(TableFailure {
                        schema: table.schema,
                        table: table.table,
                        error: e.to_string(),
                    });
                },
            }
        }

        info!(
            files = summary.files.len(),
            failures = summary.failures.len(),
            "Extraction finished"
        );
        Ok(summary)
    }

    /// Format first, then data; stops at the first failing command
    async fn extract_table(&self, plan: &Plan<'_>, table: &TableRef) -> Result<Vec<PathBuf>> {
        let mut commands = Vec::new();
        let with_format = match plan.products {
            Products::FormatOnly => true,
            Products::Dump { with_format } => with_format,
        };
        if with_format {
            commands.push(("format", BcpCommand::format(table.clone(), &plan.output_dir)));
        }
        if let Products::Dump { .. } = plan.products {
            let dump = match &plan.request.mode {
                ExtractMode::Full => BcpCommand::out(table.clone(), &plan.output_dir),
                ExtractMode::Incremental(window) => BcpCommand::query_out(table, window, &plan.output_dir),
            };
            commands.push(("data", dump));
        }

        let mut files = Vec::with_capacity(commands.len());
        for (label, mut command) in commands {
            if plan.qualify_files {
                command = command.file_stem(&format!("{}.{}", table.schema, table.table));
            }
            let log_name = log_file_name(table, label);
            let command = command
                .program(&self.bcp_program)
                .connection(plan.request.connection.clone())
                .log_file(plan.output_logs.join(&log_name))
                .error_file(plan.error_logs.join(&log_name));
            files.push(command.run().await?);
        }
        Ok(files)
    }
}

fn log_file_name(table: &TableRef, label: &str) -> String {
    format!("{}.{}.{}.log", table.schema, table.table, label)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;

    #[test]
    fn test_request_defaults() {
        let request = ExtractRequest::new("jade", "/data");
        assert_eq!(request.schemas, vec!["dbo"]);
        assert!(request.include_format);
        assert_eq!(request.mode, ExtractMode::Full);
        assert_eq!(request.output_dir("20240131"), PathBuf::from("/data/20240131/jade"));
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_request_validation() {
        assert!(ExtractRequest::new("jade", "/d").date("2024-01-31").validate().is_err());
        assert!(ExtractRequest::new("jade", "/d").date("20241332").validate().is_err());
        assert!(ExtractRequest::new("jade", "/d").date("20240131").validate().is_ok());
        assert!(ExtractRequest::new("jade", "/d").schemas(Vec::<String>::new()).validate().is_err());
        assert!(ExtractRequest::new("jade", "/d").tables(["ok", "no;pe"]).validate().is_err());
        assert!(ExtractRequest::new("jade", "/d").parallelism(0).validate().is_err());
    }

    #[test]
    fn test_resolved_date_defaults_to_today() {
        let request = ExtractRequest::new("jade", "/d");
        assert_eq!(request.resolved_date().len(), 8);
        assert_eq!(request.date("20200101").resolved_date(), "20200101");
    }

    #[test]
    fn test_summary_key_prefix() {
        let summary = ExtractSummary {
            database: "jade".into(),
            date: "20240131".into(),
            output_dir: PathBuf::from("/d/20240131/jade"),
            files: vec![],
            failures: vec![],
        };
        assert_eq!(summary.key_prefix(), "jade/20240131");
        assert!(summary.is_success());
    }

    #[tokio::test]
    async fn test_empty_catalog_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let extractor = Extractor::new(StaticCatalog::default());
        let err = extractor
            .extract(&ExtractRequest::new("jade", dir.path()).date("20240131"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::NoTables { .. }));
    }

    #[tokio::test]
    async fn test_missing_bcp_recorded_as_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let extractor = Extractor::new(StaticCatalog::new(["orders"])).bcp_program("/nonexistent/landing/bcp");
        let summary = extractor
            .extract(&ExtractRequest::new("jade", dir.path()).date("20240131"))
            .await
            .unwrap();
        assert!(summary.files.is_empty());
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].table, "orders");
    }
}
