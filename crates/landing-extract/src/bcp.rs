//! `bcp` bulk-copy command builder
//!
//! Three operations are used:
//!
//! ```text
//! bcp db.schema.table format nul -c -x -f <dir>/<table>_format.xml -t, -o <log> -e <err> -T
//! bcp db.schema.table out <dir>/<table>.csv -c -t, -o <log> -e <err> -T
//! bcp "<query>" queryout <dir>/<table>.csv -c -t, -o <log> -e <err> -T
//! ```
//!
//! `-T` (trusted connection) is replaced by `-U user -P password` when both
//! credentials are present.

use crate::error::{validate_identifier, ExtractError, Result};
use crate::process;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Field terminator of the produced CSV files
pub const FIELD_TERMINATOR: &str = ",";

/// How to reach the source server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConnection {
    /// `-S` server (instance) name; the default local instance when absent
    pub server: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl SourceConnection {
    pub fn trusted() -> Self {
        Self::default()
    }

    pub fn with_login(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            server: None,
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    /// SQL login when both halves are present, else a trusted connection
    pub fn login(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }

    /// Server and authentication arguments; `trusted_flag` is `-T` for bcp, `-E` for sqlcmd
    pub(crate) fn args(&self, trusted_flag: &str) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(server) = &self.server {
            args.push("-S".to_string());
            args.push(server.clone());
        }
        match self.login() {
            Some((user, password)) => {
                args.extend(["-U".to_string(), user.to_string(), "-P".to_string(), password.to_string()]);
            },
            None => args.push(trusted_flag.to_string()),
        }
        args
    }
}

/// Fully qualified `db.schema.table`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub database: String,
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(database: &str, schema: &str, table: &str) -> Result<Self> {
        Ok(Self {
            database: validate_identifier(database)?.to_string(),
            schema: validate_identifier(schema)?.to_string(),
            table: validate_identifier(table)?.to_string(),
        })
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.table)
    }
}

/// Lower-exclusive, upper-inclusive bound on a change-tracking column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractWindow {
    pub column: String,
    pub last: String,
    pub current: String,
}

impl ExtractWindow {
    /// Values are compared as strings, so both must share one sortable format
    pub fn new(column: impl Into<String>, last: impl Into<String>, current: impl Into<String>) -> Result<Self> {
        let window = Self {
            column: column.into(),
            last: last.into(),
            current: current.into(),
        };
        validate_identifier(&window.column)?;
        if window.last >= window.current {
            return Err(ExtractError::InvalidWindow {
                last: window.last,
                current: window.current,
            });
        }
        Ok(window)
    }
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `SELECT * FROM t WHERE t.col > 'last' AND t.col <= 'current'`
pub fn incremental_query(table: &TableRef, window: &ExtractWindow) -> String {
    format!(
        "SELECT * FROM {table} WHERE {table}.{column} > {last} AND {table}.{column} <= {current}",
        table = table,
        column = window.column,
        last = quote_literal(&window.last),
        current = quote_literal(&window.current),
    )
}

/// What one `bcp` run produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BcpOperation {
    /// XML format file describing the table
    Format { table: TableRef, format_file: PathBuf },
    /// Whole-table character-mode dump
    Out { table: TableRef, data_file: PathBuf },
    /// Dump of an arbitrary query
    QueryOut { query: String, data_file: PathBuf },
}

impl BcpOperation {
    /// File written by the operation
    pub fn output_file(&self) -> &Path {
        match self {
            BcpOperation::Format { format_file, .. } => format_file,
            BcpOperation::Out { data_file, .. } | BcpOperation::QueryOut { data_file, .. } => data_file,
        }
    }
}

/// One `bcp` invocation
#[derive(Debug, Clone)]
pub struct BcpCommand {
    program: PathBuf,
    operation: BcpOperation,
    connection: SourceConnection,
    log_file: Option<PathBuf>,
    error_file: Option<PathBuf>,
}

impl BcpCommand {
    pub fn new(operation: BcpOperation) -> Self {
        Self {
            program: PathBuf::from("bcp"),
            operation,
            connection: SourceConnection::trusted(),
            log_file: None,
            error_file: None,
        }
    }

    pub fn format(table: TableRef, output_dir: &Path) -> Self {
        let format_file = output_dir.join(format!("{}_format.xml", table.table));
        Self::new(BcpOperation::Format { table, format_file })
    }

    pub fn out(table: TableRef, output_dir: &Path) -> Self {
        let data_file = output_dir.join(format!("{}.csv", table.table));
        Self::new(BcpOperation::Out { table, data_file })
    }

    pub fn query_out(table: &TableRef, window: &ExtractWindow, output_dir: &Path) -> Self {
        let data_file = output_dir.join(format!("{}.csv", table.table));
        Self::new(BcpOperation::QueryOut {
            query: incremental_query(table, window),
            data_file,
        })
    }

    /// Rename the output to `<stem>_format.xml` or `<stem>.csv` in the same directory
    pub fn file_stem(mut self, stem: &str) -> Self {
        match &mut self.operation {
            BcpOperation::Format { format_file, .. } => {
                format_file.set_file_name(format!("{}_format.xml", stem));
            },
            BcpOperation::Out { data_file, .. } | BcpOperation::QueryOut { data_file, .. } => {
                data_file.set_file_name(format!("{}.csv", stem));
            },
        }
        self
    }

    /// Use another executable, e.g. a full path to `bcp`
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn connection(mut self, connection: SourceConnection) -> Self {
        self.connection = connection;
        self
    }

    /// `-o` file receiving bcp's own output
    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// `-e` file receiving rejected rows
    pub fn error_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_file = Some(path.into());
        self
    }

    pub fn operation(&self) -> &BcpOperation {
        &self.operation
    }

    pub fn args(&self) -> Vec<String> {
        let path = |p: &Path| p.display().to_string();
        let mut args = match &self.operation {
            BcpOperation::Format { table, format_file } => vec![
                table.to_string(),
                "format".to_string(),
                "nul".to_string(),
                "-c".to_string(),
                "-x".to_string(),
                "-f".to_string(),
                path(format_file),
            ],
            BcpOperation::Out { table, data_file } => {
                vec![table.to_string(), "out".to_string(), path(data_file), "-c".to_string()]
            },
            BcpOperation::QueryOut { query, data_file } => {
                vec![query.clone(), "queryout".to_string(), path(data_file), "-c".to_string()]
            },
        };

        args.push(format!("-t{}", FIELD_TERMINATOR));
        if let Some(log) = &self.log_file {
            args.push("-o".to_string());
            args.push(path(log));
        }
        if let Some(err) = &self.error_file {
            args.push("-e".to_string());
            args.push(path(err));
        }
        args.extend(self.connection.args("-T"));
        args
    }

    /// Create the output and log directories, then run `bcp`
    #[instrument(skip_all, fields(output = %self.operation.output_file().display()))]
    pub async fn run(&self) -> Result<PathBuf> {
        let output = self.operation.output_file();
        for dir in [Some(output), self.log_file.as_deref(), self.error_file.as_deref()]
            .into_iter()
            .flatten()
            .filter_map(Path::parent)
            .filter(|dir| !dir.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(dir).await?;
        }

        process::run(&self.program, &self.args()).await?;
        info!("bcp finished");
        Ok(output.to_path_buf())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn table() -> TableRef {
        TableRef::new("jade", "dbo", "address_type").unwrap()
    }

    #[test]
    fn test_format_args_trusted() {
        let cmd = BcpCommand::format(table(), Path::new("out"))
            .log_file("logs/output/a.log")
            .error_file("logs/error/a.log");
        let format_file = Path::new("out").join("address_type_format.xml").display().to_string();
        assert_eq!(
            cmd.args(),
            vec![
                "jade.dbo.address_type", "format", "nul", "-c", "-x", "-f", format_file.as_str(),
                "-t,", "-o", "logs/output/a.log", "-e", "logs/error/a.log", "-T",
            ]
        );
    }

    #[test]
    fn test_out_args_with_login_and_server() {
        let cmd = BcpCommand::out(table(), Path::new("out"))
            .connection(SourceConnection::with_login("loader", "pw").server("db01\\SQL2017"));
        let args = cmd.args();
        assert_eq!(&args[..2], ["jade.dbo.address_type", "out"]);
        assert!(args[2].ends_with("address_type.csv"));
        assert_eq!(&args[3..], ["-c", "-t,", "-S", "db01\\SQL2017", "-U", "loader", "-P", "pw"]);
    }

    #[test]
    fn test_file_stem_renames_output_in_place() {
        let dir = Path::new("out");
        let format = BcpCommand::format(table(), dir).file_stem("dbo.address_type");
        assert_eq!(format.operation().output_file(), dir.join("dbo.address_type_format.xml"));

        let window = ExtractWindow::new("modified_at", "20240101", "20240102").unwrap();
        let data = BcpCommand::query_out(&table(), &window, dir).file_stem("dbo.address_type");
        assert_eq!(data.operation().output_file(), dir.join("dbo.address_type.csv"));
    }

    #[test]
    fn test_half_login_falls_back_to_trusted() {
        let connection = SourceConnection {
            username: Some("loader".into()),
            ..SourceConnection::default()
        };
        assert!(connection.login().is_none());
        assert_eq!(connection.args("-T"), vec!["-T"]);
    }

    #[test]
    fn test_incremental_query() {
        let window = ExtractWindow::new("modified_at", "2024-01-01 00:00:00", "2024-01-02 00:00:00").unwrap();
        assert_eq!(
            incremental_query(&table(), &window),
            "SELECT * FROM jade.dbo.address_type WHERE jade.dbo.address_type.modified_at > \
             '2024-01-01 00:00:00' AND jade.dbo.address_type.modified_at <= '2024-01-02 00:00:00'"
        );

        let cmd = BcpCommand::query_out(&table(), &window, Path::new("out"));
        assert_eq!(cmd.args()[1], "queryout");
        assert!(cmd.args()[0].starts_with("SELECT * FROM"));
    }

    #[test]
    fn test_quotes_in_window_values_escaped() {
        let window = ExtractWindow::new("c", "a'", "b").unwrap();
        assert!(incremental_query(&table(), &window).contains("> 'a'''"));
    }

    #[test]
    fn test_window_must_move_forward() {
        assert!(matches!(
            ExtractWindow::new("c", "20240102", "20240101"),
            Err(ExtractError::InvalidWindow { .. })
        ));
        assert!(ExtractWindow::new("c", "20240101", "20240101").is_err());
        assert!(ExtractWindow::new("bad col", "1", "2").is_err());
    }

    #[test]
    fn test_table_ref_rejects_dotted_names() {
        assert!(TableRef::new("jade", "dbo", "a.b").is_err());
    }
}
