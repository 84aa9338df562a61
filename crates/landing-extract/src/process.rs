//! External program invocation
//!
//! Programs are started with an explicit argument vector, never through a
//! shell. Arguments that carry secrets are masked in logs.

use crate::error::{ExtractError, Result};
use std::ffi::OsStr;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, warn};

const MASK: &str = "****";

/// Render a command line for logs, masking the value after `-P`
pub fn redacted_command_line(program: &OsStr, args: &[String]) -> String {
    let mut rendered = vec![program.to_string_lossy().into_owned()];
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            rendered.push(MASK.to_string());
            mask_next = false;
            continue;
        }
        mask_next = arg == "-P";
        if arg.contains(' ') {
            rendered.push(format!("\"{}\"", arg));
        } else {
            rendered.push(arg.clone());
        }
    }
    rendered.join(" ")
}

/// Run `program` to completion and return its stdout
///
/// A non-zero exit becomes [`ExtractError::CommandFailed`] carrying stderr
/// (or stdout when stderr is empty, as `bcp` reports most errors there).
pub async fn run(program: &Path, args: &[String]) -> Result<String> {
    let command_line = redacted_command_line(program.as_os_str(), args);
    debug!(command = %command_line, "Running external program");

    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ExtractError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        return Ok(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if stderr.is_empty() { stdout.trim().to_string() } else { stderr };
    warn!(command = %command_line, status = ?output.status.code(), error = %message, "External program failed");

    Err(ExtractError::CommandFailed {
        program: program.display().to_string(),
        status: output.status.code(),
        stderr: message,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_password_masked() {
        let line = redacted_command_line(
            OsStr::new("bcp"),
            &args(&["db.dbo.t", "out", "t.csv", "-U", "loader", "-P", "s3cr3t"]),
        );
        assert_eq!(line, "bcp db.dbo.t out t.csv -U loader -P ****");
        assert!(!line.contains("s3cr3t"));
    }

    #[test]
    fn test_spaced_arguments_quoted() {
        let line = redacted_command_line(OsStr::new("bcp"), &args(&["SELECT * FROM t", "queryout"]));
        assert_eq!(line, "bcp \"SELECT * FROM t\" queryout");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = run(Path::new("/nonexistent/landing/bcp"), &[]).await.unwrap_err();
        assert!(matches!(err, ExtractError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_carries_status_and_message() {
        let err = run(Path::new("sh"), &args(&["-c", "echo boom >&2; exit 3"]))
            .await
            .unwrap_err();
        match err {
            ExtractError::CommandFailed { status, stderr, .. } => {
                assert_eq!(status, Some(3));
                assert_eq!(stderr, "boom");
            },
            other => panic!("unexpected error: {other}"),
        }
    }
}
