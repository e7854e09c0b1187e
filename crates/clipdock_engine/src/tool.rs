use std::path::PathBuf;
use std::time::Duration;

use clipdock_core::Channel;
use clipdock_logging::{engine_debug, engine_info, engine_warn};
use thiserror::Error;

const PERMISSION_PATTERNS: &[&str] = &[
    "permission denied",
    "eacces",
    "eperm",
    "operation not permitted",
    "access is denied",
];

const NETWORK_PATTERNS: &[&str] = &[
    "network is unreachable",
    "unable to connect",
    "connection refused",
    "connection reset",
    "could not resolve",
    "name or service not known",
    "getaddrinfo",
    "enotfound",
    "urlopen error",
    "timed out",
    "unable to download",
];

const UP_TO_DATE_PATTERNS: &[&str] = &["is up to date", "already up to date", "already up-to-date"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("tool not found at {0}")]
    NotInstalled(String),
    #[error("failed to run tool: {0}")]
    Io(String),
    #[error("tool did not finish within {0:?}")]
    Timeout(Duration),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("network unreachable: {0}")]
    Network(String),
    #[error("verification failed: {0}")]
    Verification(String),
    #[error("tool failed: {0}")]
    Failed(String),
}

/// Runs the external download tool with the given arguments.
#[async_trait::async_trait]
pub trait VersionTool: Send + Sync {
    async fn run(&self, args: &[&str]) -> Result<ToolOutput, ToolError>;
}

#[derive(Debug, Clone)]
pub struct ProcessVersionTool {
    program: PathBuf,
    timeout: Duration,
}

impl ProcessVersionTool {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl VersionTool for ProcessVersionTool {
    async fn run(&self, args: &[&str]) -> Result<ToolOutput, ToolError> {
        engine_debug!("Running {} {}", self.program.display(), args.join(" "));
        let mut command = tokio::process::Command::new(&self.program);
        command.args(args).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => return Err(ToolError::Timeout(self.timeout)),
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::NotInstalled(self.program.display().to_string()))
            }
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(ToolError::PermissionDenied(err.to_string()))
            }
            Ok(Err(err)) => return Err(ToolError::Io(err.to_string())),
            Ok(Ok(output)) => output,
        };

        Ok(ToolOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Reads the installed version via `--version`.
pub async fn read_version(tool: &dyn VersionTool) -> Result<String, ToolError> {
    let output = tool.run(&["--version"]).await?;
    if !output.success {
        return Err(classify_failure(&output));
    }
    let version = output.stdout.trim();
    if version.is_empty() {
        return Err(ToolError::Failed("empty version output".to_string()));
    }
    Ok(version.to_string())
}

/// Self-updates the tool to the latest release of `channel` and returns the
/// version read back afterwards.
///
/// "Already up to date" counts as success once the version re-reads cleanly.
/// A reported update that leaves the version unchanged is a verification
/// failure.
pub async fn remediate(tool: &dyn VersionTool, channel: Channel) -> Result<String, ToolError> {
    if channel == Channel::Unknown {
        return Err(ToolError::Failed("no release channel selected".to_string()));
    }
    let before = read_version(tool).await.ok();
    let target = format!("{channel}@latest");
    engine_info!(
        "Updating yt-dlp from {} to {target}",
        before.as_deref().unwrap_or("unknown")
    );

    let output = tool.run(&["--update-to", target.as_str()]).await?;
    let already_current = mentions_any(&output.stdout, UP_TO_DATE_PATTERNS)
        || mentions_any(&output.stderr, UP_TO_DATE_PATTERNS);
    if !output.success && !already_current {
        return Err(classify_failure(&output));
    }

    let after = read_version(tool)
        .await
        .map_err(|err| ToolError::Verification(format!("could not read version after update: {err}")))?;
    if !already_current && before.as_deref() == Some(after.as_str()) {
        engine_warn!("yt-dlp reported an update but still reports {after}");
        return Err(ToolError::Verification(format!("version unchanged at {after}")));
    }
    Ok(after)
}

/// Maps a failed run onto a user-facing category by matching known phrases.
pub fn classify_failure(output: &ToolOutput) -> ToolError {
    let detail = if output.stderr.trim().is_empty() {
        output.stdout.trim()
    } else {
        output.stderr.trim()
    };
    let detail = if detail.is_empty() {
        "exited with a non-zero status".to_string()
    } else {
        detail.to_string()
    };

    if mentions_any(&detail, PERMISSION_PATTERNS) {
        ToolError::PermissionDenied(detail)
    } else if mentions_any(&detail, NETWORK_PATTERNS) {
        ToolError::Network(detail)
    } else {
        ToolError::Failed(detail)
    }
}

fn mentions_any(text: &str, patterns: &[&str]) -> bool {
    let lower = text.to_ascii_lowercase();
    patterns.iter().any(|pattern| lower.contains(pattern))
}
