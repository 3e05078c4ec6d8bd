//! Building the `ctlprog-server` binary for the remote host.

use anyhow::{Context, bail};
use chrono::{SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

pub const SERVER_BIN: &str = "ctlprog-server";

/// Build metadata baked into the server through `option_env!`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub tag: String,
    pub commit: String,
    pub date: String,
}

impl BuildInfo {
    pub fn new(commit: impl Into<String>) -> Self {
        Self {
            tag: "dev".to_string(),
            commit: commit.into(),
            date: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Variables set on the `cargo build` child process.
    pub fn env(&self) -> [(&'static str, &str); 3] {
        [
            ("CTLPROG_BUILD_TAG", self.tag.as_str()),
            ("CTLPROG_BUILD_COMMIT", self.commit.as_str()),
            ("CTLPROG_BUILD_DATE", self.date.as_str()),
        ]
    }
}

/// Where cargo leaves the release binary for `target`.
pub fn binary_path(src_dir: &Path, target: &str) -> PathBuf {
    src_dir
        .join("target")
        .join(target)
        .join("release")
        .join(SERVER_BIN)
}

/// `git rev-parse HEAD` in `src_dir`.
pub async fn git_commit(src_dir: &Path) -> anyhow::Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(src_dir)
        .stderr(Stdio::inherit())
        .output()
        .await
        .context("failed to run git")?;
    if !output.status.success() {
        bail!("git rev-parse HEAD exited with {}", output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Builds the server in release mode for `target` and returns the binary.
#[tracing::instrument(skip(src_dir), fields(src_dir = %src_dir.display()))]
pub async fn build_server(src_dir: &Path, target: &str) -> anyhow::Result<Vec<u8>> {
    tracing::info!("building {SERVER_BIN}");

    let info = BuildInfo::new(git_commit(src_dir).await?);
    tracing::debug!(?info, "build info");

    let status = Command::new("cargo")
        .args(["build", "--release", "--bin", SERVER_BIN, "--target", target])
        .current_dir(src_dir)
        .envs(info.env())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .context("failed to run cargo")?;
    if !status.success() {
        bail!("cargo build exited with {status}");
    }

    let path = binary_path(src_dir, target);
    let binary = tokio::fs::read(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    tracing::info!("{SERVER_BIN} executable: {} bytes", binary.len());
    Ok(binary)
}
