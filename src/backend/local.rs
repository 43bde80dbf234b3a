//! Local sandbox build backend
//!
//! Each item is built by an external sandbox tool inside a
//! slot-numbered instance. While the build runs, its structured stage
//! log is tailed to derive a live status; on success the produced
//! artifacts move into the shared local repository, on failure the
//! sandbox is left in place and the item records how to enter it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use crate::backend::{BuildBackend, ItemReporter};
use crate::config::defaults::{ARTIFACT_SUFFIX, LOG_REFRESH_INTERVAL};
use crate::core::item::{BuildItem, BuildSource};
use crate::error::{Result, SandboxError};
use crate::infra::repo::LocalRepo;
use crate::infra::sandbox::SandboxRunner;

static STAGE_RE: OnceLock<Regex> = OnceLock::new();
static WROTE_RE: OnceLock<Regex> = OnceLock::new();

fn stage_re() -> &'static Regex {
    STAGE_RE.get_or_init(|| Regex::new(r"^.*?(Start|Finish):\s*(.*?)\s*$").expect("stage regex"))
}

fn wrote_re() -> &'static Regex {
    WROTE_RE.get_or_init(|| Regex::new(r"Wrote:\s*(\S+)").expect("wrote regex"))
}

/// Backend that builds items in local sandboxes.
#[derive(Debug)]
pub struct LocalBackend {
    sandbox: SandboxRunner,
    repo: Arc<LocalRepo>,
    base_workdir: PathBuf,
    package_command: Vec<String>,
}

impl LocalBackend {
    /// Create a local backend.
    ///
    /// `package_command` turns a source tree into a source artifact
    /// (run inside the tree, artifact path scraped from its output).
    pub fn new(
        sandbox: SandboxRunner,
        repo: Arc<LocalRepo>,
        base_workdir: impl Into<PathBuf>,
        package_command: Vec<String>,
    ) -> Self {
        Self {
            sandbox,
            repo,
            base_workdir: base_workdir.into(),
            package_command,
        }
    }

    /// Package a source tree into a source artifact.
    ///
    /// Returns `None` when the packaging command failed and the item
    /// has already been marked failed.
    async fn package_source_tree(
        &self,
        tree: &Path,
        workdir: &Path,
        reporter: &ItemReporter,
    ) -> Result<Option<String>> {
        reporter.status("Packaging source tree");

        let log_path = workdir.join("package_source.log");
        let logfile = open_log(&log_path)?;
        let stderr_file = clone_log(&logfile, &log_path)?;

        let mut cmd = tokio::process::Command::new(&self.package_command[0]);
        cmd.args(&self.package_command[1..])
            .current_dir(tree)
            .stdout(Stdio::from(logfile))
            .stderr(Stdio::from(stderr_file));
        let status = cmd.status().await.map_err(|e| SandboxError::Spawn {
            command: self.package_command.join(" "),
            error: e.to_string(),
        })?;

        if !status.success() {
            reporter.failed(
                format!(
                    "'{}' failed, see {}",
                    self.package_command.join(" "),
                    log_path.display()
                ),
                Vec::new(),
            );
            return Ok(None);
        }

        let content =
            std::fs::read_to_string(&log_path).map_err(|e| SandboxError::Io {
                path: log_path.clone(),
                error: e.to_string(),
            })?;
        for line in content.lines() {
            if let Some(caps) = wrote_re().captures(line) {
                return Ok(Some(caps[1].to_string()));
            }
        }
        Err(SandboxError::SourceArtifactNotFound { log: log_path }.into())
    }
}

#[async_trait]
impl BuildBackend for LocalBackend {
    async fn prepare(&self) -> Result<()> {
        // The repository is a requirement source for the sandbox as
        // well as a destination, so it must be valid before the first
        // build references it.
        self.repo.ensure_valid().await?;
        tokio::fs::create_dir_all(&self.base_workdir).await?;
        Ok(())
    }

    async fn build_item(
        &self,
        item: BuildItem,
        slot: usize,
        reporter: ItemReporter,
    ) -> Result<()> {
        let workdir = self.base_workdir.join(&item.name);
        let _ = tokio::fs::remove_dir_all(&workdir).await;
        tokio::fs::create_dir_all(&workdir)
            .await
            .map_err(|e| SandboxError::Io {
                path: workdir.clone(),
                error: e.to_string(),
            })?;

        let source = match &item.source {
            BuildSource::Artifact(location) => location.clone(),
            BuildSource::Tree(tree) => {
                match self.package_source_tree(tree, &workdir, &reporter).await? {
                    Some(location) => location,
                    None => return Ok(()),
                }
            }
        };

        reporter.status(workdir.display().to_string());

        let output_log = workdir.join("sandbox_output.log");
        let outfile = open_log(&output_log)?;
        let errfile = clone_log(&outfile, &output_log)?;
        let mut cmd = self.sandbox.rebuild_command(slot, &workdir, &source);
        cmd.stdout(Stdio::from(outfile)).stderr(Stdio::from(errfile));
        let mut child = cmd.spawn().map_err(|e| SandboxError::Spawn {
            command: format!("{source} rebuild"),
            error: e.to_string(),
        })?;

        let tail_workdir = workdir.clone();
        let tail_reporter = reporter.clone();
        let tail = tokio::spawn(async move {
            loop {
                refresh_progress(&tail_workdir, &tail_reporter);
                tokio::time::sleep(LOG_REFRESH_INTERVAL).await;
            }
        });
        let wait_result = child.wait().await;
        tail.abort();
        let _ = tail.await;
        // One final read so the last log update is never lost.
        refresh_progress(&workdir, &reporter);

        let status = wait_result.map_err(|e| SandboxError::Io {
            path: workdir.clone(),
            error: e.to_string(),
        })?;

        if status.success() {
            reporter.status("Cleaning build root");
            let mut clean = self.sandbox.clean_command(slot);
            if let Ok(logfile) = std::fs::OpenOptions::new().append(true).open(&output_log) {
                if let Ok(errfile) = logfile.try_clone() {
                    clean.stdout(Stdio::from(logfile)).stderr(Stdio::from(errfile));
                }
            }
            match clean.status().await {
                Ok(status) if status.success() => {}
                _ => {
                    tracing::warn!(
                        "'{}' failed",
                        self.sandbox.clean_command_line(slot)
                    );
                }
            }

            reporter.status("Moving result artifacts");
            let artifacts = collect_artifacts(&workdir)?;
            self.repo.install_artifacts(&artifacts).await?;
            reporter.done("Built successfully");
        } else {
            let root = self.sandbox.print_root_path(slot).await?;
            let shell = self.sandbox.shell_command_line(slot);
            reporter.failed(
                "Build failed",
                vec![
                    format!("Build root: {root}"),
                    format!("Enter build root: {shell}"),
                ],
            );
        }
        Ok(())
    }

    fn retire_slot_on_failure(&self) -> bool {
        // The failed sandbox instance is kept for inspection; its slot
        // must not be reused by another build.
        true
    }
}

fn open_log(path: &Path) -> Result<std::fs::File> {
    std::fs::File::create(path)
        .map_err(|e| {
            SandboxError::Io {
                path: path.to_path_buf(),
                error: e.to_string(),
            }
            .into()
        })
}

fn clone_log(file: &std::fs::File, path: &Path) -> Result<std::fs::File> {
    file.try_clone().map_err(|e| {
        SandboxError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        }
        .into()
    })
}

/// Binary artifacts produced into `workdir`, in name order.
fn collect_artifacts(workdir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(workdir).map_err(|e| SandboxError::Io {
        path: workdir.to_path_buf(),
        error: e.to_string(),
    })?;
    let mut artifacts: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(ARTIFACT_SUFFIX))
        })
        .collect();
    artifacts.sort();
    Ok(artifacts)
}

/// Refresh an item's log file list and stage-derived status.
fn refresh_progress(workdir: &Path, reporter: &ItemReporter) {
    let mut log_files: Vec<PathBuf> = std::fs::read_dir(workdir)
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| {
                    path.extension().and_then(|e| e.to_str()) == Some("log")
                })
                .collect()
        })
        .unwrap_or_default();
    log_files.sort();
    reporter.progress(stage_status(&workdir.join("state.log")), log_files);
}

/// Derive a status from the structured stage log: stages are pushed on
/// `Start:` and popped on a matching `Finish:`; the innermost open
/// stage wins.
fn stage_status(state_log: &Path) -> String {
    let Ok(content) = std::fs::read_to_string(state_log) else {
        return "Building".to_string();
    };
    let mut stack: Vec<&str> = Vec::new();
    for line in content.lines() {
        let Some(caps) = stage_re().captures(line) else {
            continue;
        };
        let stage = caps.get(2).map_or("", |m| m.as_str());
        match &caps[1] {
            "Start" => stack.push(stage),
            "Finish" if stack.last() == Some(&stage) => {
                stack.pop();
            }
            _ => {}
        }
    }
    stack
        .last()
        .map_or_else(|| "Building".to_string(), |stage| (*stage).to_string())
}
