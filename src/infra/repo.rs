//! Shared local package repository
//!
//! All repository mutation happens under one async lock: artifacts from
//! a finished build are placed and the index regenerated inside a
//! single critical section, so two builds' results are never
//! interleaved and the index always reflects the placement it follows.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::sync::Mutex;

use crate::error::RepoError;

/// Shared local repository fed by successful sandbox builds.
#[derive(Debug)]
pub struct LocalRepo {
    path: PathBuf,
    workdir: PathBuf,
    index_command: Vec<String>,
    lock: Mutex<()>,
}

impl LocalRepo {
    /// Create a repository at `path`, logging index runs under
    /// `workdir`.
    pub fn new(path: impl Into<PathBuf>, workdir: impl Into<PathBuf>, index_command: Vec<String>) -> Self {
        Self {
            path: path.into(),
            workdir: workdir.into(),
            index_command,
            lock: Mutex::new(()),
        }
    }

    /// Repository directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make sure the repository exists and carries an index.
    ///
    /// The repository doubles as a requirement source for the sandbox,
    /// so it must be valid before the first build starts.
    pub async fn ensure_valid(&self) -> Result<(), RepoError> {
        tokio::fs::create_dir_all(&self.path)
            .await
            .map_err(|e| RepoError::CreateDir {
                path: self.path.clone(),
                error: e.to_string(),
            })?;
        if !self.path.join("repodata/repomd.xml").exists() {
            self.regenerate().await?;
        }
        Ok(())
    }

    /// Regenerate the repository index.
    pub async fn regenerate(&self) -> Result<(), RepoError> {
        let _guard = self.lock.lock().await;
        self.regenerate_locked().await
    }

    /// Move `artifacts` into the repository and regenerate the index,
    /// all inside one critical section.
    pub async fn install_artifacts(&self, artifacts: &[PathBuf]) -> Result<(), RepoError> {
        let _guard = self.lock.lock().await;
        for artifact in artifacts {
            let Some(file_name) = artifact.file_name() else {
                continue;
            };
            let dest = self.path.join(file_name);
            let _ = tokio::fs::remove_file(&dest).await;
            move_file(artifact, &dest).await?;
        }
        self.regenerate_locked().await
    }

    async fn regenerate_locked(&self) -> Result<(), RepoError> {
        tokio::fs::create_dir_all(&self.workdir)
            .await
            .map_err(|e| RepoError::CreateDir {
                path: self.workdir.clone(),
                error: e.to_string(),
            })?;
        let log = self.workdir.join("createrepo.log");
        let logfile = std::fs::File::create(&log).map_err(|e| RepoError::CreateDir {
            path: log.clone(),
            error: e.to_string(),
        })?;
        let stderr_file = logfile.try_clone().map_err(|e| RepoError::CreateDir {
            path: log.clone(),
            error: e.to_string(),
        })?;

        let mut cmd = tokio::process::Command::new(&self.index_command[0]);
        cmd.args(&self.index_command[1..])
            .arg(&self.path)
            .stdout(Stdio::from(logfile))
            .stderr(Stdio::from(stderr_file));
        let status = cmd.status().await.map_err(|e| RepoError::Spawn {
            command: self.index_command.join(" "),
            error: e.to_string(),
        })?;
        if !status.success() {
            tracing::error!(log = %log.display(), "repository index regeneration failed");
            return Err(RepoError::IndexFailed { log });
        }
        Ok(())
    }
}

/// Move a file, falling back to copy-and-remove across filesystems.
async fn move_file(src: &Path, dest: &Path) -> Result<(), RepoError> {
    if tokio::fs::rename(src, dest).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(src, dest)
        .await
        .map_err(|e| RepoError::MoveArtifact {
            path: src.to_path_buf(),
            error: e.to_string(),
        })?;
    tokio::fs::remove_file(src)
        .await
        .map_err(|e| RepoError::MoveArtifact {
            path: src.to_path_buf(),
            error: e.to_string(),
        })
}
