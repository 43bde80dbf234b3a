//! Requirement resolution client
//!
//! Wraps the external dependency resolver: given a set of requirement
//! expressions it reports, per providing source package, which builds
//! satisfy them and why. The resolver runs as a subprocess and answers
//! in JSON on stdout.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ResolverError;

/// One build that provides a resolved requirement, with the chain of
/// requirements that led to it.
///
/// The explanation alternates [required-by, requirement, provided-by,
/// requirement, provided-by, ...]; `None` means the package was in the
/// input set itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Provider {
    /// Identifier of the providing build (e.g. an NVRA)
    pub name: String,
    /// Requirement chain that selected this provider
    #[serde(default)]
    pub explanation: Option<Vec<String>>,
}

/// Resolution result: providing source package -> providers.
pub type Resolution = BTreeMap<String, Vec<Provider>>;

/// Client for the external requirement resolver.
///
/// Implementations must be idempotent and side-effect free from the
/// caller's point of view; they may cache internally.
#[async_trait]
pub trait ResolverClient: Send + Sync {
    /// Resolve `requirements`, restricted to source packages named in
    /// `restrict_to`.
    async fn resolve(
        &self,
        requirements: &[String],
        restrict_to: &BTreeSet<String>,
    ) -> Result<Resolution, ResolverError>;
}

/// Resolver client that shells out to a configured command.
///
/// The requirement expressions are appended to the configured argument
/// vector; the command is expected to print a JSON object mapping
/// source package names to provider lists.
#[derive(Debug, Clone)]
pub struct CommandResolver {
    command: Vec<String>,
}

impl CommandResolver {
    /// Create a resolver around `command` (program plus fixed arguments).
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

#[async_trait]
impl ResolverClient for CommandResolver {
    async fn resolve(
        &self,
        requirements: &[String],
        restrict_to: &BTreeSet<String>,
    ) -> Result<Resolution, ResolverError> {
        tracing::debug!(
            command = %self.command_line(),
            requirements = requirements.len(),
            "invoking resolver"
        );

        let mut cmd = tokio::process::Command::new(&self.command[0]);
        cmd.args(&self.command[1..]).args(requirements);
        let output = cmd.output().await.map_err(|e| ResolverError::Spawn {
            command: self.command_line(),
            error: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(ResolverError::CommandFailed {
                command: self.command_line(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let mut resolution: Resolution = serde_json::from_slice(&output.stdout)
            .map_err(|e| ResolverError::InvalidOutput(e.to_string()))?;
        resolution.retain(|name, _| restrict_to.contains(name));
        Ok(resolution)
    }
}
