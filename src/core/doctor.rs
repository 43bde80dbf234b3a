//! Preflight checks for external commands
//!
//! The scheduler leans on several external tools (resolver, sandbox,
//! index, packaging). `doctor` verifies they can be found before a
//! batch is attempted.

use crate::core::manifest::{BackendKind, BatchManifest};

/// Result of a single command check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// What the command is used for
    pub role: String,
    /// The command that was looked up
    pub command: String,
    /// Resolved path, if found
    pub path: Option<String>,
}

impl CheckResult {
    /// Whether the command was found.
    pub fn passed(&self) -> bool {
        self.path.is_some()
    }
}

/// Collected check results for one manifest.
#[derive(Debug, Default)]
pub struct DoctorReport {
    /// Individual command checks
    pub checks: Vec<CheckResult>,
}

impl DoctorReport {
    /// Whether every checked command was found.
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(CheckResult::passed)
    }

    /// Commands that could not be found.
    pub fn missing(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|check| !check.passed())
    }
}

fn check(role: &str, command: &str) -> CheckResult {
    CheckResult {
        role: role.to_string(),
        command: command.to_string(),
        path: which::which(command)
            .ok()
            .map(|path| path.display().to_string()),
    }
}

/// Look up every external command the manifest's configuration uses.
pub fn run_checks(manifest: &BatchManifest) -> DoctorReport {
    let mut report = DoctorReport::default();
    report.checks.push(check("resolver", &manifest.resolver.command[0]));

    if manifest.backend == BackendKind::Local {
        if let Some(local) = &manifest.local {
            report.checks.push(check("sandbox", &local.sandbox_command));
            report.checks.push(check("index", &local.index_command[0]));
            report
                .checks
                .push(check("packaging", &local.package_command[0]));
        }
    }
    report
}
