//! `packforge doctor`: preflight checks for external commands

use std::path::PathBuf;

use clap::Args;

use crate::cli::output::display_status;
use crate::core::doctor::run_checks;
use crate::core::manifest::BatchManifest;
use crate::error::{PackforgeError, Result};

/// Arguments for `packforge doctor`.
#[derive(Debug, Args)]
pub struct DoctorArgs {
    /// Batch manifest to read
    #[arg(long, default_value = "packforge.toml")]
    pub manifest: PathBuf,
}

pub fn run(args: &DoctorArgs) -> Result<()> {
    let manifest = BatchManifest::load(&args.manifest)?;
    let report = run_checks(&manifest);

    for check in &report.checks {
        let message = match &check.path {
            Some(path) => format!("{} command '{}' found at {path}", check.role, check.command),
            None => format!("{} command '{}' not found", check.role, check.command),
        };
        display_status(check.passed(), &message);
    }

    if report.all_passed() {
        Ok(())
    } else {
        let missing: Vec<&str> = report
            .missing()
            .map(|check| check.command.as_str())
            .collect();
        Err(PackforgeError::Generic(format!(
            "missing external commands: {}",
            missing.join(" ")
        )))
    }
}
