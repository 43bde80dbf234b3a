//! `packforge build`: run the batch through the scheduler

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use crate::backend::{BuildBackend, FarmBackend, LocalBackend};
use crate::display::{BuildDisplay, RenderWhen};
use crate::config::defaults::{DEFAULT_FARM_JOBS, DEFAULT_LOCAL_JOBS};
use crate::core::cycle::check_cycles;
use crate::core::graph::resolve_build_order;
use crate::core::item::BuildItem;
use crate::core::manifest::{BackendKind, BatchManifest};
use crate::core::scheduler::{require_all_done, Scheduler};
use crate::error::{ManifestError, PackforgeError, Result};
use crate::infra::farm::HttpFarmClient;
use crate::infra::repo::LocalRepo;
use crate::infra::resolver::CommandResolver;
use crate::infra::sandbox::SandboxRunner;

/// Arguments for `packforge build`.
#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Batch manifest to read
    #[arg(long, default_value = "packforge.toml")]
    pub manifest: PathBuf,

    /// Parallel build jobs (overrides the manifest)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Execution backend (overrides the manifest)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
}

fn make_backend(
    kind: BackendKind,
    manifest: &BatchManifest,
) -> Result<Arc<dyn BuildBackend>> {
    match kind {
        BackendKind::Local => {
            let local = manifest.local.as_ref().ok_or_else(|| {
                ManifestError::MissingSection {
                    section: "local".to_string(),
                }
            })?;
            let sandbox = SandboxRunner::new(&local.sandbox_command, &local.sandbox_config);
            let repo = Arc::new(LocalRepo::new(
                &local.repo,
                &local.workdir,
                local.index_command.clone(),
            ));
            Ok(Arc::new(LocalBackend::new(
                sandbox,
                repo,
                &local.workdir,
                local.package_command.clone(),
            )))
        }
        BackendKind::Farm => {
            let farm = manifest.farm.as_ref().ok_or_else(|| {
                ManifestError::MissingSection {
                    section: "farm".to_string(),
                }
            })?;
            let client = Arc::new(HttpFarmClient::new(&farm.base_url));
            Ok(Arc::new(FarmBackend::new(
                client,
                &farm.target,
                &farm.build_tag,
            )))
        }
    }
}

pub async fn run(args: &BuildArgs) -> Result<()> {
    let manifest = BatchManifest::load(&args.manifest)?;
    let kind = args.backend.unwrap_or(manifest.backend);

    let resolver = CommandResolver::new(manifest.resolver.command.clone());
    tracing::info!(
        packages = manifest.packages.len(),
        "expanding build requirements to determine build order"
    );
    let order = resolve_build_order(&resolver, &manifest.requirements()).await?;
    check_cycles(&order)?;

    let jobs = args.jobs.or(manifest.jobs).unwrap_or(match kind {
        BackendKind::Local => DEFAULT_LOCAL_JOBS.min(num_cpus::get()),
        BackendKind::Farm => DEFAULT_FARM_JOBS,
    });

    let backend = make_backend(kind, &manifest)?;
    let display = Arc::new(BuildDisplay::new());
    let mut scheduler = Scheduler::new(backend, order.build_after, jobs, Arc::clone(&display));
    for package in &manifest.packages {
        scheduler.add_item(BuildItem::new(package.name.clone(), package.source()?));
    }

    tracing::info!(jobs, backend = ?kind, "starting build");
    let guard = Arc::clone(&display).activate();
    let outcome = tokio::select! {
        outcome = scheduler.run() => outcome,
        _ = tokio::signal::ctrl_c() => {
            display.render(RenderWhen::Interrupted);
            drop(guard);
            return Err(PackforgeError::Generic("interrupted".to_string()));
        }
    };
    match outcome {
        Ok(()) => display.render(RenderWhen::Done),
        Err(error) => {
            display.render(RenderWhen::Exception);
            drop(guard);
            return Err(error);
        }
    }
    drop(guard);

    require_all_done(&scheduler)
}
