//! `packforge order`: print the build-after graph without building

use std::path::PathBuf;

use clap::Args;

use crate::core::cycle::check_cycles;
use crate::core::graph::{explanation_lines, resolve_build_order};
use crate::core::manifest::BatchManifest;
use crate::error::Result;
use crate::infra::resolver::CommandResolver;

/// Arguments for `packforge order`.
#[derive(Debug, Args)]
pub struct OrderArgs {
    /// Batch manifest to read
    #[arg(long, default_value = "packforge.toml")]
    pub manifest: PathBuf,
}

pub async fn run(args: &OrderArgs) -> Result<()> {
    let manifest = BatchManifest::load(&args.manifest)?;
    let resolver = CommandResolver::new(manifest.resolver.command.clone());

    tracing::info!(
        packages = manifest.packages.len(),
        "expanding build requirements to determine build order"
    );
    let order = resolve_build_order(&resolver, &manifest.requirements()).await?;
    check_cycles(&order)?;

    for (package, after) in &order.build_after {
        println!("{package}");
        if after.is_empty() {
            println!("    <no build-after dependencies in batch>");
            continue;
        }
        for dep in after {
            println!("    after {dep}:");
            let providers = order
                .details
                .get(package)
                .and_then(|deps| deps.get(dep))
                .map(Vec::as_slice)
                .unwrap_or_default();
            match providers.first() {
                Some(provider) => {
                    for line in
                        explanation_lines(provider.explanation.as_deref(), package)
                    {
                        println!("        {line}");
                    }
                }
                None => println!("        <in input>"),
            }
        }
    }
    Ok(())
}
