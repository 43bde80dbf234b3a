//! Batch manifest (packforge.toml) parsing and validation
//!
//! The manifest names the packages to rebuild, their build requirement
//! expressions and source references, and configures the resolver and
//! the selected execution backend.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::defaults;
use crate::core::item::BuildSource;
use crate::error::ManifestError;

/// Which execution backend runs the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local sandbox builds
    #[default]
    Local,
    /// Remote build farm
    Farm,
}

/// One package entry in the batch.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageEntry {
    /// Package name, unique within the batch
    pub name: String,
    /// Raw build requirement expressions
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Pre-packaged source artifact reference
    pub artifact: Option<String>,
    /// Local source tree to package before building
    pub tree: Option<PathBuf>,
}

impl PackageEntry {
    /// The entry's build source.
    pub fn source(&self) -> Result<BuildSource, ManifestError> {
        match (&self.artifact, &self.tree) {
            (Some(artifact), None) => Ok(BuildSource::Artifact(artifact.clone())),
            (None, Some(tree)) => Ok(BuildSource::Tree(tree.clone())),
            (Some(_), Some(_)) => Err(ManifestError::MultipleSources {
                package: self.name.clone(),
            }),
            (None, None) => Err(ManifestError::MissingSource {
                package: self.name.clone(),
            }),
        }
    }
}

/// Resolver configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverSection {
    /// Resolver program plus fixed arguments; requirement expressions
    /// are appended per invocation
    pub command: Vec<String>,
}

/// Local backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalSection {
    /// Work directory for per-item build dirs and logs
    pub workdir: PathBuf,
    /// Shared local repository directory
    pub repo: PathBuf,
    /// Sandbox tool
    #[serde(default = "default_sandbox_command")]
    pub sandbox_command: String,
    /// Sandbox configuration file passed to the tool
    pub sandbox_config: PathBuf,
    /// Command packaging a source tree into a source artifact
    #[serde(default = "default_package_command")]
    pub package_command: Vec<String>,
    /// Repository index command
    #[serde(default = "default_index_command")]
    pub index_command: Vec<String>,
}

/// Farm backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FarmSection {
    /// Farm API base URL
    pub base_url: String,
    /// Build target submitted with every item
    pub target: String,
    /// Tag whose repository must regenerate before an item is done
    pub build_tag: String,
}

fn default_sandbox_command() -> String {
    defaults::DEFAULT_SANDBOX_COMMAND.to_string()
}

fn default_package_command() -> Vec<String> {
    defaults::DEFAULT_PACKAGE_COMMAND
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

fn default_index_command() -> Vec<String> {
    defaults::DEFAULT_INDEX_COMMAND
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

/// The parsed batch manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchManifest {
    /// Parallel build jobs; backend-specific default when absent
    pub jobs: Option<usize>,
    /// Selected backend
    #[serde(default)]
    pub backend: BackendKind,
    /// Packages to rebuild
    #[serde(default, rename = "package")]
    pub packages: Vec<PackageEntry>,
    /// Resolver configuration
    pub resolver: ResolverSection,
    /// Local backend configuration
    pub local: Option<LocalSection>,
    /// Farm backend configuration
    pub farm: Option<FarmSection>,
}

impl BatchManifest {
    /// Load and validate a manifest from `path`.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            return Err(ManifestError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let manifest: Self =
            toml::from_str(&content).map_err(|source| ManifestError::Parse { source })?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), ManifestError> {
        if self.packages.is_empty() {
            return Err(ManifestError::Empty);
        }
        if self.resolver.command.is_empty() {
            return Err(ManifestError::EmptyCommand {
                role: "resolver".to_string(),
            });
        }
        if let Some(local) = &self.local {
            for (role, command) in [
                ("packaging", &local.package_command),
                ("index", &local.index_command),
            ] {
                if command.is_empty() {
                    return Err(ManifestError::EmptyCommand {
                        role: role.to_string(),
                    });
                }
            }
        }
        let mut seen = std::collections::BTreeSet::new();
        for package in &self.packages {
            if !seen.insert(package.name.as_str()) {
                return Err(ManifestError::DuplicatePackage {
                    package: package.name.clone(),
                });
            }
            package.source()?;
        }
        match self.backend {
            BackendKind::Local if self.local.is_none() => Err(ManifestError::MissingSection {
                section: "local".to_string(),
            }),
            BackendKind::Farm if self.farm.is_none() => Err(ManifestError::MissingSection {
                section: "farm".to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// package -> raw requirement expressions, for the graph builder.
    pub fn requirements(&self) -> BTreeMap<String, Vec<String>> {
        self.packages
            .iter()
            .map(|package| (package.name.clone(), package.requirements.clone()))
            .collect()
    }
}
