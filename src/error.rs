//! Error types for packforge
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Requirement-resolution errors
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Resolver command could not be started
    #[error("Failed to start resolver command '{command}': {error}")]
    Spawn { command: String, error: String },

    /// Resolver command exited with a failure status
    #[error("Resolver command '{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// Resolver output could not be parsed
    #[error("Failed to parse resolver output: {0}")]
    InvalidOutput(String),
}

/// Build-order graph errors
#[derive(Error, Debug)]
pub enum GraphError {
    /// The build-after graph cannot be linearized
    #[error("Build order contains dependency cycles:\n{report}")]
    CyclicBuildOrder { report: String },

    /// Resolution failed while constructing the graph
    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

/// Scheduler errors
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// An item was asked to move backwards or out of its lifecycle
    #[error("Invalid state transition for '{item}': {from} -> {to}")]
    InvalidTransition {
        item: String,
        from: &'static str,
        to: &'static str,
    },

    /// No unoccupied slot was available for a promoted item
    #[error("No free build slot available")]
    SlotExhausted,

    /// A build task panicked or was aborted
    #[error("Build task terminated abnormally: {error}")]
    TaskPanicked { error: String },
}

/// Sandbox execution errors
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Sandbox command could not be started
    #[error("Failed to start '{command}': {error}")]
    Spawn { command: String, error: String },

    /// Sandbox command exited with a failure status
    #[error("'{command}' exited with {status}")]
    CommandFailed { command: String, status: String },

    /// IO error in the build work directory
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },

    /// Packaging command succeeded but produced no artifact location
    #[error("Could not locate packaged source artifact, see {log}")]
    SourceArtifactNotFound { log: PathBuf },
}

/// Local repository errors
#[derive(Error, Debug)]
pub enum RepoError {
    /// Repository directory could not be created
    #[error("Failed to create repository directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Index command could not be started
    #[error("Failed to start index command '{command}': {error}")]
    Spawn { command: String, error: String },

    /// Index regeneration exited with a failure status
    #[error("Repository index regeneration failed, see {log}")]
    IndexFailed { log: PathBuf },

    /// An artifact could not be moved into the repository
    #[error("Failed to move artifact '{path}': {error}")]
    MoveArtifact { path: PathBuf, error: String },
}

/// Remote build-farm errors
#[derive(Error, Debug)]
pub enum FarmError {
    /// Network-level failure talking to the farm
    #[error("Network error calling '{url}': {error}")]
    Network { url: String, error: String },

    /// Farm returned a non-success HTTP status
    #[error("Build farm returned HTTP {status} for '{url}'")]
    Http { status: u16, url: String },

    /// Farm response could not be decoded
    #[error("Failed to decode build farm response from '{url}': {error}")]
    Decode { url: String, error: String },

    /// A closed task has no tagged build to wait for
    #[error("No tagged build of '{package}' found in '{tag}'")]
    MissingTaggedBuild { package: String, tag: String },

    /// A tagged build carries no repository create event
    #[error("Tagged build '{nvr}' has no create event")]
    MissingCreateEvent { nvr: String },
}

/// Batch manifest errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Manifest file does not exist
    #[error("Batch manifest not found at '{path}'")]
    NotFound { path: PathBuf },

    /// Manifest file could not be read
    #[error("Failed to read batch manifest '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Manifest is not valid TOML
    #[error("Failed to parse batch manifest: {source}")]
    Parse { source: toml::de::Error },

    /// Manifest lists no packages
    #[error("Batch manifest lists no packages")]
    Empty,

    /// Package entry has neither an artifact nor a source tree
    #[error("Package '{package}' needs either a source artifact or a source tree")]
    MissingSource { package: String },

    /// Package entry has both an artifact and a source tree
    #[error("Package '{package}' specifies both a source artifact and a source tree")]
    MultipleSources { package: String },

    /// Two package entries share a name
    #[error("Package '{package}' is listed more than once")]
    DuplicatePackage { package: String },

    /// A backend section required by the selected backend is missing
    #[error("Batch manifest has no [{section}] section")]
    MissingSection { section: String },

    /// A configured command list is empty
    #[error("Command for '{role}' must not be empty")]
    EmptyCommand { role: String },
}

/// Top-level packforge error type
#[derive(Error, Debug)]
pub enum PackforgeError {
    /// Resolver error
    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// Build-order graph error
    #[error("Build order error: {0}")]
    Graph(#[from] GraphError),

    /// Scheduler error
    #[error("Scheduler error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Sandbox error
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    /// Local repository error
    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),

    /// Remote build-farm error
    #[error("Build farm error: {0}")]
    Farm(#[from] FarmError),

    /// Batch manifest error
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// IO error
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Generic error
    #[error("{0}")]
    Generic(String),
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, PackforgeError>;
