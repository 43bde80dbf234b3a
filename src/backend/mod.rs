//! Build execution backends
//!
//! The scheduler drives builds through the [`BuildBackend`] trait; the
//! two implementations are the local sandbox backend and the remote
//! build-farm backend. Backends never touch scheduler state directly:
//! all progress and terminal results flow back through an
//! [`ItemReporter`].

pub mod farm;
pub mod local;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::item::BuildItem;
use crate::error::Result;

pub use farm::FarmBackend;
pub use local::LocalBackend;

/// A single update about one item, emitted by its build task.
#[derive(Debug)]
pub struct ItemEvent {
    /// Item the event belongs to
    pub name: String,
    /// What changed
    pub kind: ItemEventKind,
}

/// The externally-visible item fields a backend may update.
#[derive(Debug)]
pub enum ItemEventKind {
    /// Replace the status text
    Status(String),
    /// Replace the status text and the discovered log files
    Progress {
        status: String,
        log_files: Vec<PathBuf>,
    },
    /// Replace the remote task reference and its children
    Task {
        task: String,
        children: Vec<String>,
    },
    /// The build finished successfully
    Done { status: String },
    /// The build failed; the item keeps the given forensic hints
    Failed {
        status: String,
        debug_messages: Vec<String>,
    },
}

/// Handle a build task uses to publish item updates to the scheduler.
#[derive(Debug, Clone)]
pub struct ItemReporter {
    name: String,
    tx: mpsc::UnboundedSender<ItemEvent>,
}

impl ItemReporter {
    pub(crate) fn new(name: String, tx: mpsc::UnboundedSender<ItemEvent>) -> Self {
        Self { name, tx }
    }

    fn send(&self, kind: ItemEventKind) {
        // The receiver only goes away when the whole run is being torn
        // down; a lost update is irrelevant then.
        let _ = self.tx.send(ItemEvent {
            name: self.name.clone(),
            kind,
        });
    }

    /// Update the status text.
    pub fn status(&self, status: impl Into<String>) {
        self.send(ItemEventKind::Status(status.into()));
    }

    /// Update the status text and log file list in one step.
    pub fn progress(&self, status: impl Into<String>, log_files: Vec<PathBuf>) {
        self.send(ItemEventKind::Progress {
            status: status.into(),
            log_files,
        });
    }

    /// Update the remote task display fields.
    pub fn task(&self, task: impl Into<String>, children: Vec<String>) {
        self.send(ItemEventKind::Task {
            task: task.into(),
            children,
        });
    }

    /// Mark the item done.
    pub fn done(&self, status: impl Into<String>) {
        self.send(ItemEventKind::Done {
            status: status.into(),
        });
    }

    /// Mark the item failed.
    pub fn failed(&self, status: impl Into<String>, debug_messages: Vec<String>) {
        self.send(ItemEventKind::Failed {
            status: status.into(),
            debug_messages,
        });
    }
}

/// One build-execution strategy.
///
/// `build_item` must report every recoverable failure through
/// `reporter.failed(..)` and return `Ok`; an `Err` is treated as an
/// unexpected internal error and aborts the whole scheduling run.
/// Returning without reporting a terminal state is a contract violation
/// the scheduler converts into a synthetic failure.
#[async_trait]
pub trait BuildBackend: Send + Sync {
    /// One-time setup before the first item starts.
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Build one item inside the given slot.
    async fn build_item(&self, item: BuildItem, slot: usize, reporter: ItemReporter)
        -> Result<()>;

    /// Whether a failed build permanently retires its slot.
    ///
    /// Retiring trades parallelism for keeping the failed build
    /// environment untouched; the scheduler grows the slot pool to
    /// compensate.
    fn retire_slot_on_failure(&self) -> bool;
}
