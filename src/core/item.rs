//! Build item state model
//!
//! One [`BuildItem`] is tracked per package in a scheduling run. State
//! moves strictly forward through the lifecycle; invalid transitions are
//! rejected instead of silently overwritten.

use std::path::PathBuf;

use crate::error::ScheduleError;

/// Source material for one build item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildSource {
    /// Pre-packaged source artifact (path or URL understood by the backend)
    Artifact(String),
    /// Local source tree that must be packaged before building
    Tree(PathBuf),
}

/// Lifecycle state of a build item.
///
/// `Building` carries the slot index the item occupies for the duration
/// of its build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildState {
    /// Blocked on build-after dependencies
    Waiting,
    /// All dependencies done, waiting for a free slot
    Ready,
    /// Build task in flight in the given slot
    Building { slot: usize },
    /// Built successfully (terminal)
    Done,
    /// Build failed (terminal, never re-enters Building)
    Failed,
}

impl BuildState {
    /// Short lowercase name for messages
    pub fn name(&self) -> &'static str {
        match self {
            BuildState::Waiting => "waiting",
            BuildState::Ready => "ready",
            BuildState::Building { .. } => "building",
            BuildState::Done => "done",
            BuildState::Failed => "failed",
        }
    }

    /// Whether this state ends the item's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildState::Done | BuildState::Failed)
    }
}

/// Mutable record for one package being scheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildItem {
    /// Package name, unique within the run
    pub name: String,
    /// Where the build's source comes from
    pub source: BuildSource,
    state: BuildState,
    /// Free-text progress description, rewritten frequently
    pub status: String,
    /// Discovered log artifacts, refreshed while building
    pub log_files: Vec<PathBuf>,
    /// Remote task reference, if any
    pub task: Option<String>,
    /// Remote child-task references
    pub task_children: Vec<String>,
    /// Forensic hints attached on failure
    pub debug_messages: Vec<String>,
}

impl BuildItem {
    /// Create a new item in the `Waiting` state.
    pub fn new(name: impl Into<String>, source: BuildSource) -> Self {
        Self {
            name: name.into(),
            source,
            state: BuildState::Waiting,
            status: String::new(),
            log_files: Vec::new(),
            task: None,
            task_children: Vec::new(),
            debug_messages: Vec::new(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> &BuildState {
        &self.state
    }

    /// Slot index while building
    pub fn slot(&self) -> Option<usize> {
        match self.state {
            BuildState::Building { slot } => Some(slot),
            _ => None,
        }
    }

    /// Move the item to `next`, rejecting anything but the forward path
    /// Waiting -> Ready -> Building -> Done/Failed.
    pub fn transition(&mut self, next: BuildState) -> Result<(), ScheduleError> {
        let valid = matches!(
            (&self.state, &next),
            (BuildState::Waiting, BuildState::Ready)
                | (BuildState::Ready, BuildState::Building { .. })
                | (BuildState::Building { .. }, BuildState::Done)
                | (BuildState::Building { .. }, BuildState::Failed)
        );
        if !valid {
            return Err(ScheduleError::InvalidTransition {
                item: self.name.clone(),
                from: self.state.name(),
                to: next.name(),
            });
        }
        self.state = next;
        Ok(())
    }
}
