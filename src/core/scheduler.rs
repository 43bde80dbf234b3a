//! Dependency-ordered parallel build scheduler
//!
//! The scheduler owns every piece of mutable run state: the item map,
//! the slot pool and the set of in-flight build tasks. Backends run as
//! spawned tasks but only communicate through the item event channel,
//! so all state mutation happens on the scheduler's own task.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::backend::{BuildBackend, ItemEvent, ItemEventKind, ItemReporter};
use crate::display::BuildDisplay;
use crate::core::item::{BuildItem, BuildState};
use crate::error::{PackforgeError, Result, ScheduleError};

type FinishedTask = (String, usize, Result<()>);

/// Scheduler for one batch of build items.
pub struct Scheduler {
    backend: Arc<dyn BuildBackend>,
    build_after: BTreeMap<String, BTreeSet<String>>,
    parallel_jobs: usize,
    items: BTreeMap<String, BuildItem>,
    slots: Vec<bool>,
    display: Arc<BuildDisplay>,
    events_tx: mpsc::UnboundedSender<ItemEvent>,
    events_rx: mpsc::UnboundedReceiver<ItemEvent>,
    running: JoinSet<FinishedTask>,
}

impl Scheduler {
    /// Create a scheduler over `build_after` with the given parallelism.
    pub fn new(
        backend: Arc<dyn BuildBackend>,
        build_after: BTreeMap<String, BTreeSet<String>>,
        parallel_jobs: usize,
        display: Arc<BuildDisplay>,
    ) -> Self {
        let parallel_jobs = parallel_jobs.max(1);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            build_after,
            parallel_jobs,
            items: BTreeMap::new(),
            slots: vec![false; parallel_jobs],
            display,
            events_tx,
            events_rx,
            running: JoinSet::new(),
        }
    }

    /// Add an item to the batch. No items may be added once scheduling
    /// has started.
    pub fn add_item(&mut self, item: BuildItem) {
        self.items.insert(item.name.clone(), item);
    }

    /// All items, in name order.
    pub fn items(&self) -> impl Iterator<Item = &BuildItem> {
        self.items.values()
    }

    /// Look up one item.
    pub fn item(&self, name: &str) -> Option<&BuildItem> {
        self.items.get(name)
    }

    /// Whether every item finished successfully.
    pub fn all_done(&self) -> bool {
        self.items
            .values()
            .all(|item| matches!(item.state(), BuildState::Done))
    }

    /// Drive the batch to completion.
    ///
    /// Returns `Ok` once no build task remains in flight; callers
    /// inspect the final item states for overall success. An `Err`
    /// signals an unrecoverable internal error (a backend bug or task
    /// panic) and aborts all in-flight bookkeeping.
    pub async fn run(&mut self) -> Result<()> {
        self.backend.prepare().await?;
        self.promote()?;

        while !self.running.is_empty() {
            tokio::select! {
                biased;
                Some(event) = self.events_rx.recv() => {
                    self.apply_event(event)?;
                }
                Some(joined) = self.running.join_next() => {
                    let (name, slot, result) = joined.map_err(|e| {
                        ScheduleError::TaskPanicked {
                            error: e.to_string(),
                        }
                    })?;
                    // The task has ended, so every update it sent is
                    // already queued; apply them before judging its
                    // final state.
                    self.drain_events()?;
                    result?;
                    self.finish_item(&name, slot)?;
                    self.promote()?;
                }
            }
        }

        self.drain_events()?;
        self.display.update_items(self.items.values());
        Ok(())
    }

    /// Re-scan all items: promote `Waiting` items whose dependencies
    /// are satisfied, then start `Ready` items while slots and the
    /// parallelism budget allow.
    fn promote(&mut self) -> Result<()> {
        let names: Vec<String> = self.items.keys().cloned().collect();

        for name in &names {
            let waiting = self
                .items
                .get(name)
                .is_some_and(|item| matches!(item.state(), BuildState::Waiting));
            if !waiting {
                continue;
            }
            let unmet = self.unmet_dependencies(name);
            if let Some(item) = self.items.get_mut(name) {
                if unmet.is_empty() {
                    item.transition(BuildState::Ready)?;
                    item.status = "Ready".to_string();
                } else {
                    item.status = format!("Waiting for: {}", unmet.join(" "));
                }
            }
        }

        let mut building = self
            .items
            .values()
            .filter(|item| matches!(item.state(), BuildState::Building { .. }))
            .count();

        for name in &names {
            if building >= self.parallel_jobs {
                break;
            }
            let ready = self
                .items
                .get(name)
                .is_some_and(|item| matches!(item.state(), BuildState::Ready));
            if !ready {
                continue;
            }
            let slot = self
                .allocate_slot()
                .ok_or(ScheduleError::SlotExhausted)?;
            let snapshot = match self.items.get_mut(name) {
                Some(item) => {
                    item.transition(BuildState::Building { slot })?;
                    item.clone()
                }
                None => {
                    self.slots[slot] = false;
                    continue;
                }
            };
            building += 1;

            tracing::debug!(item = %name, slot, "starting build");
            let backend = Arc::clone(&self.backend);
            let reporter = ItemReporter::new(name.clone(), self.events_tx.clone());
            let task_name = name.clone();
            self.running.spawn(async move {
                let result = backend.build_item(snapshot, slot, reporter).await;
                (task_name, slot, result)
            });
        }

        self.display.update_items(self.items.values());
        Ok(())
    }

    /// Names of `name`'s build-after dependencies not yet `Done`.
    /// Self-edges carry no ordering constraint and are ignored.
    fn unmet_dependencies(&self, name: &str) -> Vec<String> {
        let Some(after) = self.build_after.get(name) else {
            return Vec::new();
        };
        after
            .iter()
            .filter(|dep| {
                dep.as_str() != name
                    && self
                        .items
                        .get(*dep)
                        .is_some_and(|item| !matches!(item.state(), BuildState::Done))
            })
            .cloned()
            .collect()
    }

    fn allocate_slot(&mut self) -> Option<usize> {
        let index = self.slots.iter().position(|occupied| !occupied)?;
        self.slots[index] = true;
        Some(index)
    }

    /// Settle a finished build task: convert a task that never reported
    /// a terminal state into a failure, then release or retire its slot
    /// according to backend policy.
    fn finish_item(&mut self, name: &str, slot: usize) -> Result<()> {
        let mut done = false;
        if let Some(item) = self.items.get_mut(name) {
            if matches!(item.state(), BuildState::Building { .. }) {
                tracing::warn!(item = %name, "build task exited without reporting a result");
                item.transition(BuildState::Failed)?;
                item.status = "Build task exited without reporting a result".to_string();
            }
            done = matches!(item.state(), BuildState::Done);
        }

        if done || !self.backend.retire_slot_on_failure() {
            self.slots[slot] = false;
        } else {
            // The failed build's environment stays untouched for
            // inspection; grow the pool so parallelism is preserved.
            self.slots.push(false);
        }
        Ok(())
    }

    fn apply_event(&mut self, event: ItemEvent) -> Result<()> {
        let Some(item) = self.items.get_mut(&event.name) else {
            return Ok(());
        };
        match event.kind {
            ItemEventKind::Status(status) => item.status = status,
            ItemEventKind::Progress { status, log_files } => {
                item.status = status;
                item.log_files = log_files;
            }
            ItemEventKind::Task { task, children } => {
                item.task = Some(task);
                item.task_children = children;
            }
            ItemEventKind::Done { status } => {
                item.transition(BuildState::Done)?;
                item.status = status;
            }
            ItemEventKind::Failed {
                status,
                debug_messages,
            } => {
                item.transition(BuildState::Failed)?;
                item.status = status;
                item.debug_messages = debug_messages;
            }
        }
        let snapshot = item.clone();
        self.display.update_items(std::iter::once(&snapshot));
        Ok(())
    }

    fn drain_events(&mut self) -> Result<()> {
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply_event(event)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("items", &self.items.len())
            .field("parallel_jobs", &self.parallel_jobs)
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}

/// Convenience check for a finished run: `Err` with a summary if any
/// item ended in a non-`Done` state.
pub fn require_all_done(scheduler: &Scheduler) -> Result<()> {
    let stuck: Vec<&str> = scheduler
        .items()
        .filter(|item| !matches!(item.state(), BuildState::Done))
        .map(|item| item.name.as_str())
        .collect();
    if stuck.is_empty() {
        Ok(())
    } else {
        Err(PackforgeError::Generic(format!(
            "{} of {} packages did not build successfully: {}",
            stuck.len(),
            scheduler.items().count(),
            stuck.join(" ")
        )))
    }
}
