//! Remote build-farm backend
//!
//! Submits each item to the farm and polls its task state machine.
//! Once the task closes, the backend waits for the farm's repository to
//! regenerate past the event that tagging the build created, so the new
//! package is actually visible to later builds.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backend::{BuildBackend, ItemReporter};
use crate::config::defaults::FARM_POLL_INTERVAL;
use crate::core::item::{BuildItem, BuildSource};
use crate::error::{FarmError, Result};
use crate::infra::farm::{FarmClient, TaskState};

/// Coalescing waiter for repository regeneration events.
///
/// Many items can finish around the same time and all need "the next
/// regeneration at or after my event". Only one poll sequence runs at a
/// time; every waiter whose threshold has been reached is released as
/// soon as the shared last-known event advances far enough.
pub struct RepoWaiter {
    client: Arc<dyn FarmClient>,
    tag: String,
    poll_interval: Duration,
    last_event: Mutex<Option<i64>>,
    // Held by the single in-flight poller; queued waiters re-check the
    // last-known event once they acquire it.
    poll_gate: Mutex<()>,
}

impl RepoWaiter {
    /// Create a waiter for `tag`.
    pub fn new(client: Arc<dyn FarmClient>, tag: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            client,
            tag: tag.into(),
            poll_interval,
            last_event: Mutex::new(None),
            poll_gate: Mutex::new(()),
        }
    }

    async fn satisfied(&self, event: i64) -> bool {
        self.last_event
            .lock()
            .await
            .is_some_and(|last| last >= event)
    }

    /// Block until the repository reports a regeneration event at or
    /// after `event`. Monotonic: an earlier event never satisfies a
    /// later threshold.
    pub async fn wait_for_event(&self, event: i64) -> Result<()> {
        loop {
            if self.satisfied(event).await {
                return Ok(());
            }
            let _poll = self.poll_gate.lock().await;
            if self.satisfied(event).await {
                continue;
            }
            // We are the poller now: run until the event id advances,
            // then let every queued waiter re-check.
            loop {
                let current = self.client.get_repo_create_event(&self.tag).await?;
                let mut last = self.last_event.lock().await;
                if let Some(current) = current {
                    if *last != Some(current) {
                        *last = Some(current);
                        break;
                    }
                }
                drop(last);
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }
}

impl std::fmt::Debug for RepoWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoWaiter")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

/// Backend that builds items on the remote farm.
pub struct FarmBackend {
    client: Arc<dyn FarmClient>,
    target: String,
    build_tag: String,
    poll_interval: Duration,
    repo_waiter: RepoWaiter,
}

impl FarmBackend {
    /// Create a farm backend building against `target`, whose results
    /// land in `build_tag`.
    pub fn new(client: Arc<dyn FarmClient>, target: impl Into<String>, build_tag: impl Into<String>) -> Self {
        Self::with_poll_interval(client, target, build_tag, FARM_POLL_INTERVAL)
    }

    /// Create a farm backend with a custom poll interval.
    pub fn with_poll_interval(
        client: Arc<dyn FarmClient>,
        target: impl Into<String>,
        build_tag: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        let build_tag = build_tag.into();
        let repo_waiter = RepoWaiter::new(Arc::clone(&client), build_tag.clone(), poll_interval);
        Self {
            client,
            target: target.into(),
            build_tag,
            poll_interval,
            repo_waiter,
        }
    }
}

#[async_trait]
impl BuildBackend for FarmBackend {
    async fn build_item(
        &self,
        item: BuildItem,
        _slot: usize,
        reporter: ItemReporter,
    ) -> Result<()> {
        let source_ref = match &item.source {
            BuildSource::Artifact(location) => location.clone(),
            BuildSource::Tree(_) => {
                reporter.failed(
                    "Local source trees cannot be submitted to the build farm",
                    Vec::new(),
                );
                return Ok(());
            }
        };

        reporter.status("Starting build");
        let task_id = self.client.submit(&source_ref, &self.target).await?;
        let task_url = self.client.task_url(task_id);
        tracing::debug!(item = %item.name, task = task_id, "submitted to farm");

        loop {
            let info = self.client.get_task_info(task_id).await?;
            match info.state {
                TaskState::Failed => {
                    reporter.failed(format!("task {task_url} failed"), Vec::new());
                    return Ok(());
                }
                TaskState::Canceled => {
                    reporter.failed(format!("task {task_url} was canceled"), Vec::new());
                    return Ok(());
                }
                TaskState::Closed => break,
                TaskState::Open => {}
            }

            let children = self.client.get_task_children(task_id).await?;
            reporter.task(
                info.label.clone(),
                children.into_iter().map(|child| child.label).collect(),
            );
            tokio::time::sleep(self.poll_interval).await;
        }

        let tagged = self
            .client
            .list_tagged(&self.build_tag, &item.name, true)
            .await?;
        let Some(build) = tagged.first() else {
            return Err(FarmError::MissingTaggedBuild {
                package: item.name.clone(),
                tag: self.build_tag.clone(),
            }
            .into());
        };
        reporter.status(format!(
            "Waiting for {} to appear in {}",
            build.nvr, self.build_tag
        ));

        let event = build.create_event.ok_or_else(|| FarmError::MissingCreateEvent {
            nvr: build.nvr.clone(),
        })?;
        self.repo_waiter.wait_for_event(event).await?;

        reporter.done(format!("{} built successfully", build.nvr));
        Ok(())
    }

    fn retire_slot_on_failure(&self) -> bool {
        // Nothing is left behind locally for a failed farm task, so the
        // slot can be reused.
        false
    }
}

impl std::fmt::Debug for FarmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FarmBackend")
            .field("target", &self.target)
            .field("build_tag", &self.build_tag)
            .finish_non_exhaustive()
    }
}
