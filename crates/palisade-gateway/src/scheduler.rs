//! Periodic task scheduler.
//!
//! Task definitions persist as JSON on disk; a single loop wakes every
//! second and submits due tasks through the supervisor. Scheduled calls
//! bypass the per-user rate limit (they carry a system actor) but honor the
//! kill-switch like any other call. The same loop sweeps expired approval
//! entries.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use palisade_core::{Actor, ToolArgs, ToolCall};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{GatewayError, GatewayResult};
use crate::supervisor::Supervisor;

/// Runs kept per task.
const HISTORY_CAP: usize = 100;

/// A persistent task definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    /// Short unique id.
    pub id: String,
    /// Operator-facing name.
    pub name: String,
    /// Tool to invoke.
    pub tool: String,
    /// Arguments for every run.
    #[serde(default)]
    pub args: ToolArgs,
    /// Seconds between runs.
    pub interval_seconds: u64,
    /// Disabled tasks are skipped but kept.
    pub enabled: bool,
    /// Total completed submissions.
    #[serde(default)]
    pub run_count: u64,
    /// When the task last ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

impl ScheduledTask {
    /// Whether the task should run at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_run {
            None => true,
            Some(last) => last + chrono::Duration::seconds(self.interval_seconds as i64) <= now,
        }
    }
}

/// One run in a task's bounded history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    /// When the run started.
    pub timestamp: DateTime<Utc>,
    /// Whether the supervisor accepted the call.
    pub ok: bool,
    /// Wall-clock duration of the submission.
    pub duration_seconds: f64,
    /// Refusal token when the call was not accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Partial update for [`Scheduler::update_task`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    /// New name.
    pub name: Option<String>,
    /// New tool id.
    pub tool: Option<String>,
    /// New arguments.
    pub args: Option<ToolArgs>,
    /// New interval.
    pub interval_seconds: Option<u64>,
    /// Enable or disable.
    pub enabled: Option<bool>,
}

/// Task store plus the periodic invoker.
pub struct Scheduler {
    path: Option<PathBuf>,
    tasks: DashMap<String, ScheduledTask>,
    history: DashMap<String, VecDeque<TaskRun>>,
}

impl Scheduler {
    /// In-memory scheduler (no persistence).
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: None,
            tasks: DashMap::new(),
            history: DashMap::new(),
        }
    }

    /// Scheduler persisted to a JSON file; loads existing tasks.
    pub fn open(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut scheduler = Self::new();

        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let tasks: HashMap<String, ScheduledTask> = serde_json::from_str(&raw)?;
            for (id, task) in tasks {
                scheduler.tasks.insert(id, task);
            }
        }
        scheduler.path = Some(path);
        Ok(scheduler)
    }

    /// Create a task. Runs immediately on the next tick, then on interval.
    pub fn add_task(
        &self,
        name: impl Into<String>,
        tool: impl Into<String>,
        args: ToolArgs,
        interval_seconds: u64,
    ) -> GatewayResult<ScheduledTask> {
        let tool = tool.into();
        if interval_seconds == 0 {
            return Err(GatewayError::Adapter(
                "interval_seconds must be at least 1".to_string(),
            ));
        }
        if tool.trim().is_empty() {
            return Err(GatewayError::Adapter("tool must not be empty".to_string()));
        }

        let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let task = ScheduledTask {
            id: id.clone(),
            name: name.into(),
            tool,
            args,
            interval_seconds,
            enabled: true,
            run_count: 0,
            last_run: None,
        };
        self.tasks.insert(id, task.clone());
        self.save()?;
        tracing::info!(id = %task.id, tool = %task.tool, "scheduled task added");
        Ok(task)
    }

    /// All tasks, sorted by id.
    #[must_use]
    pub fn list_tasks(&self) -> Vec<ScheduledTask> {
        let mut tasks: Vec<ScheduledTask> =
            self.tasks.iter().map(|entry| entry.value().clone()).collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    /// Look up one task.
    #[must_use]
    pub fn get_task(&self, id: &str) -> Option<ScheduledTask> {
        self.tasks.get(id).map(|entry| entry.value().clone())
    }

    /// Apply a partial update.
    pub fn update_task(&self, id: &str, update: TaskUpdate) -> GatewayResult<ScheduledTask> {
        let updated = {
            let mut task = self
                .tasks
                .get_mut(id)
                .ok_or_else(|| GatewayError::TaskNotFound { id: id.to_string() })?;
            if let Some(name) = update.name {
                task.name = name;
            }
            if let Some(tool) = update.tool {
                task.tool = tool;
            }
            if let Some(args) = update.args {
                task.args = args;
            }
            if let Some(interval) = update.interval_seconds {
                if interval == 0 {
                    return Err(GatewayError::Adapter(
                        "interval_seconds must be at least 1".to_string(),
                    ));
                }
                task.interval_seconds = interval;
            }
            if let Some(enabled) = update.enabled {
                task.enabled = enabled;
            }
            task.clone()
        };
        self.save()?;
        Ok(updated)
    }

    /// Toggle a task.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> GatewayResult<ScheduledTask> {
        self.update_task(
            id,
            TaskUpdate {
                enabled: Some(enabled),
                ..TaskUpdate::default()
            },
        )
    }

    /// Remove a task and its history.
    pub fn delete_task(&self, id: &str) -> GatewayResult<()> {
        self.tasks
            .remove(id)
            .ok_or_else(|| GatewayError::TaskNotFound { id: id.to_string() })?;
        self.history.remove(id);
        self.save()
    }

    /// Run history for a task, oldest first (bounded to the last 100).
    #[must_use]
    pub fn history(&self, id: &str) -> Vec<TaskRun> {
        self.history
            .get(id)
            .map(|runs| runs.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Submit every due task through the supervisor once.
    ///
    /// Also sweeps expired approval entries, so one loop drives both
    /// periodic concerns.
    pub async fn tick(&self, supervisor: &Supervisor) {
        supervisor.sweep_approvals();

        let now = Utc::now();
        let due: Vec<ScheduledTask> = self
            .tasks
            .iter()
            .filter(|entry| entry.value().is_due(now))
            .map(|entry| entry.value().clone())
            .collect();

        for task in due {
            let started = Instant::now();
            let call = ToolCall::new(task.tool.clone(), task.args.clone())
                .with_actor(Actor::System(format!("scheduler:{}", task.id)));
            let outcome = supervisor.process_internal(call);

            let ok = outcome.is_accepted();
            let error = if ok {
                None
            } else {
                outcome.error_token().map(String::from)
            };
            tracing::debug!(task = %task.id, ok, "scheduled task ran");

            self.record_run(
                &task.id,
                TaskRun {
                    timestamp: now,
                    ok,
                    duration_seconds: started.elapsed().as_secs_f64(),
                    error,
                },
            );
            if let Some(mut entry) = self.tasks.get_mut(&task.id) {
                entry.run_count += 1;
                entry.last_run = Some(now);
            }
        }

        if let Err(err) = self.save() {
            tracing::warn!(%err, "failed to persist schedule");
        }
    }

    /// Spawn the once-a-second loop. Abort the returned handle to stop.
    #[must_use]
    pub fn run(self: Arc<Self>, supervisor: Arc<Supervisor>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                self.tick(&supervisor).await;
            }
        })
    }

    fn record_run(&self, id: &str, run: TaskRun) {
        let mut runs = self.history.entry(id.to_string()).or_default();
        if runs.len() >= HISTORY_CAP {
            runs.pop_front();
        }
        runs.push_back(run);
    }

    fn save(&self) -> GatewayResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot: HashMap<String, ScheduledTask> = self
            .tasks
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        std::fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
        Ok(())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.tasks.len())
            .field("persisted", &self.path.is_some())
            .finish_non_exhaustive()
    }
}
