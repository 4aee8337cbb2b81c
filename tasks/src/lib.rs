//! Job and task accounting.
//!
//! Counts the map and reduce tasks of a job as they move through
//! launched → pending → running → completed / failed. Every transition keeps
//! `launched == pending + running + completed + failed` per task kind.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("no pending {0} task to schedule")]
    NothingPending(TaskKind),

    #[error("no running {0} task")]
    NothingRunning(TaskKind),
}

pub type Result<T> = std::result::Result<T, TaskError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    Map,
    Reduce,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Map => f.write_str("map"),
            TaskKind::Reduce => f.write_str("reduce"),
        }
    }
}

/// Progress view a scheduler reports for a job.
pub trait TaskProgress {
    fn running_maps(&self) -> u64;
    fn pending_maps(&self) -> u64;
    fn running_reduces(&self) -> u64;
    fn pending_reduces(&self) -> u64;
}

/// Counters for one task kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounters {
    pub launched: u64,
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
}

impl TaskCounters {
    pub fn is_consistent(&self) -> bool {
        self.launched == self.pending + self.running + self.completed + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    Launch { kind: TaskKind, count: u64 },
    Schedule { kind: TaskKind },
    Complete { kind: TaskKind },
    Fail { kind: TaskKind, retry: bool },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    maps: TaskCounters,
    reduces: TaskCounters,
}

impl JobProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self, kind: TaskKind) -> &TaskCounters {
        match kind {
            TaskKind::Map => &self.maps,
            TaskKind::Reduce => &self.reduces,
        }
    }

    fn counters_mut(&mut self, kind: TaskKind) -> &mut TaskCounters {
        match kind {
            TaskKind::Map => &mut self.maps,
            TaskKind::Reduce => &mut self.reduces,
        }
    }

    /// Adds `count` new tasks, all pending.
    pub fn launch(&mut self, kind: TaskKind, count: u64) {
        let c = self.counters_mut(kind);
        c.launched += count;
        c.pending += count;
    }

    /// Moves one pending task to running.
    pub fn schedule(&mut self, kind: TaskKind) -> Result<()> {
        let c = self.counters_mut(kind);
        if c.pending == 0 {
            return Err(TaskError::NothingPending(kind));
        }
        c.pending -= 1;
        c.running += 1;
        Ok(())
    }

    pub fn complete(&mut self, kind: TaskKind) -> Result<()> {
        let c = self.counters_mut(kind);
        if c.running == 0 {
            return Err(TaskError::NothingRunning(kind));
        }
        c.running -= 1;
        c.completed += 1;
        Ok(())
    }

    /// A running task failed. With `retry` it goes back to pending,
    /// otherwise it counts as failed for good.
    pub fn fail(&mut self, kind: TaskKind, retry: bool) -> Result<()> {
        let c = self.counters_mut(kind);
        if c.running == 0 {
            return Err(TaskError::NothingRunning(kind));
        }
        c.running -= 1;
        if retry {
            c.pending += 1;
        } else {
            c.failed += 1;
        }
        Ok(())
    }

    /// Applies a transition. A rejected transition changes nothing.
    pub fn apply(&mut self, transition: Transition) -> Result<()> {
        debug!(?transition, "task transition");
        match transition {
            Transition::Launch { kind, count } => {
                self.launch(kind, count);
                Ok(())
            }
            Transition::Schedule { kind } => self.schedule(kind),
            Transition::Complete { kind } => self.complete(kind),
            Transition::Fail { kind, retry } => self.fail(kind, retry),
        }
    }

    /// Tasks that reached a final state, successful or not.
    pub fn completion_events(&self) -> u64 {
        self.maps.completed + self.maps.failed + self.reduces.completed + self.reduces.failed
    }

    pub fn is_consistent(&self) -> bool {
        self.maps.is_consistent() && self.reduces.is_consistent()
    }

    /// True once every launched task reached a final state.
    pub fn is_finished(&self) -> bool {
        [self.maps, self.reduces]
            .iter()
            .all(|c| c.pending == 0 && c.running == 0)
    }
}

impl TaskProgress for JobProgress {
    fn running_maps(&self) -> u64 {
        self.maps.running
    }

    fn pending_maps(&self) -> u64 {
        self.maps.pending
    }

    fn running_reduces(&self) -> u64 {
        self.reduces.running
    }

    fn pending_reduces(&self) -> u64 {
        self.reduces.pending
    }
}
