//! Engine events and sink contract.
//!
//! The manager delivers events synchronously, from the producing component,
//! to every sink registered at construction. Sinks are trusted in-process
//! collaborators; the engine installs no subscriber of its own.

use crate::TaskId;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Observable engine milestones
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    AnalysisCompleted {
        task_count: usize,
        edge_count: usize,
        elapsed_ms: u64,
    },
    SequenceGenerated {
        strategy: String,
        group_count: usize,
        total_hours: f64,
    },
    ConflictDetected {
        kind: String,
        tasks: Vec<TaskId>,
    },
    ConflictResolved {
        action: String,
        tasks: Vec<TaskId>,
    },
    OptimizationApplied {
        description: String,
    },
    CacheHit {
        key: String,
    },
    CacheMiss {
        key: String,
    },
    /// Reserved for a future learning layer
    LearningInsight {
        note: String,
    },
}

/// Receiver for engine events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &EngineEvent);
}

/// Sink that records every event, for tests and diagnostics
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<EngineEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events received so far
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of events matching a predicate
    pub fn count(&self, predicate: impl Fn(&EngineEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &EngineEvent) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event.clone());
    }
}
