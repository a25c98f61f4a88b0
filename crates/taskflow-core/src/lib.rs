//! # taskflow-core
//!
//! Core domain model for the taskflow dependency and scheduling engine.
//!
//! This crate provides:
//! - Domain types: `Task`, `Priority`, `TaskType`, `CandidateEdge`, `EdgeKind`
//! - Configuration types and the built-in presets
//! - The engine error taxonomy and result alias
//! - Engine events and the `EventSink` trait
//! - Cooperative cancellation via `CancelToken`
//!
//! ## Example
//!
//! ```rust
//! use taskflow_core::{Task, TaskType, Priority};
//!
//! let task = Task::new("api-impl")
//!     .title("Implement REST API")
//!     .task_type(TaskType::Implementation)
//!     .priority(Priority::High)
//!     .effort_hours(6.0)
//!     .depends_on("api-design")
//!     .requires("backend");
//!
//! assert_eq!(task.depends_on, vec!["api-design".to_string()]);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub mod config;
pub mod event;

pub use config::{
    AnalyzerConfig, EdgeWeights, EngineConfig, OptimizationWeights, SensitivityThresholds,
    SequencerConfig, Strategy,
};
pub use event::{EngineEvent, EventSink, MemorySink};

// ============================================================================
// Type Aliases & Constants
// ============================================================================

/// Unique identifier for a task
pub type TaskId = String;

/// Effort assumed for tasks that declare none, in hours.
///
/// Sequences scheduled with assumed effort cap their confidence at
/// [`ASSUMED_EFFORT_CONFIDENCE_CAP`] to signal the estimation uncertainty.
pub const DEFAULT_EFFORT_HOURS: f64 = 1.0;

/// Confidence ceiling for sequences containing tasks with no declared effort
pub const ASSUMED_EFFORT_CONFIDENCE_CAP: f64 = 0.8;

// ============================================================================
// Priority
// ============================================================================

/// Task urgency level
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
    Background,
}

impl Priority {
    /// Numeric rank on the low..critical scale (background sits below low).
    pub fn rank(self) -> u8 {
        match self {
            Priority::Critical => 4,
            Priority::High => 3,
            Priority::Normal => 2,
            Priority::Low => 1,
            Priority::Background => 0,
        }
    }

    /// The more urgent of two priorities
    pub fn most_urgent(self, other: Priority) -> Priority {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
            Priority::Background => write!(f, "background"),
        }
    }
}

// ============================================================================
// TaskType
// ============================================================================

/// Category of work a task represents
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    #[default]
    Implementation,
    Analysis,
    Testing,
    Documentation,
    Refactoring,
    Deployment,
    Build,
    BugFix,
    Feature,
    Maintenance,
    Security,
    Performance,
}

impl TaskType {
    /// Position in the natural delivery pipeline, for the five phase types.
    ///
    /// analysis < implementation < testing < documentation < deployment.
    /// Types outside the pipeline have no ordering.
    pub fn phase_order(self) -> Option<u8> {
        match self {
            TaskType::Analysis => Some(0),
            TaskType::Implementation => Some(1),
            TaskType::Testing => Some(2),
            TaskType::Documentation => Some(3),
            TaskType::Deployment => Some(4),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskType::Implementation => "implementation",
            TaskType::Analysis => "analysis",
            TaskType::Testing => "testing",
            TaskType::Documentation => "documentation",
            TaskType::Refactoring => "refactoring",
            TaskType::Deployment => "deployment",
            TaskType::Build => "build",
            TaskType::BugFix => "bug-fix",
            TaskType::Feature => "feature",
            TaskType::Maintenance => "maintenance",
            TaskType::Security => "security",
            TaskType::Performance => "performance",
        };
        write!(f, "{name}")
    }
}

// ============================================================================
// Task
// ============================================================================

/// A unit of work submitted to the engine.
///
/// Tasks are created by external collaborators and are read-only inside the
/// engine. `depends_on` may reference ids absent from the submitted set; the
/// analyzer drops such references silently.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, stable within a request
    pub id: TaskId,
    /// Human-readable title
    pub title: String,
    /// Free-text description
    pub description: String,
    /// Category of work
    pub task_type: TaskType,
    /// Urgency
    pub priority: Priority,
    /// Estimated effort in hours; `None` schedules as [`DEFAULT_EFFORT_HOURS`]
    pub effort_hours: Option<f64>,
    /// Capabilities (people, systems, environments) the task needs
    pub capabilities: BTreeSet<String>,
    /// Declared predecessor task ids
    pub depends_on: Vec<TaskId>,
    /// Absolute completion deadline
    pub deadline: Option<DateTime<Utc>>,
    /// Feature grouping id; dot-separated segments express hierarchy
    pub feature_id: Option<String>,
    /// Auxiliary metadata, opaque to the engine except for documented keys
    pub metadata: BTreeMap<String, String>,
}

impl Task {
    /// Create a new task with the given id
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            ..Self::default()
        }
    }

    /// Set the title
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the task type
    pub fn task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    /// Set the priority
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the estimated effort in hours
    pub fn effort_hours(mut self, hours: f64) -> Self {
        self.effort_hours = Some(hours);
        self
    }

    /// Declare a dependency on another task
    pub fn depends_on(mut self, predecessor: impl Into<String>) -> Self {
        self.depends_on.push(predecessor.into());
        self
    }

    /// Require a capability
    pub fn requires(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    /// Set the deadline
    pub fn deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the feature grouping id
    pub fn feature(mut self, feature_id: impl Into<String>) -> Self {
        self.feature_id = Some(feature_id.into());
        self
    }

    /// Attach a metadata entry
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Effort used for scheduling: the declared value, or the 1-hour default
    pub fn scheduling_effort(&self) -> f64 {
        self.effort_hours.unwrap_or(DEFAULT_EFFORT_HOURS)
    }

    /// Combined lowercase text used by keyword analysis
    pub fn combined_text(&self) -> String {
        let mut text = String::with_capacity(
            self.id.len() + self.title.len() + self.description.len() + 2,
        );
        text.push_str(&self.id.to_lowercase());
        text.push(' ');
        text.push_str(&self.title.to_lowercase());
        text.push(' ');
        text.push_str(&self.description.to_lowercase());
        text
    }
}

// ============================================================================
// Candidate Edges
// ============================================================================

/// Signal class that produced a candidate edge
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    /// Declared in `Task::depends_on`
    Explicit,
    /// Inferred from text, structure, or feature relationships
    Implicit,
    /// Serialization of tasks contending for a capability
    Resource,
    /// Deadline adjacency
    Temporal,
    /// Large urgency gap
    Priority,
}

impl EdgeKind {
    /// Weighting factor applied when converting confidence to edge weight
    pub fn type_factor(self) -> f64 {
        match self {
            EdgeKind::Explicit => 1.0,
            EdgeKind::Implicit => 0.7,
            EdgeKind::Resource => 0.8,
            EdgeKind::Temporal => 0.6,
            EdgeKind::Priority => 0.4,
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeKind::Explicit => write!(f, "explicit"),
            EdgeKind::Implicit => write!(f, "implicit"),
            EdgeKind::Resource => write!(f, "resource"),
            EdgeKind::Temporal => write!(f, "temporal"),
            EdgeKind::Priority => write!(f, "priority"),
        }
    }
}

/// A directed dependency candidate emitted by the analyzer.
///
/// Identity is the ordered `(from, to)` pair; when several passes emit the
/// same pair, the highest-confidence candidate wins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateEdge {
    /// Predecessor task id
    pub from: TaskId,
    /// Successor task id
    pub to: TaskId,
    /// Signal class
    pub kind: EdgeKind,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    /// Human-readable explanation of the signal
    pub reason: String,
    /// Whether the successor cannot start before the predecessor completes
    pub blocking: bool,
    /// Expected serialization delay in hours
    pub estimated_delay_hours: f64,
}

impl CandidateEdge {
    /// Ordered-pair identity of the edge
    pub fn key(&self) -> (TaskId, TaskId) {
        (self.from.clone(), self.to.clone())
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation handle.
///
/// Cloned freely; all clones observe the same flag. Long-running engine
/// methods check the token at their suspension points and surface
/// [`EngineError::Cancelled`] without committing partial results.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience token for callers that do not need cancellation
    pub fn never() -> Self {
        Self::default()
    }

    /// Request cancellation; observed by all clones
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Err(`Cancelled`) once the token has tripped
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Engine error taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Malformed task set: empty id, duplicate id, self-dependency, or a
    /// declared chain exceeding the configured length
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Referenced task id is absent from the current set
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    /// Caller requested early termination; caches are untouched
    #[error("operation cancelled")]
    Cancelled,

    /// A bounded step exceeded its budget
    #[error("{stage} exceeded its {budget_ms}ms budget")]
    Timeout { stage: String, budget_ms: u64 },

    /// Attempt to mutate a graph after it was sealed
    #[error("graph is sealed: {0}")]
    SealedGraph(String),
}

/// Result alias used across the engine
pub type EngineResult<T> = Result<T, EngineError>;

// ============================================================================
// Tests
// ============================================================================
