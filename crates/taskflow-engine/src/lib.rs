//! # taskflow-engine
//!
//! Dependency inference, graph analysis, and parallel sequencing.
//!
//! This crate provides the four engine components:
//! - [`analyzer::DependencyAnalyzer`] — infers candidate dependency edges
//!   from explicit declarations, text and structure, capability contention,
//!   deadlines, and priority gaps
//! - [`graph::TaskGraph`] — weighted dependency graph with topological
//!   levels, earliest/latest start times, slack, critical-path markers,
//!   cycle detection, and validation
//! - [`sequencer::Sequencer`] — conflict detection/resolution and parallel
//!   group construction under a configurable strategy
//! - [`manager::DependencyManager`] — the public surface: fingerprint
//!   caches, cycle repair, events, and dependency overrides
//!
//! ## Example
//!
//! ```rust
//! use taskflow_core::{CancelToken, EngineConfig, Task};
//! use taskflow_engine::DependencyManager;
//!
//! let manager = DependencyManager::new(EngineConfig::default());
//! let tasks = vec![
//!     Task::new("design").effort_hours(4.0),
//!     Task::new("implement").effort_hours(8.0).depends_on("design"),
//!     Task::new("test").effort_hours(3.0).depends_on("implement"),
//! ];
//!
//! let order = manager
//!     .resolve_execution_order(&tasks, &CancelToken::never())
//!     .unwrap();
//! assert_eq!(order, vec!["design", "implement", "test"]);
//! ```

pub mod analyzer;
pub mod cache;
pub mod graph;
pub mod manager;
pub mod sequencer;

pub use analyzer::{AnalysisMeta, AnalysisReport, DependencyAnalyzer};
pub use cache::FingerprintCache;
pub use graph::{
    BreakOption, Cycle, GraphEdge, GraphMetrics, GraphNode, IssueKind, IssueSeverity, TaskGraph,
    ValidationIssue, ValidationReport, SLACK_EPSILON,
};
pub use manager::{CacheStats, DependencyManager};
pub use sequencer::{
    Conflict, ConflictImpact, ConflictKind, ConflictSeverity, ExecutionSequence, ParallelGroup,
    Resolution, ResolutionAction, Sequencer, SequencingOutcome,
};
