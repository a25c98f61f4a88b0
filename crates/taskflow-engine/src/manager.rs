//! Public engine surface.
//!
//! The manager owns the analyzer and sequencer, caches graphs and sequences
//! by task-set fingerprint, repairs cyclic graphs with the cheapest break
//! options, and delivers events to the sinks registered at construction.
//!
//! Dependency overrides recorded through [`DependencyManager::update_task_dependencies`]
//! apply to every later call and invalidate the fingerprints that contain the
//! affected task.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use taskflow_core::{
    CancelToken, EngineConfig, EngineError, EngineEvent, EngineResult, EventSink, Task, TaskId,
};
use tracing::{debug, warn};

use crate::analyzer::DependencyAnalyzer;
use crate::cache::FingerprintCache;
use crate::graph::{TaskGraph, ValidationReport};
use crate::sequencer::{Conflict, ExecutionSequence, Sequencer};

/// Cache occupancy snapshot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheStats {
    pub graph_len: usize,
    pub graph_capacity: usize,
    pub sequence_len: usize,
    pub sequence_capacity: usize,
}

/// Orchestrates analysis, graph repair, and sequencing behind one surface
pub struct DependencyManager {
    config: EngineConfig,
    analyzer: DependencyAnalyzer,
    sequencer: Sequencer,
    graph_cache: FingerprintCache<TaskGraph>,
    sequence_cache: FingerprintCache<ExecutionSequence>,
    sinks: Vec<Arc<dyn EventSink>>,
    known_tasks: Mutex<BTreeSet<TaskId>>,
    overrides: Mutex<BTreeMap<TaskId, Vec<TaskId>>>,
    last_background_run: Mutex<Option<Instant>>,
}

impl DependencyManager {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_sinks(config, Vec::new())
    }

    /// Construct with event sinks; sinks are invoked synchronously
    pub fn with_sinks(config: EngineConfig, sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self {
            analyzer: DependencyAnalyzer::new(config.analyzer.clone()),
            sequencer: Sequencer::new(config.sequencer.clone()),
            graph_cache: FingerprintCache::new(config.graph_cache_capacity),
            sequence_cache: FingerprintCache::new(config.sequence_cache_capacity),
            sinks,
            known_tasks: Mutex::new(BTreeSet::new()),
            overrides: Mutex::new(BTreeMap::new()),
            last_background_run: Mutex::new(None),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            graph_len: self.graph_cache.len(),
            graph_capacity: self.graph_cache.capacity(),
            sequence_len: self.sequence_cache.len(),
            sequence_capacity: self.sequence_cache.capacity(),
        }
    }

    // ------------------------------------------------------------------------
    // Public surface
    // ------------------------------------------------------------------------

    /// Analyze a task set into a repaired, sealed dependency graph
    pub fn analyze(&self, tasks: &[Task], cancel: &CancelToken) -> EngineResult<Arc<TaskGraph>> {
        self.validate_input(tasks)?;
        let tasks = self.effective_tasks(tasks);
        let key = self.fingerprint(&tasks);
        self.graph_for(&tasks, &key, cancel)
    }

    /// Produce the flattened execution order for a task set
    pub fn resolve_execution_order(
        &self,
        tasks: &[Task],
        cancel: &CancelToken,
    ) -> EngineResult<Vec<TaskId>> {
        Ok(self.sequence_for(tasks, cancel)?.flatten())
    }

    /// Parallel groups as plain task-id lists, in execution order
    pub fn get_parallel_groups(
        &self,
        tasks: &[Task],
        cancel: &CancelToken,
    ) -> EngineResult<Vec<Vec<TaskId>>> {
        let sequence = self.sequence_for(tasks, cancel)?;
        Ok(sequence.groups.iter().map(|g| g.tasks.clone()).collect())
    }

    /// Cycles in the declared-plus-inferred dependency multigraph.
    ///
    /// Never errors: malformed tasks are filtered and analysis failures
    /// degrade to an empty result.
    pub fn detect_circular(&self, tasks: &[Task]) -> Vec<Vec<TaskId>> {
        let tasks = self.effective_tasks(&well_formed(tasks));
        match self.analyzer.analyze(&tasks, &CancelToken::never()) {
            Ok(report) => report.potential_circular,
            Err(error) => {
                warn!(%error, "circular scan degraded to empty result");
                Vec::new()
            }
        }
    }

    /// Structural validation of the raw (pre-repair) dependency graph.
    ///
    /// Never errors: malformed tasks are filtered first.
    pub fn validate_dependencies(&self, tasks: &[Task]) -> ValidationReport {
        let tasks = self.effective_tasks(&well_formed(tasks));
        let report = match self.analyzer.analyze(&tasks, &CancelToken::never()) {
            Ok(report) => report,
            Err(error) => {
                warn!(%error, "validation degraded to empty report");
                return empty_validation_report();
            }
        };
        match TaskGraph::build(&tasks, &report.edges) {
            Ok(graph) => graph.validate(),
            Err(error) => {
                warn!(%error, "validation degraded to empty report");
                empty_validation_report()
            }
        }
    }

    /// Replace a task's declared dependencies for all later calls.
    ///
    /// Surfaces `UnknownTask` for ids the manager has never seen and
    /// invalidates every cached fingerprint containing the task.
    pub fn update_task_dependencies(
        &self,
        task_id: &str,
        new_deps: Vec<TaskId>,
    ) -> EngineResult<()> {
        if !self.lock_known().contains(task_id) {
            return Err(EngineError::UnknownTask(task_id.to_string()));
        }
        if new_deps.iter().any(|dep| dep == task_id) {
            return Err(EngineError::InvalidInput(format!(
                "task '{task_id}' cannot depend on itself"
            )));
        }

        self.lock_overrides()
            .insert(task_id.to_string(), new_deps);
        let graphs = self.graph_cache.invalidate_task(task_id);
        let sequences = self.sequence_cache.invalidate_task(task_id);
        debug!(task_id, graphs, sequences, "dependency override recorded");
        Ok(())
    }

    /// Re-run conflict detection and surface suggestions, without touching
    /// caches or recorded state.
    ///
    /// Gated on the configured interval; returns an empty list while the
    /// pass is disabled or the interval has not yet elapsed.
    pub fn run_background_optimization(
        &self,
        tasks: &[Task],
        cancel: &CancelToken,
    ) -> EngineResult<Vec<Conflict>> {
        let Some(interval_ms) = self.config.background_interval_ms else {
            return Ok(Vec::new());
        };
        {
            let mut last = self
                .last_background_run
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(at) = *last {
                if at.elapsed().as_millis() < u128::from(interval_ms) {
                    return Ok(Vec::new());
                }
            }
            *last = Some(Instant::now());
        }

        let tasks = self.effective_tasks(&well_formed(tasks));
        let report = self.analyzer.analyze(&tasks, cancel)?;
        let graph = TaskGraph::build(&tasks, &report.edges)?;
        let conflicts = self.sequencer.detect_conflicts(&graph, &tasks);
        for conflict in &conflicts {
            if let Some(suggestion) = conflict.suggested_resolutions.first() {
                self.emit(&EngineEvent::OptimizationApplied {
                    description: suggestion.clone(),
                });
            }
        }
        Ok(conflicts)
    }

    // ------------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------------

    fn sequence_for(
        &self,
        tasks: &[Task],
        cancel: &CancelToken,
    ) -> EngineResult<Arc<ExecutionSequence>> {
        self.validate_input(tasks)?;
        let tasks = self.effective_tasks(tasks);
        let key = self.fingerprint(&tasks);

        if let Some(sequence) = self.sequence_cache.get(&key) {
            self.emit(&EngineEvent::CacheHit { key });
            return Ok(sequence);
        }
        self.emit(&EngineEvent::CacheMiss { key: key.clone() });

        let graph = self.graph_for(&tasks, &key, cancel)?;
        let outcome = self.sequencer.generate(&graph, &tasks, cancel)?;

        for conflict in &outcome.conflicts {
            self.emit(&EngineEvent::ConflictDetected {
                kind: conflict.kind.to_string(),
                tasks: conflict.tasks.clone(),
            });
        }
        for resolution in &outcome.resolutions {
            self.emit(&EngineEvent::ConflictResolved {
                action: resolution.action.to_string(),
                tasks: resolution.tasks.clone(),
            });
        }
        if outcome.merged_groups > 0 {
            self.emit(&EngineEvent::OptimizationApplied {
                description: format!("merged {} parallel group(s)", outcome.merged_groups),
            });
        }
        self.emit(&EngineEvent::SequenceGenerated {
            strategy: outcome.sequence.strategy.to_string(),
            group_count: outcome.sequence.groups.len(),
            total_hours: outcome.sequence.total_estimated_hours,
        });

        let sequence = Arc::new(outcome.sequence);
        self.sequence_cache.put(key, sequence.clone());
        Ok(sequence)
    }

    /// Cached graph lookup; a miss runs analysis, build, and cycle repair
    fn graph_for(
        &self,
        tasks: &[Task],
        key: &str,
        cancel: &CancelToken,
    ) -> EngineResult<Arc<TaskGraph>> {
        if let Some(graph) = self.graph_cache.get(key) {
            self.emit(&EngineEvent::CacheHit {
                key: key.to_string(),
            });
            return Ok(graph);
        }
        self.emit(&EngineEvent::CacheMiss {
            key: key.to_string(),
        });

        let report = self.analyzer.analyze(tasks, cancel)?;
        self.emit(&EngineEvent::AnalysisCompleted {
            task_count: report.meta.task_count,
            edge_count: report.meta.edge_count,
            elapsed_ms: report.meta.elapsed_ms,
        });

        let threshold = self.config.sequencer.min_confidence_threshold;
        let trusted: Vec<_> = report
            .edges
            .iter()
            .filter(|edge| edge.confidence >= threshold)
            .cloned()
            .collect();
        let mut graph = TaskGraph::build(tasks, &trusted)?;
        self.repair_cycles(&mut graph, cancel)?;
        graph.seal();

        let graph = Arc::new(graph);
        self.graph_cache.put(key.to_string(), graph.clone());
        Ok(graph)
    }

    /// Remove the cheapest break option per detected cycle until acyclic
    fn repair_cycles(&self, graph: &mut TaskGraph, cancel: &CancelToken) -> EngineResult<()> {
        let mut budget = graph.edge_count() + 1;
        while graph.has_cycles() && budget > 0 {
            cancel.check()?;
            budget -= 1;
            let cycles = graph.detect_cycles();
            let Some(option) = cycles
                .first()
                .and_then(|cycle| cycle.break_options.first())
            else {
                break;
            };
            debug!(
                from = %option.from,
                to = %option.to,
                impact = option.impact,
                "breaking cycle"
            );
            graph.remove_edge(&option.from, &option.to)?;
        }
        if graph.has_cycles() {
            warn!("cycle repair exhausted its budget; graph left cyclic");
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Input handling
    // ------------------------------------------------------------------------

    fn validate_input(&self, tasks: &[Task]) -> EngineResult<()> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for task in tasks {
            if task.id.is_empty() {
                return Err(EngineError::InvalidInput(
                    "task id must not be empty".into(),
                ));
            }
            if !seen.insert(task.id.as_str()) {
                return Err(EngineError::InvalidInput(format!(
                    "duplicate task id '{}'",
                    task.id
                )));
            }
            if task.depends_on.iter().any(|dep| dep == &task.id) {
                return Err(EngineError::InvalidInput(format!(
                    "task '{}' depends on itself",
                    task.id
                )));
            }
        }

        let limit = self.config.analyzer.max_chain_length;
        let longest = longest_declared_chain(tasks);
        if longest > limit {
            return Err(EngineError::InvalidInput(format!(
                "declared dependency chain spans {longest} tasks, limit is {limit}"
            )));
        }
        Ok(())
    }

    /// Clone the input with recorded overrides applied and register the ids
    fn effective_tasks(&self, tasks: &[Task]) -> Vec<Task> {
        self.lock_known()
            .extend(tasks.iter().map(|t| t.id.clone()));
        let overrides = self.lock_overrides();
        tasks
            .iter()
            .map(|task| {
                let mut task = task.clone();
                if let Some(deps) = overrides.get(&task.id) {
                    task.depends_on = deps.clone();
                }
                task
            })
            .collect()
    }

    /// Canonical order-independent cache key for a task set plus strategy
    fn fingerprint(&self, tasks: &[Task]) -> String {
        let mut segments: Vec<String> = tasks
            .iter()
            .map(|task| {
                format!(
                    "{}:{}:{}",
                    task.id,
                    task.priority.rank(),
                    task.depends_on.len()
                )
            })
            .collect();
        segments.sort();
        let mut key = self.config.sequencer.strategy.as_str().to_string();
        for segment in segments {
            key.push('|');
            key.push_str(&segment);
        }
        key
    }

    fn emit(&self, event: &EngineEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }

    fn lock_known(&self) -> std::sync::MutexGuard<'_, BTreeSet<TaskId>> {
        self.known_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_overrides(&self) -> std::sync::MutexGuard<'_, BTreeMap<TaskId, Vec<TaskId>>> {
        self.overrides
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DependencyManager {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Drop malformed tasks for the infallible surface: empty ids and duplicate
/// ids (first occurrence wins)
fn well_formed(tasks: &[Task]) -> Vec<Task> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    tasks
        .iter()
        .filter(|task| !task.id.is_empty() && seen.insert(task.id.as_str()))
        .cloned()
        .collect()
}

fn empty_validation_report() -> ValidationReport {
    ValidationReport {
        issues: Vec::new(),
        metrics: crate::graph::GraphMetrics {
            node_count: 0,
            edge_count: 0,
            average_fan_out: 0.0,
            max_path_length: 0,
            density: 0.0,
            critical_path_length: 0,
            strongly_connected_components: 0,
        },
        is_valid: false,
    }
}

/// Longest declared chain in tasks, following resolvable references only.
///
/// Cycles terminate the walk instead of recursing forever; their length is
/// surfaced through cycle detection, not here.
fn longest_declared_chain(tasks: &[Task]) -> usize {
    let deps: BTreeMap<&str, Vec<&str>> = tasks
        .iter()
        .map(|task| {
            (
                task.id.as_str(),
                task.depends_on.iter().map(String::as_str).collect(),
            )
        })
        .collect();

    fn depth<'a>(
        id: &'a str,
        deps: &BTreeMap<&'a str, Vec<&'a str>>,
        memo: &mut BTreeMap<&'a str, usize>,
        on_path: &mut BTreeSet<&'a str>,
    ) -> usize {
        if let Some(&cached) = memo.get(id) {
            return cached;
        }
        if !on_path.insert(id) {
            return 0;
        }
        let below = deps
            .get(id)
            .map(|predecessors| {
                predecessors
                    .iter()
                    .filter(|dep| deps.contains_key(**dep))
                    .map(|dep| depth(dep, deps, memo, on_path))
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        on_path.remove(id);
        memo.insert(id, below + 1);
        below + 1
    }

    let mut memo = BTreeMap::new();
    let mut on_path = BTreeSet::new();
    deps.keys()
        .map(|id| depth(id, &deps, &mut memo, &mut on_path))
        .max()
        .unwrap_or(0)
}

// ============================================================================
// Tests
// ============================================================================
