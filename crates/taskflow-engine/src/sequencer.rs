//! Execution sequence generation.
//!
//! Four stages: conflict detection, optional automatic resolution, strategy
//! application (parallel group construction over graph levels), and a
//! time-weighted optimization pass that merges adjacent groups which can
//! coexist safely. Resolution and optimization honour wall-clock budgets and
//! degrade rather than fail.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use taskflow_core::{
    CancelToken, EngineResult, Priority, SequencerConfig, Strategy, Task, TaskId,
    ASSUMED_EFFORT_CONFIDENCE_CAP,
};
use tracing::{debug, warn};

use crate::graph::TaskGraph;

/// Resource units one task consumes per required capability (100 = one
/// fully-allocated resource)
const FULL_ALLOCATION: f64 = 100.0;

/// Parallel-safety of critical sub-groups under the critical-path strategy
const CRITICAL_GROUP_SAFETY: f64 = 0.95;

/// Parallel-safety of normal sub-groups under the critical-path strategy
const NORMAL_GROUP_SAFETY: f64 = 0.8;

/// Parallel-safety of level groups under the priority-first strategy
const PRIORITY_GROUP_SAFETY: f64 = 0.9;

/// Groups at or below this safety never participate in merges
const MERGE_SAFETY_FLOOR: f64 = 0.7;

/// Deadlines within this window raise temporal conflicts
const TEMPORAL_CONFLICT_WINDOW_HOURS: f64 = 24.0;

// ============================================================================
// Conflicts
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    Circular,
    ResourceContention,
    PriorityInversion,
    Temporal,
    /// Reserved for external contributors
    Custom,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConflictKind::Circular => "circular",
            ConflictKind::ResourceContention => "resource-contention",
            ConflictKind::PriorityInversion => "priority-inversion",
            ConflictKind::Temporal => "temporal",
            ConflictKind::Custom => "custom",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Estimated cost of leaving a conflict unresolved
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConflictImpact {
    pub time_increase_pct: f64,
    pub resource_utilization_decrease_pct: f64,
    /// Probability of execution failure, in `[0, 1]`
    pub failure_risk: f64,
    /// Probability of degraded output quality, in `[0, 1]`
    pub quality_risk: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub severity: ConflictSeverity,
    pub tasks: Vec<TaskId>,
    pub description: String,
    pub suggested_resolutions: Vec<String>,
    pub impact: ConflictImpact,
}

// ============================================================================
// Resolutions
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    Reschedule,
    PriorityAdjustment,
    EdgeRemoval,
}

impl std::fmt::Display for ResolutionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResolutionAction::Reschedule => "reschedule",
            ResolutionAction::PriorityAdjustment => "priority_adjustment",
            ResolutionAction::EdgeRemoval => "edge_removal",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub action: ResolutionAction,
    pub description: String,
    pub tasks: Vec<TaskId>,
    pub confidence: f64,
    /// Negative when the resolution reduces total time
    pub expected_improvement_ms: f64,
}

// ============================================================================
// Sequence
// ============================================================================

/// Tasks safe to run concurrently, with aggregate estimates
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParallelGroup {
    pub id: String,
    pub tasks: Vec<TaskId>,
    /// Max member effort, in hours
    pub estimated_hours: f64,
    /// Units needed per capability; one member contributes [`FULL_ALLOCATION`]
    pub resource_load: BTreeMap<String, f64>,
    /// Most urgent member priority
    pub priority: Priority,
    /// Group ids that must complete first
    pub depends_on: Vec<String>,
    pub parallel_safety: f64,
}

/// Ordered parallel groups with plan-level metrics
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSequence {
    pub groups: Vec<ParallelGroup>,
    /// Sum of group durations, in hours
    pub total_estimated_hours: f64,
    /// Largest group size
    pub max_concurrency: usize,
    pub resource_efficiency: f64,
    pub critical_path: Vec<TaskId>,
    /// Strategy the caller requested (fallbacks keep the requested name)
    pub strategy: Strategy,
    pub confidence: f64,
}

impl ExecutionSequence {
    /// Task ids flattened in execution order
    pub fn flatten(&self) -> Vec<TaskId> {
        self.groups.iter().flat_map(|g| g.tasks.clone()).collect()
    }
}

/// Sequence plus the audit trail that produced it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequencingOutcome {
    pub sequence: ExecutionSequence,
    pub conflicts: Vec<Conflict>,
    pub resolutions: Vec<Resolution>,
    /// Number of group merges the optimization pass performed
    pub merged_groups: usize,
    /// Set when a bounded stage exceeded its budget and was skipped
    pub degraded: bool,
}

// ============================================================================
// Sequencer
// ============================================================================

/// Builds execution sequences from an analyzed graph
#[derive(Clone, Debug, Default)]
pub struct Sequencer {
    config: SequencerConfig,
}

impl Sequencer {
    pub fn new(config: SequencerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Generate an execution sequence for the graph.
    ///
    /// An empty task set yields an empty sequence with confidence 1.0. A
    /// graph that still contains cycles degrades to a single group holding
    /// every task.
    pub fn generate(
        &self,
        graph: &TaskGraph,
        tasks: &[Task],
        cancel: &CancelToken,
    ) -> EngineResult<SequencingOutcome> {
        if tasks.is_empty() {
            return Ok(SequencingOutcome {
                sequence: ExecutionSequence {
                    groups: Vec::new(),
                    total_estimated_hours: 0.0,
                    max_concurrency: 0,
                    resource_efficiency: 0.8,
                    critical_path: Vec::new(),
                    strategy: self.config.strategy,
                    confidence: 1.0,
                },
                conflicts: Vec::new(),
                resolutions: Vec::new(),
                merged_groups: 0,
                degraded: false,
            });
        }
        cancel.check()?;

        let conflicts = self.detect_conflicts(graph, tasks);
        let mut degraded = false;

        let resolutions = if self.config.enable_auto_conflict_resolution {
            let (resolutions, timed_out) = self.resolve_conflicts(&conflicts);
            if timed_out {
                warn!(
                    budget_ms = self.config.conflict_resolution_timeout_ms,
                    "conflict resolution exceeded its budget; remaining conflicts left open"
                );
                degraded = true;
            }
            resolutions
        } else {
            Vec::new()
        };

        if graph.has_cycles() {
            warn!("graph still contains cycles; emitting degenerate single-group sequence");
            let sequence = self.degenerate_sequence(graph, tasks);
            return Ok(SequencingOutcome {
                sequence,
                conflicts,
                resolutions,
                merged_groups: 0,
                degraded,
            });
        }

        let groups = match self.config.strategy.effective() {
            Strategy::PriorityFirst => self.priority_first_groups(graph),
            _ => self.critical_path_groups(graph),
        };
        cancel.check()?;

        let (groups, merged_groups, timed_out) = if self.config.optimization.time > 0.0 {
            self.optimize_time(groups, graph)
        } else {
            (groups, 0, false)
        };
        if timed_out {
            degraded = true;
        }

        let sequence = self.finish_sequence(groups, graph, tasks, false);
        debug!(
            groups = sequence.groups.len(),
            total_hours = sequence.total_estimated_hours,
            merged = merged_groups,
            "sequence generated"
        );

        Ok(SequencingOutcome {
            sequence,
            conflicts,
            resolutions,
            merged_groups,
            degraded,
        })
    }

    // ------------------------------------------------------------------------
    // Conflict detection
    // ------------------------------------------------------------------------

    pub fn detect_conflicts(&self, graph: &TaskGraph, tasks: &[Task]) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        for cycle in graph.detect_cycles() {
            let suggested: Vec<String> = cycle
                .break_options
                .iter()
                .map(|option| format!("remove edge '{}' -> '{}'", option.from, option.to))
                .collect();
            conflicts.push(Conflict {
                kind: ConflictKind::Circular,
                severity: ConflictSeverity::Critical,
                tasks: cycle.tasks.clone(),
                description: format!("circular dependency between {}", cycle.tasks.join(", ")),
                suggested_resolutions: suggested,
                impact: ConflictImpact {
                    time_increase_pct: 30.0,
                    resource_utilization_decrease_pct: 10.0,
                    failure_risk: 0.9,
                    quality_risk: 0.6,
                },
            });
        }

        let mut by_capability: BTreeMap<&str, Vec<&Task>> = BTreeMap::new();
        for task in tasks {
            for capability in &task.capabilities {
                by_capability.entry(capability.as_str()).or_default().push(task);
            }
        }
        for (capability, members) in by_capability {
            if members.len() < 2 {
                continue;
            }
            let mut ids: Vec<TaskId> = members.iter().map(|t| t.id.clone()).collect();
            ids.sort();
            conflicts.push(Conflict {
                kind: ConflictKind::ResourceContention,
                severity: if members.len() > 3 {
                    ConflictSeverity::High
                } else {
                    ConflictSeverity::Medium
                },
                description: format!(
                    "{} tasks contend for capability '{capability}'",
                    members.len()
                ),
                suggested_resolutions: vec![
                    format!("serialize the '{capability}' tasks in priority order"),
                    format!("add '{capability}' capacity"),
                ],
                tasks: ids,
                impact: ConflictImpact {
                    time_increase_pct: 10.0 * (members.len() as f64 - 1.0),
                    resource_utilization_decrease_pct: 15.0,
                    failure_risk: 0.3,
                    quality_risk: 0.2,
                },
            });
        }

        let by_id: BTreeMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        for dependent in tasks {
            for dep in &dependent.depends_on {
                let Some(blocker) = by_id.get(dep.as_str()) else {
                    continue;
                };
                let gap = i32::from(dependent.priority.rank()) - i32::from(blocker.priority.rank());
                if gap <= 0 {
                    continue;
                }
                conflicts.push(Conflict {
                    kind: ConflictKind::PriorityInversion,
                    severity: if gap >= 2 {
                        ConflictSeverity::High
                    } else {
                        ConflictSeverity::Medium
                    },
                    tasks: vec![blocker.id.clone(), dependent.id.clone()],
                    description: format!(
                        "{} task '{}' waits on {} task '{}'",
                        dependent.priority, dependent.id, blocker.priority, blocker.id
                    ),
                    suggested_resolutions: vec![format!(
                        "raise '{}' to {} priority",
                        blocker.id, dependent.priority
                    )],
                    impact: ConflictImpact {
                        time_increase_pct: 5.0 * f64::from(gap),
                        resource_utilization_decrease_pct: 5.0,
                        failure_risk: 0.4,
                        quality_risk: 0.3,
                    },
                });
            }
        }

        let mut dated: Vec<&Task> = tasks.iter().filter(|t| t.deadline.is_some()).collect();
        dated.sort_by(|x, y| x.deadline.cmp(&y.deadline).then_with(|| x.id.cmp(&y.id)));
        for window in dated.windows(2) {
            let (first, second) = (window[0], window[1]);
            let gap = *second.deadline.as_ref().expect("filtered")
                - *first.deadline.as_ref().expect("filtered");
            let gap_hours = gap.num_minutes() as f64 / 60.0;
            if gap_hours <= TEMPORAL_CONFLICT_WINDOW_HOURS {
                conflicts.push(Conflict {
                    kind: ConflictKind::Temporal,
                    severity: ConflictSeverity::Low,
                    tasks: vec![first.id.clone(), second.id.clone()],
                    description: format!(
                        "deadlines of '{}' and '{}' are {gap_hours:.1}h apart",
                        first.id, second.id
                    ),
                    suggested_resolutions: vec![format!(
                        "schedule '{}' ahead of '{}'",
                        first.id, second.id
                    )],
                    impact: ConflictImpact {
                        time_increase_pct: 5.0,
                        resource_utilization_decrease_pct: 0.0,
                        failure_risk: 0.2,
                        quality_risk: 0.1,
                    },
                });
            }
        }

        conflicts
    }

    // ------------------------------------------------------------------------
    // Conflict resolution
    // ------------------------------------------------------------------------

    /// Dispatch resolutions by conflict kind within the configured budget.
    ///
    /// Returns the resolutions produced and whether the budget ran out.
    fn resolve_conflicts(&self, conflicts: &[Conflict]) -> (Vec<Resolution>, bool) {
        let deadline =
            Instant::now() + Duration::from_millis(self.config.conflict_resolution_timeout_ms);
        let mut resolutions = Vec::new();

        for conflict in conflicts {
            if Instant::now() > deadline {
                return (resolutions, true);
            }
            match conflict.kind {
                ConflictKind::ResourceContention => resolutions.push(Resolution {
                    action: ResolutionAction::Reschedule,
                    description: format!(
                        "serialize {} in priority order",
                        conflict.tasks.join(", ")
                    ),
                    tasks: conflict.tasks.clone(),
                    confidence: 0.8,
                    expected_improvement_ms: 0.0,
                }),
                ConflictKind::PriorityInversion => resolutions.push(Resolution {
                    action: ResolutionAction::PriorityAdjustment,
                    description: conflict
                        .suggested_resolutions
                        .first()
                        .cloned()
                        .unwrap_or_else(|| "boost the blocking task".into()),
                    tasks: conflict.tasks.clone(),
                    confidence: 0.9,
                    expected_improvement_ms: -900_000.0,
                }),
                ConflictKind::Circular => resolutions.push(Resolution {
                    action: ResolutionAction::EdgeRemoval,
                    description: conflict
                        .suggested_resolutions
                        .first()
                        .cloned()
                        .unwrap_or_else(|| "break the cycle".into()),
                    tasks: conflict.tasks.clone(),
                    confidence: 0.7,
                    expected_improvement_ms: 0.0,
                }),
                ConflictKind::Temporal | ConflictKind::Custom => {}
            }
        }

        (resolutions, false)
    }

    // ------------------------------------------------------------------------
    // Strategies
    // ------------------------------------------------------------------------

    /// One group per topological level, members ordered most urgent first
    fn priority_first_groups(&self, graph: &TaskGraph) -> Vec<ParallelGroup> {
        let mut groups = Vec::new();
        let mut previous: Option<String> = None;

        for (level, mut members) in graph.levels() {
            sort_by_urgency(&mut members, graph);
            let depends_on = previous.iter().cloned().collect();
            let group = build_group(
                format!("level-{level}"),
                members,
                graph,
                PRIORITY_GROUP_SAFETY,
                None,
                depends_on,
            );
            previous = Some(group.id.clone());
            groups.push(group);
        }
        groups
    }

    /// Each level split into a critical sub-group and a normal sub-group
    fn critical_path_groups(&self, graph: &TaskGraph) -> Vec<ParallelGroup> {
        let mut groups = Vec::new();
        let mut previous_level_ids: Vec<String> = Vec::new();

        for (level, members) in graph.levels() {
            let (critical, normal): (Vec<TaskId>, Vec<TaskId>) = members
                .into_iter()
                .partition(|id| graph.node(id).is_some_and(|n| n.on_critical_path));

            let mut level_ids = Vec::new();
            let mut critical_id = None;

            if !critical.is_empty() {
                let group = build_group(
                    format!("level-{level}-critical"),
                    critical,
                    graph,
                    CRITICAL_GROUP_SAFETY,
                    Some(Priority::Critical),
                    previous_level_ids.clone(),
                );
                critical_id = Some(group.id.clone());
                level_ids.push(group.id.clone());
                groups.push(group);
            }
            if !normal.is_empty() {
                let depends_on = match &critical_id {
                    Some(id) => vec![id.clone()],
                    None => previous_level_ids.clone(),
                };
                let group = build_group(
                    format!("level-{level}"),
                    normal,
                    graph,
                    NORMAL_GROUP_SAFETY,
                    None,
                    depends_on,
                );
                level_ids.push(group.id.clone());
                groups.push(group);
            }

            previous_level_ids = level_ids;
        }
        groups
    }

    /// Last-resort sequence: every task in one serial group
    fn degenerate_sequence(&self, graph: &TaskGraph, tasks: &[Task]) -> ExecutionSequence {
        let mut members: Vec<TaskId> = tasks.iter().map(|t| t.id.clone()).collect();
        sort_by_urgency(&mut members, graph);
        let group = build_group("all-tasks".into(), members, graph, 0.5, None, Vec::new());
        let mut sequence = self.finish_sequence(vec![group], graph, tasks, true);
        sequence.confidence = 0.5;
        sequence
    }

    // ------------------------------------------------------------------------
    // Optimization
    // ------------------------------------------------------------------------

    /// Merge consecutive groups that can coexist safely.
    ///
    /// A merge requires the combined size to stay within
    /// `max_parallel_groups`, both safeties above the floor, and no
    /// dependency edge between members of the two groups. Exceeding the
    /// optimization budget abandons the pass and keeps the input groups.
    fn optimize_time(
        &self,
        groups: Vec<ParallelGroup>,
        graph: &TaskGraph,
    ) -> (Vec<ParallelGroup>, usize, bool) {
        let deadline = self
            .config
            .max_optimization_time_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let original = groups.clone();

        let mut merged: Vec<ParallelGroup> = Vec::new();
        let mut renames: BTreeMap<String, String> = BTreeMap::new();
        let mut merges = 0usize;

        for group in groups {
            if deadline.is_some_and(|d| Instant::now() > d) {
                warn!("optimization pass exceeded its budget; keeping unmerged groups");
                return (original, 0, true);
            }
            match merged.last_mut() {
                Some(last) if self.can_merge(last, &group, graph) => {
                    renames.insert(group.id.clone(), last.id.clone());
                    merge_into(last, group);
                    merges += 1;
                }
                _ => merged.push(group),
            }
        }

        // Dependencies on absorbed groups follow them to the surviving group.
        for group in &mut merged {
            let mut rewired: Vec<String> = group
                .depends_on
                .iter()
                .map(|dep| {
                    let mut target = dep.clone();
                    while let Some(next) = renames.get(&target) {
                        target = next.clone();
                    }
                    target
                })
                .filter(|dep| dep != &group.id)
                .collect();
            rewired.dedup();
            group.depends_on = rewired;
        }

        (merged, merges, false)
    }

    fn can_merge(&self, a: &ParallelGroup, b: &ParallelGroup, graph: &TaskGraph) -> bool {
        if a.tasks.len() + b.tasks.len() > self.config.max_parallel_groups {
            return false;
        }
        if a.parallel_safety <= MERGE_SAFETY_FLOOR || b.parallel_safety <= MERGE_SAFETY_FLOOR {
            return false;
        }
        for x in &a.tasks {
            for y in &b.tasks {
                if graph.connected(x, y) {
                    return false;
                }
            }
        }
        true
    }

    // ------------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------------

    fn finish_sequence(
        &self,
        groups: Vec<ParallelGroup>,
        graph: &TaskGraph,
        tasks: &[Task],
        degenerate: bool,
    ) -> ExecutionSequence {
        let total_estimated_hours: f64 = groups.iter().map(|g| g.estimated_hours).sum();
        let max_concurrency = groups.iter().map(|g| g.tasks.len()).max().unwrap_or(0);

        let total_resources: f64 = groups
            .iter()
            .flat_map(|g| g.resource_load.values())
            .sum();
        let denominator = groups.len() as f64 * 100.0;
        let resource_efficiency = if denominator == 0.0 {
            0.8
        } else {
            (total_resources / denominator).min(1.0)
        };

        let mean_safety = if groups.is_empty() {
            1.0
        } else {
            groups.iter().map(|g| g.parallel_safety).sum::<f64>() / groups.len() as f64
        };

        let mut confidence = mean_safety.min(resource_efficiency + 0.1);
        if tasks.iter().any(|t| t.effort_hours.is_none()) {
            confidence = confidence.min(ASSUMED_EFFORT_CONFIDENCE_CAP);
        }
        if degenerate {
            confidence = confidence.min(0.5);
        }

        ExecutionSequence {
            groups,
            total_estimated_hours,
            max_concurrency,
            resource_efficiency,
            critical_path: graph.critical_path().to_vec(),
            strategy: self.config.strategy,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

// ============================================================================
// Group helpers
// ============================================================================

fn sort_by_urgency(members: &mut [TaskId], graph: &TaskGraph) {
    members.sort_by(|x, y| {
        let rank = |id: &TaskId| graph.node(id).map_or(0, |n| n.task.priority.rank());
        rank(y).cmp(&rank(x)).then_with(|| x.cmp(y))
    });
}

fn build_group(
    id: String,
    members: Vec<TaskId>,
    graph: &TaskGraph,
    parallel_safety: f64,
    priority_override: Option<Priority>,
    depends_on: Vec<String>,
) -> ParallelGroup {
    let mut estimated_hours = 0.0_f64;
    let mut resource_load: BTreeMap<String, f64> = BTreeMap::new();
    let mut priority = Priority::Background;

    for member in &members {
        if let Some(node) = graph.node(member) {
            estimated_hours = estimated_hours.max(node.effort());
            for capability in &node.task.capabilities {
                *resource_load.entry(capability.clone()).or_insert(0.0) += FULL_ALLOCATION;
            }
            priority = priority.most_urgent(node.task.priority);
        }
    }

    ParallelGroup {
        id,
        tasks: members,
        estimated_hours,
        resource_load,
        priority: priority_override.unwrap_or(priority),
        depends_on,
        parallel_safety,
    }
}

fn merge_into(survivor: &mut ParallelGroup, absorbed: ParallelGroup) {
    survivor.tasks.extend(absorbed.tasks);
    survivor.estimated_hours = survivor.estimated_hours.max(absorbed.estimated_hours);
    for (capability, units) in absorbed.resource_load {
        *survivor.resource_load.entry(capability).or_insert(0.0) += units;
    }
    survivor.priority = survivor.priority.most_urgent(absorbed.priority);
    survivor.parallel_safety = survivor.parallel_safety.min(absorbed.parallel_safety);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::DependencyAnalyzer;
    use pretty_assertions::assert_eq;
    use taskflow_core::{AnalyzerConfig, Task};

    fn sequencer() -> Sequencer {
        Sequencer::new(SequencerConfig::default())
    }

    fn graph_for(tasks: &[Task]) -> TaskGraph {
        let report = DependencyAnalyzer::new(AnalyzerConfig::default())
            .analyze(tasks, &CancelToken::never())
            .unwrap();
        let mut graph = TaskGraph::build(tasks, &report.edges).unwrap();
        // repair the way the manager does: cheapest break option first
        while graph.has_cycles() {
            let cycles = graph.detect_cycles();
            let option = cycles[0].break_options.first().cloned().expect("break option");
            graph.remove_edge(&option.from, &option.to).unwrap();
        }
        graph
    }

    fn generate(tasks: &[Task]) -> SequencingOutcome {
        let graph = graph_for(tasks);
        sequencer().generate(&graph, tasks, &CancelToken::never()).unwrap()
    }

    #[test]
    fn empty_input_yields_empty_sequence() {
        let graph = TaskGraph::build(&[], &[]).unwrap();
        let outcome = sequencer().generate(&graph, &[], &CancelToken::never()).unwrap();
        assert!(outcome.sequence.groups.is_empty());
        assert_eq!(outcome.sequence.confidence, 1.0);
        assert_eq!(outcome.sequence.total_estimated_hours, 0.0);
        assert_eq!(outcome.sequence.resource_efficiency, 0.8);
    }

    #[test]
    fn linear_chain_produces_single_task_groups() {
        let tasks = vec![
            Task::new("a").effort_hours(1.0),
            Task::new("b").effort_hours(1.0).depends_on("a"),
            Task::new("c").effort_hours(1.0).depends_on("b"),
        ];
        let outcome = generate(&tasks);

        let flattened = outcome.sequence.flatten();
        assert_eq!(flattened, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(outcome.sequence.groups.len(), 3);
        assert_eq!(outcome.sequence.total_estimated_hours, 3.0);
        assert_eq!(outcome.sequence.max_concurrency, 1);
        assert_eq!(outcome.sequence.critical_path, vec!["a", "b", "c"]);
    }

    #[test]
    fn fan_out_runs_in_parallel() {
        let tasks = vec![
            Task::new("r").effort_hours(1.0),
            Task::new("x").effort_hours(1.0).depends_on("r"),
            Task::new("y").effort_hours(1.0).depends_on("r"),
            Task::new("z").effort_hours(1.0).depends_on("r"),
        ];
        let outcome = generate(&tasks);

        assert_eq!(outcome.sequence.groups.len(), 2);
        assert_eq!(outcome.sequence.groups[0].tasks, vec!["r".to_string()]);
        assert_eq!(
            outcome.sequence.groups[1].tasks,
            vec!["x".to_string(), "y".to_string(), "z".to_string()]
        );
        assert_eq!(outcome.sequence.max_concurrency, 3);
        assert_eq!(outcome.sequence.total_estimated_hours, 2.0);
    }

    #[test]
    fn critical_path_strategy_splits_levels() {
        // a(5h) is critical at level 0; b(3h) idles beside it
        let tasks = vec![
            Task::new("a").effort_hours(5.0),
            Task::new("b").effort_hours(3.0),
            Task::new("c").effort_hours(2.0).depends_on("a").depends_on("b"),
        ];
        let graph = graph_for(&tasks);
        let groups = sequencer().critical_path_groups(&graph);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].id, "level-0-critical");
        assert_eq!(groups[0].tasks, vec!["a".to_string()]);
        assert_eq!(groups[0].priority, Priority::Critical);
        assert_eq!(groups[0].parallel_safety, CRITICAL_GROUP_SAFETY);

        assert_eq!(groups[1].id, "level-0");
        assert_eq!(groups[1].tasks, vec!["b".to_string()]);
        assert_eq!(groups[1].parallel_safety, NORMAL_GROUP_SAFETY);
        assert_eq!(groups[1].depends_on, vec!["level-0-critical".to_string()]);

        assert_eq!(groups[2].tasks, vec!["c".to_string()]);
    }

    #[test]
    fn optimization_merges_same_level_subgroups() {
        // a and b share level 0 with no edge between them, so the critical
        // and normal sub-groups merge back together
        let tasks = vec![
            Task::new("a").effort_hours(5.0),
            Task::new("b").effort_hours(3.0),
            Task::new("c").effort_hours(2.0).depends_on("a").depends_on("b"),
        ];
        let outcome = generate(&tasks);

        assert_eq!(outcome.merged_groups, 1);
        assert_eq!(outcome.sequence.groups.len(), 2);
        assert_eq!(
            outcome.sequence.groups[0].tasks,
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(outcome.sequence.groups[0].estimated_hours, 5.0);
        assert_eq!(outcome.sequence.groups[0].parallel_safety, NORMAL_GROUP_SAFETY);
        // the successor group follows the surviving id
        assert_eq!(
            outcome.sequence.groups[1].depends_on,
            vec!["level-0-critical".to_string()]
        );
        assert_eq!(outcome.sequence.total_estimated_hours, 7.0);
    }

    #[test]
    fn merge_respects_group_size_cap() {
        let mut config = SequencerConfig::default();
        config.max_parallel_groups = 1;
        let tasks = vec![
            Task::new("a").effort_hours(5.0),
            Task::new("b").effort_hours(3.0),
            Task::new("c").effort_hours(2.0).depends_on("a").depends_on("b"),
        ];
        let graph = graph_for(&tasks);
        let outcome = Sequencer::new(config)
            .generate(&graph, &tasks, &CancelToken::never())
            .unwrap();
        assert_eq!(outcome.merged_groups, 0);
        assert_eq!(outcome.sequence.groups.len(), 3);
    }

    #[test]
    fn merge_never_spans_dependencies() {
        let tasks = vec![
            Task::new("a").effort_hours(1.0),
            Task::new("b").effort_hours(1.0).depends_on("a"),
        ];
        let outcome = generate(&tasks);
        assert_eq!(outcome.merged_groups, 0);
        assert_eq!(outcome.sequence.groups.len(), 2);
    }

    #[test]
    fn zero_time_weight_skips_optimization() {
        let mut config = SequencerConfig::default();
        config.optimization.time = 0.0;
        let tasks = vec![
            Task::new("a").effort_hours(5.0),
            Task::new("b").effort_hours(3.0),
            Task::new("c").effort_hours(2.0).depends_on("a").depends_on("b"),
        ];
        let graph = graph_for(&tasks);
        let outcome = Sequencer::new(config)
            .generate(&graph, &tasks, &CancelToken::never())
            .unwrap();
        assert_eq!(outcome.merged_groups, 0);
        assert_eq!(outcome.sequence.groups.len(), 3);
    }

    #[test]
    fn priority_first_orders_members_by_urgency() {
        let mut config = SequencerConfig::default();
        config.strategy = Strategy::PriorityFirst;
        let tasks = vec![
            Task::new("slow").priority(Priority::Low),
            Task::new("hot").priority(Priority::Critical),
            Task::new("warm").priority(Priority::High),
        ];
        let graph = TaskGraph::build(&tasks, &[]).unwrap();
        let outcome = Sequencer::new(config)
            .generate(&graph, &tasks, &CancelToken::never())
            .unwrap();

        assert_eq!(outcome.sequence.groups.len(), 1);
        assert_eq!(
            outcome.sequence.groups[0].tasks,
            vec!["hot".to_string(), "warm".to_string(), "slow".to_string()]
        );
        assert_eq!(outcome.sequence.groups[0].priority, Priority::Critical);
        assert_eq!(outcome.sequence.strategy, Strategy::PriorityFirst);
    }

    #[test]
    fn resource_optimized_falls_back_to_critical_path() {
        let mut config = SequencerConfig::default();
        config.strategy = Strategy::ResourceOptimized;
        let tasks = vec![
            Task::new("a").effort_hours(1.0),
            Task::new("b").effort_hours(1.0).depends_on("a"),
        ];
        let graph = graph_for(&tasks);
        let outcome = Sequencer::new(config)
            .generate(&graph, &tasks, &CancelToken::never())
            .unwrap();

        // grouping follows the critical-path rules, the name stays as asked
        assert_eq!(outcome.sequence.strategy, Strategy::ResourceOptimized);
        assert_eq!(outcome.sequence.groups[0].id, "level-0-critical");
    }

    #[test]
    fn resource_contention_conflict() {
        let tasks = vec![
            Task::new("a").requires("database"),
            Task::new("b").requires("database"),
        ];
        let graph = graph_for(&tasks);
        let conflicts = sequencer().detect_conflicts(&graph, &tasks);

        let contention: Vec<_> = conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::ResourceContention)
            .collect();
        assert_eq!(contention.len(), 1);
        assert_eq!(contention[0].tasks, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(contention[0].severity, ConflictSeverity::Medium);
    }

    #[test]
    fn priority_inversion_conflict_and_resolution() {
        let tasks = vec![
            Task::new("a").priority(Priority::Low),
            Task::new("b").priority(Priority::Critical).depends_on("a"),
        ];
        let outcome = generate(&tasks);

        let inversion: Vec<_> = outcome
            .conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::PriorityInversion)
            .collect();
        assert_eq!(inversion.len(), 1);
        assert_eq!(inversion[0].tasks, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(inversion[0].severity, ConflictSeverity::High);

        let adjustment: Vec<_> = outcome
            .resolutions
            .iter()
            .filter(|r| r.action == ResolutionAction::PriorityAdjustment)
            .collect();
        assert_eq!(adjustment.len(), 1);
        assert!(adjustment[0].expected_improvement_ms < 0.0);

        // the inversion never reorders execution
        let order = outcome.sequence.flatten();
        let a_pos = order.iter().position(|id| id == "a").unwrap();
        let b_pos = order.iter().position(|id| id == "b").unwrap();
        assert!(a_pos < b_pos);
    }

    #[test]
    fn circular_conflict_defers_to_break_options() {
        let tasks = vec![
            Task::new("a").depends_on("b"),
            Task::new("b").depends_on("a"),
        ];
        let report = DependencyAnalyzer::new(AnalyzerConfig::default())
            .analyze(&tasks, &CancelToken::never())
            .unwrap();
        let graph = TaskGraph::build(&tasks, &report.edges).unwrap();
        let outcome = sequencer().generate(&graph, &tasks, &CancelToken::never()).unwrap();

        let circular: Vec<_> = outcome
            .conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::Circular)
            .collect();
        assert_eq!(circular.len(), 1);
        assert!(!circular[0].suggested_resolutions.is_empty());

        let removal: Vec<_> = outcome
            .resolutions
            .iter()
            .filter(|r| r.action == ResolutionAction::EdgeRemoval)
            .collect();
        assert_eq!(removal.len(), 1);

        // unrepaired cycle degrades to a single serial group
        assert_eq!(outcome.sequence.groups.len(), 1);
        assert_eq!(outcome.sequence.groups[0].tasks.len(), 2);
        assert_eq!(outcome.sequence.confidence, 0.5);
    }

    #[test]
    fn disabled_auto_resolution_reports_nothing() {
        let mut config = SequencerConfig::default();
        config.enable_auto_conflict_resolution = false;
        let tasks = vec![
            Task::new("a").priority(Priority::Low),
            Task::new("b").priority(Priority::Critical).depends_on("a"),
        ];
        let graph = graph_for(&tasks);
        let outcome = Sequencer::new(config)
            .generate(&graph, &tasks, &CancelToken::never())
            .unwrap();
        assert!(!outcome.conflicts.is_empty());
        assert!(outcome.resolutions.is_empty());
    }

    #[test]
    fn temporal_conflicts_stay_unresolved() {
        use chrono::TimeZone;
        let base = chrono::Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        let tasks = vec![
            Task::new("a").deadline(base),
            Task::new("b").deadline(base + chrono::Duration::hours(6)),
        ];
        let graph = graph_for(&tasks);
        let outcome = sequencer().generate(&graph, &tasks, &CancelToken::never()).unwrap();

        assert!(outcome
            .conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::Temporal));
        assert!(outcome
            .resolutions
            .iter()
            .all(|r| r.action != ResolutionAction::Reschedule || r.tasks.len() > 1));
    }

    #[test]
    fn resource_units_feed_efficiency() {
        let tasks = vec![
            Task::new("a").requires("db").effort_hours(1.0),
            Task::new("b").requires("db").effort_hours(1.0),
        ];
        let outcome = generate(&tasks);
        // resource serialization puts a and b in separate groups, each
        // loading 100 units of 'db'; 200 units over 2 groups is full use
        assert_eq!(outcome.sequence.resource_efficiency, 1.0);
    }

    #[test]
    fn undeclared_effort_caps_confidence() {
        let tasks = vec![Task::new("a"), Task::new("b").depends_on("a")];
        let outcome = generate(&tasks);
        assert!(outcome.sequence.confidence <= ASSUMED_EFFORT_CONFIDENCE_CAP);
    }

    #[test]
    fn cancellation_propagates() {
        let tasks = vec![Task::new("a")];
        let graph = graph_for(&tasks);
        let token = CancelToken::new();
        token.cancel();
        let err = sequencer().generate(&graph, &tasks, &token).unwrap_err();
        assert_eq!(err, taskflow_core::EngineError::Cancelled);
    }

    #[test]
    fn sequence_serde_round_trip() {
        let tasks = vec![
            Task::new("a").effort_hours(1.0).requires("db"),
            Task::new("b").effort_hours(1.0).depends_on("a"),
        ];
        let outcome = generate(&tasks);
        let json = serde_json::to_string(&outcome.sequence).unwrap();
        assert!(json.contains("\"critical-path\""));
        let back: ExecutionSequence = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome.sequence);
    }

    #[test]
    fn generation_is_deterministic() {
        let tasks = vec![
            Task::new("a").effort_hours(5.0).requires("db"),
            Task::new("b").effort_hours(3.0).requires("db"),
            Task::new("c").effort_hours(2.0).depends_on("a").depends_on("b"),
        ];
        let first = generate(&tasks);
        let second = generate(&tasks);
        assert_eq!(first, second);
    }
}
