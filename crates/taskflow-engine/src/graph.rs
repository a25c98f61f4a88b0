//! Dependency graph construction, analysis, and repair.
//!
//! The graph is built once from a task set and a candidate edge list, then
//! enriched by three derived passes: topological levels (Kahn), earliest and
//! latest start times (longest-path forward/backward), and slack with
//! critical-path markers. Cycle detection runs Tarjan's strongly-connected
//! components over the adjacency and scores break options for repair.
//!
//! A graph stays mutable through repair (`remove_edge` recomputes the derived
//! passes) and becomes immutable once sealed.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use taskflow_core::{CandidateEdge, EdgeKind, EngineError, EngineResult, Task, TaskId};
use tracing::debug;

/// Slack below this bound marks a node as critical
pub const SLACK_EPSILON: f64 = 0.01;

/// Blocking edges carry this weight multiplier
const BLOCKING_WEIGHT_FACTOR: f64 = 1.2;

/// Out-degree above this raises an excessive-fan-out issue
const FAN_OUT_LIMIT: usize = 5;

/// Chains longer than this many tasks raise a long-path issue
const LONG_PATH_LIMIT: usize = 10;

// ============================================================================
// Nodes & Edges
// ============================================================================

/// A task enriched with graph-computed scheduling fields
#[derive(Clone, Debug, PartialEq)]
pub struct GraphNode {
    pub task: Task,
    /// Topological level; roots sit at 0
    pub level: u32,
    /// Earliest start in hours from plan start
    pub earliest_start: f64,
    /// Latest start that delays no successor
    pub latest_start: f64,
    /// `latest_start - earliest_start`
    pub slack: f64,
    pub on_critical_path: bool,
    /// Successor task ids, sorted
    pub successors: Vec<TaskId>,
    /// Predecessor task ids, sorted
    pub predecessors: Vec<TaskId>,
}

impl GraphNode {
    fn new(task: Task) -> Self {
        Self {
            task,
            level: 0,
            earliest_start: 0.0,
            latest_start: 0.0,
            slack: 0.0,
            on_critical_path: false,
            successors: Vec::new(),
            predecessors: Vec::new(),
        }
    }

    pub fn effort(&self) -> f64 {
        self.task.scheduling_effort()
    }
}

/// A weighted arc between two nodes
#[derive(Clone, Debug, PartialEq)]
pub struct GraphEdge {
    pub from: TaskId,
    pub to: TaskId,
    pub kind: EdgeKind,
    pub confidence: f64,
    /// `confidence × type factor × blocking bonus`, capped at 1.0
    pub weight: f64,
    pub blocking: bool,
    pub estimated_delay_hours: f64,
    pub on_critical_path: bool,
}

impl GraphEdge {
    fn from_candidate(candidate: &CandidateEdge) -> Self {
        let bonus = if candidate.blocking {
            BLOCKING_WEIGHT_FACTOR
        } else {
            1.0
        };
        Self {
            from: candidate.from.clone(),
            to: candidate.to.clone(),
            kind: candidate.kind,
            confidence: candidate.confidence,
            weight: (candidate.confidence * candidate.kind.type_factor() * bonus).min(1.0),
            blocking: candidate.blocking,
            estimated_delay_hours: candidate.estimated_delay_hours,
            on_critical_path: false,
        }
    }
}

// ============================================================================
// Cycles
// ============================================================================

/// A strongly connected component of size >= 2 (or a self-loop)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    /// Member task ids, sorted
    pub tasks: Vec<TaskId>,
    /// Candidate edge removals, least harmful first
    pub break_options: Vec<BreakOption>,
}

/// A candidate edge removal that would help eliminate a cycle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BreakOption {
    pub from: TaskId,
    pub to: TaskId,
    /// Estimated harm of removing the edge; lower is preferred
    pub impact: f64,
}

// ============================================================================
// Validation
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    CircularDependency,
    OrphanedNode,
    ExcessiveFanOut,
    LongPath,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IssueKind::CircularDependency => "circular_dependency",
            IssueKind::OrphanedNode => "orphaned_node",
            IssueKind::ExcessiveFanOut => "excessive_fan_out",
            IssueKind::LongPath => "long_path",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// A single structural fault found by validation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    pub tasks: Vec<TaskId>,
    pub message: String,
}

/// Aggregate structure metrics
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub average_fan_out: f64,
    /// Longest chain length, in tasks
    pub max_path_length: usize,
    /// `edges / (n * (n - 1))`
    pub density: f64,
    pub critical_path_length: usize,
    /// Non-trivial strongly connected components
    pub strongly_connected_components: usize,
}

/// Outcome of a validation pass
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    pub metrics: GraphMetrics,
    /// True iff no critical-severity issue remains
    pub is_valid: bool,
}

// ============================================================================
// TaskGraph
// ============================================================================

/// Immutable-after-seal dependency graph with computed scheduling fields
#[derive(Clone, Debug, PartialEq, Default)]
pub struct TaskGraph {
    nodes: BTreeMap<TaskId, GraphNode>,
    edges: BTreeMap<(TaskId, TaskId), GraphEdge>,
    has_cycles: bool,
    critical_path: Vec<TaskId>,
    completion_hours: f64,
    sealed: bool,
}

impl TaskGraph {
    /// Build a graph from tasks and candidate edges.
    ///
    /// Edges with a missing endpoint or equal endpoints are dropped. The
    /// returned graph is unsealed so cycle repair may still remove edges;
    /// call [`TaskGraph::seal`] once repair is done.
    pub fn build(tasks: &[Task], candidates: &[CandidateEdge]) -> EngineResult<Self> {
        let mut nodes: BTreeMap<TaskId, GraphNode> = BTreeMap::new();
        for task in tasks {
            if task.id.is_empty() {
                return Err(EngineError::InvalidInput(
                    "task id must not be empty".into(),
                ));
            }
            if nodes
                .insert(task.id.clone(), GraphNode::new(task.clone()))
                .is_some()
            {
                return Err(EngineError::InvalidInput(format!(
                    "duplicate task id '{}'",
                    task.id
                )));
            }
        }

        let mut edges: BTreeMap<(TaskId, TaskId), GraphEdge> = BTreeMap::new();
        for candidate in candidates {
            if candidate.from == candidate.to {
                continue;
            }
            if !nodes.contains_key(&candidate.from) || !nodes.contains_key(&candidate.to) {
                continue;
            }
            let edge = GraphEdge::from_candidate(candidate);
            match edges.entry(candidate.key()) {
                std::collections::btree_map::Entry::Vacant(slot) => {
                    slot.insert(edge);
                }
                std::collections::btree_map::Entry::Occupied(mut slot) => {
                    if edge.confidence > slot.get().confidence {
                        slot.insert(edge);
                    }
                }
            }
        }

        let mut graph = Self {
            nodes,
            edges,
            has_cycles: false,
            critical_path: Vec::new(),
            completion_hours: 0.0,
            sealed: false,
        };
        graph.recompute();
        Ok(graph)
    }

    /// Mark the graph immutable. Further mutation surfaces `SealedGraph`.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&GraphEdge> {
        self.edges.get(&(from.to_string(), to.to_string()))
    }

    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.values()
    }

    /// True when an edge connects the two tasks in either direction
    pub fn connected(&self, a: &str, b: &str) -> bool {
        self.edge(a, b).is_some() || self.edge(b, a).is_some()
    }

    pub fn has_cycles(&self) -> bool {
        self.has_cycles
    }

    /// Tasks on the critical path, ordered by earliest start
    pub fn critical_path(&self) -> &[TaskId] {
        &self.critical_path
    }

    /// Total plan duration along the longest chain, in hours
    pub fn completion_hours(&self) -> f64 {
        self.completion_hours
    }

    /// Node ids grouped by topological level, ascending
    pub fn levels(&self) -> BTreeMap<u32, Vec<TaskId>> {
        let mut levels: BTreeMap<u32, Vec<TaskId>> = BTreeMap::new();
        for (id, node) in &self.nodes {
            levels.entry(node.level).or_default().push(id.clone());
        }
        levels
    }

    /// Remove an edge and recompute the derived passes.
    ///
    /// Returns `Ok(false)` when the edge is absent and `SealedGraph` once the
    /// graph has been sealed.
    pub fn remove_edge(&mut self, from: &str, to: &str) -> EngineResult<bool> {
        if self.sealed {
            return Err(EngineError::SealedGraph(format!(
                "cannot remove edge {from} -> {to}"
            )));
        }
        let removed = self
            .edges
            .remove(&(from.to_string(), to.to_string()))
            .is_some();
        if removed {
            debug!(from, to, "removed edge");
            self.recompute();
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------------
    // Derived passes
    // ------------------------------------------------------------------------

    fn recompute(&mut self) {
        self.rebuild_adjacency();
        self.compute_levels();
        if self.has_cycles {
            // Start times are meaningless while a cycle remains; leave the
            // scheduling fields zeroed until repair completes.
            for node in self.nodes.values_mut() {
                node.earliest_start = 0.0;
                node.latest_start = 0.0;
                node.slack = 0.0;
                node.on_critical_path = false;
            }
            for edge in self.edges.values_mut() {
                edge.on_critical_path = false;
            }
            self.critical_path.clear();
            self.completion_hours = 0.0;
            return;
        }
        self.compute_start_times();
        self.compute_critical_path();
    }

    fn rebuild_adjacency(&mut self) {
        for node in self.nodes.values_mut() {
            node.successors.clear();
            node.predecessors.clear();
        }
        // Edge map iteration is ordered, so adjacency lists come out sorted.
        let pairs: Vec<(TaskId, TaskId)> = self.edges.keys().cloned().collect();
        for (from, to) in pairs {
            if let Some(node) = self.nodes.get_mut(&from) {
                node.successors.push(to.clone());
            }
            if let Some(node) = self.nodes.get_mut(&to) {
                node.predecessors.push(from);
            }
        }
    }

    /// Kahn's algorithm. Nodes left unprocessed by a cycle inherit the
    /// maximum assigned level so the partial ordering stays usable during
    /// repair.
    fn compute_levels(&mut self) {
        let mut in_degree: BTreeMap<TaskId, usize> = self
            .nodes
            .iter()
            .map(|(id, node)| (id.clone(), node.predecessors.len()))
            .collect();
        let mut levels: BTreeMap<TaskId, u32> = BTreeMap::new();

        let mut queue: VecDeque<TaskId> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &queue {
            levels.insert(id.clone(), 0);
        }

        let mut processed = 0usize;
        while let Some(id) = queue.pop_front() {
            processed += 1;
            let level = levels[&id];
            let successors = self.nodes[&id].successors.clone();
            for succ in successors {
                let entry = levels.entry(succ.clone()).or_insert(0);
                *entry = (*entry).max(level + 1);
                let degree = in_degree.get_mut(&succ).expect("successor is a node");
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(succ);
                }
            }
        }

        self.has_cycles = processed < self.nodes.len();
        let max_level = levels.values().copied().max().unwrap_or(0);
        for (id, node) in &mut self.nodes {
            node.level = levels.get(id).copied().unwrap_or(max_level);
        }
    }

    /// Longest-path forward and backward passes over the DAG.
    fn compute_start_times(&mut self) {
        let order = self.level_order();

        for id in &order {
            let earliest = self.nodes[id]
                .predecessors
                .iter()
                .map(|pred| {
                    let p = &self.nodes[pred];
                    p.earliest_start + p.effort()
                })
                .fold(0.0_f64, f64::max);
            self.nodes.get_mut(id).expect("ordered node").earliest_start = earliest;
        }

        let completion = self
            .nodes
            .values()
            .map(|node| node.earliest_start + node.effort())
            .fold(0.0_f64, f64::max);
        self.completion_hours = completion;

        for id in order.iter().rev() {
            let node = &self.nodes[id];
            let effort = node.effort();
            let latest = if node.successors.is_empty() {
                completion - effort
            } else {
                node.successors
                    .iter()
                    .map(|succ| self.nodes[succ].latest_start)
                    .fold(f64::INFINITY, f64::min)
                    - effort
            };
            self.nodes.get_mut(id).expect("ordered node").latest_start = latest;
        }

        for node in self.nodes.values_mut() {
            node.slack = node.latest_start - node.earliest_start;
        }
    }

    fn compute_critical_path(&mut self) {
        for node in self.nodes.values_mut() {
            node.on_critical_path = node.slack.abs() < SLACK_EPSILON;
        }

        let mut critical: Vec<&GraphNode> = self
            .nodes
            .values()
            .filter(|node| node.on_critical_path)
            .collect();
        critical.sort_by(|a, b| {
            a.earliest_start
                .partial_cmp(&b.earliest_start)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.level.cmp(&b.level))
                .then_with(|| a.task.id.cmp(&b.task.id))
        });
        self.critical_path = critical.iter().map(|node| node.task.id.clone()).collect();

        let marks: Vec<((TaskId, TaskId), bool)> = self
            .edges
            .keys()
            .map(|(from, to)| {
                let u = &self.nodes[from];
                let w = &self.nodes[to];
                let tight = (u.earliest_start + u.effort() - w.earliest_start).abs()
                    < SLACK_EPSILON;
                (
                    (from.clone(), to.clone()),
                    u.on_critical_path && w.on_critical_path && tight,
                )
            })
            .collect();
        for (key, on_path) in marks {
            if let Some(edge) = self.edges.get_mut(&key) {
                edge.on_critical_path = on_path;
            }
        }
    }

    /// Node ids ordered by `(level, id)`; a valid topological order on DAGs
    fn level_order(&self) -> Vec<TaskId> {
        let mut order: Vec<(u32, TaskId)> = self
            .nodes
            .iter()
            .map(|(id, node)| (node.level, id.clone()))
            .collect();
        order.sort();
        order.into_iter().map(|(_, id)| id).collect()
    }

    // ------------------------------------------------------------------------
    // Cycle detection
    // ------------------------------------------------------------------------

    /// Strongly-connected-component scan with scored break options
    pub fn detect_cycles(&self) -> Vec<Cycle> {
        let adjacency: BTreeMap<TaskId, Vec<TaskId>> = self
            .nodes
            .iter()
            .map(|(id, node)| (id.clone(), node.successors.clone()))
            .collect();

        tarjan_scc(&adjacency)
            .into_iter()
            .filter(|component| component.len() >= 2)
            .map(|mut component| {
                component.sort();
                let break_options = self.break_options_for(&component);
                Cycle {
                    tasks: component,
                    break_options,
                }
            })
            .collect()
    }

    fn break_options_for(&self, component: &[TaskId]) -> Vec<BreakOption> {
        let mut options: Vec<BreakOption> = self
            .edges
            .values()
            .filter(|edge| {
                component.contains(&edge.from) && component.contains(&edge.to)
            })
            .map(|edge| BreakOption {
                from: edge.from.clone(),
                to: edge.to.clone(),
                impact: 10.0 * edge.confidence
                    + if edge.blocking { 5.0 } else { 0.0 }
                    + if edge.on_critical_path { 3.0 } else { 0.0 },
            })
            .collect();
        options.sort_by(|a, b| {
            a.impact
                .partial_cmp(&b.impact)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.from.cmp(&b.from))
                .then_with(|| a.to.cmp(&b.to))
        });
        options
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    /// Structural fault scan plus aggregate metrics
    pub fn validate(&self) -> ValidationReport {
        let mut issues = Vec::new();

        let cycles = self.detect_cycles();
        for cycle in &cycles {
            issues.push(ValidationIssue {
                kind: IssueKind::CircularDependency,
                severity: IssueSeverity::Critical,
                tasks: cycle.tasks.clone(),
                message: format!(
                    "circular dependency between {}",
                    cycle.tasks.join(", ")
                ),
            });
        }

        for (id, node) in &self.nodes {
            if node.predecessors.is_empty() && node.successors.is_empty() && self.nodes.len() > 1 {
                issues.push(ValidationIssue {
                    kind: IssueKind::OrphanedNode,
                    severity: IssueSeverity::Medium,
                    tasks: vec![id.clone()],
                    message: format!("task '{id}' has no dependency relationships"),
                });
            }
            if node.successors.len() > FAN_OUT_LIMIT {
                issues.push(ValidationIssue {
                    kind: IssueKind::ExcessiveFanOut,
                    severity: IssueSeverity::Medium,
                    tasks: vec![id.clone()],
                    message: format!(
                        "task '{id}' blocks {} others",
                        node.successors.len()
                    ),
                });
            }
        }

        let max_path_length = self.max_path_length();
        if max_path_length > LONG_PATH_LIMIT {
            issues.push(ValidationIssue {
                kind: IssueKind::LongPath,
                severity: IssueSeverity::Low,
                tasks: Vec::new(),
                message: format!("longest dependency chain spans {max_path_length} tasks"),
            });
        }

        let node_count = self.nodes.len();
        let edge_count = self.edges.len();
        let metrics = GraphMetrics {
            node_count,
            edge_count,
            average_fan_out: if node_count == 0 {
                0.0
            } else {
                edge_count as f64 / node_count as f64
            },
            max_path_length,
            density: if node_count < 2 {
                0.0
            } else {
                edge_count as f64 / (node_count as f64 * (node_count as f64 - 1.0))
            },
            critical_path_length: self.critical_path.len(),
            strongly_connected_components: cycles.len(),
        };

        let is_valid = !issues
            .iter()
            .any(|issue| issue.severity == IssueSeverity::Critical);

        ValidationReport {
            issues,
            metrics,
            is_valid,
        }
    }

    /// Longest chain length in tasks, derived from levels
    fn max_path_length(&self) -> usize {
        self.nodes
            .values()
            .map(|node| node.level as usize + 1)
            .max()
            .unwrap_or(0)
    }
}

// ============================================================================
// Tarjan's SCC
// ============================================================================

struct TarjanState {
    counter: usize,
    stack: Vec<TaskId>,
    on_stack: BTreeMap<TaskId, bool>,
    index: BTreeMap<TaskId, usize>,
    lowlink: BTreeMap<TaskId, usize>,
    components: Vec<Vec<TaskId>>,
}

/// Tarjan's strongly-connected-components algorithm.
///
/// Deterministic: nodes are visited in key order. Singleton components are
/// included; callers filter for size >= 2 when hunting cycles.
pub(crate) fn tarjan_scc(adjacency: &BTreeMap<TaskId, Vec<TaskId>>) -> Vec<Vec<TaskId>> {
    let mut state = TarjanState {
        counter: 0,
        stack: Vec::new(),
        on_stack: BTreeMap::new(),
        index: BTreeMap::new(),
        lowlink: BTreeMap::new(),
        components: Vec::new(),
    };

    for node in adjacency.keys() {
        if !state.index.contains_key(node) {
            strongconnect(node, adjacency, &mut state);
        }
    }

    state.components
}

fn strongconnect(
    v: &TaskId,
    adjacency: &BTreeMap<TaskId, Vec<TaskId>>,
    state: &mut TarjanState,
) {
    let v_index = state.counter;
    state.counter += 1;
    state.index.insert(v.clone(), v_index);
    state.lowlink.insert(v.clone(), v_index);
    state.stack.push(v.clone());
    state.on_stack.insert(v.clone(), true);

    if let Some(neighbors) = adjacency.get(v) {
        for w in neighbors {
            if !state.index.contains_key(w) {
                strongconnect(w, adjacency, state);
                let w_low = state.lowlink[w];
                let v_low = state.lowlink.get_mut(v).expect("visited node");
                if w_low < *v_low {
                    *v_low = w_low;
                }
            } else if state.on_stack.get(w).copied().unwrap_or(false) {
                let w_index = state.index[w];
                let v_low = state.lowlink.get_mut(v).expect("visited node");
                if w_index < *v_low {
                    *v_low = w_index;
                }
            }
        }
    }

    if state.lowlink[v] == state.index[v] {
        let mut component = Vec::new();
        loop {
            let w = state.stack.pop().expect("stack holds the component");
            state.on_stack.insert(w.clone(), false);
            let done = w == *v;
            component.push(w);
            if done {
                break;
            }
        }
        component.reverse();
        state.components.push(component);
    }
}

// ============================================================================
// Tests
// ============================================================================
