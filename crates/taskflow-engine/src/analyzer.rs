//! Candidate-edge inference over a task set.
//!
//! Five passes run in a fixed order: explicit declarations, pairwise implicit
//! scoring (keyword, structural, and feature evidence), capability
//! serialization, deadline adjacency, and priority gaps. Candidates are then
//! deduplicated by ordered pair, keeping the highest confidence, and the
//! surviving set is scanned for potential cycles.
//!
//! The analyzer never fails on well-typed input; unresolvable references are
//! filtered silently. The only error it surfaces is `Cancelled`.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use taskflow_core::{
    AnalyzerConfig, CancelToken, CandidateEdge, EdgeKind, EngineResult, Priority, Task, TaskId,
};
use tracing::debug;

use crate::graph::tarjan_scc;

/// Keyword families used by the implicit pass; sharing a family is weak
/// evidence that two tasks belong to the same stream of work.
const KEYWORD_FAMILIES: &[(&str, &[&str])] = &[
    ("setup", &["setup", "install", "configure", "init", "bootstrap", "scaffold"]),
    ("development", &["implement", "develop", "code", "write", "create", "refactor"]),
    ("testing", &["test", "verify", "validate", "qa", "coverage", "regression"]),
    ("deployment", &["deploy", "release", "ship", "rollout", "publish", "launch"]),
    ("database", &["database", "schema", "migration", "sql", "query", "index"]),
    ("api", &["api", "endpoint", "rest", "graphql", "route", "handler"]),
    ("ui", &["ui", "frontend", "interface", "view", "component", "layout"]),
    ("security", &["security", "auth", "permission", "encrypt", "token", "audit"]),
];

/// Pipeline-ordered keywords; a task matching an earlier entry tends to
/// precede one matching a later entry.
const SEQUENTIAL_KEYWORDS: &[&str] = &[
    "plan", "design", "setup", "implement", "build", "test", "review", "deploy", "document",
    "maintain",
];

/// Deadlines within this window produce temporal edges
const TEMPORAL_WINDOW_HOURS: f64 = 24.0;

/// Minimum rank gap for a priority edge, on the low..critical scale
const PRIORITY_GAP: i32 = 2;

/// Implicit edges above this confidence are considered blocking
const IMPLICIT_BLOCKING_THRESHOLD: f64 = 0.8;

// ============================================================================
// Report
// ============================================================================

/// Timing and volume metadata for one analysis run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMeta {
    pub elapsed_ms: u64,
    pub task_count: usize,
    pub edge_count: usize,
    pub average_confidence: f64,
}

/// Everything the analyzer learned about one task set
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Deduplicated candidate edges, ordered by `(from, to)`
    pub edges: Vec<CandidateEdge>,
    /// Tasks with no incoming candidate edge, sorted
    pub independent_tasks: Vec<TaskId>,
    /// Tasks that are the source of two or more edges, sorted
    pub critical_tasks: Vec<TaskId>,
    /// Potential cycles in the candidate set, each sorted by member id
    pub potential_circular: Vec<Vec<TaskId>>,
    pub meta: AnalysisMeta,
}

// ============================================================================
// Per-task signals
// ============================================================================

/// Text-derived signals computed once per task, reused across all pairs
struct TaskSignals {
    text: String,
    title_lower: String,
    id_lower: String,
    family_mask: u32,
    sequential_index: Option<usize>,
}

impl TaskSignals {
    fn from_task(task: &Task) -> Self {
        let text = task.combined_text();
        let mut family_mask = 0u32;
        for (bit, (_, words)) in KEYWORD_FAMILIES.iter().enumerate() {
            if words.iter().any(|word| text.contains(word)) {
                family_mask |= 1 << bit;
            }
        }
        let sequential_index = SEQUENTIAL_KEYWORDS
            .iter()
            .position(|word| text.contains(word));
        Self {
            text,
            title_lower: task.title.to_lowercase(),
            id_lower: task.id.to_lowercase(),
            family_mask,
            sequential_index,
        }
    }
}

// ============================================================================
// Analyzer
// ============================================================================

/// Infers candidate dependency edges from heterogeneous task signals
#[derive(Clone, Debug, Default)]
pub struct DependencyAnalyzer {
    config: AnalyzerConfig,
}

impl DependencyAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Run all inference passes over the task set.
    pub fn analyze(&self, tasks: &[Task], cancel: &CancelToken) -> EngineResult<AnalysisReport> {
        let started = Instant::now();
        cancel.check()?;

        let known: BTreeSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

        let mut candidates = self.explicit_pass(tasks, &known);
        if self.config.enable_implicit {
            cancel.check()?;
            candidates.extend(self.implicit_pass(tasks, cancel)?);
        }
        cancel.check()?;
        candidates.extend(self.resource_pass(tasks));
        candidates.extend(self.temporal_pass(tasks));
        candidates.extend(self.priority_pass(tasks));

        // Dedup by ordered pair, highest confidence wins; drop self-edges and
        // references outside the task set.
        let mut deduped: BTreeMap<(TaskId, TaskId), CandidateEdge> = BTreeMap::new();
        for edge in candidates {
            if edge.from == edge.to
                || !known.contains(edge.from.as_str())
                || !known.contains(edge.to.as_str())
            {
                continue;
            }
            match deduped.entry(edge.key()) {
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
        let edges: Vec<CandidateEdge> = deduped.into_values().collect();

        let mut has_incoming: BTreeSet<&str> = BTreeSet::new();
        let mut outgoing: BTreeMap<&str, usize> = BTreeMap::new();
        for edge in &edges {
            has_incoming.insert(edge.to.as_str());
            *outgoing.entry(edge.from.as_str()).or_default() += 1;
        }
        let independent_tasks: Vec<TaskId> = tasks
            .iter()
            .filter(|t| !has_incoming.contains(t.id.as_str()))
            .map(|t| t.id.clone())
            .collect();
        let critical_tasks: Vec<TaskId> = outgoing
            .iter()
            .filter(|(_, &count)| count >= 2)
            .map(|(id, _)| (*id).to_string())
            .collect();

        let potential_circular = scan_cycles(tasks, &edges);

        let average_confidence = if edges.is_empty() {
            0.0
        } else {
            edges.iter().map(|e| e.confidence).sum::<f64>() / edges.len() as f64
        };

        let meta = AnalysisMeta {
            elapsed_ms: started.elapsed().as_millis() as u64,
            task_count: tasks.len(),
            edge_count: edges.len(),
            average_confidence,
        };
        debug!(
            tasks = meta.task_count,
            edges = meta.edge_count,
            cycles = potential_circular.len(),
            "analysis complete"
        );

        Ok(AnalysisReport {
            edges,
            independent_tasks,
            critical_tasks,
            potential_circular,
            meta,
        })
    }

    // ------------------------------------------------------------------------
    // Passes
    // ------------------------------------------------------------------------

    /// Declared dependencies; unknown references are dropped silently
    fn explicit_pass(&self, tasks: &[Task], known: &BTreeSet<&str>) -> Vec<CandidateEdge> {
        let by_id: BTreeMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        let mut edges = Vec::new();
        for to in tasks {
            for dep in &to.depends_on {
                if dep == &to.id || !known.contains(dep.as_str()) {
                    continue;
                }
                let from = by_id[dep.as_str()];
                let multiplier = if from.priority == Priority::Critical {
                    0.5
                } else {
                    1.0
                };
                edges.push(CandidateEdge {
                    from: from.id.clone(),
                    to: to.id.clone(),
                    kind: EdgeKind::Explicit,
                    confidence: self.config.weights.explicit,
                    reason: format!("'{}' declares a dependency on '{}'", to.id, from.id),
                    blocking: true,
                    estimated_delay_hours: from.scheduling_effort() * multiplier,
                });
            }
        }
        edges
    }

    /// Pairwise keyword/structural/feature scoring, in parallel
    fn implicit_pass(
        &self,
        tasks: &[Task],
        cancel: &CancelToken,
    ) -> EngineResult<Vec<CandidateEdge>> {
        let signals: Vec<TaskSignals> = tasks.iter().map(TaskSignals::from_task).collect();
        let pairs: Vec<(usize, usize)> = (0..tasks.len())
            .flat_map(|a| (0..tasks.len()).map(move |b| (a, b)))
            .filter(|(a, b)| a != b)
            .collect();

        let mut edges: Vec<CandidateEdge> = pairs
            .par_iter()
            .filter_map(|&(a, b)| {
                if cancel.is_cancelled() {
                    return None;
                }
                self.score_pair(&tasks[a], &tasks[b], &signals[a], &signals[b])
            })
            .collect();
        cancel.check()?;

        edges.sort_by(|x, y| x.from.cmp(&y.from).then_with(|| x.to.cmp(&y.to)));
        Ok(edges)
    }

    fn score_pair(
        &self,
        a: &Task,
        b: &Task,
        a_sig: &TaskSignals,
        b_sig: &TaskSignals,
    ) -> Option<CandidateEdge> {
        let weights = &self.config.weights;
        let sensitivity = &self.config.sensitivity;

        let mut keyword = keyword_score(a_sig, b_sig);
        if keyword < sensitivity.keyword {
            keyword = 0.0;
        }
        let mut structural = structural_score(a, b);
        if structural < sensitivity.structural {
            structural = 0.0;
        }
        let feature = feature_score(a, b);

        let confidence =
            (weights.implicit * (keyword + structural + feature)).min(1.0);
        if confidence < sensitivity.semantic {
            return None;
        }

        let mut signals = Vec::new();
        if keyword > 0.0 {
            signals.push("keyword");
        }
        if structural > 0.0 {
            signals.push("structure");
        }
        if feature > 0.0 {
            signals.push("feature");
        }

        Some(CandidateEdge {
            from: a.id.clone(),
            to: b.id.clone(),
            kind: EdgeKind::Implicit,
            confidence,
            reason: format!(
                "'{}' likely precedes '{}' ({})",
                a.id,
                b.id,
                signals.join("+")
            ),
            blocking: confidence > IMPLICIT_BLOCKING_THRESHOLD,
            estimated_delay_hours: a.scheduling_effort() * confidence,
        })
    }

    /// Serialize tasks contending for the same capability, most urgent first
    fn resource_pass(&self, tasks: &[Task]) -> Vec<CandidateEdge> {
        let mut by_capability: BTreeMap<&str, Vec<&Task>> = BTreeMap::new();
        for task in tasks {
            for capability in &task.capabilities {
                by_capability.entry(capability.as_str()).or_default().push(task);
            }
        }

        let mut edges = Vec::new();
        for (capability, mut members) in by_capability {
            if members.len() < 2 {
                continue;
            }
            members.sort_by(|x, y| {
                y.priority
                    .rank()
                    .cmp(&x.priority.rank())
                    .then_with(|| x.id.cmp(&y.id))
            });
            for window in members.windows(2) {
                let (from, to) = (window[0], window[1]);
                edges.push(CandidateEdge {
                    from: from.id.clone(),
                    to: to.id.clone(),
                    kind: EdgeKind::Resource,
                    confidence: self.config.weights.resource,
                    reason: format!("both need capability '{capability}'"),
                    blocking: true,
                    estimated_delay_hours: from.scheduling_effort(),
                });
            }
        }
        edges
    }

    /// Deadline adjacency between consecutive deadlines within 24 hours
    fn temporal_pass(&self, tasks: &[Task]) -> Vec<CandidateEdge> {
        let mut dated: Vec<&Task> = tasks.iter().filter(|t| t.deadline.is_some()).collect();
        dated.sort_by(|x, y| x.deadline.cmp(&y.deadline).then_with(|| x.id.cmp(&y.id)));

        let mut edges = Vec::new();
        for window in dated.windows(2) {
            let (from, to) = (window[0], window[1]);
            let gap = *to.deadline.as_ref().expect("filtered")
                - *from.deadline.as_ref().expect("filtered");
            let gap_hours = gap.num_minutes() as f64 / 60.0;
            if gap_hours <= TEMPORAL_WINDOW_HOURS {
                edges.push(CandidateEdge {
                    from: from.id.clone(),
                    to: to.id.clone(),
                    kind: EdgeKind::Temporal,
                    confidence: self.config.weights.temporal,
                    reason: format!("deadlines {gap_hours:.1}h apart"),
                    blocking: false,
                    estimated_delay_hours: gap_hours,
                });
            }
        }
        edges
    }

    /// Large urgency gaps suggest ordering even without other evidence
    fn priority_pass(&self, tasks: &[Task]) -> Vec<CandidateEdge> {
        let mut edges = Vec::new();
        for a in tasks {
            for b in tasks {
                if a.id == b.id {
                    continue;
                }
                let gap = i32::from(a.priority.rank()) - i32::from(b.priority.rank());
                if gap >= PRIORITY_GAP {
                    edges.push(CandidateEdge {
                        from: a.id.clone(),
                        to: b.id.clone(),
                        kind: EdgeKind::Priority,
                        confidence: 0.4,
                        reason: format!(
                            "'{}' is {} while '{}' is {}",
                            a.id, a.priority, b.id, b.priority
                        ),
                        blocking: false,
                        estimated_delay_hours: 0.5,
                    });
                }
            }
        }
        edges
    }
}

// ============================================================================
// Scoring helpers
// ============================================================================

fn keyword_score(a: &TaskSignals, b: &TaskSignals) -> f64 {
    let mut score = 0.0;
    if (!a.title_lower.is_empty() && b.text.contains(&a.title_lower))
        || b.text.contains(&a.id_lower)
    {
        score += 0.8;
    }
    let shared_families = (a.family_mask & b.family_mask).count_ones();
    score += f64::from(shared_families) * 0.3;
    if let (Some(a_index), Some(b_index)) = (a.sequential_index, b.sequential_index) {
        if a_index < b_index {
            score += 0.4;
        }
    }
    score.min(1.0)
}

fn structural_score(a: &Task, b: &Task) -> f64 {
    let mut score: f64 = 0.0;
    if let (Some(a_phase), Some(b_phase)) =
        (a.task_type.phase_order(), b.task_type.phase_order())
    {
        if a_phase < b_phase {
            score += 0.5;
        }
    }
    if a.priority.rank() > b.priority.rank() {
        score += 0.3;
    }
    if a.scheduling_effort() > 2.0 * b.scheduling_effort() {
        score += 0.2;
    }
    score.min(1.0)
}

/// Directional feature evidence: only the strongest relationship counts.
///
/// A task may declare `supports = <main task id>` in its metadata; feature
/// ids express hierarchy with dot-separated segments.
fn feature_score(a: &Task, b: &Task) -> f64 {
    if a.metadata.get("supports").map(String::as_str) == Some(b.id.as_str()) {
        return 0.9;
    }
    match (&a.feature_id, &b.feature_id) {
        (Some(a_feature), Some(b_feature)) => {
            if b_feature.len() > a_feature.len()
                && b_feature.starts_with(a_feature.as_str())
                && b_feature.as_bytes()[a_feature.len()] == b'.'
            {
                0.7
            } else if a_feature == b_feature {
                0.6
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// SCC scan over the candidate set; components of size >= 2 are cycles
fn scan_cycles(tasks: &[Task], edges: &[CandidateEdge]) -> Vec<Vec<TaskId>> {
    let mut adjacency: BTreeMap<TaskId, Vec<TaskId>> = tasks
        .iter()
        .map(|t| (t.id.clone(), Vec::new()))
        .collect();
    for edge in edges {
        if let Some(successors) = adjacency.get_mut(&edge.from) {
            successors.push(edge.to.clone());
        }
    }
    let mut cycles: Vec<Vec<TaskId>> = tarjan_scc(&adjacency)
        .into_iter()
        .filter(|component| component.len() >= 2)
        .map(|mut component| {
            component.sort();
            component
        })
        .collect();
    cycles.sort();
    cycles
}

// ============================================================================
// Tests
// ============================================================================
