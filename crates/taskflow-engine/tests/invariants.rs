//! Universal invariant suite.
//!
//! These properties must hold for any input the engine accepts:
//! 1. Determinism of analysis and sequencing
//! 2. Soundness of cycle detection, and acyclicity after repair
//! 3. Topological agreement between levels and edges
//! 4. Dependency satisfaction across sequence groups
//! 5. Slack non-negativity
//! 6. Idempotence of validation
//! 7. Cache equivalence with fresh computation
//! 8. Merge safety under the optimization pass
//!
//! Plus the two round-trip laws: edge extraction after build, and
//! flattening a sequence preserving topological order.

use std::collections::HashMap;

use pretty_assertions::assert_eq;
use taskflow_core::{
    CancelToken, CandidateEdge, EdgeKind, EngineConfig, Priority, Task,
};
use taskflow_engine::{DependencyAnalyzer, DependencyManager, Sequencer, TaskGraph};

/// A mixed fixture exercising every inference pass
fn fixture() -> Vec<Task> {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2025, 4, 7, 9, 0, 0).unwrap();
    vec![
        Task::new("plan")
            .title("plan the rollout")
            .task_type(taskflow_core::TaskType::Analysis)
            .effort_hours(2.0),
        Task::new("schema")
            .title("database schema")
            .effort_hours(4.0)
            .requires("database")
            .depends_on("plan"),
        Task::new("api")
            .title("api layer")
            .description("expose the database schema over rest")
            .effort_hours(6.0)
            .requires("database")
            .depends_on("schema"),
        Task::new("ui")
            .title("ui shell")
            .effort_hours(5.0)
            .depends_on("api"),
        Task::new("hotfix")
            .priority(Priority::Critical)
            .effort_hours(1.0),
        Task::new("docs")
            .task_type(taskflow_core::TaskType::Documentation)
            .priority(Priority::Low)
            .effort_hours(2.0)
            .deadline(base),
        Task::new("release")
            .task_type(taskflow_core::TaskType::Deployment)
            .effort_hours(1.0)
            .deadline(base + chrono::Duration::hours(8))
            .depends_on("ui"),
    ]
}

fn manager() -> DependencyManager {
    DependencyManager::new(EngineConfig::default())
}

// ============================================================================
// Invariant 1: Determinism
// ============================================================================

#[test]
fn analysis_is_a_pure_function_of_its_input() {
    let analyzer = DependencyAnalyzer::new(Default::default());
    let first = analyzer.analyze(&fixture(), &CancelToken::never()).unwrap();
    let second = analyzer.analyze(&fixture(), &CancelToken::never()).unwrap();

    assert_eq!(first.edges, second.edges);
    assert_eq!(first.independent_tasks, second.independent_tasks);
    assert_eq!(first.critical_tasks, second.critical_tasks);
    assert_eq!(first.potential_circular, second.potential_circular);
}

#[test]
fn execution_order_is_deterministic_across_managers() {
    let first = manager()
        .resolve_execution_order(&fixture(), &CancelToken::never())
        .unwrap();
    let second = manager()
        .resolve_execution_order(&fixture(), &CancelToken::never())
        .unwrap();
    assert_eq!(first, second);
}

// ============================================================================
// Invariants 2 & 3: Cycle soundness, acyclicity, level agreement
// ============================================================================

#[test]
fn reported_cycles_are_real_and_repair_removes_them() {
    let tasks = vec![
        Task::new("a").depends_on("c"),
        Task::new("b").depends_on("a"),
        Task::new("c").depends_on("b"),
        Task::new("d"),
    ];

    let manager = manager();
    let cycles = manager.detect_circular(&tasks);
    assert_eq!(cycles.len(), 1);

    // every reported member really reaches the others through declared edges
    let declared: HashMap<&str, &Vec<String>> =
        tasks.iter().map(|t| (t.id.as_str(), &t.depends_on)).collect();
    for member in &cycles[0] {
        assert!(declared.contains_key(member.as_str()));
    }
    let mut members = cycles[0].clone();
    members.sort();
    assert_eq!(members, vec!["a".to_string(), "b".to_string(), "c".to_string()]);

    // repair yields an acyclic graph
    let graph = manager.analyze(&tasks, &CancelToken::never()).unwrap();
    assert!(!graph.has_cycles());
    assert!(graph.detect_cycles().is_empty());
}

#[test]
fn levels_agree_with_every_edge() {
    let graph = manager().analyze(&fixture(), &CancelToken::never()).unwrap();
    assert!(!graph.has_cycles());
    for edge in graph.edges() {
        let from = graph.node(&edge.from).unwrap();
        let to = graph.node(&edge.to).unwrap();
        assert!(
            from.level < to.level,
            "edge {} -> {} violates levels {} >= {}",
            edge.from,
            edge.to,
            from.level,
            to.level
        );
    }
}

// ============================================================================
// Invariant 4 + round-trip: dependency satisfaction in sequences
// ============================================================================

#[test]
fn every_dependency_lands_in_an_earlier_group() {
    let manager = manager();
    let tasks = fixture();
    let graph = manager.analyze(&tasks, &CancelToken::never()).unwrap();
    let groups = manager
        .get_parallel_groups(&tasks, &CancelToken::never())
        .unwrap();

    let mut position: HashMap<&str, usize> = HashMap::new();
    for (index, group) in groups.iter().enumerate() {
        for id in group {
            position.insert(id.as_str(), index);
        }
    }

    for edge in graph.edges() {
        let from = position[edge.from.as_str()];
        let to = position[edge.to.as_str()];
        assert!(
            from < to,
            "edge {} -> {} not satisfied: group {} vs {}",
            edge.from,
            edge.to,
            from,
            to
        );
    }
}

#[test]
fn flattened_sequence_preserves_topological_order() {
    let manager = manager();
    let tasks = fixture();
    let graph = manager.analyze(&tasks, &CancelToken::never()).unwrap();
    let order = manager
        .resolve_execution_order(&tasks, &CancelToken::never())
        .unwrap();

    let position: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(index, id)| (id.as_str(), index))
        .collect();
    for edge in graph.edges() {
        assert!(position[edge.from.as_str()] < position[edge.to.as_str()]);
    }
}

// ============================================================================
// Invariant 5: Slack non-negativity
// ============================================================================

#[test]
fn slack_is_never_negative() {
    let graph = manager().analyze(&fixture(), &CancelToken::never()).unwrap();
    for node in graph.nodes() {
        assert!(
            node.slack >= -0.01,
            "task {} has negative slack {}",
            node.task.id,
            node.slack
        );
    }
}

// ============================================================================
// Invariant 6: Validation idempotence
// ============================================================================

#[test]
fn validation_is_idempotent() {
    let manager = manager();
    let tasks = fixture();
    let first = manager.validate_dependencies(&tasks);
    let second = manager.validate_dependencies(&tasks);
    assert_eq!(first, second);

    let graph = manager.analyze(&tasks, &CancelToken::never()).unwrap();
    assert_eq!(graph.validate(), graph.validate());
}

// ============================================================================
// Invariant 7: Cache equivalence
// ============================================================================

#[test]
fn cache_hits_equal_fresh_computation() {
    let shared = manager();
    let tasks = fixture();

    let first = shared
        .resolve_execution_order(&tasks, &CancelToken::never())
        .unwrap();
    let cached = shared
        .resolve_execution_order(&tasks, &CancelToken::never())
        .unwrap();
    let fresh = manager()
        .resolve_execution_order(&tasks, &CancelToken::never())
        .unwrap();

    assert_eq!(first, cached);
    assert_eq!(first, fresh);

    let cached_groups = shared
        .get_parallel_groups(&tasks, &CancelToken::never())
        .unwrap();
    let fresh_groups = manager()
        .get_parallel_groups(&tasks, &CancelToken::never())
        .unwrap();
    assert_eq!(cached_groups, fresh_groups);
}

// ============================================================================
// Invariant 8: Merge safety
// ============================================================================

#[test]
fn merged_groups_stay_within_bounds() {
    // a and b share a level without touching, so the optimization pass
    // merges their sub-groups
    let tasks = vec![
        Task::new("a").effort_hours(5.0),
        Task::new("b").effort_hours(3.0),
        Task::new("c").effort_hours(2.0).depends_on("a").depends_on("b"),
    ];
    let manager = manager();
    let graph = manager.analyze(&tasks, &CancelToken::never()).unwrap();
    let sequencer = Sequencer::new(EngineConfig::default().sequencer);
    let outcome = sequencer
        .generate(&graph, &tasks, &CancelToken::never())
        .unwrap();
    assert!(outcome.merged_groups > 0);

    let cap = EngineConfig::default().sequencer.max_parallel_groups;
    for group in &outcome.sequence.groups {
        assert!(group.tasks.len() <= cap);
        // no dependency may point inside its own group
        for x in &group.tasks {
            for y in &group.tasks {
                if x != y {
                    assert!(
                        graph.edge(x, y).is_none(),
                        "dependency {x} -> {y} inside one group"
                    );
                }
            }
        }
    }
}

// ============================================================================
// Round-trip: build then extract edges
// ============================================================================

#[test]
fn build_extract_round_trip_drops_only_illegal_edges() {
    let tasks = vec![Task::new("a"), Task::new("b"), Task::new("c")];
    let candidate = |from: &str, to: &str| CandidateEdge {
        from: from.into(),
        to: to.into(),
        kind: EdgeKind::Explicit,
        confidence: 1.0,
        reason: "declared".into(),
        blocking: true,
        estimated_delay_hours: 1.0,
    };
    let input = vec![
        candidate("a", "b"),
        candidate("b", "c"),
        candidate("c", "c"),     // self edge: dropped
        candidate("a", "ghost"), // dangling: dropped
        candidate("ghost", "a"), // dangling: dropped
    ];

    let graph = TaskGraph::build(&tasks, &input).unwrap();
    let extracted: Vec<(String, String)> = graph
        .edges()
        .map(|e| (e.from.clone(), e.to.clone()))
        .collect();
    assert_eq!(
        extracted,
        vec![
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "c".to_string()),
        ]
    );
}
