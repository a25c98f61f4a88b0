//! End-to-end scenario suite.
//!
//! Each test pins the observable behavior of one literal input shape:
//! linear chains, cycles, priority inversion, resource contention, fan-out,
//! and cache hits.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use taskflow_core::{
    CancelToken, EngineConfig, EngineEvent, EventSink, MemorySink, Priority, Task,
};
use taskflow_engine::{
    ConflictKind, DependencyManager, ResolutionAction, Sequencer, TaskGraph,
};

fn manager() -> DependencyManager {
    DependencyManager::new(EngineConfig::default())
}

fn manager_with_sink() -> (DependencyManager, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    (
        DependencyManager::with_sinks(
            EngineConfig::default(),
            vec![sink.clone() as Arc<dyn EventSink>],
        ),
        sink,
    )
}

// ============================================================================
// S1: Linear chain
// ============================================================================

#[test]
fn s1_linear_chain() {
    let tasks = vec![
        Task::new("a").effort_hours(1.0),
        Task::new("b").effort_hours(1.0).depends_on("a"),
        Task::new("c").effort_hours(1.0).depends_on("b"),
    ];

    let manager = manager();
    let graph = manager.analyze(&tasks, &CancelToken::never()).unwrap();

    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 2);
    assert!(!graph.has_cycles());
    assert_eq!(graph.node("a").unwrap().level, 0);
    assert_eq!(graph.node("b").unwrap().level, 1);
    assert_eq!(graph.node("c").unwrap().level, 2);
    assert_eq!(graph.critical_path(), ["a", "b", "c"]);

    // the backward pass must not shift latest starts off the chain
    for id in ["a", "b", "c"] {
        assert!(graph.node(id).unwrap().slack.abs() < 0.01);
    }

    let sequencer = Sequencer::new(EngineConfig::default().sequencer);
    let outcome = sequencer
        .generate(&graph, &tasks, &CancelToken::never())
        .unwrap();
    assert_eq!(outcome.sequence.groups.len(), 3);
    for group in &outcome.sequence.groups {
        assert_eq!(group.tasks.len(), 1);
    }
    assert_eq!(
        outcome.sequence.flatten(),
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    );
    assert_eq!(outcome.sequence.total_estimated_hours, 3.0);
}

// ============================================================================
// S2: Simple cycle
// ============================================================================

#[test]
fn s2_simple_cycle() {
    let tasks = vec![
        Task::new("a").effort_hours(1.0).depends_on("b"),
        Task::new("b").effort_hours(1.0).depends_on("a"),
    ];

    let manager = manager();
    let cycles = manager.detect_circular(&tasks);
    assert_eq!(cycles, vec![vec!["a".to_string(), "b".to_string()]]);

    let report = manager.validate_dependencies(&tasks);
    assert!(!report.is_valid);
    let circular: Vec<_> = report
        .issues
        .iter()
        .filter(|i| i.kind == taskflow_engine::IssueKind::CircularDependency)
        .collect();
    assert_eq!(circular.len(), 1);

    // raw graph: two symmetric break options
    let analyzer = taskflow_engine::DependencyAnalyzer::new(Default::default());
    let analysis = analyzer.analyze(&tasks, &CancelToken::never()).unwrap();
    let mut raw = TaskGraph::build(&tasks, &analysis.edges).unwrap();
    let detected = raw.detect_cycles();
    assert_eq!(detected.len(), 1);
    assert_eq!(detected[0].break_options.len(), 2);
    assert_eq!(
        detected[0].break_options[0].impact,
        detected[0].break_options[1].impact
    );

    // applying the first break option makes the graph validate
    let option = detected[0].break_options[0].clone();
    assert!(raw.remove_edge(&option.from, &option.to).unwrap());
    assert!(raw.validate().is_valid);

    // the managed pipeline repairs and sequences: two groups, ordered by
    // whichever edge remained
    let graph = manager.analyze(&tasks, &CancelToken::never()).unwrap();
    let order = manager
        .resolve_execution_order(&tasks, &CancelToken::never())
        .unwrap();
    assert_eq!(order.len(), 2);
    if graph.edge("a", "b").is_some() {
        assert_eq!(order, vec!["a".to_string(), "b".to_string()]);
    } else {
        assert_eq!(order, vec!["b".to_string(), "a".to_string()]);
    }

    let groups = manager
        .get_parallel_groups(&tasks, &CancelToken::never())
        .unwrap();
    assert_eq!(groups.len(), 2);
}

// ============================================================================
// S3: Priority inversion
// ============================================================================

#[test]
fn s3_priority_inversion() {
    let tasks = vec![
        Task::new("a").effort_hours(1.0).priority(Priority::Low),
        Task::new("b")
            .effort_hours(1.0)
            .priority(Priority::Critical)
            .depends_on("a"),
    ];

    let (manager, sink) = manager_with_sink();
    let order = manager
        .resolve_execution_order(&tasks, &CancelToken::never())
        .unwrap();

    // the conflict is surfaced and a priority adjustment proposed
    assert!(sink.count(|e| matches!(
        e,
        EngineEvent::ConflictDetected { kind, tasks }
            if kind == "priority-inversion"
                && tasks.contains(&"a".to_string())
                && tasks.contains(&"b".to_string())
    )) >= 1);
    assert!(sink.count(|e| matches!(
        e,
        EngineEvent::ConflictResolved { action, .. } if action == "priority_adjustment"
    )) >= 1);

    // the dependency still orders a before b
    assert_eq!(order, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn s3_priority_inversion_outcome_detail() {
    let tasks = vec![
        Task::new("a").effort_hours(1.0).priority(Priority::Low),
        Task::new("b")
            .effort_hours(1.0)
            .priority(Priority::Critical)
            .depends_on("a"),
    ];
    let manager = manager();
    let graph = manager.analyze(&tasks, &CancelToken::never()).unwrap();
    let sequencer = Sequencer::new(EngineConfig::default().sequencer);
    let outcome = sequencer
        .generate(&graph, &tasks, &CancelToken::never())
        .unwrap();

    let inversions: Vec<_> = outcome
        .conflicts
        .iter()
        .filter(|c| c.kind == ConflictKind::PriorityInversion)
        .collect();
    assert_eq!(inversions.len(), 1);
    assert_eq!(
        inversions[0].tasks,
        vec!["a".to_string(), "b".to_string()]
    );

    assert!(outcome
        .resolutions
        .iter()
        .any(|r| r.action == ResolutionAction::PriorityAdjustment));
}

// ============================================================================
// S4: Resource contention
// ============================================================================

#[test]
fn s4_resource_contention() {
    let tasks = vec![
        Task::new("a")
            .effort_hours(1.0)
            .priority(Priority::Critical)
            .requires("database"),
        Task::new("b")
            .effort_hours(1.0)
            .priority(Priority::High)
            .requires("database"),
        Task::new("c")
            .effort_hours(1.0)
            .priority(Priority::Normal)
            .requires("database"),
    ];

    let analyzer = taskflow_engine::DependencyAnalyzer::new(Default::default());
    let analysis = analyzer.analyze(&tasks, &CancelToken::never()).unwrap();
    let resource: Vec<_> = analysis
        .edges
        .iter()
        .filter(|e| e.kind == taskflow_core::EdgeKind::Resource)
        .collect();
    assert_eq!(resource.len(), 2);
    assert_eq!((resource[0].from.as_str(), resource[0].to.as_str()), ("a", "b"));
    assert_eq!((resource[1].from.as_str(), resource[1].to.as_str()), ("b", "c"));
    assert!(resource.iter().all(|e| e.confidence == 0.8));

    let groups = manager()
        .get_parallel_groups(&tasks, &CancelToken::never())
        .unwrap();
    assert_eq!(
        groups,
        vec![
            vec!["a".to_string()],
            vec!["b".to_string()],
            vec!["c".to_string()]
        ]
    );
}

// ============================================================================
// S5: Parallel fan-out
// ============================================================================

#[test]
fn s5_parallel_fan_out() {
    let tasks = vec![
        Task::new("r").effort_hours(1.0),
        Task::new("x").effort_hours(1.0).depends_on("r"),
        Task::new("y").effort_hours(1.0).depends_on("r"),
        Task::new("z").effort_hours(1.0).depends_on("r"),
    ];

    let manager = manager();
    let graph = manager.analyze(&tasks, &CancelToken::never()).unwrap();
    let sequencer = Sequencer::new(EngineConfig::default().sequencer);
    let outcome = sequencer
        .generate(&graph, &tasks, &CancelToken::never())
        .unwrap();

    assert_eq!(outcome.sequence.groups.len(), 2);
    assert_eq!(outcome.sequence.groups[0].tasks, vec!["r".to_string()]);
    assert_eq!(
        outcome.sequence.groups[1].tasks,
        vec!["x".to_string(), "y".to_string(), "z".to_string()]
    );
    assert_eq!(outcome.sequence.max_concurrency, 3);
    assert_eq!(outcome.sequence.total_estimated_hours, 2.0);
}

// ============================================================================
// S6: Cache hit
// ============================================================================

#[test]
fn s6_cache_hit() {
    let tasks = vec![
        Task::new("a").effort_hours(1.0),
        Task::new("b").effort_hours(1.0).depends_on("a"),
    ];

    let (manager, sink) = manager_with_sink();
    let first = manager
        .resolve_execution_order(&tasks, &CancelToken::never())
        .unwrap();
    let hits_before = sink.count(|e| matches!(e, EngineEvent::CacheHit { .. }));

    let second = manager
        .resolve_execution_order(&tasks, &CancelToken::never())
        .unwrap();
    let hits_after = sink.count(|e| matches!(e, EngineEvent::CacheHit { .. }));

    assert_eq!(first, second);
    assert_eq!(hits_before, 0);
    assert_eq!(hits_after, 1);
}
