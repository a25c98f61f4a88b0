//! Engine configuration and built-in presets.
//!
//! Every field has a default; presets tune the defaults for a workload
//! profile and are accepted by the manager at construction.

use serde::{Deserialize, Serialize};

/// Per-kind confidence weights applied by the analyzer's inference passes
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeWeights {
    pub explicit: f64,
    pub implicit: f64,
    pub resource: f64,
    pub temporal: f64,
}

impl Default for EdgeWeights {
    fn default() -> Self {
        Self {
            explicit: 1.0,
            implicit: 0.7,
            resource: 0.8,
            temporal: 0.6,
        }
    }
}

/// Thresholds gating whether implicit evidence is emitted
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensitivityThresholds {
    /// Minimum keyword sub-score that may contribute
    pub keyword: f64,
    /// Minimum composite score for an implicit edge to be emitted
    pub semantic: f64,
    /// Minimum structural sub-score that may contribute
    pub structural: f64,
}

impl Default for SensitivityThresholds {
    fn default() -> Self {
        Self {
            keyword: 0.3,
            semantic: 0.5,
            structural: 0.4,
        }
    }
}

/// Analyzer tuning
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Run the pairwise implicit-inference pass
    pub enable_implicit: bool,
    /// Longest accepted declared-dependency chain, in tasks
    pub max_chain_length: usize,
    pub weights: EdgeWeights,
    pub sensitivity: SensitivityThresholds,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            enable_implicit: true,
            max_chain_length: 10,
            weights: EdgeWeights::default(),
            sensitivity: SensitivityThresholds::default(),
        }
    }
}

/// Sequencing strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    PriorityFirst,
    #[default]
    CriticalPath,
    ResourceOptimized,
    LoadBalanced,
}

impl Strategy {
    /// The strategy whose grouping rules actually run.
    ///
    /// Resource-optimized and load-balanced keep the critical-path contract
    /// until they grow their own specializations.
    pub fn effective(self) -> Strategy {
        match self {
            Strategy::ResourceOptimized | Strategy::LoadBalanced => Strategy::CriticalPath,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::PriorityFirst => "priority-first",
            Strategy::CriticalPath => "critical-path",
            Strategy::ResourceOptimized => "resource-optimized",
            Strategy::LoadBalanced => "load-balanced",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Relative emphasis of the optimization passes, each in `[0, 1]`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizationWeights {
    pub time: f64,
    pub resource: f64,
    pub quality: f64,
}

impl Default for OptimizationWeights {
    fn default() -> Self {
        Self {
            time: 0.5,
            resource: 0.3,
            quality: 0.2,
        }
    }
}

/// Sequencer tuning
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequencerConfig {
    pub strategy: Strategy,
    /// Size cap applied to merged parallel groups
    pub max_parallel_groups: usize,
    pub optimization: OptimizationWeights,
    pub enable_auto_conflict_resolution: bool,
    /// Wall-clock budget for the conflict-resolution pass
    pub conflict_resolution_timeout_ms: u64,
    /// Candidate edges below this confidence are excluded from the graph
    /// the sequencing pipeline runs on
    pub min_confidence_threshold: f64,
    /// Wall-clock budget for the optimization pass; `None` means unbounded
    pub max_optimization_time_ms: Option<u64>,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            max_parallel_groups: 10,
            optimization: OptimizationWeights::default(),
            enable_auto_conflict_resolution: true,
            conflict_resolution_timeout_ms: 5_000,
            min_confidence_threshold: 0.3,
            max_optimization_time_ms: None,
        }
    }
}

/// Top-level engine configuration accepted by the manager
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub analyzer: AnalyzerConfig,
    pub sequencer: SequencerConfig,
    /// Capacity of the graph cache, in fingerprints
    pub graph_cache_capacity: usize,
    /// Capacity of the sequence cache, in fingerprints
    pub sequence_cache_capacity: usize,
    /// Minimum interval between background optimization passes;
    /// `None` disables the pass entirely
    pub background_interval_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            analyzer: AnalyzerConfig::default(),
            sequencer: SequencerConfig::default(),
            graph_cache_capacity: 50,
            sequence_cache_capacity: 100,
            background_interval_ms: None,
        }
    }
}

impl EngineConfig {
    /// Throughput over inference depth: implicit detection off, short
    /// chains, wide priority-first groups.
    pub fn high_performance() -> Self {
        let mut config = Self::default();
        config.analyzer.enable_implicit = false;
        config.analyzer.max_chain_length = 8;
        config.sequencer.strategy = Strategy::PriorityFirst;
        config.sequencer.max_parallel_groups = 12;
        config.background_interval_ms = None;
        config.graph_cache_capacity = 50;
        config.sequence_cache_capacity = 100;
        config
    }

    /// Full inference with long chains and a large cache
    pub fn comprehensive() -> Self {
        let mut config = Self::default();
        config.analyzer.enable_implicit = true;
        config.analyzer.max_chain_length = 20;
        config.sequencer.strategy = Strategy::CriticalPath;
        config.sequencer.max_parallel_groups = 8;
        config.sequencer.min_confidence_threshold = 0.8;
        config.graph_cache_capacity = 200;
        config.sequence_cache_capacity = 200;
        config
    }

    /// Narrow groups tuned for contended capabilities
    pub fn resource_optimized() -> Self {
        let mut config = Self::default();
        config.analyzer.enable_implicit = true;
        config.analyzer.max_chain_length = 12;
        config.sequencer.strategy = Strategy::ResourceOptimized;
        config.sequencer.max_parallel_groups = 6;
        config.graph_cache_capacity = 100;
        config.sequence_cache_capacity = 100;
        config
    }

    /// Conservative grouping with a high confidence bar
    pub fn quality_focused() -> Self {
        let mut config = Self::default();
        config.analyzer.enable_implicit = true;
        config.analyzer.max_chain_length = 25;
        config.sequencer.strategy = Strategy::CriticalPath;
        config.sequencer.max_parallel_groups = 5;
        config.sequencer.min_confidence_threshold = 0.9;
        config.graph_cache_capacity = 150;
        config.sequence_cache_capacity = 150;
        config
    }
}
