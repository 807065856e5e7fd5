//! Stage dependency graph

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use petgraph::Direction;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::dot::{Config as DotConfig, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use super::error::{PipelineError, PipelineResult};
use crate::warehouse::Dimension;

/// Named nodes of a run
///
/// The declaration order is the tie-break used by
/// [`StageGraph::execution_order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    CalendarSeed,
    Staging,
    StagingCheckpoint,
    DimCustomer,
    DimProduct,
    DimRegion,
    DimSalesperson,
    DimOffer,
    DimensionsCheckpoint,
    FactSales,
}

impl StageId {
    pub fn all() -> &'static [StageId] {
        &[
            StageId::CalendarSeed,
            StageId::Staging,
            StageId::StagingCheckpoint,
            StageId::DimCustomer,
            StageId::DimProduct,
            StageId::DimRegion,
            StageId::DimSalesperson,
            StageId::DimOffer,
            StageId::DimensionsCheckpoint,
            StageId::FactSales,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            StageId::CalendarSeed => "calendar_seed",
            StageId::Staging => "staging",
            StageId::StagingCheckpoint => "staging_checkpoint",
            StageId::DimCustomer => "dim_customer",
            StageId::DimProduct => "dim_product",
            StageId::DimRegion => "dim_region",
            StageId::DimSalesperson => "dim_salesperson",
            StageId::DimOffer => "dim_offer",
            StageId::DimensionsCheckpoint => "dimensions_checkpoint",
            StageId::FactSales => "fact_sales",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            StageId::CalendarSeed => "Seed the date dimension once",
            StageId::Staging => "Copy source tables into inferred staging tables",
            StageId::StagingCheckpoint => "Barrier: all staging tables loaded",
            StageId::DimCustomer => "Upsert dim_customer",
            StageId::DimProduct => "Upsert dim_product",
            StageId::DimRegion => "Upsert dim_region",
            StageId::DimSalesperson => "Upsert dim_salesperson",
            StageId::DimOffer => "Upsert dim_offer",
            StageId::DimensionsCheckpoint => "Barrier: all dimensions loaded",
            StageId::FactSales => "Insert new fact_sales lines",
        }
    }

    /// Barrier nodes do no work
    pub fn is_checkpoint(&self) -> bool {
        matches!(
            self,
            StageId::StagingCheckpoint | StageId::DimensionsCheckpoint
        )
    }

    /// The dimension a stage upserts, if any
    pub fn dimension(&self) -> Option<Dimension> {
        match self {
            StageId::DimCustomer => Some(Dimension::Customer),
            StageId::DimProduct => Some(Dimension::Product),
            StageId::DimRegion => Some(Dimension::Region),
            StageId::DimSalesperson => Some(Dimension::Salesperson),
            StageId::DimOffer => Some(Dimension::Offer),
            _ => None,
        }
    }

    pub fn for_dimension(dimension: Dimension) -> Self {
        match dimension {
            Dimension::Customer => StageId::DimCustomer,
            Dimension::Product => StageId::DimProduct,
            Dimension::Region => StageId::DimRegion,
            Dimension::Salesperson => StageId::DimSalesperson,
            Dimension::Offer => StageId::DimOffer,
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for StageId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        StageId::all()
            .iter()
            .copied()
            .find(|stage| stage.name() == wanted)
            .ok_or_else(|| PipelineError::UnknownStage(s.to_string()))
    }
}

/// Directed graph of stages; an edge `a -> b` means `a` runs before `b`
#[derive(Debug, Clone)]
pub struct StageGraph {
    graph: DiGraph<StageId, ()>,
    node_map: HashMap<StageId, NodeIndex>,
}

impl Default for StageGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl StageGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// The daily run:
    ///
    /// ```text
    /// calendar_seed -> staging -> staging_checkpoint
    ///     -> {dim_customer, dim_product, dim_region, dim_salesperson, dim_offer}
    ///     -> dimensions_checkpoint -> fact_sales
    /// ```
    ///
    /// plus an edge for every dimension lookup (region before salesperson).
    pub fn standard() -> Self {
        let mut dag = Self::new();
        dag.add_dependency(StageId::CalendarSeed, StageId::Staging);
        dag.add_dependency(StageId::Staging, StageId::StagingCheckpoint);
        for dimension in Dimension::all() {
            let stage = StageId::for_dimension(*dimension);
            dag.add_dependency(StageId::StagingCheckpoint, stage);
            dag.add_dependency(stage, StageId::DimensionsCheckpoint);
            for upstream in dimension.depends_on() {
                dag.add_dependency(StageId::for_dimension(*upstream), stage);
            }
        }
        dag.add_dependency(StageId::DimensionsCheckpoint, StageId::FactSales);
        dag
    }

    pub fn add_stage(&mut self, stage: StageId) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(&stage) {
            idx
        } else {
            let idx = self.graph.add_node(stage);
            self.node_map.insert(stage, idx);
            idx
        }
    }

    /// Require `before` to complete before `after` starts
    pub fn add_dependency(&mut self, before: StageId, after: StageId) {
        let from = self.add_stage(before);
        let to = self.add_stage(after);
        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, ());
        }
    }

    pub fn stages(&self) -> Vec<StageId> {
        let mut stages: Vec<StageId> = self.node_map.keys().copied().collect();
        stages.sort();
        stages
    }

    pub fn contains(&self, stage: StageId) -> bool {
        self.node_map.contains_key(&stage)
    }

    /// All edges as `(before, after)`, sorted
    pub fn edges(&self) -> Vec<(StageId, StageId)> {
        let mut edges: Vec<_> = self
            .graph
            .edge_references()
            .map(|e| (self.graph[e.source()], self.graph[e.target()]))
            .collect();
        edges.sort();
        edges
    }

    pub fn validate(&self) -> PipelineResult<()> {
        match toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(PipelineError::Cycle(self.find_cycle_path(cycle.node_id()))),
        }
    }

    /// Walk outgoing edges from `start` until a node repeats
    fn find_cycle_path(&self, start: NodeIndex) -> String {
        let mut path = vec![self.graph[start].name()];
        let mut visited = HashSet::from([start]);
        let mut current = start;

        // Prefer edges that can lead back to the start so the path closes
        while let Some(target) = self
            .graph
            .edges(current)
            .map(|e| e.target())
            .find(|t| has_path_connecting(&self.graph, *t, start, None))
        {
            path.push(self.graph[target].name());
            if target == start || !visited.insert(target) {
                break;
            }
            current = target;
        }

        path.join(" -> ")
    }

    /// Topological order; among ready stages the lowest [`StageId`] goes first
    pub fn execution_order(&self) -> PipelineResult<Vec<StageId>> {
        self.validate()?;

        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                (
                    idx,
                    self.graph.edges_directed(idx, Direction::Incoming).count(),
                )
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<(StageId, usize)>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| Reverse((self.graph[*idx], idx.index())))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse((stage, index))) = ready.pop() {
            order.push(stage);
            let idx = NodeIndex::new(index);
            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                let target = edge.target();
                if let Some(degree) = in_degree.get_mut(&target) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse((self.graph[target], target.index())));
                    }
                }
            }
        }
        Ok(order)
    }

    /// Direct upstream stages
    pub fn dependencies(&self, stage: StageId) -> Vec<StageId> {
        self.neighbours(stage, Direction::Incoming)
    }

    /// Direct downstream stages
    pub fn dependents(&self, stage: StageId) -> Vec<StageId> {
        self.neighbours(stage, Direction::Outgoing)
    }

    fn neighbours(&self, stage: StageId, direction: Direction) -> Vec<StageId> {
        let Some(&idx) = self.node_map.get(&stage) else {
            return Vec::new();
        };
        let mut out: Vec<StageId> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n])
            .collect();
        out.sort();
        out
    }

    /// Whether `before` is a transitive prerequisite of `after`
    pub fn must_precede(&self, before: StageId, after: StageId) -> bool {
        match (self.node_map.get(&before), self.node_map.get(&after)) {
            (Some(&from), Some(&to)) if from != to => {
                has_path_connecting(&self.graph, from, to, None)
            }
            _ => false,
        }
    }

    /// Check that `order` honours every edge between the stages it contains
    pub fn check_order(&self, order: &[StageId]) -> PipelineResult<()> {
        let position: HashMap<StageId, usize> =
            order.iter().enumerate().map(|(i, s)| (*s, i)).collect();

        for stage in order {
            if !self.contains(*stage) {
                return Err(PipelineError::UnknownStage(stage.name().to_string()));
            }
        }

        for (before, after) in self.edges() {
            if let (Some(b), Some(a)) = (position.get(&before), position.get(&after)) {
                if b > a {
                    return Err(PipelineError::OrderViolation {
                        before: before.name().to_string(),
                        after: after.name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Graphviz export for external schedulers
    pub fn to_dot(&self) -> String {
        let labelled = self.graph.map(|_, stage| stage.name(), |_, _| "");
        format!("{}", Dot::with_config(&labelled, &[DotConfig::EdgeNoLabel]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_order() {
        let order = StageGraph::standard().execution_order().unwrap();
        assert_eq!(order, StageId::all().to_vec());
    }

    #[test]
    fn test_region_before_salesperson() {
        let dag = StageGraph::standard();
        assert!(dag.must_precede(StageId::DimRegion, StageId::DimSalesperson));
        assert!(!dag.must_precede(StageId::DimSalesperson, StageId::DimRegion));
        assert!(!dag.must_precede(StageId::DimCustomer, StageId::DimProduct));
        assert!(dag.must_precede(StageId::CalendarSeed, StageId::FactSales));
    }

    #[test]
    fn test_dependencies() {
        let dag = StageGraph::standard();
        assert_eq!(
            dag.dependencies(StageId::DimSalesperson),
            vec![StageId::StagingCheckpoint, StageId::DimRegion]
        );
        assert_eq!(dag.dependents(StageId::StagingCheckpoint).len(), 5);
        assert_eq!(dag.dependencies(StageId::FactSales), vec![StageId::DimensionsCheckpoint]);
    }

    #[test]
    fn test_check_order() {
        let dag = StageGraph::standard();
        assert!(dag.check_order(&[StageId::DimRegion, StageId::DimSalesperson]).is_ok());

        let err = dag
            .check_order(&[StageId::DimSalesperson, StageId::DimRegion])
            .unwrap_err();
        assert!(matches!(err, PipelineError::OrderViolation { .. }));

        let err = dag
            .check_order(&[StageId::FactSales, StageId::Staging])
            .unwrap_err();
        assert!(err.to_string().contains("staging"));
    }

    #[test]
    fn test_cycle_detected() {
        let mut dag = StageGraph::standard();
        dag.add_dependency(StageId::FactSales, StageId::CalendarSeed);

        let err = dag.validate().unwrap_err();
        let PipelineError::Cycle(path) = &err else {
            panic!("expected cycle, got {err:?}");
        };
        assert!(path.contains("fact_sales"));
        assert!(path.contains("calendar_seed"));
        assert!(dag.execution_order().is_err());
    }

    #[test]
    fn test_duplicate_edges_ignored() {
        let mut dag = StageGraph::new();
        dag.add_dependency(StageId::Staging, StageId::DimOffer);
        dag.add_dependency(StageId::Staging, StageId::DimOffer);
        assert_eq!(dag.edges().len(), 1);
    }

    #[test]
    fn test_stage_names_round_trip() {
        for stage in StageId::all() {
            assert_eq!(stage.name().parse::<StageId>().unwrap(), *stage);
        }
        assert!(matches!(
            "dim_store".parse::<StageId>(),
            Err(PipelineError::UnknownStage(_))
        ));
    }

    #[test]
    fn test_dot_export() {
        let dot = StageGraph::standard().to_dot();
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("dim_region"));
        assert!(dot.contains("->"));
    }
}
