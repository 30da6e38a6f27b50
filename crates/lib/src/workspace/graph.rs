//! Static dependency graph of a workspace's targets.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::label::Label;
use crate::target::Target;

/// Attribute edges between declared targets. Edges to undeclared labels are
/// left out; analysis reports those as loading failures.
pub struct TargetGraph<'a> {
  graph: DiGraph<&'a Label, ()>,
}

impl<'a> TargetGraph<'a> {
  pub fn new(targets: &'a [Target]) -> Self {
    let mut graph = DiGraph::new();
    let nodes: HashMap<&Label, NodeIndex> = targets
      .iter()
      .map(|target| (&target.label, graph.add_node(&target.label)))
      .collect();

    for target in targets {
      let from = nodes[&target.label];
      for label in target.attributes.values().flatten() {
        if let Some(&to) = nodes.get(label) {
          graph.add_edge(from, to, ());
        }
      }
    }
    Self { graph }
  }

  /// Dependencies before dependents, or a label on a cycle.
  pub fn order(&self) -> Result<Vec<Label>, Label> {
    let sorted = toposort(&self.graph, None).map_err(|cycle| self.graph[cycle.node_id()].clone())?;
    Ok(sorted.into_iter().rev().map(|idx| self.graph[idx].clone()).collect())
  }

  pub fn edge_count(&self) -> usize {
    self.graph.edge_count()
  }
}
