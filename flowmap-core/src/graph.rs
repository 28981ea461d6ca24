// The client → destination graph.
//
// Nodes are keyed by hostname and never change once created. Edges are keyed
// by their `(from, to)` pair; every call between the same pair folds into
// the one edge.

use crate::model::{Edge, Node, NodeCategory, RequestRecord, ServiceCategory};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use tracing::debug;

pub const DEFAULT_ROOT_ID: &str = "client";
pub const DEFAULT_ROOT_LABEL: &str = "This client";

const ROOT_COLOR: &str = "#4CAF50";
const DEFAULT_COLOR: &str = "#2196F3";

/// Display color for a service category.
pub fn category_color(category: ServiceCategory) -> &'static str {
    match category {
        ServiceCategory::Database => "#FF9800",
        ServiceCategory::Cdn => "#9C27B0",
        ServiceCategory::Analytics => "#F44336",
        ServiceCategory::Auth => "#4CAF50",
        ServiceCategory::Api => "#00BCD4",
        _ => DEFAULT_COLOR,
    }
}

/// A change produced by one ingest, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphChange {
    NodeUpserted(Node),
    EdgeUpserted(Edge),
}

pub struct TrafficGraph {
    graph: DiGraph<Node, Edge>,
    hosts: HashMap<String, NodeIndex>,
    root: NodeIndex,
    root_id: String,
    root_label: String,
}

impl TrafficGraph {
    pub fn new(root_id: impl Into<String>, root_label: impl Into<String>) -> Self {
        let root_id = root_id.into();
        let root_label = root_label.into();
        let mut graph = DiGraph::new();
        let root = graph.add_node(Self::root_node(&root_id, &root_label));

        Self {
            graph,
            hosts: HashMap::new(),
            root,
            root_id,
            root_label,
        }
    }

    fn root_node(root_id: &str, root_label: &str) -> Node {
        Node {
            id: root_id.to_string(),
            label: root_label.to_string(),
            category: NodeCategory::Client,
            color: ROOT_COLOR.to_string(),
            hostname: None,
        }
    }

    /// Fold one record into the graph and report what changed.
    ///
    /// The destination node is created on first sight of its hostname, with
    /// this record's classification. Later records for the same host leave it
    /// alone. The root → destination edge is always updated.
    pub fn ingest(&mut self, record: &RequestRecord) -> Vec<GraphChange> {
        let mut changes = Vec::with_capacity(2);

        let target = match self.hosts.get(&record.hostname) {
            Some(index) => *index,
            None => {
                let node = Node {
                    id: self.node_id_for(&record.hostname),
                    label: record.service.label(),
                    category: NodeCategory::Service(record.service.category),
                    color: category_color(record.service.category).to_string(),
                    hostname: Some(record.hostname.clone()),
                };
                debug!("New destination {} ({})", node.id, record.service.name);
                changes.push(GraphChange::NodeUpserted(node.clone()));
                let index = self.graph.add_node(node);
                self.hosts.insert(record.hostname.clone(), index);
                index
            }
        };

        let edge = match self.graph.find_edge(self.root, target) {
            Some(index) => {
                let edge = &mut self.graph[index];
                edge.occurrence_count += 1;
                edge.total_duration_ms += record.duration_ms;
                edge.last_duration_ms = record.duration_ms;
                edge.last_method = record.method.clone();
                edge.clone()
            }
            None => {
                let from = self.graph[self.root].id.clone();
                let to = self.graph[target].id.clone();
                let edge = Edge {
                    id: Edge::edge_id(&from, &to),
                    from,
                    to,
                    last_method: record.method.clone(),
                    occurrence_count: 1,
                    last_duration_ms: record.duration_ms,
                    total_duration_ms: record.duration_ms,
                };
                self.graph.add_edge(self.root, target, edge.clone());
                edge
            }
        };
        changes.push(GraphChange::EdgeUpserted(edge));

        changes
    }

    /// Drop every node and edge and put the root back.
    pub fn reset(&mut self) {
        self.graph.clear();
        self.hosts.clear();
        self.root = self
            .graph
            .add_node(Self::root_node(&self.root_id, &self.root_label));
    }

    /// Host node ids are the hostname, unless that would collide with the root.
    fn node_id_for(&self, hostname: &str) -> String {
        if hostname == self.root_id {
            format!("host:{}", hostname)
        } else {
            hostname.to_string()
        }
    }

    pub fn root(&self) -> &Node {
        &self.graph[self.root]
    }

    /// Nodes in creation order, root first.
    pub fn nodes(&self) -> Vec<Node> {
        self.graph.node_weights().cloned().collect()
    }

    /// Edges in creation order.
    pub fn edges(&self) -> Vec<Edge> {
        self.graph.edge_weights().cloned().collect()
    }

    pub fn host_node(&self, hostname: &str) -> Option<&Node> {
        self.hosts.get(hostname).map(|index| &self.graph[*index])
    }

    pub fn host_edge(&self, hostname: &str) -> Option<&Edge> {
        let target = self.hosts.get(hostname)?;
        self.graph
            .find_edge(self.root, *target)
            .map(|index| &self.graph[index])
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

impl Default for TrafficGraph {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT_ID, DEFAULT_ROOT_LABEL)
    }
}
