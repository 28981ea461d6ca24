// Tests for the traffic graph

use flowmap_core::graph::{DEFAULT_ROOT_ID, GraphChange, TrafficGraph, category_color};
use flowmap_core::model::{NodeCategory, RequestRecord, ServiceCategory};
use flowmap_core::{SourceKind, classify};
use flowmap_intercept::Observation;
use url::Url;

fn record(url: &str, method: &str, duration_ms: f64) -> RequestRecord {
    let parsed = Url::parse(url).unwrap();
    let host = parsed.host_str().unwrap().to_string();
    let mut observation =
        Observation::new(url.to_string(), method.to_string(), SourceKind::PromiseRequest);
    observation.duration_ms = duration_ms;
    observation.status = 200;
    RequestRecord::from_observation(observation, &parsed, &host, classify(&parsed))
}

// ============================================================================
// Root Node Tests
// ============================================================================

#[test]
fn test_new_graph_has_only_root() {
    let graph = TrafficGraph::default();
    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.edge_count(), 0);
    assert_eq!(graph.root().id, DEFAULT_ROOT_ID);
    assert_eq!(graph.root().category, NodeCategory::Client);
    assert_eq!(graph.root().color, "#4CAF50");
}

#[test]
fn test_custom_root() {
    let graph = TrafficGraph::new("browser", "My Browser");
    assert_eq!(graph.root().id, "browser");
    assert_eq!(graph.root().label, "My Browser");
}

// ============================================================================
// Node Tests
// ============================================================================

#[test]
fn test_first_record_creates_node_and_edge() {
    let mut graph = TrafficGraph::default();
    let changes = graph.ingest(&record("https://fonts.googleapis.com/css", "GET", 12.0));

    assert_eq!(changes.len(), 2);
    match &changes[0] {
        GraphChange::NodeUpserted(node) => {
            assert_eq!(node.id, "fonts.googleapis.com");
            assert_eq!(node.label, "🔤 Google Fonts");
            assert_eq!(node.category, NodeCategory::Service(ServiceCategory::Font));
            assert_eq!(node.hostname.as_deref(), Some("fonts.googleapis.com"));
        }
        other => panic!("expected node change, got {:?}", other),
    }
    assert!(matches!(changes[1], GraphChange::EdgeUpserted(_)));
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 1);
}

#[test]
fn test_repeat_host_emits_only_edge_change() {
    let mut graph = TrafficGraph::default();
    graph.ingest(&record("https://example.com/a", "GET", 5.0));
    let changes = graph.ingest(&record("https://example.com/b", "GET", 5.0));

    assert_eq!(changes.len(), 1);
    assert!(matches!(changes[0], GraphChange::EdgeUpserted(_)));
    assert_eq!(graph.node_count(), 2);
}

#[test]
fn test_node_keeps_first_classification() {
    let mut graph = TrafficGraph::default();
    graph.ingest(&record("https://example.com/api/users", "GET", 5.0));
    graph.ingest(&record("https://example.com/index.html", "GET", 5.0));

    let node = graph.host_node("example.com").unwrap();
    assert_eq!(node.label, "🔌 API Server");
    assert_eq!(node.category, NodeCategory::Service(ServiceCategory::Api));
    assert_eq!(node.color, category_color(ServiceCategory::Api));
}

#[test]
fn test_host_colliding_with_root_gets_prefixed_id() {
    let mut graph = TrafficGraph::new("localhost", "Local");
    graph.ingest(&record("http://localhost/", "GET", 1.0));

    let node = graph.host_node("localhost").unwrap();
    assert_eq!(node.id, "host:localhost");
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.host_edge("localhost").unwrap().id, "localhost->host:localhost");
}

#[test]
fn test_category_colors() {
    assert_eq!(category_color(ServiceCategory::Database), "#FF9800");
    assert_eq!(category_color(ServiceCategory::Cdn), "#9C27B0");
    assert_eq!(category_color(ServiceCategory::Analytics), "#F44336");
    assert_eq!(category_color(ServiceCategory::Auth), "#4CAF50");
    assert_eq!(category_color(ServiceCategory::Api), "#00BCD4");
    assert_eq!(category_color(ServiceCategory::Font), "#2196F3");
}

// ============================================================================
// Edge Aggregation Tests
// ============================================================================

#[test]
fn test_edge_aggregates_repeated_calls() {
    let mut graph = TrafficGraph::default();
    graph.ingest(&record("https://example.com/a", "GET", 10.0));
    graph.ingest(&record("https://example.com/b", "POST", 30.0));

    let edge = graph.host_edge("example.com").unwrap();
    assert_eq!(edge.id, "client->example.com");
    assert_eq!(edge.occurrence_count, 2);
    assert_eq!(edge.last_method, "POST");
    assert_eq!(edge.last_duration_ms, 30.0);
    assert_eq!(edge.total_duration_ms, 40.0);
    assert_eq!(edge.mean_duration_ms(), 20.0);
    assert_eq!(edge.label(), "POST (2)");
    assert_eq!(graph.edge_count(), 1);
}

#[test]
fn test_edge_width_caps_at_eight() {
    let mut graph = TrafficGraph::default();
    graph.ingest(&record("https://example.com/", "GET", 1.0));
    assert_eq!(graph.host_edge("example.com").unwrap().width(), 4);

    for _ in 0..9 {
        graph.ingest(&record("https://example.com/", "GET", 1.0));
    }
    assert_eq!(graph.host_edge("example.com").unwrap().occurrence_count, 10);
    assert_eq!(graph.host_edge("example.com").unwrap().width(), 8);
}

#[test]
fn test_nodes_and_edges_in_creation_order() {
    let mut graph = TrafficGraph::default();
    graph.ingest(&record("https://b.example/", "GET", 1.0));
    graph.ingest(&record("https://a.example/", "GET", 1.0));
    graph.ingest(&record("https://b.example/", "GET", 1.0));

    let ids: Vec<String> = graph.nodes().into_iter().map(|n| n.id).collect();
    assert_eq!(ids, vec!["client", "b.example", "a.example"]);

    let edges: Vec<String> = graph.edges().into_iter().map(|e| e.to).collect();
    assert_eq!(edges, vec!["b.example", "a.example"]);
}

// ============================================================================
// Reset Tests
// ============================================================================

#[test]
fn test_reset_leaves_only_root() {
    let mut graph = TrafficGraph::new("me", "Me");
    graph.ingest(&record("https://a.example/", "GET", 1.0));
    graph.ingest(&record("https://b.example/", "GET", 1.0));

    graph.reset();

    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.edge_count(), 0);
    assert_eq!(graph.root().id, "me");
    assert!(graph.host_node("a.example").is_none());

    let changes = graph.ingest(&record("https://a.example/", "GET", 1.0));
    assert_eq!(changes.len(), 2);
    assert_eq!(graph.host_edge("a.example").unwrap().occurrence_count, 1);
}
