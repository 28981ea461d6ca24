pub mod classify;
pub mod config;
pub mod error;
pub mod export;
pub mod graph;
pub mod model;
pub mod monitor;
pub mod report;
pub mod stats;

pub use classify::{DomainRule, PortRule, ServiceClassifier, classify};
pub use config::MonitorConfig;
pub use error::MonitorError;
pub use export::Snapshot;
pub use graph::{GraphChange, TrafficGraph, category_color};
pub use model::{
    DetectedBy, Edge, Node, NodeCategory, RequestRecord, ServiceCategory, ServiceDescriptor,
};
pub use monitor::{MonitorEvent, Recorder, TrafficMonitor};
pub use stats::{HostStats, SessionTotals, StatsAggregator};

pub use flowmap_intercept::SourceKind;
