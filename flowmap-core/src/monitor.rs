// The monitoring session: owns the request log and the graph, and hands out
// the sink that interception wrappers report to.
//
// All mutation goes through one lock, so ingests are applied one at a time
// and change notifications leave in the order the changes happened.

use crate::classify::ServiceClassifier;
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::export::Snapshot;
use crate::graph::{GraphChange, TrafficGraph};
use crate::model::{Edge, Node, RequestRecord};
use crate::stats::{HostStats, SessionTotals, StatsAggregator};
use chrono::Utc;
use flowmap_intercept::{
    EventTransport, FetchTransport, InterceptedEvents, InterceptedFetch, Observation,
    ObservationSink, ResourceTimingCollector, ResourceTimingFeed,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info};
use url::Url;

/// Notification sent to subscribers after each change to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    NodeUpserted(Node),
    EdgeUpserted(Edge),
    StatsUpdated(SessionTotals),
    /// Everything was cleared; only the root node remains.
    Reset,
}

impl From<GraphChange> for MonitorEvent {
    fn from(change: GraphChange) -> Self {
        match change {
            GraphChange::NodeUpserted(node) => MonitorEvent::NodeUpserted(node),
            GraphChange::EdgeUpserted(edge) => MonitorEvent::EdgeUpserted(edge),
        }
    }
}

struct Session {
    monitoring: bool,
    log: Vec<RequestRecord>,
    graph: TrafficGraph,
    dropped: u64,
    subscribers: Vec<mpsc::UnboundedSender<MonitorEvent>>,
}

impl Session {
    fn publish(&mut self, events: Vec<MonitorEvent>) {
        if self.subscribers.is_empty() {
            return;
        }
        self.subscribers.retain(|tx| {
            events.iter().all(|event| tx.send(event.clone()).is_ok())
        });
    }

    fn stats(&self) -> StatsAggregator<'_> {
        StatsAggregator::new(&self.log, self.dropped)
    }
}

struct Shared {
    session: Mutex<Session>,
    classifier: ServiceClassifier,
    base_url: Option<Url>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, raw: &str) -> Option<Url> {
        match &self.base_url {
            Some(base) => base.join(raw).ok(),
            None => Url::parse(raw).ok(),
        }
    }

    fn ingest(&self, observation: Observation) {
        let mut session = self.lock();
        if !session.monitoring {
            debug!("Monitoring stopped, discarding {}", observation.url);
            return;
        }

        let destination = self
            .resolve(&observation.url)
            .and_then(|url| url.host_str().map(|host| (host.to_string(), url.clone())));

        let mut events: Vec<MonitorEvent> = Vec::new();
        match destination {
            Some((hostname, url)) => {
                let service = self.classifier.classify(&url);
                let record = RequestRecord::from_observation(observation, &url, &hostname, service);
                debug!(
                    "{} {} -> {} [{}] {:.1}ms",
                    record.method,
                    record.url,
                    record.status,
                    record.service.name,
                    record.duration_ms
                );
                events.extend(session.graph.ingest(&record).into_iter().map(MonitorEvent::from));
                session.log.push(record);
            }
            None => {
                debug!("No destination host in {}, dropping", observation.url);
                session.dropped += 1;
            }
        }

        if !session.subscribers.is_empty() {
            events.push(MonitorEvent::StatsUpdated(session.stats().totals()));
        }
        session.publish(events);
    }
}

/// Sink handed to interception wrappers and the resource timing collector.
#[derive(Clone)]
pub struct Recorder {
    shared: Arc<Shared>,
}

impl ObservationSink for Recorder {
    fn is_recording(&self) -> bool {
        self.shared.lock().monitoring
    }

    fn observe(&self, observation: Observation) {
        self.shared.ingest(observation);
    }
}

pub struct TrafficMonitor {
    shared: Arc<Shared>,
    passive_collection: bool,
    collector: Option<ResourceTimingCollector<Recorder>>,
}

impl TrafficMonitor {
    pub fn new() -> Self {
        Self::build(&MonitorConfig::default(), None)
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, config.parsed_base_url()?))
    }

    fn build(config: &MonitorConfig, base_url: Option<Url>) -> Self {
        let session = Session {
            monitoring: false,
            log: Vec::new(),
            graph: TrafficGraph::new(&config.root_id, &config.root_label),
            dropped: 0,
            subscribers: Vec::new(),
        };

        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                classifier: config.classifier(),
                base_url,
            }),
            passive_collection: config.passive_collection,
            collector: None,
        }
    }

    /// Attach a passive resource timing feed. Ignored when passive collection
    /// is disabled in the config.
    pub fn with_timing_feed(mut self, feed: Arc<dyn ResourceTimingFeed>) -> Self {
        if self.passive_collection {
            self.collector = Some(ResourceTimingCollector::new(feed, self.recorder()));
        } else {
            debug!("Passive collection disabled, ignoring timing feed");
        }
        self
    }

    /// Begin recording. Returns false if already monitoring.
    pub fn start(&self) -> bool {
        {
            let mut session = self.shared.lock();
            if session.monitoring {
                return false;
            }
            session.monitoring = true;
        }

        // the collector feeds back into the session lock, so it runs unlocked
        if let Some(collector) = &self.collector {
            collector.start();
        }
        info!("Network monitoring started");
        true
    }

    /// Stop recording. Calls already in flight complete normally for their
    /// callers but are not recorded. Returns false if not monitoring.
    pub fn stop(&self) -> bool {
        {
            let mut session = self.shared.lock();
            if !session.monitoring {
                return false;
            }
            session.monitoring = false;
        }

        if let Some(collector) = &self.collector {
            collector.stop();
        }
        info!("Network monitoring stopped");
        true
    }

    /// Clear the log, nodes and edges in one step, leaving only the root.
    /// Monitoring state is unchanged.
    pub fn reset(&self) {
        let mut session = self.shared.lock();
        session.log.clear();
        session.graph.reset();
        session.dropped = 0;

        let root = session.graph.root().clone();
        let totals = session.stats().totals();
        session.publish(vec![
            MonitorEvent::Reset,
            MonitorEvent::NodeUpserted(root),
            MonitorEvent::StatsUpdated(totals),
        ]);
        info!("Session data cleared");
    }

    pub fn is_monitoring(&self) -> bool {
        self.shared.lock().monitoring
    }

    pub fn recorder(&self) -> Recorder {
        Recorder {
            shared: self.shared.clone(),
        }
    }

    /// Wrap a promise-style transport so its calls are recorded.
    pub fn intercept_fetch<T: FetchTransport>(&self, inner: T) -> InterceptedFetch<T, Recorder> {
        InterceptedFetch::new(inner, self.recorder())
    }

    /// Wrap an event-style transport so the calls it creates are recorded.
    pub fn intercept_events<T: EventTransport>(&self, inner: T) -> InterceptedEvents<T, Recorder> {
        InterceptedEvents::new(inner, self.recorder())
    }

    /// Receive every future change notification, in order.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<MonitorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.lock().subscribers.push(tx);
        rx
    }

    pub fn snapshot(&self) -> Snapshot {
        let session = self.shared.lock();
        Snapshot {
            timestamp: Utc::now(),
            requests: session.log.clone(),
            nodes: session.graph.nodes(),
            edges: session.graph.edges(),
        }
    }

    /// Same as [`TrafficMonitor::snapshot`]; an empty session is a valid export.
    pub fn export(&self) -> Snapshot {
        let snapshot = self.snapshot();
        info!(
            "Exporting {} requests, {} nodes, {} edges",
            snapshot.requests.len(),
            snapshot.nodes.len(),
            snapshot.edges.len()
        );
        snapshot
    }

    pub fn totals(&self) -> SessionTotals {
        self.shared.lock().stats().totals()
    }

    pub fn host_stats(&self) -> Vec<HostStats> {
        self.shared.lock().stats().hosts()
    }

    pub fn domains(&self) -> Vec<String> {
        self.shared.lock().stats().domains()
    }

    pub fn request_count(&self) -> usize {
        self.shared.lock().log.len()
    }

    pub fn node_count(&self) -> usize {
        self.shared.lock().graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.shared.lock().graph.edge_count()
    }

    /// The destination node for `hostname`, if one exists.
    pub fn host_node(&self, hostname: &str) -> Option<Node> {
        self.shared.lock().graph.host_node(hostname).cloned()
    }

    /// The root → `hostname` edge, if one exists.
    pub fn host_edge(&self, hostname: &str) -> Option<Edge> {
        self.shared.lock().graph.host_edge(hostname).cloned()
    }

    pub fn classifier(&self) -> &ServiceClassifier {
        &self.shared.classifier
    }
}

impl Default for TrafficMonitor {
    fn default() -> Self {
        Self::new()
    }
}
