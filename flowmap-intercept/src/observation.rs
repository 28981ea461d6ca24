use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Method recorded when the caller did not name one.
pub const DEFAULT_METHOD: &str = "GET";

/// Which platform capability issued the observed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Promise-style call (`fetch`-like, resolves to a response).
    PromiseRequest,
    /// Event-style call object (open/send with load and error listeners).
    EventRequest,
    /// Load seen only through the passive resource timing feed.
    PassiveResource,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::PromiseRequest => "promise-request",
            SourceKind::EventRequest => "event-request",
            SourceKind::PassiveResource => "passive-resource",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw, unclassified observation of one outbound call.
///
/// The URL is kept exactly as the caller passed it; parsing and
/// classification happen downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub url: String,
    pub method: String,
    pub source_kind: SourceKind,
    pub duration_ms: f64,
    /// Final status; 0 means the transport failed.
    pub status: u16,
    pub transfer_size: Option<u64>,
    pub error: Option<String>,
    pub initiator: Option<String>,
}

impl Observation {
    pub fn new(url: String, method: String, source_kind: SourceKind) -> Self {
        Self {
            url,
            method,
            source_kind,
            duration_ms: 0.0,
            status: 0,
            transfer_size: None,
            error: None,
            initiator: None,
        }
    }

    pub fn with_error(url: String, method: String, source_kind: SourceKind, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(url, method, source_kind)
        }
    }

    /// Stamp the elapsed time since `started` in milliseconds.
    pub fn finished(mut self, started: Instant) -> Self {
        self.duration_ms = elapsed_ms(started);
        self
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Receiver of observations produced by the interception wrappers and the
/// resource timing collector.
pub trait ObservationSink: Send + Sync {
    /// Whether observations are currently wanted. Wrappers still forward
    /// calls when this is false; only the telemetry is skipped.
    fn is_recording(&self) -> bool;

    fn observe(&self, observation: Observation);
}

impl<S: ObservationSink + ?Sized> ObservationSink for Arc<S> {
    fn is_recording(&self) -> bool {
        (**self).is_recording()
    }

    fn observe(&self, observation: Observation) {
        (**self).observe(observation)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Sink that keeps everything it is given, for assertions.
    #[derive(Default)]
    pub struct CollectingSink {
        pub recording: AtomicBool,
        pub seen: Mutex<Vec<Observation>>,
    }

    impl CollectingSink {
        pub fn recording() -> Arc<Self> {
            let sink = Self::default();
            sink.recording.store(true, Ordering::SeqCst);
            Arc::new(sink)
        }

        pub fn set_recording(&self, on: bool) {
            self.recording.store(on, Ordering::SeqCst);
        }

        pub fn observations(&self) -> Vec<Observation> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl ObservationSink for CollectingSink {
        fn is_recording(&self) -> bool {
            self.recording.load(Ordering::SeqCst)
        }

        fn observe(&self, observation: Observation) {
            if self.is_recording() {
                self.seen.lock().unwrap().push(observation);
            }
        }
    }
}
