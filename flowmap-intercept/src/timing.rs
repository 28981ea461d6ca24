// Passive resource timing: the feed a host exposes, and the collector that
// turns its entries into observations.

use crate::error::{InterceptError, Result};
use crate::observation::{DEFAULT_METHOD, Observation, ObservationSink, SourceKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, info, warn};
use url::Url;

/// One passively recorded resource load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTimingEntry {
    /// Resource name, normally its absolute URL.
    pub name: String,
    /// What started the load (`img`, `script`, `link`, `css`, ...).
    pub initiator_type: String,
    pub start_time_ms: f64,
    pub duration_ms: f64,
    pub transfer_size: u64,
    /// Response status if the platform exposes it, 0 when it does not.
    #[serde(default)]
    pub response_status: u16,
}

impl ResourceTimingEntry {
    pub fn new(name: impl Into<String>, initiator_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initiator_type: initiator_type.into(),
            start_time_ms: 0.0,
            duration_ms: 0.0,
            transfer_size: 0,
            response_status: 0,
        }
    }

    pub fn with_timing(mut self, start_time_ms: f64, duration_ms: f64) -> Self {
        self.start_time_ms = start_time_ms;
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_transfer_size(mut self, bytes: u64) -> Self {
        self.transfer_size = bytes;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.response_status = status;
        self
    }

    fn key(&self) -> EntryKey {
        (self.name.clone(), self.start_time_ms.to_bits())
    }
}

/// Entries are the same load when name and start time agree.
type EntryKey = (String, u64);

pub type BatchCallback = Arc<dyn Fn(&[ResourceTimingEntry]) + Send + Sync>;

/// A source of passive timing entries.
///
/// Observer callbacks must not run while holding anything `buffered` needs:
/// the collector reads the buffer from inside its callback.
pub trait ResourceTimingFeed: Send + Sync {
    /// Everything recorded so far, oldest first.
    fn buffered(&self) -> Vec<ResourceTimingEntry>;

    /// Subscribe to future batches. Feeds that cannot push new entries return
    /// [`InterceptError::ObserverUnsupported`].
    fn observe(&self, callback: BatchCallback) -> Result<ObserverHandle>;
}

/// Live subscription to a feed. Dropping it disconnects.
pub struct ObserverHandle {
    disconnect: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ObserverHandle {
    pub fn new(disconnect: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            disconnect: Some(Box::new(disconnect)),
        }
    }

    pub fn disconnect(self) {
        drop(self);
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if let Some(disconnect) = self.disconnect.take() {
            disconnect();
        }
    }
}

impl std::fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHandle")
            .field("connected", &self.disconnect.is_some())
            .finish()
    }
}

#[derive(Default)]
struct BufferState {
    entries: Vec<ResourceTimingEntry>,
    observers: Vec<(u64, BatchCallback)>,
    next_observer: u64,
}

/// In-process timing buffer. The host records entries into it; observers get
/// each recorded batch in delivery order.
#[derive(Clone, Default)]
pub struct TimingBuffer {
    state: Arc<Mutex<BufferState>>,
}

impl TimingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: ResourceTimingEntry) {
        self.record_batch(vec![entry]);
    }

    pub fn record_batch(&self, batch: Vec<ResourceTimingEntry>) {
        if batch.is_empty() {
            return;
        }

        let observers: Vec<BatchCallback> = {
            let mut state = self.lock();
            state.entries.extend(batch.iter().cloned());
            state.observers.iter().map(|(_, cb)| cb.clone()).collect()
        };

        for callback in observers {
            callback(&batch);
        }
    }

    /// Forget buffered entries. Observers stay connected.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResourceTimingFeed for TimingBuffer {
    fn buffered(&self) -> Vec<ResourceTimingEntry> {
        self.lock().entries.clone()
    }

    fn observe(&self, callback: BatchCallback) -> Result<ObserverHandle> {
        let id = {
            let mut state = self.lock();
            let id = state.next_observer;
            state.next_observer += 1;
            state.observers.push((id, callback));
            id
        };

        let state = Arc::downgrade(&self.state);
        Ok(ObserverHandle::new(move || {
            if let Some(state) = state.upgrade() {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                state.observers.retain(|(observer, _)| *observer != id);
            }
        }))
    }
}

/// Feed for platforms with no passive timing at all.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTimingFeed;

impl ResourceTimingFeed for NoTimingFeed {
    fn buffered(&self) -> Vec<ResourceTimingEntry> {
        Vec::new()
    }

    fn observe(&self, _callback: BatchCallback) -> Result<ObserverHandle> {
        Err(InterceptError::ObserverUnsupported)
    }
}

/// Dedupe set size that triggers a prune against the feed's buffer.
const PRUNE_THRESHOLD: usize = 4096;

/// Keys of entries already forwarded. A key whose entry has left the feed
/// cannot come back through a replay, so such keys are dropped when
/// collection stops and whenever the set outgrows `prune_at`.
struct SeenKeys {
    keys: HashSet<EntryKey>,
    prune_at: usize,
}

impl SeenKeys {
    fn new() -> Self {
        Self {
            keys: HashSet::new(),
            prune_at: PRUNE_THRESHOLD,
        }
    }

    fn insert(&mut self, key: EntryKey, feed: &dyn ResourceTimingFeed) -> bool {
        if !self.keys.insert(key) {
            return false;
        }
        if self.keys.len() > self.prune_at {
            self.prune(feed);
        }
        true
    }

    /// Keep only the keys of entries the feed still holds.
    fn prune(&mut self, feed: &dyn ResourceTimingFeed) {
        let held: HashSet<EntryKey> = feed
            .buffered()
            .iter()
            .map(ResourceTimingEntry::key)
            .collect();
        let before = self.keys.len();
        self.keys.retain(|key| held.contains(key));
        self.prune_at = PRUNE_THRESHOLD.max(self.keys.len() * 2);

        if self.keys.len() < before {
            debug!("Dropped {} stale resource entry keys", before - self.keys.len());
        }
    }
}

#[derive(Default)]
struct CollectorState {
    active: bool,
    subscription: Option<ObserverHandle>,
}

/// Follows a feed and replays what it already holds, forwarding each entry
/// once as a passive observation.
pub struct ResourceTimingCollector<S> {
    feed: Arc<dyn ResourceTimingFeed>,
    sink: S,
    seen: Arc<Mutex<SeenKeys>>,
    state: Mutex<CollectorState>,
}

impl<S> ResourceTimingCollector<S>
where
    S: ObservationSink + Clone + 'static,
{
    pub fn new(feed: Arc<dyn ResourceTimingFeed>, sink: S) -> Self {
        Self {
            feed,
            sink,
            seen: Arc::new(Mutex::new(SeenKeys::new())),
            state: Mutex::new(CollectorState::default()),
        }
    }

    /// Subscribe, then replay what the feed already holds. Entries landing
    /// between the two arrive through both paths and are forwarded once.
    /// Returns false when already started.
    pub fn start(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.active {
            return false;
        }
        state.active = true;

        let seen = self.seen.clone();
        let sink = self.sink.clone();
        let feed: Weak<dyn ResourceTimingFeed> = Arc::downgrade(&self.feed);
        let callback: BatchCallback = Arc::new(move |batch: &[ResourceTimingEntry]| {
            if let Some(feed) = feed.upgrade() {
                Self::drain(&seen, feed.as_ref(), &sink, batch);
            }
        });

        match self.feed.observe(callback) {
            Ok(handle) => {
                state.subscription = Some(handle);
                info!("Passive resource collection started");
            }
            Err(InterceptError::ObserverUnsupported) => {
                info!("Passive resource observer unsupported, continuing without it");
            }
            Err(e) => {
                warn!("Could not observe resource timing: {}", e);
            }
        }

        let buffered = self.feed.buffered();
        debug!("Replaying {} buffered resource entries", buffered.len());
        Self::drain(&self.seen, self.feed.as_ref(), &self.sink, &buffered);
        true
    }

    /// Disconnect from the feed. Returns false when not started.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.active {
            return false;
        }
        state.active = false;
        if let Some(handle) = state.subscription.take() {
            handle.disconnect();
        }
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .prune(self.feed.as_ref());
        info!("Passive resource collection stopped");
        true
    }

    /// How many dedupe keys are currently held.
    pub fn tracked_entries(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys
            .len()
    }

    pub fn is_active(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active
    }

    pub fn is_subscribed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscription
            .is_some()
    }

    fn drain(
        seen: &Mutex<SeenKeys>,
        feed: &dyn ResourceTimingFeed,
        sink: &S,
        batch: &[ResourceTimingEntry],
    ) {
        for entry in batch {
            if !sink.is_recording() {
                return;
            }

            let fresh = seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(entry.key(), feed);
            if !fresh {
                continue;
            }

            if Url::parse(&entry.name).is_err() {
                debug!("Skipping resource entry with unparsable name: {}", entry.name);
                continue;
            }

            let mut observation = Observation::new(
                entry.name.clone(),
                DEFAULT_METHOD.to_string(),
                SourceKind::PassiveResource,
            );
            observation.duration_ms = entry.duration_ms;
            observation.transfer_size = Some(entry.transfer_size);
            observation.status = entry.response_status;
            observation.initiator = Some(entry.initiator_type.clone());
            sink.observe(observation);
        }
    }
}
