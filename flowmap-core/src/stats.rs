// Session totals and per-host rows, derived from the request log on demand

use crate::model::{RequestRecord, ServiceDescriptor};
use flowmap_intercept::SourceKind;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTotals {
    /// Distinct destination hostnames.
    pub destination_count: usize,
    pub request_count: usize,
    /// Distinct service categories across destinations.
    pub category_count: usize,
    pub total_transfer_bytes: u64,
    /// Observations whose URL could not be turned into a destination.
    pub dropped_observations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostStats {
    pub hostname: String,
    /// Classification of the first record seen for this host.
    pub service: ServiceDescriptor,
    pub request_count: usize,
    pub total_duration_ms: f64,
    pub mean_duration_ms: f64,
    pub total_bytes: u64,
    /// Distinct source kinds, in the order they were first seen.
    pub source_kinds: Vec<SourceKind>,
}

impl HostStats {
    fn new(record: &RequestRecord) -> Self {
        Self {
            hostname: record.hostname.clone(),
            service: record.service.clone(),
            request_count: 0,
            total_duration_ms: 0.0,
            mean_duration_ms: 0.0,
            total_bytes: 0,
            source_kinds: Vec::new(),
        }
    }

    fn add(&mut self, record: &RequestRecord) {
        self.request_count += 1;
        self.total_duration_ms += record.duration_ms;
        self.total_bytes = self
            .total_bytes
            .saturating_add(record.transfer_size_bytes.unwrap_or(0));
        if !self.source_kinds.contains(&record.source_kind) {
            self.source_kinds.push(record.source_kind);
        }
    }
}

/// Read-only view over a request log.
pub struct StatsAggregator<'a> {
    log: &'a [RequestRecord],
    dropped: u64,
}

impl<'a> StatsAggregator<'a> {
    pub fn new(log: &'a [RequestRecord], dropped: u64) -> Self {
        Self { log, dropped }
    }

    pub fn totals(&self) -> SessionTotals {
        let mut hosts: HashMap<&str, &ServiceDescriptor> = HashMap::new();
        for record in self.log {
            hosts.entry(record.hostname.as_str()).or_insert(&record.service);
        }
        let categories: HashSet<_> = hosts.values().map(|service| service.category).collect();

        SessionTotals {
            destination_count: hosts.len(),
            request_count: self.log.len(),
            category_count: categories.len(),
            total_transfer_bytes: self
                .log
                .iter()
                .map(|record| record.transfer_size_bytes.unwrap_or(0))
                .fold(0u64, u64::saturating_add),
            dropped_observations: self.dropped,
        }
    }

    /// One row per hostname, busiest first; ties keep discovery order.
    pub fn hosts(&self) -> Vec<HostStats> {
        let mut order: HashMap<&str, usize> = HashMap::new();
        let mut rows: Vec<HostStats> = Vec::new();

        for record in self.log {
            let slot = *order.entry(record.hostname.as_str()).or_insert_with(|| {
                rows.push(HostStats::new(record));
                rows.len() - 1
            });
            rows[slot].add(record);
        }

        for row in rows.iter_mut() {
            row.mean_duration_ms = row.total_duration_ms / row.request_count as f64;
        }

        // stable sort keeps discovery order among equal counts
        rows.sort_by(|a, b| b.request_count.cmp(&a.request_count));
        rows
    }

    /// Distinct hostnames in discovery order.
    pub fn domains(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.log
            .iter()
            .filter(|record| seen.insert(record.hostname.as_str()))
            .map(|record| record.hostname.clone())
            .collect()
    }
}
