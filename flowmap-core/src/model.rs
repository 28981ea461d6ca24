use chrono::{DateTime, Utc};
use flowmap_intercept::{Observation, SourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCategory {
    Cdn,
    Analytics,
    Advertising,
    Font,
    Media,
    Social,
    Database,
    Api,
    Cloud,
    Auth,
    Firewall,
    Loadbalancer,
    Monitoring,
    Payment,
    Email,
    Server,
}

impl ServiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCategory::Cdn => "cdn",
            ServiceCategory::Analytics => "analytics",
            ServiceCategory::Advertising => "advertising",
            ServiceCategory::Font => "font",
            ServiceCategory::Media => "media",
            ServiceCategory::Social => "social",
            ServiceCategory::Database => "database",
            ServiceCategory::Api => "api",
            ServiceCategory::Cloud => "cloud",
            ServiceCategory::Auth => "auth",
            ServiceCategory::Firewall => "firewall",
            ServiceCategory::Loadbalancer => "loadbalancer",
            ServiceCategory::Monitoring => "monitoring",
            ServiceCategory::Payment => "payment",
            ServiceCategory::Email => "email",
            ServiceCategory::Server => "server",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cdn" => Some(ServiceCategory::Cdn),
            "analytics" => Some(ServiceCategory::Analytics),
            "advertising" => Some(ServiceCategory::Advertising),
            "font" => Some(ServiceCategory::Font),
            "media" => Some(ServiceCategory::Media),
            "social" => Some(ServiceCategory::Social),
            "database" => Some(ServiceCategory::Database),
            "api" => Some(ServiceCategory::Api),
            "cloud" => Some(ServiceCategory::Cloud),
            "auth" => Some(ServiceCategory::Auth),
            "firewall" => Some(ServiceCategory::Firewall),
            "loadbalancer" => Some(ServiceCategory::Loadbalancer),
            "monitoring" => Some(ServiceCategory::Monitoring),
            "payment" => Some(ServiceCategory::Payment),
            "email" => Some(ServiceCategory::Email),
            "server" => Some(ServiceCategory::Server),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which classification rule produced a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedBy {
    Domain,
    Port,
    Path,
    Default,
}

impl DetectedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectedBy::Domain => "domain",
            DetectedBy::Port => "port",
            DetectedBy::Path => "path",
            DetectedBy::Default => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub name: String,
    pub category: ServiceCategory,
    pub icon: String,
    pub detected_by: DetectedBy,
}

impl ServiceDescriptor {
    pub fn new(
        name: impl Into<String>,
        category: ServiceCategory,
        icon: impl Into<String>,
        detected_by: DetectedBy,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            icon: icon.into(),
            detected_by,
        }
    }

    /// Display label, icon first.
    pub fn label(&self) -> String {
        format!("{} {}", self.icon, self.name)
    }
}

/// One observed network call, classified. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub url: String,
    pub hostname: String,
    pub method: String,
    pub source_kind: SourceKind,
    pub duration_ms: f64,
    /// 0 means the call failed at the transport level.
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub service: ServiceDescriptor,
}

impl RequestRecord {
    /// Build a record from a raw observation whose URL has already been
    /// resolved and parsed.
    pub fn from_observation(
        observation: Observation,
        url: &url::Url,
        hostname: &str,
        service: ServiceDescriptor,
    ) -> Self {
        Self {
            url: url.to_string(),
            hostname: hostname.to_string(),
            method: observation.method,
            source_kind: observation.source_kind,
            duration_ms: observation.duration_ms.max(0.0),
            status: observation.status,
            transfer_size_bytes: observation.transfer_size,
            error_message: observation.error,
            initiator: observation.initiator,
            timestamp: Utc::now(),
            service,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == 0
    }
}

/// Display group of a graph node: the client itself, or a service category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum NodeCategory {
    Client,
    Service(ServiceCategory),
}

impl NodeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeCategory::Client => "client",
            NodeCategory::Service(category) => category.as_str(),
        }
    }
}

impl From<NodeCategory> for String {
    fn from(category: NodeCategory) -> Self {
        category.as_str().to_string()
    }
}

impl TryFrom<String> for NodeCategory {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "client" {
            return Ok(NodeCategory::Client);
        }
        ServiceCategory::from_str(&value)
            .map(NodeCategory::Service)
            .ok_or_else(|| format!("unknown node category: {}", value))
    }
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub label: String,
    pub category: NodeCategory,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

/// Aggregate of every call from one node to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub from: String,
    pub to: String,
    pub last_method: String,
    pub occurrence_count: u64,
    pub last_duration_ms: f64,
    pub total_duration_ms: f64,
}

impl Edge {
    pub fn edge_id(from: &str, to: &str) -> String {
        format!("{}->{}", from, to)
    }

    pub fn mean_duration_ms(&self) -> f64 {
        if self.occurrence_count == 0 {
            0.0
        } else {
            self.total_duration_ms / self.occurrence_count as f64
        }
    }

    /// `"{method} ({count})"`, as drawn on the edge.
    pub fn label(&self) -> String {
        format!("{} ({})", self.last_method, self.occurrence_count)
    }

    /// Stroke width grows with traffic and caps at 8.
    pub fn width(&self) -> u64 {
        (3 + self.occurrence_count).min(8)
    }
}
