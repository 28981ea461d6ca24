// Destination classification by ordered rules: domain, then port, then path

use crate::model::{DetectedBy, ServiceCategory, ServiceDescriptor};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use url::Url;

const DATABASE_ICON: &str = "🗄️";
const API_ICON: &str = "🔌";
const SERVER_ICON: &str = "🖥️";

/// Hostname substring rules, first match wins.
const BUILTIN_DOMAINS: &[(&str, &str, ServiceCategory, &str)] = &[
    // CDN
    ("cloudfront.net", "AWS CloudFront", ServiceCategory::Cdn, "🌐"),
    ("akamai.net", "Akamai CDN", ServiceCategory::Cdn, "🌐"),
    ("fastly.net", "Fastly", ServiceCategory::Cdn, "🌐"),
    // Analytics and tracking
    ("google-analytics.com", "Google Analytics", ServiceCategory::Analytics, "📊"),
    ("googletagmanager.com", "Google Tag Manager", ServiceCategory::Analytics, "🏷️"),
    ("doubleclick.net", "Google Ads", ServiceCategory::Advertising, "💰"),
    // Fonts
    ("fonts.googleapis.com", "Google Fonts", ServiceCategory::Font, "🔤"),
    ("fonts.gstatic.com", "Google Fonts CDN", ServiceCategory::Font, "🔤"),
    // Media
    ("youtube.com", "YouTube", ServiceCategory::Media, "🎬"),
    ("youtu.be", "YouTube", ServiceCategory::Media, "🎬"),
    ("vimeo.com", "Vimeo", ServiceCategory::Media, "🎥"),
    // Social
    ("twitter.com", "Twitter", ServiceCategory::Social, "🐦"),
    ("facebook.com", "Facebook", ServiceCategory::Social, "👥"),
    ("instagram.com", "Instagram", ServiceCategory::Social, "📷"),
    // Hosted databases
    ("firebaseio.com", "Firebase Database", ServiceCategory::Database, DATABASE_ICON),
    ("supabase.co", "Supabase", ServiceCategory::Database, DATABASE_ICON),
    ("mongodb", "MongoDB", ServiceCategory::Database, DATABASE_ICON),
    // APIs
    ("api.", "API Endpoint", ServiceCategory::Api, API_ICON),
    ("graphql", "GraphQL API", ServiceCategory::Api, API_ICON),
    // Cloud
    ("aws.amazon.com", "AWS", ServiceCategory::Cloud, "☁️"),
    ("azure.com", "Microsoft Azure", ServiceCategory::Cloud, "☁️"),
    // Auth
    ("auth0.com", "Auth0", ServiceCategory::Auth, "🔐"),
    ("okta.com", "Okta", ServiceCategory::Auth, "🔐"),
    // Firewalls and proxies
    ("cloudflare.com", "Cloudflare WAF", ServiceCategory::Firewall, "🛡️"),
    ("imperva.com", "Imperva WAF", ServiceCategory::Firewall, "🛡️"),
    // Load balancers
    ("elb.amazonaws.com", "AWS ELB", ServiceCategory::Loadbalancer, "⚖️"),
    // Monitoring
    ("newrelic.com", "New Relic", ServiceCategory::Monitoring, "📈"),
    ("datadoghq.com", "Datadog", ServiceCategory::Monitoring, "📈"),
    // Payments
    ("stripe.com", "Stripe", ServiceCategory::Payment, "💳"),
    ("paypal.com", "PayPal", ServiceCategory::Payment, "💳"),
    // Mail
    ("smtp.", "SMTP Server", ServiceCategory::Email, "📧"),
    ("mail.", "Mail Server", ServiceCategory::Email, "📧"),
];

const BUILTIN_DATABASE_PORTS: &[(u16, &str)] = &[
    (3306, "MySQL"),
    (5432, "PostgreSQL"),
    (1433, "Microsoft SQL Server"),
    (1521, "Oracle"),
    (27017, "MongoDB"),
    (6379, "Redis"),
];

static DEFAULT_CLASSIFIER: LazyLock<ServiceClassifier> = LazyLock::new(ServiceClassifier::new);

/// Classify with the built-in tables.
pub fn classify(url: &Url) -> ServiceDescriptor {
    DEFAULT_CLASSIFIER.classify(url)
}

/// A hostname substring mapped to a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRule {
    pub pattern: String,
    pub name: String,
    pub category: ServiceCategory,
    pub icon: String,
}

impl DomainRule {
    pub fn new(
        pattern: impl Into<String>,
        name: impl Into<String>,
        category: ServiceCategory,
        icon: impl Into<String>,
    ) -> Self {
        Self {
            pattern: pattern.into().to_lowercase(),
            name: name.into(),
            category,
            icon: icon.into(),
        }
    }

    fn matches(&self, hostname: &str) -> bool {
        !self.pattern.is_empty() && hostname.contains(&self.pattern)
    }
}

/// An explicit port that identifies a database engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRule {
    pub port: u16,
    pub name: String,
}

impl PortRule {
    pub fn new(port: u16, name: impl Into<String>) -> Self {
        Self {
            port,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceClassifier {
    domain_rules: Vec<DomainRule>,
    database_ports: Vec<PortRule>,
}

impl ServiceClassifier {
    /// Classifier with the built-in domain and port tables.
    pub fn new() -> Self {
        Self {
            domain_rules: BUILTIN_DOMAINS
                .iter()
                .map(|(pattern, name, category, icon)| {
                    DomainRule::new(*pattern, *name, *category, *icon)
                })
                .collect(),
            database_ports: BUILTIN_DATABASE_PORTS
                .iter()
                .map(|(port, name)| PortRule::new(*port, *name))
                .collect(),
        }
    }

    /// Classifier with no tables; everything falls through to path or default.
    pub fn empty() -> Self {
        Self {
            domain_rules: Vec::new(),
            database_ports: Vec::new(),
        }
    }

    /// Put `rules` ahead of the existing domain table, keeping their order.
    pub fn with_domain_rules(mut self, rules: Vec<DomainRule>) -> Self {
        let mut combined = rules;
        combined.append(&mut self.domain_rules);
        self.domain_rules = combined;
        self
    }

    /// Put `ports` ahead of the existing port table.
    pub fn with_database_ports(mut self, ports: Vec<PortRule>) -> Self {
        let mut combined = ports;
        combined.append(&mut self.database_ports);
        self.database_ports = combined;
        self
    }

    pub fn domain_rules(&self) -> &[DomainRule] {
        &self.domain_rules
    }

    pub fn database_ports(&self) -> &[PortRule] {
        &self.database_ports
    }

    /// Classify a parsed URL. Never fails; unmatched URLs are a generic server.
    pub fn classify(&self, url: &Url) -> ServiceDescriptor {
        let hostname = url.host_str().unwrap_or_default().to_lowercase();

        if let Some(rule) = self.domain_rules.iter().find(|rule| rule.matches(&hostname)) {
            return ServiceDescriptor::new(
                rule.name.clone(),
                rule.category,
                rule.icon.clone(),
                DetectedBy::Domain,
            );
        }

        // url only reports a port when it differs from the scheme default
        if let Some(port) = url.port()
            && let Some(rule) = self.database_ports.iter().find(|rule| rule.port == port)
        {
            return ServiceDescriptor::new(
                rule.name.clone(),
                ServiceCategory::Database,
                DATABASE_ICON,
                DetectedBy::Port,
            );
        }

        let path = url.path().to_lowercase();
        if path.contains("/api/") || path.contains("/graphql") {
            return ServiceDescriptor::new(
                "API Server",
                ServiceCategory::Api,
                API_ICON,
                DetectedBy::Path,
            );
        }

        ServiceDescriptor::new(
            "Web Server",
            ServiceCategory::Server,
            SERVER_ICON,
            DetectedBy::Default,
        )
    }

    /// Parse then classify; `None` when the string is not a URL.
    pub fn classify_str(&self, url: &str) -> Option<ServiceDescriptor> {
        Url::parse(url).ok().map(|url| self.classify(&url))
    }
}

impl Default for ServiceClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(url: &str) -> ServiceDescriptor {
        classify(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_domain_substring_matches_anywhere() {
        let service = descriptor("https://d1234.cloudfront.net.example.org/asset.js");
        assert_eq!(service.name, "AWS CloudFront");
        assert_eq!(service.detected_by, DetectedBy::Domain);
    }

    #[test]
    fn test_first_listed_domain_rule_wins() {
        // "api." is listed before "stripe.com"
        let service = descriptor("https://api.stripe.com/v1/charges");
        assert_eq!(service.category, ServiceCategory::Api);
        assert_eq!(service.name, "API Endpoint");
    }

    #[test]
    fn test_default_port_is_not_explicit() {
        let service = descriptor("https://db.example.com:443/");
        assert_eq!(service.detected_by, DetectedBy::Default);
    }

    #[test]
    fn test_extra_rules_take_precedence() {
        let classifier = ServiceClassifier::new().with_domain_rules(vec![DomainRule::new(
            "Fonts.GoogleAPIs.com",
            "Corporate Font Proxy",
            ServiceCategory::Cdn,
            "🌐",
        )]);

        let service = classifier
            .classify_str("https://fonts.googleapis.com/css")
            .unwrap();
        assert_eq!(service.name, "Corporate Font Proxy");
        assert_eq!(service.category, ServiceCategory::Cdn);
    }

    #[test]
    fn test_empty_classifier_falls_through() {
        let classifier = ServiceClassifier::empty();
        let service = classifier.classify_str("http://example.com:5432/").unwrap();
        assert_eq!(service.category, ServiceCategory::Server);
        assert!(classifier.classify_str("::not a url::").is_none());
    }
}
