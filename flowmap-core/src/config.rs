use crate::classify::{DomainRule, PortRule, ServiceClassifier};
use crate::error::{MonitorError, Result};
use crate::graph::{DEFAULT_ROOT_ID, DEFAULT_ROOT_LABEL};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub root_id: String,
    pub root_label: String,
    /// Origin that relative request URLs are resolved against.
    pub base_url: Option<String>,
    pub passive_collection: bool,
    /// Checked before the built-in domain table, in order.
    pub extra_domain_rules: Vec<DomainRule>,
    /// Checked before the built-in database port table, in order.
    pub extra_database_ports: Vec<PortRule>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            root_id: DEFAULT_ROOT_ID.to_string(),
            root_label: DEFAULT_ROOT_LABEL.to_string(),
            base_url: None,
            passive_collection: true,
            extra_domain_rules: Vec::new(),
            extra_database_ports: Vec::new(),
        }
    }
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let config: MonitorConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.root_id.trim().is_empty() {
            return Err(MonitorError::Config("root_id must not be empty".to_string()));
        }
        if let Some(rule) = self.extra_domain_rules.iter().find(|r| r.pattern.trim().is_empty()) {
            return Err(MonitorError::Config(format!(
                "domain rule '{}' has an empty pattern",
                rule.name
            )));
        }
        self.parsed_base_url()?;
        Ok(())
    }

    pub fn parsed_base_url(&self) -> Result<Option<Url>> {
        self.base_url
            .as_deref()
            .map(|base| {
                Url::parse(base).map_err(|e| {
                    MonitorError::Config(format!("invalid base_url '{}': {}", base, e))
                })
            })
            .transpose()
    }

    /// Built-in classifier with this config's extra rules in front.
    pub fn classifier(&self) -> ServiceClassifier {
        let domain_rules = self
            .extra_domain_rules
            .iter()
            .map(|rule| DomainRule::new(&rule.pattern, &rule.name, rule.category, &rule.icon))
            .collect();

        ServiceClassifier::new()
            .with_domain_rules(domain_rules)
            .with_database_ports(self.extra_database_ports.clone())
    }
}
