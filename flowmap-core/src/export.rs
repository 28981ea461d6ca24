use crate::error::Result;
use crate::model::{Edge, Node, RequestRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Point-in-time copy of the whole session, and the export artifact format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub requests: Vec<RequestRecord>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// `network-flow-<timestamp>.json`, safe on every filesystem.
    pub fn file_name(&self) -> String {
        format!("network-flow-{}.json", self.timestamp.format("%Y-%m-%dT%H-%M-%S"))
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Write into `dir` under [`Snapshot::file_name`] and return the full path.
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        self.write_to(&path)?;
        Ok(path)
    }
}
