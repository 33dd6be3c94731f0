use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use xds_reconciler_core::{resource::Any, Scope};

/// A configuration batch as read from disk. YAML and JSON are both accepted.
///
/// ```yaml
/// namespace: default
/// name: ingress
/// resources:
///   - "@type": type.googleapis.com/envoy.config.cluster.v3.Cluster
///     name: backend
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct BatchFile {
    pub namespace: String,
    pub name: String,

    #[serde(default)]
    pub resources: Vec<Any>,
}

// === impl BatchFile ===

impl BatchFile {
    pub fn read(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn scope(&self) -> Scope {
        Scope::new(&self.namespace, &self.name)
    }
}
