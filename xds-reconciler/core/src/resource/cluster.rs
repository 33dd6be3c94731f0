use super::{ClusterLoadAssignment, ConfigSource, TransportSocket};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default)]
    pub name: String,

    /// The discovery type, e.g. `EDS` or `STATIC`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub discovery_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eds_cluster_config: Option<EdsClusterConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_assignment: Option<ClusterLoadAssignment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_socket: Option<TransportSocket>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EdsClusterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eds_config: Option<ConfigSource>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// === impl Cluster ===

impl Cluster {
    pub fn is_eds(&self) -> bool {
        self.discovery_type.as_deref() == Some("EDS")
    }
}
