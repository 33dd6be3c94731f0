use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Endpoint assignments for a single cluster, keyed by the cluster's name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterLoadAssignment {
    #[serde(default)]
    pub cluster_name: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
