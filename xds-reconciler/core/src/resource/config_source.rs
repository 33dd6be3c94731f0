use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Where the proxy fetches a dynamically referenced resource from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigSource(pub Map<String, Value>);

// === impl ConfigSource ===

impl ConfigSource {
    /// An aggregated gRPC config source served by the control plane's xDS
    /// cluster.
    pub fn ads(cluster_name: &str) -> Self {
        let mut source = Map::new();
        source.insert("resource_api_version".to_string(), json!("V3"));
        source.insert(
            "api_config_source".to_string(),
            json!({
                "api_type": "GRPC",
                "transport_api_version": "V3",
                "set_node_on_first_message_only": true,
                "grpc_services": [
                    { "envoy_grpc": { "cluster_name": cluster_name } },
                ],
            }),
        );
        Self(source)
    }
}
