use super::WeightedClusters;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteConfiguration {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub virtual_hosts: Vec<VirtualHost>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualHost {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single route. Only forwarding actions reference clusters; redirects and
/// direct responses are carried in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteAction>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteAction {
    #[serde(flatten)]
    pub cluster_specifier: Option<RouteClusterSpecifier>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub request_mirror_policies: Vec<RequestMirrorPolicy>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Selects the upstream cluster of a route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteClusterSpecifier {
    Cluster(String),
    WeightedClusters(WeightedClusters),
    /// The cluster is read from a request header at runtime and cannot be
    /// qualified ahead of time.
    ClusterHeader(String),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMirrorPolicy {
    #[serde(default)]
    pub cluster: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// === impl RouteConfiguration ===

impl RouteConfiguration {
    /// Iterates over the forwarding actions of all routes.
    pub fn actions_mut(&mut self) -> impl Iterator<Item = &mut RouteAction> + '_ {
        self.virtual_hosts
            .iter_mut()
            .flat_map(|vh| vh.routes.iter_mut())
            .filter_map(|rt| rt.route.as_mut())
    }

    /// Iterates over the names of all clusters referenced by this route
    /// configuration.
    pub fn cluster_refs(&self) -> impl Iterator<Item = &str> + '_ {
        self.virtual_hosts
            .iter()
            .flat_map(|vh| vh.routes.iter())
            .filter_map(|rt| rt.route.as_ref())
            .flat_map(RouteAction::cluster_refs)
    }
}

// === impl RouteAction ===

impl RouteAction {
    pub fn cluster_refs(&self) -> Vec<&str> {
        let mut refs = match &self.cluster_specifier {
            Some(RouteClusterSpecifier::Cluster(name)) => vec![name.as_str()],
            Some(RouteClusterSpecifier::WeightedClusters(wc)) => {
                wc.clusters.iter().map(|c| c.name.as_str()).collect()
            }
            Some(RouteClusterSpecifier::ClusterHeader(_)) | None => vec![],
        };
        refs.extend(
            self.request_mirror_policies
                .iter()
                .filter(|m| !m.cluster.is_empty())
                .map(|m| m.cluster.as_str()),
        );
        refs
    }
}
