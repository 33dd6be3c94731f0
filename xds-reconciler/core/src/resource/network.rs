use super::{Any, ConfigSource, RouteConfiguration, Typed};
use crate::{NamedFilter, OrderedFilters};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

pub const HTTP_CONNECTION_MANAGER_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";
pub const TCP_PROXY_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.tcp_proxy.v3.TcpProxy";

/// The configuration of a network filter. The two terminal filters the
/// reconciler rewrites are decoded; all others are carried through untouched.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "Any")]
pub enum NetworkFilterConfig {
    HttpConnectionManager(Box<HttpConnectionManager>),
    TcpProxy(TcpProxy),
    Other(Any),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpConnectionManager {
    #[serde(flatten)]
    pub route_specifier: Option<RouteSpecifier>,

    #[serde(default, skip_serializing_if = "OrderedFilters::is_empty")]
    pub http_filters: OrderedFilters<HttpFilter>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// How an HTTP connection manager obtains its routes. Scoped routes are not
/// rewritten and remain in the manager's `extra` fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSpecifier {
    Rds(Rds),
    RouteConfig(RouteConfiguration),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rds {
    #[serde(default)]
    pub route_config_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_source: Option<ConfigSource>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpFilter {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typed_config: Option<Any>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TcpProxy {
    #[serde(flatten)]
    pub cluster_specifier: Option<TcpClusterSpecifier>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TcpClusterSpecifier {
    Cluster(String),
    WeightedClusters(WeightedClusters),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightedClusters {
    #[serde(default)]
    pub clusters: Vec<ClusterWeight>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterWeight {
    #[serde(default)]
    pub name: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// === impl NetworkFilterConfig ===

impl NetworkFilterConfig {
    /// Terminal filters end a filter chain; the chain's remaining filters are
    /// never consulted after one of them.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl TryFrom<Any> for NetworkFilterConfig {
    type Error = serde_json::Error;

    fn try_from(any: Any) -> Result<Self, Self::Error> {
        match any.type_url.as_str() {
            HTTP_CONNECTION_MANAGER_TYPE_URL => any
                .unpack()
                .map(|hcm| Self::HttpConnectionManager(Box::new(hcm))),
            TCP_PROXY_TYPE_URL => any.unpack().map(Self::TcpProxy),
            _ => Ok(Self::Other(any)),
        }
    }
}

impl Serialize for NetworkFilterConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::HttpConnectionManager(hcm) => {
                Typed::new(HTTP_CONNECTION_MANAGER_TYPE_URL, &**hcm).serialize(serializer)
            }
            Self::TcpProxy(tcp) => Typed::new(TCP_PROXY_TYPE_URL, tcp).serialize(serializer),
            Self::Other(any) => any.serialize(serializer),
        }
    }
}

// === impl HttpFilter ===

impl NamedFilter for HttpFilter {
    fn name(&self) -> &str {
        &self.name
    }
}

// === impl TcpProxy ===

impl TcpProxy {
    pub fn cluster_refs(&self) -> Vec<&str> {
        match &self.cluster_specifier {
            Some(TcpClusterSpecifier::Cluster(name)) => vec![name.as_str()],
            Some(TcpClusterSpecifier::WeightedClusters(wc)) => {
                wc.clusters.iter().map(|c| c.name.as_str()).collect()
            }
            None => vec![],
        }
    }
}
