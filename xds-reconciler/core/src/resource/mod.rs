//! Envoy v3 resources, decoded as far as the reconciler needs to see them.

mod cluster;
mod config_source;
mod endpoint;
mod listener;
mod network;
mod route;
mod secret;
mod tls;

pub use self::{
    cluster::{Cluster, EdsClusterConfig},
    config_source::ConfigSource,
    endpoint::ClusterLoadAssignment,
    listener::{
        AdditionalAddress, Address, FilterChain, Listener, ListenerFilter, NetworkFilter,
        SocketAddress,
    },
    network::{
        ClusterWeight, HttpConnectionManager, HttpFilter, NetworkFilterConfig, Rds,
        RouteSpecifier, TcpClusterSpecifier, TcpProxy, WeightedClusters,
        HTTP_CONNECTION_MANAGER_TYPE_URL, TCP_PROXY_TYPE_URL,
    },
    route::{
        RequestMirrorPolicy, Route, RouteAction, RouteClusterSpecifier, RouteConfiguration,
        VirtualHost,
    },
    secret::Secret,
    tls::{
        CommonTlsContext, DownstreamTlsContext, SdsSecretConfig, TransportSocket,
        TransportSocketConfig, UpstreamTlsContext, DOWNSTREAM_TLS_CONTEXT_TYPE_URL,
        UPSTREAM_TLS_CONTEXT_TYPE_URL,
    },
};
use serde::{de::DeserializeOwned, Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

pub const LISTENER_TYPE_URL: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";
pub const ROUTE_TYPE_URL: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
pub const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
pub const ENDPOINT_TYPE_URL: &str =
    "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";
pub const SECRET_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.Secret";

/// A protobuf `Any` in its JSON form: a `@type` tag alongside the message's
/// fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Any {
    #[serde(rename = "@type", default)]
    pub type_url: String,

    #[serde(flatten)]
    pub value: Map<String, Value>,
}

/// The resource types the push channel distributes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Listener,
    Route,
    Cluster,
    Endpoint,
    Secret,
}

/// Identifies a resource within a resource set. Endpoints are keyed by their
/// cluster name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Resource {
    Listener(Listener),
    Route(RouteConfiguration),
    Cluster(Cluster),
    Endpoint(ClusterLoadAssignment),
    Secret(Secret),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ResourceRef<'a> {
    Listener(&'a Listener),
    Route(&'a RouteConfiguration),
    Cluster(&'a Cluster),
    Endpoint(&'a ClusterLoadAssignment),
    Secret(&'a Secret),
}

/// Serializes a typed message as an `Any`.
#[derive(Serialize)]
pub(crate) struct Typed<'a, T> {
    #[serde(rename = "@type")]
    type_url: &'a str,

    #[serde(flatten)]
    value: &'a T,
}

impl<'a, T> Typed<'a, T> {
    pub(crate) fn new(type_url: &'a str, value: &'a T) -> Self {
        Self { type_url, value }
    }
}

// === impl Any ===

impl Any {
    pub fn pack<T: Serialize>(type_url: impl ToString, message: &T) -> serde_json::Result<Self> {
        match serde_json::to_value(message)? {
            Value::Object(value) => Ok(Self {
                type_url: type_url.to_string(),
                value,
            }),
            other => Err(serde::ser::Error::custom(format!(
                "expected an object, found {other}"
            ))),
        }
    }

    pub fn unpack<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(Value::Object(self.value.clone()))
    }
}

// === impl ResourceKind ===

impl ResourceKind {
    pub const ALL: [Self; 5] = [
        Self::Listener,
        Self::Route,
        Self::Cluster,
        Self::Endpoint,
        Self::Secret,
    ];

    pub fn type_url(self) -> &'static str {
        match self {
            Self::Listener => LISTENER_TYPE_URL,
            Self::Route => ROUTE_TYPE_URL,
            Self::Cluster => CLUSTER_TYPE_URL,
            Self::Endpoint => ENDPOINT_TYPE_URL,
            Self::Secret => SECRET_TYPE_URL,
        }
    }

    pub fn from_type_url(type_url: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_url() == type_url)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Listener => "listener",
            Self::Route => "route",
            Self::Cluster => "cluster",
            Self::Endpoint => "endpoint",
            Self::Secret => "secret",
        }
    }

    /// Decodes a message of this kind.
    pub fn decode(self, value: Value) -> serde_json::Result<Resource> {
        Ok(match self {
            Self::Listener => Resource::Listener(serde_json::from_value(value)?),
            Self::Route => Resource::Route(serde_json::from_value(value)?),
            Self::Cluster => Resource::Cluster(serde_json::from_value(value)?),
            Self::Endpoint => Resource::Endpoint(serde_json::from_value(value)?),
            Self::Secret => Resource::Secret(serde_json::from_value(value)?),
        })
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl ResourceKey ===

impl ResourceKey {
    pub fn new(kind: ResourceKind, name: impl ToString) -> Self {
        Self {
            kind,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

// === impl Resource ===

impl Resource {
    pub fn view(&self) -> ResourceRef<'_> {
        match self {
            Self::Listener(r) => ResourceRef::Listener(r),
            Self::Route(r) => ResourceRef::Route(r),
            Self::Cluster(r) => ResourceRef::Cluster(r),
            Self::Endpoint(r) => ResourceRef::Endpoint(r),
            Self::Secret(r) => ResourceRef::Secret(r),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.view().kind()
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Listener(r) => &r.name,
            Self::Route(r) => &r.name,
            Self::Cluster(r) => &r.name,
            Self::Endpoint(r) => &r.cluster_name,
            Self::Secret(r) => &r.name,
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.kind(), self.name())
    }
}

impl Serialize for Resource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.view().serialize(serializer)
    }
}

// === impl ResourceRef ===

impl<'a> ResourceRef<'a> {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Listener(_) => ResourceKind::Listener,
            Self::Route(_) => ResourceKind::Route,
            Self::Cluster(_) => ResourceKind::Cluster,
            Self::Endpoint(_) => ResourceKind::Endpoint,
            Self::Secret(_) => ResourceKind::Secret,
        }
    }

    pub fn name(&self) -> &'a str {
        match *self {
            Self::Listener(r) => &r.name,
            Self::Route(r) => &r.name,
            Self::Cluster(r) => &r.name,
            Self::Endpoint(r) => &r.cluster_name,
            Self::Secret(r) => &r.name,
        }
    }

    pub fn to_resource(&self) -> Resource {
        match *self {
            Self::Listener(r) => Resource::Listener(r.clone()),
            Self::Route(r) => Resource::Route(r.clone()),
            Self::Cluster(r) => Resource::Cluster(r.clone()),
            Self::Endpoint(r) => Resource::Endpoint(r.clone()),
            Self::Secret(r) => Resource::Secret(r.clone()),
        }
    }
}

impl Serialize for ResourceRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let type_url = self.kind().type_url();
        match *self {
            Self::Listener(value) => Typed { type_url, value }.serialize(serializer),
            Self::Route(value) => Typed { type_url, value }.serialize(serializer),
            Self::Cluster(value) => Typed { type_url, value }.serialize(serializer),
            Self::Endpoint(value) => Typed { type_url, value }.serialize(serializer),
            Self::Secret(value) => Typed { type_url, value }.serialize(serializer),
        }
    }
}
