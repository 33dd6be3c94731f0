use super::{Any, NetworkFilterConfig, TransportSocket};
use crate::{NamedFilter, OrderedFilters};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::IpAddr;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Listener {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_addresses: Vec<AdditionalAddress>,

    #[serde(default, skip_serializing_if = "OrderedFilters::is_empty")]
    pub listener_filters: OrderedFilters<ListenerFilter>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter_chains: Vec<FilterChain>,

    /// Set on listeners that only accept connections from within the proxy
    /// process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_listener: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_reuse_port: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_address: Option<SocketAddress>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SocketAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub port_value: u32,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdditionalAddress {
    pub address: Address,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListenerFilter {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typed_config: Option<Any>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterChain {
    #[serde(default, skip_serializing_if = "OrderedFilters::is_empty")]
    pub filters: OrderedFilters<NetworkFilter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_socket: Option<TransportSocket>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkFilter {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typed_config: Option<NetworkFilterConfig>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// === impl Listener ===

impl Listener {
    pub fn is_internal(&self) -> bool {
        self.internal_listener.is_some()
    }

    /// Listeners without an explicit address are bound to a local port leased
    /// by the control plane, and traffic is redirected to them transparently.
    pub fn needs_local_address(&self) -> bool {
        self.address.is_none() && !self.is_internal()
    }

    /// The port of the listener's socket address, if it has one.
    pub fn port(&self) -> Option<u32> {
        self.address
            .as_ref()
            .and_then(|a| a.socket_address.as_ref())
            .map(|sa| sa.port_value)
    }

    /// Iterates over the names of all clusters referenced by TCP proxies and
    /// inline route configurations in this listener's filter chains.
    pub fn cluster_refs(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        for filter in self.filter_chains.iter().flat_map(|fc| fc.filters.iter()) {
            match &filter.typed_config {
                Some(NetworkFilterConfig::TcpProxy(tcp)) => refs.extend(tcp.cluster_refs()),
                Some(NetworkFilterConfig::HttpConnectionManager(hcm)) => {
                    if let Some(super::RouteSpecifier::RouteConfig(rc)) = &hcm.route_specifier {
                        refs.extend(rc.cluster_refs());
                    }
                }
                _ => {}
            }
        }
        refs
    }
}

// === impl Address ===

impl Address {
    pub fn tcp(ip: IpAddr, port: u16) -> Self {
        Self {
            socket_address: Some(SocketAddress {
                protocol: Some("TCP".to_string()),
                address: ip.to_string(),
                port_value: port.into(),
                extra: Map::new(),
            }),
            extra: Map::new(),
        }
    }
}

// === impl ListenerFilter ===

impl NamedFilter for ListenerFilter {
    fn name(&self) -> &str {
        &self.name
    }
}

// === impl NetworkFilter ===

impl NamedFilter for NetworkFilter {
    fn name(&self) -> &str {
        &self.name
    }
}

impl NetworkFilter {
    pub fn is_terminal(&self) -> bool {
        self.typed_config
            .as_ref()
            .is_some_and(NetworkFilterConfig::is_terminal)
    }
}
