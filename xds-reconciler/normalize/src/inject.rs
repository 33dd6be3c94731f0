use serde_json::Value;
use xds_reconciler_core::resource::{
    Any, HttpConnectionManager, HttpFilter, ListenerFilter, NetworkFilter, NetworkFilterConfig,
};

/// Attaches socket metadata to accepted connections.
pub const SOCKET_METADATA_FILTER: &str = "xds.filters.listener.socket_metadata";

/// Enforces network policy ahead of the terminal network filter.
pub const NETWORK_POLICY_FILTER: &str = "xds.filters.network.policy";

/// Enforces HTTP policy ahead of the router.
pub const HTTP_POLICY_FILTER: &str = "xds.filters.http.policy";

pub const HTTP_ROUTER_FILTER: &str = "envoy.filters.http.router";

const SOCKET_METADATA_TYPE_URL: &str =
    "type.googleapis.com/xds.filters.listener.v1.SocketMetadata";
const NETWORK_POLICY_TYPE_URL: &str = "type.googleapis.com/xds.filters.network.v1.NetworkPolicy";
const HTTP_POLICY_TYPE_URL: &str = "type.googleapis.com/xds.filters.http.v1.HttpPolicy";

pub(crate) fn socket_metadata_filter(
    use_original_source_address: bool,
    is_l7lb: bool,
) -> ListenerFilter {
    let config = [
        ("is_ingress", Value::Bool(false)),
        (
            "use_original_source_address",
            Value::Bool(use_original_source_address),
        ),
        ("is_l7lb", Value::Bool(is_l7lb)),
    ];
    ListenerFilter {
        name: SOCKET_METADATA_FILTER.to_string(),
        typed_config: Some(typed(SOCKET_METADATA_TYPE_URL, config)),
        ..Default::default()
    }
}

pub(crate) fn network_policy_filter() -> NetworkFilter {
    NetworkFilter {
        name: NETWORK_POLICY_FILTER.to_string(),
        typed_config: Some(NetworkFilterConfig::Other(typed(NETWORK_POLICY_TYPE_URL, []))),
        ..Default::default()
    }
}

fn http_policy_filter() -> HttpFilter {
    HttpFilter {
        name: HTTP_POLICY_FILTER.to_string(),
        typed_config: Some(typed(HTTP_POLICY_TYPE_URL, [])),
        ..Default::default()
    }
}

/// Places the HTTP policy filter immediately before the router, unless it is
/// already present. Returns true if the filter was inserted.
pub(crate) fn http_policy(hcm: &mut HttpConnectionManager) -> bool {
    if hcm.http_filters.contains(HTTP_POLICY_FILTER) {
        return false;
    }
    hcm.http_filters
        .insert_before(http_policy_filter(), |f| f.name == HTTP_ROUTER_FILTER)
}

fn typed<const N: usize>(type_url: &str, fields: [(&str, Value); N]) -> Any {
    Any {
        type_url: type_url.to_string(),
        value: fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    }
}
