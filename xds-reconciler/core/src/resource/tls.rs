use super::{Any, ConfigSource, Typed};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

pub const DOWNSTREAM_TLS_CONTEXT_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.DownstreamTlsContext";
pub const UPSTREAM_TLS_CONTEXT_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.UpstreamTlsContext";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportSocket {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typed_config: Option<TransportSocketConfig>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The transport socket variants whose secret references are rewritten.
/// Any other transport socket is carried through untouched.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "Any")]
pub enum TransportSocketConfig {
    Downstream(DownstreamTlsContext),
    Upstream(UpstreamTlsContext),
    Other(Any),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DownstreamTlsContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_tls_context: Option<CommonTlsContext>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamTlsContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_tls_context: Option<CommonTlsContext>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommonTlsContext {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tls_certificate_sds_secret_configs: Vec<SdsSecretConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_context_sds_secret_config: Option<SdsSecretConfig>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A reference to a secret served over SDS.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SdsSecretConfig {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sds_config: Option<ConfigSource>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// === impl TransportSocketConfig ===

impl TransportSocketConfig {
    pub fn common_tls_context_mut(&mut self) -> Option<&mut CommonTlsContext> {
        match self {
            Self::Downstream(tls) => tls.common_tls_context.as_mut(),
            Self::Upstream(tls) => tls.common_tls_context.as_mut(),
            Self::Other(_) => None,
        }
    }
}

impl TryFrom<Any> for TransportSocketConfig {
    type Error = serde_json::Error;

    fn try_from(any: Any) -> Result<Self, Self::Error> {
        match any.type_url.as_str() {
            DOWNSTREAM_TLS_CONTEXT_TYPE_URL => any.unpack().map(Self::Downstream),
            UPSTREAM_TLS_CONTEXT_TYPE_URL => any.unpack().map(Self::Upstream),
            _ => Ok(Self::Other(any)),
        }
    }
}

impl Serialize for TransportSocketConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Downstream(tls) => {
                Typed::new(DOWNSTREAM_TLS_CONTEXT_TYPE_URL, tls).serialize(serializer)
            }
            Self::Upstream(tls) => {
                Typed::new(UPSTREAM_TLS_CONTEXT_TYPE_URL, tls).serialize(serializer)
            }
            Self::Other(any) => any.serialize(serializer),
        }
    }
}
