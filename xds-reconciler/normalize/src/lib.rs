//! Turns a batch of raw xDS resources into a canonical [`ResourceSet`].
//!
//! Parsing proceeds in stages, each of which either succeeds for the whole
//! batch or fails before anything is pushed:
//!
//! 1. [`decode`] checks type tags and names;
//! 2. [`normalize`] qualifies names and references, fills in config sources
//!    and injects the control plane's filters, after which names are checked
//!    for uniqueness once more;
//! 3. an optional [`Validate`] pass;
//! 4. [`PortBinder::bind`] leases local ports for listeners without an
//!    address.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod binder;
mod decode;
pub mod inject;
mod qualify;
mod validate;


pub use self::{
    binder::{Lifecycle, PortBinder},
    decode::{check_unique_names, decode},
    validate::BasicValidator,
};
use self::qualify::Qualifier;
use std::sync::Arc;
use tracing::{debug, warn};
use xds_reconciler_core::{
    resource::{Any, ConfigSource, NetworkFilterConfig},
    Error, PortAllocator, Qualify, ResourceRef, ResourceSet, Result, Scope, Validate,
};

#[derive(Clone, Debug)]
pub struct NormalizeOptions {
    /// Run the validator over every resource.
    pub validate: bool,

    /// Marks injected socket metadata as belonging to an L7 load balancer.
    pub is_l7lb: bool,

    pub use_original_source_address: bool,

    /// Transparent proxying is incompatible with `SO_REUSEPORT`, so it is
    /// disabled on every listener when enabled.
    pub enable_bpf_tproxy: bool,

    pub ipv4: bool,
    pub ipv6: bool,

    /// The cluster through which the data plane reaches the control plane.
    pub xds_cluster_name: String,
}

/// Runs the full parsing pipeline for batches of one configuration source.
#[derive(Clone)]
pub struct Parser {
    options: NormalizeOptions,
    binder: PortBinder,
    validator: Arc<dyn Validate>,
}

/// Normalizes `set` in place for the given scope.
///
/// Normalizing an already-normalized set leaves it unchanged.
pub fn normalize(scope: &Scope, set: &mut ResourceSet, options: &NormalizeOptions) {
    let xds = ConfigSource::ads(&options.xds_cluster_name);
    let qualifier = Qualifier { scope, xds: &xds };

    for listener in &mut set.listeners {
        if options.enable_bpf_tproxy {
            listener.enable_reuse_port = Some(false);
        }

        let has_metadata = listener
            .listener_filters
            .contains(inject::SOCKET_METADATA_FILTER);
        if !listener.is_internal() && !has_metadata {
            listener.listener_filters.push(inject::socket_metadata_filter(
                options.use_original_source_address,
                options.is_l7lb,
            ));
        }

        let inject_policy = listener.needs_local_address();
        for chain in &mut listener.filter_chains {
            qualifier.transport_socket(chain.transport_socket.as_mut());

            // Only the first terminal filter of a chain is ever consulted.
            let Some(terminal) = chain.filters.iter_mut().find(|f| f.is_terminal()) else {
                continue;
            };
            match terminal.typed_config.as_mut() {
                Some(NetworkFilterConfig::HttpConnectionManager(hcm)) => {
                    qualifier.http_connection_manager(hcm);
                    if inject_policy {
                        inject::http_policy(hcm);
                    }
                }
                Some(NetworkFilterConfig::TcpProxy(tcp)) => qualifier.tcp_proxy(tcp),
                Some(NetworkFilterConfig::Other(_)) | None => {}
            }

            if inject_policy && !chain.filters.contains(inject::NETWORK_POLICY_FILTER) {
                chain
                    .filters
                    .insert_before(inject::network_policy_filter(), |f| f.is_terminal());
            }
        }

        scope.qualify(&mut listener.name, Qualify::Force);
    }

    for route in &mut set.routes {
        qualifier.route_configuration(route);
    }
    for cluster in &mut set.clusters {
        qualifier.cluster(cluster);
    }
    for endpoints in &mut set.endpoints {
        qualifier.endpoints(endpoints);
    }
    for secret in &mut set.secrets {
        qualifier.secret(secret);
    }
}

/// Validates every resource in the set, reporting the first failure with the
/// offending resource's content.
pub fn validate(validator: &dyn Validate, set: &ResourceSet) -> Result<()> {
    set.iter().try_for_each(|resource| validate_one(validator, resource))
}

fn validate_one(validator: &dyn Validate, resource: ResourceRef<'_>) -> Result<()> {
    validator.validate(resource).map_err(|error| Error::Validation {
        kind: resource.kind(),
        name: resource.name().to_string(),
        reason: format!("{error:#}"),
        content: serde_json::to_string(&resource).unwrap_or_default(),
    })
}

// === impl NormalizeOptions ===

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            validate: true,
            is_l7lb: false,
            use_original_source_address: true,
            enable_bpf_tproxy: false,
            ipv4: true,
            ipv6: false,
            xds_cluster_name: "xds-grpc".to_string(),
        }
    }
}

// === impl Parser ===

impl Parser {
    pub fn new(options: NormalizeOptions, allocator: Arc<dyn PortAllocator>) -> Self {
        Self {
            binder: PortBinder::new(allocator, &options),
            validator: Arc::new(BasicValidator::default()),
            options,
        }
    }

    pub fn with_validator(self, validator: Arc<dyn Validate>) -> Self {
        Self { validator, ..self }
    }

    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    /// Decodes, normalizes, validates and binds one batch.
    pub fn parse(
        &self,
        scope: &Scope,
        resources: impl IntoIterator<Item = Any>,
        lifecycle: Lifecycle,
    ) -> Result<ResourceSet> {
        let mut set = decode(resources)?;
        normalize(scope, &mut set, &self.options);
        check_unique_names(&set)?;
        if self.options.validate {
            validate(&*self.validator, &set)?;
        }

        self.binder.bind(&mut set, lifecycle)?;
        if self.options.validate {
            let res = set
                .listeners
                .iter()
                .try_for_each(|l| validate_one(&*self.validator, ResourceRef::Listener(l)));
            if let Err(error) = res {
                for (listener, callback) in set.take_port_callbacks() {
                    if let Err(error) = callback.abort() {
                        let error = format!("{error:#}");
                        warn!(%listener, %error, "Failed to release lease");
                    }
                }
                return Err(error);
            }
        }

        debug!(%scope, ?lifecycle, resources = %set.summary(), "Parsed batch");
        Ok(set)
    }
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("options", &self.options)
            .field("binder", &self.binder)
            .finish_non_exhaustive()
    }
}
