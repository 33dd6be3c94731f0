use anyhow::{bail, ensure, Result};
use xds_reconciler_core::{
    resource::{Listener, RouteConfiguration},
    ResourceRef, Validate,
};

/// Structural checks on resources the data plane would otherwise reject
/// asynchronously.
#[derive(Clone, Debug, Default)]
pub struct BasicValidator(());

impl Validate for BasicValidator {
    fn validate(&self, resource: ResourceRef<'_>) -> Result<()> {
        ensure!(!resource.name().is_empty(), "name must not be empty");
        match resource {
            ResourceRef::Listener(listener) => validate_listener(listener),
            ResourceRef::Route(route) => validate_route(route),
            ResourceRef::Cluster(cluster) => {
                if let Some(assignment) = &cluster.load_assignment {
                    ensure!(
                        !assignment.cluster_name.is_empty(),
                        "load assignment must name its cluster"
                    );
                }
                Ok(())
            }
            ResourceRef::Endpoint(_) | ResourceRef::Secret(_) => Ok(()),
        }
    }
}

fn validate_listener(listener: &Listener) -> Result<()> {
    if let Some(port) = listener.port() {
        ensure!(port <= u16::MAX as u32, "invalid port {port}");
    }
    for (i, chain) in listener.filter_chains.iter().enumerate() {
        for (j, filter) in chain.filters.iter().enumerate() {
            ensure!(
                !filter.name.is_empty(),
                "filter {j} of filter chain {i} has no name"
            );
            if filter.is_terminal() && j + 1 != chain.filters.len() {
                bail!(
                    "terminal filter {} of filter chain {i} must be the last filter",
                    filter.name
                );
            }
        }
    }
    Ok(())
}

fn validate_route(route: &RouteConfiguration) -> Result<()> {
    for vhost in &route.virtual_hosts {
        ensure!(
            !vhost.domains.is_empty(),
            "virtual host {:?} must have at least one domain",
            vhost.name
        );
    }
    Ok(())
}
