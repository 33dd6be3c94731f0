use xds_reconciler_core::{
    resource::{
        Cluster, ClusterLoadAssignment, CommonTlsContext, ConfigSource, HttpConnectionManager,
        RouteClusterSpecifier, RouteConfiguration, RouteSpecifier, SdsSecretConfig, Secret,
        TcpClusterSpecifier, TcpProxy, TransportSocket,
    },
    Qualify, Scope,
};

/// Qualifies the names of resources and their references to one another, and
/// fills in missing xDS config sources with the control plane's.
pub(crate) struct Qualifier<'a> {
    pub(crate) scope: &'a Scope,
    pub(crate) xds: &'a ConfigSource,
}

impl Qualifier<'_> {
    pub(crate) fn route_configuration(&self, route: &mut RouteConfiguration) {
        self.scope.qualify(&mut route.name, Qualify::Force);
        for vhost in &mut route.virtual_hosts {
            self.scope.qualify(&mut vhost.name, Qualify::Force);
        }
        for action in route.actions_mut() {
            match &mut action.cluster_specifier {
                Some(RouteClusterSpecifier::Cluster(cluster)) => {
                    self.scope.qualify(cluster, Qualify::IfUnscoped);
                }
                Some(RouteClusterSpecifier::WeightedClusters(weighted)) => {
                    for cluster in &mut weighted.clusters {
                        self.scope.qualify(&mut cluster.name, Qualify::IfUnscoped);
                    }
                }
                Some(RouteClusterSpecifier::ClusterHeader(_)) | None => {}
            }
            for mirror in &mut action.request_mirror_policies {
                self.scope.qualify(&mut mirror.cluster, Qualify::IfUnscoped);
            }
        }
    }

    pub(crate) fn tcp_proxy(&self, tcp: &mut TcpProxy) {
        match &mut tcp.cluster_specifier {
            Some(TcpClusterSpecifier::Cluster(cluster)) => {
                self.scope.qualify(cluster, Qualify::IfUnscoped);
            }
            Some(TcpClusterSpecifier::WeightedClusters(weighted)) => {
                for cluster in &mut weighted.clusters {
                    self.scope.qualify(&mut cluster.name, Qualify::IfUnscoped);
                }
            }
            None => {}
        }
    }

    pub(crate) fn http_connection_manager(&self, hcm: &mut HttpConnectionManager) {
        match &mut hcm.route_specifier {
            Some(RouteSpecifier::Rds(rds)) => {
                self.scope
                    .qualify(&mut rds.route_config_name, Qualify::Force);
                rds.config_source.get_or_insert_with(|| self.xds.clone());
            }
            Some(RouteSpecifier::RouteConfig(route)) => self.route_configuration(route),
            None => {}
        }
    }

    pub(crate) fn transport_socket(&self, socket: Option<&mut TransportSocket>) {
        let tls = socket
            .and_then(|ts| ts.typed_config.as_mut())
            .and_then(|config| config.common_tls_context_mut());
        if let Some(tls) = tls {
            self.tls_context(tls);
        }
    }

    fn tls_context(&self, tls: &mut CommonTlsContext) {
        for sds in &mut tls.tls_certificate_sds_secret_configs {
            self.sds_secret(sds);
        }
        if let Some(sds) = tls.validation_context_sds_secret_config.as_mut() {
            self.sds_secret(sds);
        }
    }

    fn sds_secret(&self, sds: &mut SdsSecretConfig) {
        sds.sds_config.get_or_insert_with(|| self.xds.clone());
        self.scope.qualify(&mut sds.name, Qualify::IfUnscoped);
    }

    pub(crate) fn cluster(&self, cluster: &mut Cluster) {
        self.transport_socket(cluster.transport_socket.as_mut());
        if cluster.is_eds() {
            cluster
                .eds_cluster_config
                .get_or_insert_with(Default::default)
                .eds_config
                .get_or_insert_with(|| self.xds.clone());
        }
        if let Some(assignment) = cluster.load_assignment.as_mut() {
            self.scope
                .qualify(&mut assignment.cluster_name, Qualify::IfUnscoped);
        }
        self.scope.qualify(&mut cluster.name, Qualify::IfUnscoped);
    }

    pub(crate) fn endpoints(&self, endpoints: &mut ClusterLoadAssignment) {
        self.scope
            .qualify(&mut endpoints.cluster_name, Qualify::IfUnscoped);
    }

    pub(crate) fn secret(&self, secret: &mut Secret) {
        self.scope.qualify(&mut secret.name, Qualify::IfUnscoped);
    }
}
