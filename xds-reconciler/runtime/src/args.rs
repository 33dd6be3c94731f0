use crate::{
    ports::{parse_port_range, PortPool},
    Applier, BatchFile, LogFilter, LogFormat,
};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use prometheus_client::registry::Registry;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::time::Duration;
use tracing::{info, warn};
use xds_reconciler_core::{Context, ResourceSet};
use xds_reconciler_engine::{AckMode, Cache, Plan, Reconciler, ReconcilerMetrics};
use xds_reconciler_normalize::{self as normalize, Lifecycle, NormalizeOptions};

#[derive(Debug, Parser)]
#[clap(
    name = "xds-reconciler",
    about = "Reconciles batches of xDS resources with a proxy",
    version
)]
pub struct Args {
    #[clap(
        long,
        default_value = "xds_reconciler=info,warn",
        env = "XDS_RECONCILER_LOG"
    )]
    log_level: LogFilter,

    #[clap(long, default_value = "plain", env = "XDS_RECONCILER_LOG_FORMAT")]
    log_format: LogFormat,

    #[clap(flatten)]
    normalize: NormalizeArgs,

    /// Local ports leased to listeners that have no address of their own.
    #[clap(long, default_value = "10000-20000")]
    proxy_port_range: String,

    /// Bounds the time a batch waits for acknowledgments.
    #[clap(long, default_value = "30000")]
    ack_timeout_ms: u64,

    /// How the in-memory proxy acknowledges resources: `auto` accepts
    /// everything, `consistency` rejects listeners and routes that reference
    /// unknown clusters.
    #[clap(long, default_value = "consistency")]
    ack_mode: ChannelMode,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Args)]
struct NormalizeArgs {
    /// Skips validation of decoded resources.
    #[clap(long)]
    disable_validation: bool,

    /// Marks injected socket metadata as originating from an L7 load balancer.
    #[clap(long)]
    l7lb: bool,

    #[clap(long)]
    disable_original_source_address: bool,

    /// Disables `SO_REUSEPORT` on all listeners.
    #[clap(long)]
    enable_bpf_tproxy: bool,

    #[clap(long)]
    disable_ipv4: bool,

    #[clap(long)]
    enable_ipv6: bool,

    /// The cluster through which the proxy reaches this control plane.
    #[clap(long, default_value = "xds-grpc")]
    xds_cluster_name: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Prints the operations that move the proxy from one batch to another.
    Plan {
        /// The currently installed batch. Without it, the batch is installed
        /// from scratch.
        #[clap(long)]
        old: Option<PathBuf>,

        new: PathBuf,
    },

    /// Applies batches in order to an in-memory proxy and prints the
    /// resulting resources and port leases.
    Apply {
        #[clap(required = true)]
        files: Vec<PathBuf>,

        /// Uninstalls every applied batch before printing.
        #[clap(long)]
        uninstall: bool,

        /// Prints metrics in the Prometheus text format.
        #[clap(long)]
        metrics: bool,
    },
}

#[derive(Copy, Clone, Debug)]
struct ChannelMode(AckMode);

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            normalize,
            proxy_port_range,
            ack_timeout_ms,
            ack_mode: ChannelMode(ack_mode),
            command,
        } = self;

        log_format.try_init(log_level)?;

        let ports = Arc::new(PortPool::new(parse_port_range(&proxy_port_range)?));
        let parser = normalize::Parser::new(normalize.into_options(), ports.clone());

        match command {
            Command::Plan { old, new } => plan(&parser, old.as_deref(), &new),
            Command::Apply {
                files,
                uninstall,
                metrics,
            } => {
                let mut prom = <Registry>::default();
                let reconciler = Reconciler::new(
                    Cache::new(ack_mode),
                    ReconcilerMetrics::register(prom.sub_registry_with_prefix("reconciler")),
                )
                .with_ack_timeout(Duration::from_millis(ack_timeout_ms));

                let ctx = Context::new();
                tokio::spawn({
                    let ctx = ctx.clone();
                    async move {
                        if tokio::signal::ctrl_c().await.is_ok() {
                            info!("Interrupted; cancelling");
                            ctx.cancel();
                        }
                    }
                });

                let mut applier = Applier::new(parser, reconciler);
                let failed = apply(&mut applier, &ctx, &files, uninstall).await?;

                let cache = applier.reconciler().channel();
                let resources = cache.snapshot().into_values().collect::<Vec<_>>();
                let leases = ports
                    .leases()
                    .into_iter()
                    .map(|(listener, lease)| {
                        serde_json::json!({
                            "listener": listener,
                            "port": lease.port,
                            "acked": lease.acked,
                        })
                    })
                    .collect::<Vec<_>>();
                let state = serde_json::json!({
                    "version": cache.version(),
                    "resources": resources,
                    "ports": leases,
                });
                println!("{}", serde_json::to_string_pretty(&state)?);

                if metrics {
                    let mut text = String::new();
                    prometheus_client::encoding::text::encode(&mut text, &prom)?;
                    print!("{text}");
                }

                if failed > 0 {
                    bail!("{failed} of {} batches failed", files.len());
                }
                Ok(())
            }
        }
    }
}

fn plan(parser: &normalize::Parser, old: Option<&Path>, new: &Path) -> Result<()> {
    let new = BatchFile::read(new)?;
    let scope = new.scope();
    let old = match old {
        Some(path) => {
            let old = BatchFile::read(path)?;
            if old.scope() != scope {
                bail!("batches belong to different sources: {} and {scope}", old.scope());
            }
            parser.parse(&scope, old.resources, Lifecycle::Removed)?
        }
        None => ResourceSet::default(),
    };
    let new = parser.parse(&scope, new.resources, Lifecycle::Added)?;
    print!("{}", Plan::new(&old, &new));
    Ok(())
}

/// Applies each file in turn, continuing past failed batches. Returns the
/// number of failures.
async fn apply(
    applier: &mut Applier<Cache>,
    ctx: &Context,
    files: &[PathBuf],
    uninstall: bool,
) -> Result<usize> {
    let mut failed = 0;
    for path in files {
        let batch = BatchFile::read(path)?;
        if let Err(error) = applier.apply(ctx, batch).await {
            warn!(path = %path.display(), %error, "Failed to apply batch");
            failed += 1;
        }
    }

    if uninstall {
        let scopes = applier.scopes().cloned().collect::<Vec<_>>();
        for scope in scopes {
            if let Err(error) = applier.uninstall(ctx, &scope).await {
                warn!(%scope, %error, "Failed to uninstall batch");
                failed += 1;
            }
        }
    }
    Ok(failed)
}

// === impl NormalizeArgs ===

impl NormalizeArgs {
    fn into_options(self) -> NormalizeOptions {
        NormalizeOptions {
            validate: !self.disable_validation,
            is_l7lb: self.l7lb,
            use_original_source_address: !self.disable_original_source_address,
            enable_bpf_tproxy: self.enable_bpf_tproxy,
            ipv4: !self.disable_ipv4,
            ipv6: self.enable_ipv6,
            xds_cluster_name: self.xds_cluster_name,
        }
    }
}

// === impl ChannelMode ===

impl std::str::FromStr for ChannelMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Self(AckMode::Auto)),
            "consistency" => Ok(Self(AckMode::Consistency)),
            _ => bail!("invalid acknowledgment mode: {s}"),
        }
    }
}
