use crate::BatchFile;
use tracing::{debug, info};
use xds_reconciler_core::{resource::Any, Context, PushChannel, Result, Scope};
use xds_reconciler_engine::Reconciler;
use xds_reconciler_normalize::{Lifecycle, Parser};

/// Applies successive batches of configuration sources, tracking the last
/// batch installed for each scope.
///
/// The raw resources of the installed batch are retained rather than the
/// parsed set, so that the old side of an update is parsed afresh with
/// release callbacks for its leases.
#[derive(Debug)]
pub struct Applier<C> {
    parser: Parser,
    reconciler: Reconciler<C>,
    installed: Vec<(Scope, Vec<Any>)>,
}

// === impl Applier ===

impl<C: PushChannel> Applier<C> {
    pub fn new(parser: Parser, reconciler: Reconciler<C>) -> Self {
        Self {
            parser,
            reconciler,
            installed: Vec::new(),
        }
    }

    pub fn reconciler(&self) -> &Reconciler<C> {
        &self.reconciler
    }

    /// Scopes with an installed batch, in the order they were first installed.
    pub fn scopes(&self) -> impl Iterator<Item = &Scope> + '_ {
        self.installed.iter().map(|(scope, _)| scope)
    }

    /// Installs the batch, or updates its scope's installed batch. On failure
    /// the scope keeps its previous batch.
    pub async fn apply(&mut self, ctx: &Context, batch: BatchFile) -> Result<()> {
        let scope = batch.scope();
        // The installed side holds its leases already, so it is parsed first
        // and a failure leaves no lease behind.
        let installed = match self.installed.iter().position(|(s, _)| *s == scope) {
            Some(idx) => {
                let resources = self.installed[idx].1.clone();
                let old = self.parser.parse(&scope, resources, Lifecycle::Removed)?;
                Some((idx, old))
            }
            None => None,
        };
        let new = self
            .parser
            .parse(&scope, batch.resources.clone(), Lifecycle::Added)?;

        match installed {
            Some((idx, old)) => {
                debug!(%scope, old = %old.summary(), new = %new.summary(), "Updating");
                self.reconciler.update(ctx, old, new).await?;
                self.installed[idx].1 = batch.resources;
            }
            None => {
                debug!(%scope, new = %new.summary(), "Installing");
                self.reconciler.install(ctx, new).await?;
                self.installed.push((scope.clone(), batch.resources));
            }
        }
        info!(%scope, "Applied batch");
        Ok(())
    }

    /// Removes the scope's installed batch. Returns false if nothing was
    /// installed for the scope.
    pub async fn uninstall(&mut self, ctx: &Context, scope: &Scope) -> Result<bool> {
        let Some(idx) = self.installed.iter().position(|(s, _)| s == scope) else {
            return Ok(false);
        };
        let old = self
            .parser
            .parse(scope, self.installed[idx].1.clone(), Lifecycle::Removed)?;
        self.reconciler.uninstall(ctx, old).await?;
        self.installed.remove(idx);
        info!(%scope, "Uninstalled batch");
        Ok(true)
    }
}
