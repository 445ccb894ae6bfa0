//! Node wiring: bus + logbook + dscache, composed resolvers.

use std::path::PathBuf;
use std::sync::Arc;

use quarry_core::crypto::Keypair;
use quarry_core::event::MemBus;
use quarry_core::resolve::{Resolver, SequentialResolver};
use quarry_dscache::Dscache;
use quarry_logbook::{Clock, Logbook, LogbookError, LogbookOptions};

/// Construction options for a node.
#[derive(Default)]
pub struct NodeOptions {
    /// Repo directory holding `logbook.qfb` and `dscache.qfb`. `None`
    /// keeps everything in memory.
    pub dir: Option<PathBuf>,
    /// Allow a name-init event to create the dscache from nothing.
    pub cache_create_enabled: bool,
    /// Seed for the logbook's init-nonce RNG.
    pub nonce_seed: Option<u64>,
    /// Clock override.
    pub clock: Option<Clock>,
}

/// One running node: the authoritative logbook, the derived cache, and
/// the bus tying them together.
pub struct Node {
    pub bus: Arc<MemBus>,
    pub book: Arc<Logbook>,
    pub cache: Arc<Dscache>,
}

impl Node {
    /// Open a node, subscribing the cache to logbook events.
    pub fn open(
        keypair: Keypair,
        username: &str,
        options: NodeOptions,
    ) -> Result<Self, LogbookError> {
        let bus = Arc::new(MemBus::new());

        let book = Arc::new(Logbook::open(
            keypair,
            username,
            bus.clone(),
            LogbookOptions {
                path: options.dir.as_ref().map(|d| d.join("logbook.qfb")),
                nonce_seed: options.nonce_seed,
                clock: options.clock,
            },
        )?);

        let cache = Arc::new(Dscache::open(
            options.dir.as_ref().map(|d| d.join("dscache.qfb")),
            options.cache_create_enabled,
        ));
        cache.subscribe(bus.as_ref());

        Ok(Self { bus, book, cache })
    }

    /// The canonical local composition: dscache fast path, then the
    /// authoritative logbook.
    pub fn local_resolver(&self) -> SequentialResolver {
        SequentialResolver::new(vec![
            Some(self.cache.clone() as Arc<dyn Resolver>),
            Some(self.book.clone() as Arc<dyn Resolver>),
        ])
    }

    /// The composition for a network query: logbook first, then
    /// whatever remote resolvers the caller supplies (absent ones stay
    /// `None`).
    pub fn network_resolver(
        &self,
        remotes: Vec<Option<Arc<dyn Resolver>>>,
    ) -> SequentialResolver {
        let mut resolvers: Vec<Option<Arc<dyn Resolver>>> =
            vec![Some(self.book.clone() as Arc<dyn Resolver>)];
        resolvers.extend(remotes);
        SequentialResolver::new(resolvers)
    }

    /// Re-derive the cache from a full logbook scan. The recovery path
    /// for a stale or missing cache file; cache failures are logged, the
    /// logbook stays authoritative.
    pub async fn rebuild_cache(&self) -> Result<(), LogbookError> {
        let infos = self.book.list_refs(None, -1, 0).await?;
        if let Err(e) = self.cache.rebuild(&infos) {
            tracing::warn!(error = %e, "dscache rebuild failed");
        }
        Ok(())
    }
}
