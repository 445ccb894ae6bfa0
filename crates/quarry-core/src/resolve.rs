//! Reference resolution: the contract and the sequential combinator.
//!
//! A resolver fills in the missing fields of a [`Ref`]. Resolvers chain:
//! the dscache answers fast, the logbook answers authoritatively, remote
//! sources answer for datasets this node has never seen. The
//! [`SequentialResolver`] is the only way the system expresses that
//! precedence.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::dsref::Ref;

/// Errors surfaced while resolving a reference.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No live dataset matches the reference. Resolvers use this to
    /// chain; every other error short-circuits.
    #[error("reference not found")]
    NotFound,

    /// The reference itself is malformed (caller bug, never retried).
    #[error("invalid reference: {0}")]
    InvalidRef(String),

    /// Anything else: transport failures, corrupt state, cancellation.
    #[error("{0}")]
    Other(String),
}

impl ResolveError {
    /// Whether the next resolver in a chain should be consulted.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolveError::NotFound)
    }
}

/// Anything that can complete a dataset reference.
///
/// On success the resolver mutates `r` in place and returns a source
/// hint: an empty string normally, or a source tag (e.g. `"network"`)
/// when the resolver believes a fresher head may exist elsewhere.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve_ref(&self, r: &mut Ref) -> Result<String, ResolveError>;
}

/// Tries each resolver in order, returning the first answer.
///
/// Positions may be `None`: optional resolvers (dscache, network) are
/// absent in minimal deployments, and a missing resolver must never be
/// dereferenced. [`ResolveError::NotFound`] moves on to the next
/// position; any other error stops the chain.
pub struct SequentialResolver {
    resolvers: Vec<Option<Arc<dyn Resolver>>>,
}

impl SequentialResolver {
    /// Compose resolvers in precedence order.
    pub fn new(resolvers: Vec<Option<Arc<dyn Resolver>>>) -> Self {
        Self { resolvers }
    }
}

#[async_trait]
impl Resolver for SequentialResolver {
    async fn resolve_ref(&self, r: &mut Ref) -> Result<String, ResolveError> {
        for resolver in self.resolvers.iter().flatten() {
            match resolver.resolve_ref(r).await {
                Ok(hint) => return Ok(hint),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ResolveError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Hit {
        init_id: &'static str,
        hint: &'static str,
    }

    #[async_trait]
    impl Resolver for Hit {
        async fn resolve_ref(&self, r: &mut Ref) -> Result<String, ResolveError> {
            r.init_id = self.init_id.to_string();
            Ok(self.hint.to_string())
        }
    }

    struct Miss;

    #[async_trait]
    impl Resolver for Miss {
        async fn resolve_ref(&self, _r: &mut Ref) -> Result<String, ResolveError> {
            Err(ResolveError::NotFound)
        }
    }

    struct Broken;

    #[async_trait]
    impl Resolver for Broken {
        async fn resolve_ref(&self, _r: &mut Ref) -> Result<String, ResolveError> {
            Err(ResolveError::Other("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_first_hit_wins() {
        let seq = SequentialResolver::new(vec![
            Some(Arc::new(Miss) as Arc<dyn Resolver>),
            Some(Arc::new(Hit {
                init_id: "id-second",
                hint: "",
            })),
            Some(Arc::new(Hit {
                init_id: "id-third",
                hint: "",
            })),
        ]);

        let mut r = Ref::from_human("alice", "world_bank");
        seq.resolve_ref(&mut r).await.unwrap();
        assert_eq!(r.init_id, "id-second");
    }

    #[tokio::test]
    async fn test_nil_positions_are_skipped() {
        let seq = SequentialResolver::new(vec![
            None,
            None,
            Some(Arc::new(Hit {
                init_id: "id1",
                hint: "network",
            })),
        ]);

        let mut r = Ref::from_human("alice", "world_bank");
        let hint = seq.resolve_ref(&mut r).await.unwrap();
        assert_eq!(hint, "network");
        assert_eq!(r.init_id, "id1");
    }

    #[tokio::test]
    async fn test_all_miss_is_not_found() {
        let seq = SequentialResolver::new(vec![None, Some(Arc::new(Miss) as Arc<dyn Resolver>)]);
        let mut r = Ref::from_human("alice", "nope");
        let err = seq.resolve_ref(&mut r).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_empty_chain_is_not_found() {
        let seq = SequentialResolver::new(vec![]);
        let mut r = Ref::from_human("alice", "nope");
        assert!(seq.resolve_ref(&mut r).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_hard_error_short_circuits() {
        let seq = SequentialResolver::new(vec![
            Some(Arc::new(Broken) as Arc<dyn Resolver>),
            Some(Arc::new(Hit {
                init_id: "id1",
                hint: "",
            })),
        ]);

        let mut r = Ref::from_human("alice", "world_bank");
        let err = seq.resolve_ref(&mut r).await.unwrap_err();
        assert!(!err.is_not_found());
        assert!(r.init_id.is_empty());
    }
}
