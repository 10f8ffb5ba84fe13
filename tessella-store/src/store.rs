//! The public store facade.
//!
//! [`Store`] wraps a KV database handle, the key schema for one root
//! prefix, and the shared URI⇄ID cache. Every public operation runs as
//! exactly one retryable KV transaction; mutations are idempotent, queries
//! stream lazily over snapshot reads.

use futures::stream::BoxStream;
use futures::TryStreamExt;
use std::sync::Arc;
use tessella_core::{IdTriple, KeySpace, Result, Triple, TriplePattern, UriId};
use tessella_kv::{run, KvDatabase, DEFAULT_RETRY_ATTEMPTS};

use crate::dictionary::{Dictionary, InternSession};
use crate::index_set::IndexSet;
use crate::query;

/// Tunables for a store instance. The defaults follow the substrate's
/// transaction budget guidelines.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Triples per transaction in [`Store::insert_batch`]. Must keep a
    /// chunk's mutations under the substrate's per-transaction payload
    /// ceiling.
    pub batch_size: usize,
    /// Bound on automatic retries for each public operation.
    pub max_retry_attempts: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            batch_size: 1_000,
            max_retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

/// A triple store over an ordered transactional KV substrate.
///
/// Cloning is cheap and clones share the database handle and the URI⇄ID
/// cache, so a store can be handed to many concurrent tasks.
#[derive(Debug)]
pub struct Store<D: KvDatabase> {
    db: Arc<D>,
    keys: Arc<KeySpace>,
    dict: Arc<Dictionary>,
    indexes: IndexSet,
    opts: StoreOptions,
}

impl<D: KvDatabase> Clone for Store<D> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            keys: Arc::clone(&self.keys),
            dict: Arc::clone(&self.dict),
            indexes: self.indexes.clone(),
            opts: self.opts.clone(),
        }
    }
}

impl<D: KvDatabase> Store<D> {
    /// Open a store under `root_prefix` with default options.
    ///
    /// The root prefix isolates this store's keys from anything else in
    /// the same KV namespace; stores sharing a prefix share their data.
    pub fn new(db: D, root_prefix: impl Into<Vec<u8>>) -> Self {
        Self::with_options(db, root_prefix, StoreOptions::default())
    }

    /// Open a store with explicit options.
    pub fn with_options(db: D, root_prefix: impl Into<Vec<u8>>, opts: StoreOptions) -> Self {
        let keys = Arc::new(KeySpace::new(root_prefix));
        Self {
            db: Arc::new(db),
            dict: Arc::new(Dictionary::new(Arc::clone(&keys))),
            indexes: IndexSet::new(Arc::clone(&keys)),
            keys,
            opts,
        }
    }

    /// Insert a triple. Re-inserting a present triple is a no-op.
    pub async fn insert(&self, triple: &Triple) -> Result<()> {
        triple.validate()?;
        let (inserted, fresh) = run(&*self.db, self.opts.max_retry_attempts, |tx| async move {
            let mut session = InternSession::new(&self.dict);
            let s = session.intern(&tx, &triple.s).await?;
            let p = session.intern(&tx, &triple.p).await?;
            let o = session.intern(&tx, &triple.o).await?;
            let inserted = self.indexes.insert(&tx, IdTriple::new(s, p, o)).await?;
            Ok((inserted, session.into_fresh()))
        })
        .await?;
        self.dict.publish(fresh);
        tracing::debug!(inserted, %triple, "insert");
        Ok(())
    }

    /// Insert a batch of triples, chunked so each transaction stays within
    /// the substrate's payload and time budgets. Duplicates within and
    /// across chunks are no-ops.
    pub async fn insert_batch(&self, triples: &[Triple]) -> Result<()> {
        for triple in triples {
            triple.validate()?;
        }
        let chunk_size = self.opts.batch_size.max(1);
        for chunk in triples.chunks(chunk_size) {
            let (added, fresh) =
                run(&*self.db, self.opts.max_retry_attempts, |tx| async move {
                    let mut session = InternSession::new(&self.dict);
                    let mut added = 0u64;
                    for triple in chunk {
                        let s = session.intern(&tx, &triple.s).await?;
                        let p = session.intern(&tx, &triple.p).await?;
                        let o = session.intern(&tx, &triple.o).await?;
                        if self.indexes.insert(&tx, IdTriple::new(s, p, o)).await? {
                            added += 1;
                        }
                    }
                    Ok((added, session.into_fresh()))
                })
                .await?;
            self.dict.publish(fresh);
            tracing::debug!(chunk = chunk.len(), added, "insert_batch chunk committed");
        }
        Ok(())
    }

    /// Delete a triple. Deleting an absent triple is a no-op; URIs the
    /// store has never seen are not interned by deletion.
    pub async fn delete(&self, triple: &Triple) -> Result<()> {
        triple.validate()?;
        let deleted = run(&*self.db, self.opts.max_retry_attempts, |tx| async move {
            let resolved = (
                self.dict.lookup_id(&tx, &triple.s, true).await?,
                self.dict.lookup_id(&tx, &triple.p, true).await?,
                self.dict.lookup_id(&tx, &triple.o, true).await?,
            );
            let (Some(s), Some(p), Some(o)) = resolved else {
                return Ok(false);
            };
            self.indexes.delete(&tx, IdTriple::new(s, p, o)).await
        })
        .await?;
        tracing::debug!(deleted, %triple, "delete");
        Ok(())
    }

    /// Whether the triple is currently in the store, by a snapshot point
    /// read of its SPO key.
    pub async fn contains(&self, triple: &Triple) -> Result<bool> {
        triple.validate()?;
        run(&*self.db, self.opts.max_retry_attempts, |tx| async move {
            let resolved = (
                self.dict.lookup_id(&tx, &triple.s, true).await?,
                self.dict.lookup_id(&tx, &triple.p, true).await?,
                self.dict.lookup_id(&tx, &triple.o, true).await?,
            );
            let (Some(s), Some(p), Some(o)) = resolved else {
                return Ok(false);
            };
            self.indexes.contains(&tx, IdTriple::new(s, p, o), true).await
        })
        .await
    }

    /// Number of distinct triples currently in the store.
    pub async fn count(&self) -> Result<u64> {
        run(&*self.db, self.opts.max_retry_attempts, |tx| async move {
            self.indexes.count(&tx).await
        })
        .await
    }

    /// Stream all triples matching a pattern, in the key order of the
    /// chosen index. Unknown bound URIs yield an empty stream and are not
    /// interned.
    pub async fn query(
        &self,
        pattern: &TriplePattern,
    ) -> Result<BoxStream<'static, Result<Triple>>> {
        query::pattern_stream(
            &*self.db,
            Arc::clone(&self.keys),
            Arc::clone(&self.dict),
            pattern,
        )
        .await
    }

    /// Convenience: run a pattern query and collect the results.
    pub async fn query_collect(&self, pattern: &TriplePattern) -> Result<Vec<Triple>> {
        self.query(pattern).await?.try_collect().await
    }

    /// The dictionary ID of a URI, if it has ever been interned.
    pub async fn lookup_id(&self, uri: &str) -> Result<Option<UriId>> {
        let tx = self.db.create_transaction().await?;
        self.dict.lookup_id(&tx, uri, true).await
    }

    /// The URI interned under an ID, if any.
    pub async fn lookup_uri(&self, id: UriId) -> Result<Option<String>> {
        let tx = self.db.create_transaction().await?;
        match self.dict.lookup_uri(&tx, id, true).await {
            Ok(uri) => Ok(Some(uri.to_string())),
            Err(tessella_core::Error::DanglingId(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The root prefix this store was opened with.
    pub fn root_prefix(&self) -> &[u8] {
        self.keys.root()
    }
}
