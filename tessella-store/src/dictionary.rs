//! URI dictionary: interning and bidirectional lookup.
//!
//! URIs are interned to dense [`UriId`]s allocated from a monotone counter
//! key. Both directions are persisted (`u2i` and `i2u`), and a shared
//! in-process cache short-circuits repeated lookups.
//!
//! ## Cache discipline
//!
//! The shared cache holds only *committed* mappings. Transactional intern
//! work goes through an [`InternSession`], which keeps a per-attempt
//! scratch map and hands its newly observed mappings back to the caller as
//! a batch to publish after the commit succeeds. A retried attempt starts
//! with an empty scratch, so a retry can never trust a mapping the KV
//! store has not materialized.

use hashbrown::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tessella_core::{Error, KeySpace, Result, UriId};
use tessella_kv::KvTransaction;

/// Shared bidirectional URI⇄ID cache plus the dictionary key schema.
///
/// The two cache directions share each `Arc<str>` allocation.
#[derive(Debug)]
pub struct Dictionary {
    keys: Arc<KeySpace>,
    cache: RwLock<BiCache>,
}

#[derive(Debug, Default)]
struct BiCache {
    by_uri: HashMap<Arc<str>, UriId>,
    by_id: HashMap<UriId, Arc<str>>,
}

impl Dictionary {
    pub fn new(keys: Arc<KeySpace>) -> Self {
        Self {
            keys,
            cache: RwLock::new(BiCache::default()),
        }
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, BiCache> {
        self.cache.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, BiCache> {
        self.cache.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached ID for a URI, if the mapping has been seen committed.
    pub fn cached_id(&self, uri: &str) -> Option<UriId> {
        self.read_cache().by_uri.get(uri).copied()
    }

    /// Cached URI for an ID.
    pub fn cached_uri(&self, id: UriId) -> Option<Arc<str>> {
        self.read_cache().by_id.get(&id).cloned()
    }

    /// Merge committed mappings into the shared cache, both directions.
    pub fn publish(&self, entries: impl IntoIterator<Item = (Arc<str>, UriId)>) {
        let mut entries = entries.into_iter().peekable();
        if entries.peek().is_none() {
            return;
        }
        let mut cache = self.write_cache();
        for (uri, id) in entries {
            cache.by_uri.insert(Arc::clone(&uri), id);
            cache.by_id.insert(id, uri);
        }
    }

    /// Number of cached mappings.
    pub fn cache_len(&self) -> usize {
        self.read_cache().by_uri.len()
    }

    /// Look up the ID of a URI: cache first, then one KV read.
    ///
    /// Returns `None` if the URI has never been interned. A hit from the KV
    /// store is necessarily committed state and is published immediately.
    pub async fn lookup_id<T: KvTransaction>(
        &self,
        tx: &T,
        uri: &str,
        snapshot: bool,
    ) -> Result<Option<UriId>> {
        if let Some(id) = self.cached_id(uri) {
            return Ok(Some(id));
        }
        match tx.get(&self.keys.uri_to_id_key(uri), snapshot).await? {
            Some(value) => {
                let id = decode_id_value(&value)?;
                self.publish([(Arc::<str>::from(uri), id)]);
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Resolve an ID back to its URI: cache first, then one KV read.
    ///
    /// Fails with [`Error::DanglingId`] if the mapping is missing, which
    /// indicates a corrupted store.
    pub async fn lookup_uri<T: KvTransaction>(
        &self,
        tx: &T,
        id: UriId,
        snapshot: bool,
    ) -> Result<Arc<str>> {
        if let Some(uri) = self.cached_uri(id) {
            return Ok(uri);
        }
        match tx.get(&self.keys.id_to_uri_key(id), snapshot).await? {
            Some(value) => {
                let uri: Arc<str> = std::str::from_utf8(&value)
                    .map_err(|_| {
                        Error::internal(format!("i2u value for {id} is not valid UTF-8"))
                    })?
                    .into();
                self.publish([(Arc::clone(&uri), id)]);
                Ok(uri)
            }
            None => Err(Error::DanglingId(id.as_u64())),
        }
    }
}

fn decode_id_value(value: &[u8]) -> Result<UriId> {
    UriId::from_le_slice(value).ok_or_else(|| {
        Error::internal(format!(
            "dictionary ID value has width {} instead of 8",
            value.len()
        ))
    })
}

// ============================================================================
// Intern sessions
// ============================================================================

/// Per-transaction-attempt interning state.
///
/// Construct one inside each transaction body, intern through it, and after
/// the commit succeeds hand [`InternSession::into_fresh`] to
/// [`Dictionary::publish`]. Dropping the session (retry, abort) discards
/// the scratch with no effect on the shared cache.
#[derive(Debug)]
pub struct InternSession<'a> {
    dict: &'a Dictionary,
    scratch: HashMap<Arc<str>, UriId>,
    fresh: Vec<(Arc<str>, UriId)>,
}

impl<'a> InternSession<'a> {
    pub fn new(dict: &'a Dictionary) -> Self {
        Self {
            dict,
            scratch: HashMap::new(),
            fresh: Vec::new(),
        }
    }

    /// Intern a URI, allocating a fresh ID if it has never been seen.
    ///
    /// Reads are conflict-checked (non-snapshot): two transactions racing
    /// to intern the same URI serialize through the `u2i` key, and the
    /// loser's retry observes the winner's mapping.
    pub async fn intern<T: KvTransaction>(&mut self, tx: &T, uri: &str) -> Result<UriId> {
        if let Some(id) = self.scratch.get(uri) {
            return Ok(*id);
        }
        if let Some(id) = self.dict.cached_id(uri) {
            self.scratch.insert(Arc::from(uri), id);
            return Ok(id);
        }

        let keys = &self.dict.keys;
        let shared: Arc<str> = Arc::from(uri);
        let id = match tx.get(&keys.uri_to_id_key(uri), false).await? {
            Some(value) => decode_id_value(&value)?,
            None => {
                let id = allocate_id(tx, keys).await?;
                tx.set(&keys.uri_to_id_key(uri), &id.to_le_bytes());
                tx.set(&keys.id_to_uri_key(id), uri.as_bytes());
                id
            }
        };
        self.scratch.insert(Arc::clone(&shared), id);
        self.fresh.push((shared, id));
        Ok(id)
    }

    /// Mappings observed by this session, for publication after commit.
    pub fn into_fresh(self) -> Vec<(Arc<str>, UriId)> {
        self.fresh
    }
}

/// Allocate the next dictionary ID from the counter key.
///
/// The atomic add followed by a read-your-writes get observes the
/// post-increment value; the non-snapshot read puts the counter into the
/// conflict set, so concurrent allocations serialize and IDs stay unique.
/// IDs therefore start at 1 and increase by 1 per distinct URI interned.
async fn allocate_id<T: KvTransaction>(tx: &T, keys: &KeySpace) -> Result<UriId> {
    tx.atomic_add(keys.id_counter_key(), 1);
    let value = tx
        .get(keys.id_counter_key(), false)
        .await?
        .ok_or_else(|| Error::internal("ID counter missing immediately after atomic add"))?;
    decode_id_value(&value)
}
