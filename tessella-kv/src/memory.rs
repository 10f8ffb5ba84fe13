//! In-memory KV engine implementing the ordered-KV contract.
//!
//! `MemoryKv` is the in-tree substrate for tests and embedded stores. It
//! implements the same semantics the contract demands of a production
//! backend, not a shortcut around them:
//!
//! - snapshot-isolated reads (a transaction reads the committed state as of
//!   its creation),
//! - read-your-writes through a composed mutation buffer,
//! - optimistic conflict detection at commit: point and range reads are
//!   tracked, and a commit fails with a retriable conflict if any tracked
//!   key was modified by a transaction that committed after this one began,
//! - atomic adds applied to the latest committed value at commit time, so
//!   blind counter updates never conflict with each other,
//! - payload and wall-clock limits enforced at commit.
//!
//! Snapshot reads (`snapshot = true`) skip conflict tracking entirely.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tessella_core::{Error, Result};

use crate::transaction::{
    KeySelector, KeyValue, KvDatabase, KvTransaction, MAX_KEY_BYTES, MAX_TRANSACTION_BYTES,
    MAX_TRANSACTION_DURATION, MAX_VALUE_BYTES,
};

// ============================================================================
// Committed state
// ============================================================================

#[derive(Debug, Default)]
struct Committed {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Monotone commit version; bumped once per committed transaction.
    version: u64,
    /// Last commit version that touched each key (writes and clears).
    modified: BTreeMap<Vec<u8>, u64>,
}

/// In-memory ordered KV database with optimistic transactions.
#[derive(Clone, Debug, Default)]
pub struct MemoryKv {
    inner: Arc<Mutex<Committed>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed keys; test and diagnostics helper.
    pub fn committed_len(&self) -> usize {
        self.lock().data.len()
    }

    fn lock(&self) -> MutexGuard<'_, Committed> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl KvDatabase for MemoryKv {
    type Tx = MemoryTransaction;

    async fn create_transaction(&self) -> Result<Self::Tx> {
        let inner = self.lock();
        Ok(MemoryTransaction {
            shared: Arc::new(TxShared {
                db: Arc::clone(&self.inner),
                snapshot: inner.data.clone(),
                read_version: inner.version,
                started: Instant::now(),
                committed: AtomicBool::new(false),
                state: Mutex::new(TxState::default()),
            }),
        })
    }
}

// ============================================================================
// Transactions
// ============================================================================

#[derive(Clone, Debug)]
enum Mutation {
    Set(Vec<u8>),
    Clear,
    Add(i64),
}

type RangeKeyBounds = (Bound<Vec<u8>>, Bound<Vec<u8>>);

#[derive(Debug, Default)]
struct TxState {
    mutations: BTreeMap<Vec<u8>, Mutation>,
    point_reads: HashSet<Vec<u8>>,
    range_reads: Vec<RangeKeyBounds>,
}

#[derive(Debug)]
struct TxShared {
    db: Arc<Mutex<Committed>>,
    snapshot: BTreeMap<Vec<u8>, Vec<u8>>,
    read_version: u64,
    started: Instant,
    committed: AtomicBool,
    state: Mutex<TxState>,
}

/// One optimistic transaction over [`MemoryKv`]; handles are cheap clones.
#[derive(Clone, Debug)]
pub struct MemoryTransaction {
    shared: Arc<TxShared>,
}

impl MemoryTransaction {
    fn state(&self) -> MutexGuard<'_, TxState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply a buffered mutation (if any) over the snapshot value of `key`.
    fn effective_value(&self, state: &TxState, key: &[u8]) -> Option<Vec<u8>> {
        match state.mutations.get(key) {
            Some(Mutation::Set(v)) => Some(v.clone()),
            Some(Mutation::Clear) => None,
            Some(Mutation::Add(delta)) => Some(
                le_add(self.shared.snapshot.get(key).map(Vec::as_slice), *delta).to_vec(),
            ),
            None => self.shared.snapshot.get(key).cloned(),
        }
    }

    fn selector_bounds(begin: &KeySelector, end: &KeySelector) -> RangeKeyBounds {
        let lower = if begin.or_equal() {
            Bound::Included(begin.key().to_vec())
        } else {
            Bound::Excluded(begin.key().to_vec())
        };
        // An end selector names the first key *past* the range: greater-or-equal
        // excludes the reference key, greater-than includes it.
        let upper = if end.or_equal() {
            Bound::Excluded(end.key().to_vec())
        } else {
            Bound::Included(end.key().to_vec())
        };
        (lower, upper)
    }

    fn bounds_are_empty(bounds: &RangeKeyBounds) -> bool {
        let (lower, upper) = bounds;
        let (lo, hi) = match (lower, upper) {
            (Bound::Included(a) | Bound::Excluded(a), Bound::Included(b) | Bound::Excluded(b)) => {
                (a, b)
            }
            _ => return false,
        };
        match lo.cmp(hi) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Equal => {
                !matches!((lower, upper), (Bound::Included(_), Bound::Included(_)))
            }
            std::cmp::Ordering::Less => false,
        }
    }
}

#[async_trait]
impl KvTransaction for MemoryTransaction {
    async fn get(&self, key: &[u8], snapshot: bool) -> Result<Option<Vec<u8>>> {
        let mut state = self.state();
        if !snapshot {
            state.point_reads.insert(key.to_vec());
        }
        Ok(self.effective_value(&state, key))
    }

    async fn get_range(
        &self,
        begin: &KeySelector,
        end: &KeySelector,
        limit: usize,
        snapshot: bool,
    ) -> Result<Vec<KeyValue>> {
        let bounds = Self::selector_bounds(begin, end);
        let mut state = self.state();
        if !snapshot {
            state.range_reads.push(bounds.clone());
        }
        if limit == 0 || Self::bounds_are_empty(&bounds) {
            return Ok(Vec::new());
        }
        let slice_bounds = (as_slice_bound(&bounds.0), as_slice_bound(&bounds.1));

        // Merge the snapshot with this transaction's buffered mutations.
        let mut merged: BTreeMap<&[u8], Option<Vec<u8>>> = self
            .shared
            .snapshot
            .range::<[u8], _>(slice_bounds)
            .map(|(k, v)| (k.as_slice(), Some(v.clone())))
            .collect();
        for (key, mutation) in state.mutations.range::<[u8], _>(slice_bounds) {
            let value = match mutation {
                Mutation::Set(v) => Some(v.clone()),
                Mutation::Clear => None,
                Mutation::Add(delta) => Some(
                    le_add(self.shared.snapshot.get(key).map(Vec::as_slice), *delta).to_vec(),
                ),
            };
            merged.insert(key.as_slice(), value);
        }

        Ok(merged
            .into_iter()
            .filter_map(|(k, v)| {
                v.map(|value| KeyValue {
                    key: k.to_vec(),
                    value,
                })
            })
            .take(limit)
            .collect())
    }

    fn set(&self, key: &[u8], value: &[u8]) {
        self.state()
            .mutations
            .insert(key.to_vec(), Mutation::Set(value.to_vec()));
    }

    fn clear(&self, key: &[u8]) {
        self.state().mutations.insert(key.to_vec(), Mutation::Clear);
    }

    fn atomic_add(&self, key: &[u8], delta: i64) {
        let mut state = self.state();
        let next = match state.mutations.get(key) {
            // Add over an in-transaction write folds into the written value.
            Some(Mutation::Set(v)) => Mutation::Set(le_add(Some(v), delta).to_vec()),
            Some(Mutation::Clear) => Mutation::Set(le_add(None, delta).to_vec()),
            Some(Mutation::Add(prior)) => Mutation::Add(prior.wrapping_add(delta)),
            None => Mutation::Add(delta),
        };
        state.mutations.insert(key.to_vec(), next);
    }

    async fn commit(&self) -> Result<()> {
        if self.shared.committed.swap(true, Ordering::SeqCst) {
            return Err(Error::internal("transaction committed twice"));
        }
        if self.shared.started.elapsed() > MAX_TRANSACTION_DURATION {
            return Err(Error::TransactionTooLong);
        }
        let state = std::mem::take(&mut *self.state());

        let mut payload = 0usize;
        for (key, mutation) in &state.mutations {
            if key.len() > MAX_KEY_BYTES {
                return Err(Error::too_large(format!(
                    "key of {} bytes exceeds the {} byte limit",
                    key.len(),
                    MAX_KEY_BYTES
                )));
            }
            let value_len = match mutation {
                Mutation::Set(v) => v.len(),
                Mutation::Clear => 0,
                Mutation::Add(_) => 8,
            };
            if value_len > MAX_VALUE_BYTES {
                return Err(Error::too_large(format!(
                    "value of {} bytes exceeds the {} byte limit",
                    value_len, MAX_VALUE_BYTES
                )));
            }
            payload += key.len() + value_len;
        }
        if payload > MAX_TRANSACTION_BYTES {
            return Err(Error::too_large(format!(
                "transaction payload of {} bytes exceeds the {} byte limit",
                payload, MAX_TRANSACTION_BYTES
            )));
        }

        let mut inner = self
            .shared
            .db
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Conflict detection against transactions committed after our
        // read version.
        if inner.version > self.shared.read_version {
            for key in &state.point_reads {
                if inner
                    .modified
                    .get(key)
                    .is_some_and(|v| *v > self.shared.read_version)
                {
                    tracing::debug!(version = inner.version, "point-read conflict");
                    return Err(Error::Conflict);
                }
            }
            for bounds in &state.range_reads {
                if Self::bounds_are_empty(bounds) {
                    continue;
                }
                let conflicted = inner
                    .modified
                    .range::<[u8], _>((as_slice_bound(&bounds.0), as_slice_bound(&bounds.1)))
                    .any(|(_, v)| *v > self.shared.read_version);
                if conflicted {
                    tracing::debug!(version = inner.version, "range-read conflict");
                    return Err(Error::Conflict);
                }
            }
        }

        if state.mutations.is_empty() {
            return Ok(());
        }

        inner.version += 1;
        let version = inner.version;
        for (key, mutation) in state.mutations {
            match mutation {
                Mutation::Set(value) => {
                    inner.data.insert(key.clone(), value);
                }
                Mutation::Clear => {
                    inner.data.remove(&key);
                }
                Mutation::Add(delta) => {
                    // Applied over the *latest* committed value: this is what
                    // keeps concurrent counter updates conflict-free.
                    let next = le_add(inner.data.get(&key).map(Vec::as_slice), delta);
                    inner.data.insert(key.clone(), next.to_vec());
                }
            }
            inner.modified.insert(key, version);
        }
        Ok(())
    }
}

fn as_slice_bound(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(k) => Bound::Included(k.as_slice()),
        Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Little-endian 64-bit add with absent-as-zero semantics.
///
/// Values shorter than 8 bytes are zero-extended; longer values are
/// truncated to their low 8 bytes. The result is always 8 bytes.
fn le_add(existing: Option<&[u8]>, delta: i64) -> [u8; 8] {
    let mut buf = [0u8; 8];
    if let Some(bytes) = existing {
        let n = bytes.len().min(8);
        buf[..n].copy_from_slice(&bytes[..n]);
    }
    let current = i64::from_le_bytes(buf);
    current.wrapping_add(delta).to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{range_stream, run};
    use futures::TryStreamExt;

    async fn commit_set(db: &MemoryKv, key: &[u8], value: &[u8]) {
        let tx = db.create_transaction().await.unwrap();
        tx.set(key, value);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn set_commit_get() {
        let db = MemoryKv::new();
        commit_set(&db, b"a", b"1").await;

        let tx = db.create_transaction().await.unwrap();
        assert_eq!(tx.get(b"a", false).await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(tx.get(b"missing", false).await.unwrap(), None);
    }

    #[tokio::test]
    async fn read_your_writes() {
        let db = MemoryKv::new();
        let tx = db.create_transaction().await.unwrap();
        tx.set(b"k", b"v");
        assert_eq!(tx.get(b"k", false).await.unwrap(), Some(b"v".to_vec()));
        tx.clear(b"k");
        assert_eq!(tx.get(b"k", false).await.unwrap(), None);
    }

    #[tokio::test]
    async fn atomic_add_read_back_observes_increment() {
        let db = MemoryKv::new();
        let tx = db.create_transaction().await.unwrap();
        tx.atomic_add(b"cnt", 1);
        let value = tx.get(b"cnt", false).await.unwrap().unwrap();
        assert_eq!(value, 1i64.to_le_bytes().to_vec());
        tx.atomic_add(b"cnt", 2);
        let value = tx.get(b"cnt", false).await.unwrap().unwrap();
        assert_eq!(value, 3i64.to_le_bytes().to_vec());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn snapshot_isolation() {
        let db = MemoryKv::new();
        commit_set(&db, b"k", b"old").await;

        let reader = db.create_transaction().await.unwrap();
        commit_set(&db, b"k", b"new").await;

        // The reader still sees the state as of its creation.
        assert_eq!(reader.get(b"k", true).await.unwrap(), Some(b"old".to_vec()));
    }

    #[tokio::test]
    async fn conflicting_point_read_aborts() {
        let db = MemoryKv::new();
        commit_set(&db, b"k", b"0").await;

        let tx1 = db.create_transaction().await.unwrap();
        let tx2 = db.create_transaction().await.unwrap();

        assert!(tx1.get(b"k", false).await.unwrap().is_some());
        tx2.set(b"k", b"1");
        tx2.commit().await.unwrap();

        tx1.set(b"other", b"x");
        let err = tx1.commit().await.unwrap_err();
        assert!(err.is_retriable(), "expected retriable conflict, got {err}");
    }

    #[tokio::test]
    async fn snapshot_read_does_not_conflict() {
        let db = MemoryKv::new();
        commit_set(&db, b"k", b"0").await;

        let tx1 = db.create_transaction().await.unwrap();
        let tx2 = db.create_transaction().await.unwrap();

        assert!(tx1.get(b"k", true).await.unwrap().is_some());
        tx2.set(b"k", b"1");
        tx2.commit().await.unwrap();

        tx1.set(b"other", b"x");
        tx1.commit().await.unwrap();
    }

    #[tokio::test]
    async fn range_read_conflicts_with_insert_into_range() {
        let db = MemoryKv::new();
        let tx1 = db.create_transaction().await.unwrap();
        let begin = KeySelector::first_greater_or_equal(b"a".to_vec());
        let end = KeySelector::first_greater_or_equal(b"z".to_vec());
        assert!(tx1
            .get_range(&begin, &end, 100, false)
            .await
            .unwrap()
            .is_empty());

        commit_set(&db, b"m", b"1").await;

        tx1.set(b"out-of-band", b"x");
        let err = tx1.commit().await.unwrap_err();
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn concurrent_atomic_adds_do_not_conflict() {
        let db = MemoryKv::new();
        let tx1 = db.create_transaction().await.unwrap();
        let tx2 = db.create_transaction().await.unwrap();
        tx1.atomic_add(b"cnt", 1);
        tx2.atomic_add(b"cnt", 1);
        tx1.commit().await.unwrap();
        tx2.commit().await.unwrap();

        let tx = db.create_transaction().await.unwrap();
        let value = tx.get(b"cnt", true).await.unwrap().unwrap();
        assert_eq!(value, 2i64.to_le_bytes().to_vec());
    }

    #[tokio::test]
    async fn get_range_respects_selectors_and_limit() {
        let db = MemoryKv::new();
        for key in [b"a", b"b", b"c", b"d"] {
            commit_set(&db, key, b"v").await;
        }

        let tx = db.create_transaction().await.unwrap();
        let begin = KeySelector::first_greater_than(b"a".to_vec());
        let end = KeySelector::first_greater_or_equal(b"d".to_vec());
        let page = tx.get_range(&begin, &end, 10, true).await.unwrap();
        let keys: Vec<_> = page.iter().map(|kv| kv.key.clone()).collect();
        assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);

        let begin = KeySelector::first_greater_or_equal(b"a".to_vec());
        let page = tx.get_range(&begin, &end, 2, true).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].key, b"a".to_vec());
    }

    #[tokio::test]
    async fn get_range_sees_own_mutations() {
        let db = MemoryKv::new();
        commit_set(&db, b"b", b"old").await;
        commit_set(&db, b"c", b"gone").await;

        let tx = db.create_transaction().await.unwrap();
        tx.set(b"a", b"new");
        tx.clear(b"c");
        let begin = KeySelector::first_greater_or_equal(b"a".to_vec());
        let end = KeySelector::first_greater_or_equal(b"z".to_vec());
        let page = tx.get_range(&begin, &end, 10, true).await.unwrap();
        let keys: Vec<_> = page.iter().map(|kv| kv.key.clone()).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[tokio::test]
    async fn range_stream_pages_through_everything() {
        let db = MemoryKv::new();
        let tx = db.create_transaction().await.unwrap();
        for i in 0..700u32 {
            tx.set(format!("key/{i:04}").as_bytes(), &i.to_le_bytes());
        }
        tx.commit().await.unwrap();

        let tx = db.create_transaction().await.unwrap();
        let begin = KeySelector::first_greater_or_equal(b"key/".to_vec());
        let end = KeySelector::first_greater_or_equal(b"key0".to_vec());
        let all: Vec<_> = range_stream(tx, begin, end, true)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(all.len(), 700);
        assert!(all.windows(2).all(|w| w[0].key < w[1].key));
    }

    #[tokio::test]
    async fn oversized_value_rejected() {
        let db = MemoryKv::new();
        let tx = db.create_transaction().await.unwrap();
        tx.set(b"k", &vec![0u8; MAX_VALUE_BYTES + 1]);
        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, Error::TransactionTooLarge(_)));
    }

    #[tokio::test]
    async fn run_retries_read_modify_write_conflicts() {
        let db = MemoryKv::new();

        // Seed the counter at 1, leaving a doomed concurrent writer behind.
        let tx1 = db.create_transaction().await.unwrap();
        assert!(tx1.get(b"cnt", false).await.unwrap().is_none());
        tx1.set(b"cnt", &1i64.to_le_bytes());

        let doomed = db.create_transaction().await.unwrap();
        let _ = doomed.get(b"cnt", false).await.unwrap();
        tx1.commit().await.unwrap();
        doomed.set(b"cnt", &99i64.to_le_bytes());
        assert!(doomed.commit().await.unwrap_err().is_retriable());

        // The envelope re-reads and lands on 2.
        run(&db, 10, |tx| async move {
            let current = match tx.get(b"cnt", false).await? {
                Some(v) => i64::from_le_bytes(le_add(Some(&v), 0)),
                None => 0,
            };
            tx.set(b"cnt", &(current + 1).to_le_bytes());
            Ok(())
        })
        .await
        .unwrap();

        let tx = db.create_transaction().await.unwrap();
        let value = tx.get(b"cnt", true).await.unwrap().unwrap();
        assert_eq!(i64::from_le_bytes(value.try_into().unwrap()), 2);
    }
}
