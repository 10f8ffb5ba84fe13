//! The ordered-KV contract consumed by the store.
//!
//! Tessella does not ship a networked KV engine; it consumes any ordered,
//! transactional substrate that can implement these traits. Apps provide
//! their own backend; [`crate::MemoryKv`] is the in-tree implementation
//! used for tests and embedded stores.
//!
//! The contract mirrors what production ordered KV stores offer: snapshot
//! point reads, ranged reads with key selectors, writes buffered until an
//! atomic commit, little-endian 64-bit atomic add, and a retry envelope
//! ([`run`]) that re-executes a transaction body on commit conflicts.
//!
//! Transaction handles are cheap clones of shared state, so a retry body
//! receives its transaction by value and the envelope keeps a handle for
//! the commit.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tessella_core::{Error, Result};

// ============================================================================
// Limits
// ============================================================================

/// Maximum encoded key size accepted by a transaction.
pub const MAX_KEY_BYTES: usize = 10 * 1024;

/// Maximum value size accepted by a transaction.
pub const MAX_VALUE_BYTES: usize = 100 * 1024;

/// Maximum total mutation payload per transaction.
pub const MAX_TRANSACTION_BYTES: usize = 10 * 1024 * 1024;

/// Wall-clock budget for a single transaction attempt.
pub const MAX_TRANSACTION_DURATION: Duration = Duration::from_secs(5);

/// Default bound on retry attempts in [`run`].
pub const DEFAULT_RETRY_ATTEMPTS: usize = 100;

/// Page size used by [`range_stream`] when pulling from `get_range`.
pub const RANGE_PAGE_SIZE: usize = 256;

// ============================================================================
// Key selectors
// ============================================================================

/// Resolves to a position in the key order, for range endpoints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySelector {
    key: Vec<u8>,
    or_equal: bool,
}

impl KeySelector {
    /// The first key greater than or equal to `key`.
    pub fn first_greater_or_equal(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            or_equal: true,
        }
    }

    /// The first key strictly greater than `key`.
    pub fn first_greater_than(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            or_equal: false,
        }
    }

    /// The reference key.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Whether the reference key itself satisfies the selector.
    pub fn or_equal(&self) -> bool {
        self.or_equal
    }
}

/// One key-value pair from a ranged read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

// ============================================================================
// Traits
// ============================================================================

/// One transaction over the ordered KV substrate.
///
/// Handles are cheap clones sharing the same underlying transaction.
/// Reads observe the transaction's snapshot plus its own buffered writes
/// (read-your-writes). Writes are buffered until [`KvTransaction::commit`];
/// a handle must not be used after commit.
///
/// Passing `snapshot = true` to a read excludes it from the transaction's
/// conflict set; mutating operations that guard on prior state must use
/// `snapshot = false` so concurrent writers serialize correctly.
#[async_trait]
pub trait KvTransaction: Clone + Send + Sync + 'static {
    /// Point read.
    async fn get(&self, key: &[u8], snapshot: bool) -> Result<Option<Vec<u8>>>;

    /// One page of a ranged read over `[begin, end)` as resolved by the
    /// selectors, in key order, at most `limit` pairs.
    ///
    /// Use [`range_stream`] to consume a range lazily without paging by hand.
    async fn get_range(
        &self,
        begin: &KeySelector,
        end: &KeySelector,
        limit: usize,
        snapshot: bool,
    ) -> Result<Vec<KeyValue>>;

    /// Buffer a write of `value` under `key`.
    fn set(&self, key: &[u8], value: &[u8]);

    /// Buffer a clear of `key`.
    fn clear(&self, key: &[u8]);

    /// Buffer a little-endian 64-bit atomic add of `delta` at `key`.
    ///
    /// An absent value is treated as zero. The addition is applied to the
    /// latest committed value at commit time, so blind counter updates do
    /// not conflict with each other.
    fn atomic_add(&self, key: &[u8], delta: i64);

    /// Commit the buffered mutations atomically.
    ///
    /// Fails with a retriable [`Error::Conflict`] if a key in this
    /// transaction's conflict set was modified by a concurrently committed
    /// transaction.
    async fn commit(&self) -> Result<()>;
}

/// Handle to the KV substrate; cheap to clone and share.
#[async_trait]
pub trait KvDatabase: Send + Sync + 'static {
    /// The transaction type this database produces.
    type Tx: KvTransaction;

    /// Open a new transaction at the current read version.
    async fn create_transaction(&self) -> Result<Self::Tx>;
}

// ============================================================================
// Retry envelope
// ============================================================================

/// Run `body` inside a transaction, committing on success and retrying on
/// retriable errors, up to `max_attempts` attempts.
///
/// Every attempt gets a fresh transaction; `body` must therefore be safe to
/// re-execute from scratch. Non-retriable errors propagate immediately. If
/// the retry budget is exhausted the caller sees
/// [`Error::MaxRetriesExceeded`].
pub async fn run<D, T, F, Fut>(db: &D, max_attempts: usize, body: F) -> Result<T>
where
    D: KvDatabase,
    F: Fn(D::Tx) -> Fut,
    Fut: Future<Output = Result<T>> + Send,
{
    debug_assert!(max_attempts > 0);
    for attempt in 1..=max_attempts {
        let tx = db.create_transaction().await?;
        let outcome = match body(tx.clone()).await {
            Ok(value) => tx.commit().await.map(|()| value),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retriable() => {
                tracing::debug!(attempt, error = %e, "transaction conflict, retrying");
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::MaxRetriesExceeded(max_attempts))
}

// ============================================================================
// Range streaming
// ============================================================================

/// Stream a ranged read lazily, pulling pages of [`RANGE_PAGE_SIZE`] pairs
/// from the transaction as the consumer demands them.
///
/// The stream owns a transaction handle; dropping the stream mid-way
/// abandons the read with no residual state.
pub fn range_stream<T>(
    tx: T,
    begin: KeySelector,
    end: KeySelector,
    snapshot: bool,
) -> BoxStream<'static, Result<KeyValue>>
where
    T: KvTransaction,
{
    struct PageState<T> {
        tx: T,
        cursor: KeySelector,
        end: KeySelector,
        buffered: VecDeque<KeyValue>,
        exhausted: bool,
        snapshot: bool,
    }

    let state = PageState {
        tx,
        cursor: begin,
        end,
        buffered: VecDeque::new(),
        exhausted: false,
        snapshot,
    };

    Box::pin(futures::stream::try_unfold(state, |mut st| async move {
        if let Some(kv) = st.buffered.pop_front() {
            return Ok(Some((kv, st)));
        }
        if st.exhausted {
            return Ok(None);
        }
        let page = st
            .tx
            .get_range(&st.cursor, &st.end, RANGE_PAGE_SIZE, st.snapshot)
            .await?;
        if page.len() < RANGE_PAGE_SIZE {
            st.exhausted = true;
        }
        if let Some(last) = page.last() {
            st.cursor = KeySelector::first_greater_than(last.key.clone());
        }
        st.buffered = page.into();
        match st.buffered.pop_front() {
            Some(first) => Ok(Some((first, st))),
            None => Ok(None),
        }
    }))
}
