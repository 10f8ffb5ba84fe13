//! The four covering indexes, written and cleared in lockstep.
//!
//! Each logical triple owns one key in each of SPO, PSO, POS, and OSP, all
//! with empty values, plus a share of the triple-count key. Mutations guard
//! on the SPO key with a conflict-checked read, so concurrent writers of
//! the same triple serialize and the counter stays accurate: the loser of
//! a race retries, observes the winner's state, and becomes a no-op.

use std::sync::Arc;
use tessella_core::{Error, IdTriple, IndexType, KeySpace, Result};
use tessella_kv::KvTransaction;

/// Index maintenance over all four orderings.
#[derive(Clone, Debug)]
pub struct IndexSet {
    keys: Arc<KeySpace>,
}

impl IndexSet {
    pub fn new(keys: Arc<KeySpace>) -> Self {
        Self { keys }
    }

    /// Write the triple into all four indexes and bump the count.
    ///
    /// Returns `false` (and touches nothing) if the triple already exists.
    pub async fn insert<T: KvTransaction>(&self, tx: &T, t: IdTriple) -> Result<bool> {
        let spo_key = self.keys.index_key(IndexType::Spo, t);
        if tx.get(&spo_key, false).await?.is_some() {
            return Ok(false);
        }
        tx.set(&spo_key, b"");
        for index in &IndexType::all()[1..] {
            tx.set(&self.keys.index_key(*index, t), b"");
        }
        tx.atomic_add(self.keys.triple_count_key(), 1);
        Ok(true)
    }

    /// Clear the triple from all four indexes and decrement the count.
    ///
    /// Returns `false` (and touches nothing) if the triple is absent.
    pub async fn delete<T: KvTransaction>(&self, tx: &T, t: IdTriple) -> Result<bool> {
        let spo_key = self.keys.index_key(IndexType::Spo, t);
        if tx.get(&spo_key, false).await?.is_none() {
            return Ok(false);
        }
        for index in IndexType::all() {
            tx.clear(&self.keys.index_key(*index, t));
        }
        tx.atomic_add(self.keys.triple_count_key(), -1);
        Ok(true)
    }

    /// Whether the triple exists, by a point read of its SPO key.
    pub async fn contains<T: KvTransaction>(
        &self,
        tx: &T,
        t: IdTriple,
        snapshot: bool,
    ) -> Result<bool> {
        let spo_key = self.keys.index_key(IndexType::Spo, t);
        Ok(tx.get(&spo_key, snapshot).await?.is_some())
    }

    /// Snapshot read of the triple count.
    ///
    /// The on-disk counter is a signed 64-bit value; a negative reading is
    /// clamped to zero on the way out.
    pub async fn count<T: KvTransaction>(&self, tx: &T) -> Result<u64> {
        match tx.get(self.keys.triple_count_key(), true).await? {
            None => Ok(0),
            Some(value) => {
                let arr: [u8; 8] = value.as_slice().try_into().map_err(|_| {
                    Error::internal(format!(
                        "triple count value has width {} instead of 8",
                        value.len()
                    ))
                })?;
                let signed = i64::from_le_bytes(arr);
                Ok(u64::try_from(signed).unwrap_or(0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessella_core::UriId;
    use tessella_kv::{KvDatabase, MemoryKv};

    fn indexes() -> IndexSet {
        IndexSet::new(Arc::new(KeySpace::new(b"idx-test".to_vec())))
    }

    fn ids(s: u64, p: u64, o: u64) -> IdTriple {
        IdTriple::new(UriId(s), UriId(p), UriId(o))
    }

    #[tokio::test]
    async fn insert_writes_all_four_indexes_once() {
        let db = MemoryKv::new();
        let set = indexes();

        let tx = db.create_transaction().await.unwrap();
        assert!(set.insert(&tx, ids(1, 2, 3)).await.unwrap());
        // Second insert of the same triple in the same transaction is a no-op.
        assert!(!set.insert(&tx, ids(1, 2, 3)).await.unwrap());
        tx.commit().await.unwrap();

        // 4 index keys + 1 counter key.
        assert_eq!(db.committed_len(), 5);

        let tx = db.create_transaction().await.unwrap();
        assert!(set.contains(&tx, ids(1, 2, 3), true).await.unwrap());
        assert!(!set.contains(&tx, ids(3, 2, 1), true).await.unwrap());
        assert_eq!(set.count(&tx).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_clears_all_four_indexes() {
        let db = MemoryKv::new();
        let set = indexes();

        let tx = db.create_transaction().await.unwrap();
        set.insert(&tx, ids(1, 2, 3)).await.unwrap();
        tx.commit().await.unwrap();

        let tx = db.create_transaction().await.unwrap();
        assert!(set.delete(&tx, ids(1, 2, 3)).await.unwrap());
        assert!(!set.delete(&tx, ids(1, 2, 3)).await.unwrap());
        tx.commit().await.unwrap();

        // Only the counter key remains.
        assert_eq!(db.committed_len(), 1);

        let tx = db.create_transaction().await.unwrap();
        assert_eq!(set.count(&tx).await.unwrap(), 0);
        assert!(!set.contains(&tx, ids(1, 2, 3), true).await.unwrap());
    }

    #[tokio::test]
    async fn delete_of_absent_triple_leaves_counter_alone() {
        let db = MemoryKv::new();
        let set = indexes();

        let tx = db.create_transaction().await.unwrap();
        assert!(!set.delete(&tx, ids(9, 9, 9)).await.unwrap());
        tx.commit().await.unwrap();

        let tx = db.create_transaction().await.unwrap();
        assert_eq!(set.count(&tx).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn racing_inserts_of_the_same_triple_count_once() {
        let db = MemoryKv::new();
        let set = indexes();

        let tx1 = db.create_transaction().await.unwrap();
        let tx2 = db.create_transaction().await.unwrap();

        assert!(set.insert(&tx1, ids(1, 2, 3)).await.unwrap());
        assert!(set.insert(&tx2, ids(1, 2, 3)).await.unwrap());

        tx1.commit().await.unwrap();
        // The loser conflicts on its SPO guard read and must retry.
        assert!(tx2.commit().await.unwrap_err().is_retriable());

        let tx3 = db.create_transaction().await.unwrap();
        assert!(!set.insert(&tx3, ids(1, 2, 3)).await.unwrap());
        tx3.commit().await.unwrap();

        let tx = db.create_transaction().await.unwrap();
        assert_eq!(set.count(&tx).await.unwrap(), 1);
    }
}
