//! Key schema for the store's KV layout.
//!
//! Every key is a tuple beginning with the caller-supplied root prefix and
//! a subspace tag. The layout below is the on-disk contract: two stores
//! built against the same root prefix on the same KV substrate interoperate.
//!
//! | Key            | Tuple shape                     | Value                  |
//! |----------------|---------------------------------|------------------------|
//! | URI → ID       | `root, "dict", "u2i", uri`      | 8-byte LE ID           |
//! | ID → URI       | `root, "dict", "i2u", id`       | UTF-8 bytes of URI     |
//! | ID counter     | `root, "dict", "cnt"`           | 8-byte LE counter      |
//! | Index entry    | `root, "idx", tag, k1, k2, k3`  | empty                  |
//! | Triple count   | `root, "meta", "cnt"`           | 8-byte LE counter      |

use crate::error::{Error, Result};
use crate::ids::{IdTriple, UriId};
use crate::index::IndexType;
use crate::tuple;

/// Subspace tag for dictionary keys.
pub const SUBSPACE_DICT: &str = "dict";
/// Subspace tag for index keys.
pub const SUBSPACE_IDX: &str = "idx";
/// Subspace tag for store metadata.
pub const SUBSPACE_META: &str = "meta";

const DICT_URI_TO_ID: &str = "u2i";
const DICT_ID_TO_URI: &str = "i2u";
const COUNTER: &str = "cnt";

/// Key builder for one logical store, fixed to a root prefix.
///
/// The root prefix is an opaque non-empty byte string that isolates this
/// store's keys from anything else sharing the KV namespace.
#[derive(Clone, Debug)]
pub struct KeySpace {
    root: Vec<u8>,
    // Precomputed packed prefixes for the hot paths.
    dict_u2i: Vec<u8>,
    dict_i2u: Vec<u8>,
    idx: [Vec<u8>; 4],
    id_counter: Vec<u8>,
    triple_count: Vec<u8>,
}

impl KeySpace {
    /// Create a key space under `root`.
    pub fn new(root: impl Into<Vec<u8>>) -> Self {
        let root = root.into();
        let subspace = |space: &str, tag: &str| {
            tuple::pack(&[
                tuple::Element::Bytes(&root),
                tuple::Element::Str(space),
                tuple::Element::Str(tag),
            ])
        };
        let dict_u2i = subspace(SUBSPACE_DICT, DICT_URI_TO_ID);
        let dict_i2u = subspace(SUBSPACE_DICT, DICT_ID_TO_URI);
        let id_counter = subspace(SUBSPACE_DICT, COUNTER);
        let triple_count = subspace(SUBSPACE_META, COUNTER);
        let all = IndexType::all();
        let idx = [
            subspace(SUBSPACE_IDX, all[0].tag()),
            subspace(SUBSPACE_IDX, all[1].tag()),
            subspace(SUBSPACE_IDX, all[2].tag()),
            subspace(SUBSPACE_IDX, all[3].tag()),
        ];
        Self {
            root,
            dict_u2i,
            dict_i2u,
            idx,
            id_counter,
            triple_count,
        }
    }

    /// The root prefix this key space was constructed with.
    pub fn root(&self) -> &[u8] {
        &self.root
    }

    fn index_prefix(&self, index: IndexType) -> &[u8] {
        match index {
            IndexType::Spo => &self.idx[0],
            IndexType::Pso => &self.idx[1],
            IndexType::Pos => &self.idx[2],
            IndexType::Osp => &self.idx[3],
        }
    }

    /// `root, "dict", "u2i", uri` — value is the 8-byte LE ID.
    pub fn uri_to_id_key(&self, uri: &str) -> Vec<u8> {
        let mut key = self.dict_u2i.clone();
        tuple::encode_str(&mut key, uri);
        key
    }

    /// `root, "dict", "i2u", id` — value is the UTF-8 bytes of the URI.
    pub fn id_to_uri_key(&self, id: UriId) -> Vec<u8> {
        let mut key = self.dict_i2u.clone();
        tuple::encode_int(&mut key, id.as_i64());
        key
    }

    /// `root, "dict", "cnt"` — the monotone ID-allocation counter.
    pub fn id_counter_key(&self) -> &[u8] {
        &self.id_counter
    }

    /// `root, "meta", "cnt"` — the logical triple count.
    pub fn triple_count_key(&self) -> &[u8] {
        &self.triple_count
    }

    /// `root, "idx", tag, k1, k2, k3` for one index's permutation of an ID
    /// triple. The value stored under this key is always empty.
    pub fn index_key(&self, index: IndexType, t: IdTriple) -> Vec<u8> {
        let mut key = self.index_prefix(index).to_vec();
        for id in index.permute(t) {
            tuple::encode_int(&mut key, id.as_i64());
        }
        key
    }

    /// Half-open range `[begin, end)` over one index, bounded to the given
    /// prefix of bound IDs (zero to three, in the index's key order).
    pub fn index_range(&self, index: IndexType, prefix_ids: &[UriId]) -> (Vec<u8>, Vec<u8>) {
        debug_assert!(prefix_ids.len() <= 3);
        let mut prefix = self.index_prefix(index).to_vec();
        for id in prefix_ids {
            tuple::encode_int(&mut prefix, id.as_i64());
        }
        tuple::prefix_range(&prefix)
    }

    /// Decode an index key back to subject/predicate/object order.
    ///
    /// Fails with `CorruptKey` if the key is not in this index's subspace or
    /// its suffix is not exactly three integer elements.
    pub fn decode_index_key(&self, index: IndexType, key: &[u8]) -> Result<IdTriple> {
        let prefix = self.index_prefix(index);
        let suffix = key.strip_prefix(prefix).ok_or_else(|| {
            Error::corrupt_key(format!("key is not in the {} index subspace", index))
        })?;
        let (k1, pos) = tuple::decode_int(suffix, 0)?;
        let (k2, pos) = tuple::decode_int(suffix, pos)?;
        let (k3, pos) = tuple::decode_int(suffix, pos)?;
        if pos != suffix.len() {
            return Err(Error::corrupt_key(format!(
                "{} trailing bytes after index key elements",
                suffix.len() - pos
            )));
        }
        Ok(index.unpermute([
            UriId::from_i64(k1),
            UriId::from_i64(k2),
            UriId::from_i64(k3),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyspace() -> KeySpace {
        KeySpace::new(b"test-store".to_vec())
    }

    fn ids(s: u64, p: u64, o: u64) -> IdTriple {
        IdTriple::new(UriId(s), UriId(p), UriId(o))
    }

    #[test]
    fn index_key_roundtrip_all_indexes() {
        let ks = keyspace();
        let t = ids(1, 2, 3);
        for idx in IndexType::all() {
            let key = ks.index_key(*idx, t);
            assert_eq!(ks.decode_index_key(*idx, &key).unwrap(), t);
        }
    }

    #[test]
    fn index_keys_are_distinct_across_indexes() {
        let ks = keyspace();
        let t = ids(1, 2, 3);
        let keys: Vec<_> = IndexType::all()
            .iter()
            .map(|idx| ks.index_key(*idx, t))
            .collect();
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn range_contains_exactly_matching_prefix() {
        let ks = keyspace();
        let (begin, end) = ks.index_range(IndexType::Spo, &[UriId(7)]);

        let inside = ks.index_key(IndexType::Spo, ids(7, 1, 1));
        let inside_high = ks.index_key(IndexType::Spo, ids(7, u64::MAX >> 1, 4));
        let below = ks.index_key(IndexType::Spo, ids(6, 999, 999));
        let above = ks.index_key(IndexType::Spo, ids(8, 0, 0));

        assert!(begin <= inside && inside < end);
        assert!(begin <= inside_high && inside_high < end);
        assert!(below < begin);
        assert!(above >= end);
    }

    #[test]
    fn empty_prefix_range_spans_whole_index() {
        let ks = keyspace();
        let (begin, end) = ks.index_range(IndexType::Osp, &[]);
        let low = ks.index_key(IndexType::Osp, ids(1, 1, 1));
        let high = ks.index_key(IndexType::Osp, ids(1, 1, u64::MAX >> 1));
        assert!(begin <= low && low < end);
        assert!(begin <= high && high < end);
        // Keys of other indexes never fall inside.
        let other = ks.index_key(IndexType::Spo, ids(1, 1, 1));
        assert!(!(begin <= other && other < end));
    }

    #[test]
    fn decode_rejects_foreign_and_malformed_keys() {
        let ks = keyspace();
        let t = ids(1, 2, 3);

        // Key from a different index subspace.
        let pso = ks.index_key(IndexType::Pso, t);
        assert!(ks.decode_index_key(IndexType::Spo, &pso).is_err());

        // Truncated suffix.
        let mut short = ks.index_key(IndexType::Spo, t);
        short.pop();
        assert!(ks.decode_index_key(IndexType::Spo, &short).is_err());

        // Trailing bytes.
        let mut long = ks.index_key(IndexType::Spo, t);
        long.push(0x14);
        assert!(ks.decode_index_key(IndexType::Spo, &long).is_err());
    }

    #[test]
    fn distinct_roots_do_not_collide() {
        let a = KeySpace::new(b"store-a".to_vec());
        let b = KeySpace::new(b"store-b".to_vec());
        let t = ids(1, 2, 3);
        assert_ne!(a.index_key(IndexType::Spo, t), b.index_key(IndexType::Spo, t));
        assert_ne!(a.uri_to_id_key("x"), b.uri_to_id_key("x"));
        assert_ne!(a.id_counter_key(), b.id_counter_key());
    }

    #[test]
    fn dict_keys_distinct_per_direction() {
        let ks = keyspace();
        // A URI that happens to look like an encoded ID must not collide.
        assert_ne!(ks.uri_to_id_key("1"), ks.id_to_uri_key(UriId(1)));
        assert_ne!(ks.id_counter_key().to_vec(), ks.triple_count_key().to_vec());
    }
}
