//! Covering indexes and index selection
//!
//! Tessella maintains 4 covering indexes so every triple pattern resolves to
//! a prefix scan over exactly one of them:
//!
//! | Index | Order   | Use case                        |
//! |-------|---------|---------------------------------|
//! | SPO   | s, p, o | Subject lookups, full scans     |
//! | PSO   | p, s, o | Predicate scans                 |
//! | POS   | p, o, s | Predicate-value lookups         |
//! | OSP   | o, s, p | Object (reverse-link) lookups   |
//!
//! The one pattern without a covering prefix — subject and object bound,
//! predicate unbound — scans SPO by subject and post-filters on object.
//! It is rare in practice and does not justify a fifth index.

use crate::ids::{IdTriple, UriId};
use std::fmt;

/// Index type enumeration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexType {
    /// Subject-Predicate-Object
    Spo,
    /// Predicate-Subject-Object
    Pso,
    /// Predicate-Object-Subject
    Pos,
    /// Object-Subject-Predicate
    Osp,
}

impl IndexType {
    /// Get all index types, in the order they are written on mutation.
    pub fn all() -> &'static [IndexType] {
        &[
            IndexType::Spo,
            IndexType::Pso,
            IndexType::Pos,
            IndexType::Osp,
        ]
    }

    /// The three-letter tag identifying this index inside keys.
    pub fn tag(&self) -> &'static str {
        match self {
            IndexType::Spo => "spo",
            IndexType::Pso => "pso",
            IndexType::Pos => "pos",
            IndexType::Osp => "osp",
        }
    }

    /// Permute an ID triple into this index's key order.
    pub fn permute(&self, t: IdTriple) -> [UriId; 3] {
        match self {
            IndexType::Spo => [t.s, t.p, t.o],
            IndexType::Pso => [t.p, t.s, t.o],
            IndexType::Pos => [t.p, t.o, t.s],
            IndexType::Osp => [t.o, t.s, t.p],
        }
    }

    /// Invert [`IndexType::permute`], recovering subject/predicate/object order.
    pub fn unpermute(&self, k: [UriId; 3]) -> IdTriple {
        match self {
            IndexType::Spo => IdTriple::new(k[0], k[1], k[2]),
            IndexType::Pso => IdTriple::new(k[1], k[0], k[2]),
            IndexType::Pos => IdTriple::new(k[2], k[0], k[1]),
            IndexType::Osp => IdTriple::new(k[1], k[2], k[0]),
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl std::str::FromStr for IndexType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spo" => Ok(IndexType::Spo),
            "pso" => Ok(IndexType::Pso),
            "pos" => Ok(IndexType::Pos),
            "osp" => Ok(IndexType::Osp),
            _ => Err(format!("Unknown index type: {}", s)),
        }
    }
}

/// A resolved plan for one triple pattern: which index to scan, the bound
/// key prefix in that index's order, and an optional object post-filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryPlan {
    /// Index to scan
    pub index: IndexType,
    /// Bound prefix elements, in the index's key order
    pub prefix: Vec<UriId>,
    /// Post-filter on the object component (the `s ✓, p ✗, o ✓` gap)
    pub object_filter: Option<UriId>,
}

impl QueryPlan {
    /// Select the optimal index for a pattern of bound/unbound components.
    ///
    /// Every pattern maps to a pure prefix scan except subject+object
    /// without predicate, which scans SPO by subject and filters on object.
    pub fn for_pattern(s: Option<UriId>, p: Option<UriId>, o: Option<UriId>) -> QueryPlan {
        match (s, p, o) {
            (Some(s), Some(p), Some(o)) => QueryPlan {
                index: IndexType::Spo,
                prefix: vec![s, p, o],
                object_filter: None,
            },
            (Some(s), Some(p), None) => QueryPlan {
                index: IndexType::Spo,
                prefix: vec![s, p],
                object_filter: None,
            },
            (Some(s), None, Some(o)) => QueryPlan {
                index: IndexType::Spo,
                prefix: vec![s],
                object_filter: Some(o),
            },
            (Some(s), None, None) => QueryPlan {
                index: IndexType::Spo,
                prefix: vec![s],
                object_filter: None,
            },
            (None, Some(p), Some(o)) => QueryPlan {
                index: IndexType::Pos,
                prefix: vec![p, o],
                object_filter: None,
            },
            (None, Some(p), None) => QueryPlan {
                index: IndexType::Pso,
                prefix: vec![p],
                object_filter: None,
            },
            (None, None, Some(o)) => QueryPlan {
                index: IndexType::Osp,
                prefix: vec![o],
                object_filter: None,
            },
            (None, None, None) => QueryPlan {
                index: IndexType::Spo,
                prefix: vec![],
                object_filter: None,
            },
        }
    }

    /// Whether a decoded triple passes the post-filter.
    pub fn passes_filter(&self, t: IdTriple) -> bool {
        match self.object_filter {
            Some(o) => t.o == o,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(s: u64, p: u64, o: u64) -> IdTriple {
        IdTriple::new(UriId(s), UriId(p), UriId(o))
    }

    #[test]
    fn permute_unpermute_roundtrip() {
        let t = ids(1, 2, 3);
        for idx in IndexType::all() {
            assert_eq!(idx.unpermute(idx.permute(t)), t, "roundtrip via {idx}");
        }
    }

    #[test]
    fn permutations_are_distinct() {
        let t = ids(1, 2, 3);
        assert_eq!(IndexType::Spo.permute(t), [UriId(1), UriId(2), UriId(3)]);
        assert_eq!(IndexType::Pso.permute(t), [UriId(2), UriId(1), UriId(3)]);
        assert_eq!(IndexType::Pos.permute(t), [UriId(2), UriId(3), UriId(1)]);
        assert_eq!(IndexType::Osp.permute(t), [UriId(3), UriId(1), UriId(2)]);
    }

    #[test]
    fn plan_selection_table() {
        let s = Some(UriId(1));
        let p = Some(UriId(2));
        let o = Some(UriId(3));

        let plan = QueryPlan::for_pattern(s, p, o);
        assert_eq!(plan.index, IndexType::Spo);
        assert_eq!(plan.prefix, vec![UriId(1), UriId(2), UriId(3)]);

        let plan = QueryPlan::for_pattern(s, p, None);
        assert_eq!(plan.index, IndexType::Spo);
        assert_eq!(plan.prefix, vec![UriId(1), UriId(2)]);

        let plan = QueryPlan::for_pattern(s, None, o);
        assert_eq!(plan.index, IndexType::Spo);
        assert_eq!(plan.prefix, vec![UriId(1)]);
        assert_eq!(plan.object_filter, Some(UriId(3)));

        let plan = QueryPlan::for_pattern(s, None, None);
        assert_eq!(plan.index, IndexType::Spo);
        assert_eq!(plan.prefix, vec![UriId(1)]);

        let plan = QueryPlan::for_pattern(None, p, o);
        assert_eq!(plan.index, IndexType::Pos);
        assert_eq!(plan.prefix, vec![UriId(2), UriId(3)]);

        let plan = QueryPlan::for_pattern(None, p, None);
        assert_eq!(plan.index, IndexType::Pso);
        assert_eq!(plan.prefix, vec![UriId(2)]);

        let plan = QueryPlan::for_pattern(None, None, o);
        assert_eq!(plan.index, IndexType::Osp);
        assert_eq!(plan.prefix, vec![UriId(3)]);

        let plan = QueryPlan::for_pattern(None, None, None);
        assert_eq!(plan.index, IndexType::Spo);
        assert!(plan.prefix.is_empty());
        assert_eq!(plan.object_filter, None);
    }

    #[test]
    fn post_filter() {
        let plan = QueryPlan::for_pattern(Some(UriId(1)), None, Some(UriId(3)));
        assert!(plan.passes_filter(ids(1, 9, 3)));
        assert!(!plan.passes_filter(ids(1, 9, 4)));
    }

    #[test]
    fn tag_parse_roundtrip() {
        for idx in IndexType::all() {
            assert_eq!(idx.tag().parse::<IndexType>().unwrap(), *idx);
        }
        assert!("sop".parse::<IndexType>().is_err());
    }
}
