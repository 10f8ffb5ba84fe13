//! Triple - the unit of data in Tessella
//!
//! A triple is an ordered `(subject, predicate, object)` of URIs. URIs are
//! opaque non-empty UTF-8 strings; no syntactic validation beyond
//! non-emptiness is performed.

use crate::error::{Error, Result};
use std::fmt;

/// An RDF triple of URIs.
///
/// Immutable value type; equality is componentwise.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Triple {
    /// Subject URI
    pub s: String,
    /// Predicate URI
    pub p: String,
    /// Object URI
    pub o: String,
}

impl Triple {
    /// Construct a triple, rejecting empty components.
    pub fn new(
        s: impl Into<String>,
        p: impl Into<String>,
        o: impl Into<String>,
    ) -> Result<Self> {
        let t = Self {
            s: s.into(),
            p: p.into(),
            o: o.into(),
        };
        t.validate()?;
        Ok(t)
    }

    /// Check the non-emptiness invariant.
    pub fn validate(&self) -> Result<()> {
        if self.s.is_empty() {
            return Err(Error::invalid_uri("subject is empty"));
        }
        if self.p.is_empty() {
            return Err(Error::invalid_uri("predicate is empty"));
        }
        if self.o.is_empty() {
            return Err(Error::invalid_uri("object is empty"));
        }
        Ok(())
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> <{}> <{}>", self.s, self.p, self.o)
    }
}

/// A query pattern over triples.
///
/// Each component is either bound to a URI or a wildcard (`None`).
/// Use the builder constructors for the common shapes.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct TriplePattern {
    /// Subject to match, if bound
    pub s: Option<String>,
    /// Predicate to match, if bound
    pub p: Option<String>,
    /// Object to match, if bound
    pub o: Option<String>,
}

impl TriplePattern {
    /// Create a pattern from optional components.
    pub fn new(s: Option<String>, p: Option<String>, o: Option<String>) -> Self {
        Self { s, p, o }
    }

    /// Match everything (full scan).
    pub fn any() -> Self {
        Self::default()
    }

    /// Match a specific subject.
    pub fn subject(s: impl Into<String>) -> Self {
        Self {
            s: Some(s.into()),
            ..Default::default()
        }
    }

    /// Match a specific subject and predicate.
    pub fn subject_predicate(s: impl Into<String>, p: impl Into<String>) -> Self {
        Self {
            s: Some(s.into()),
            p: Some(p.into()),
            ..Default::default()
        }
    }

    /// Match a specific predicate.
    pub fn predicate(p: impl Into<String>) -> Self {
        Self {
            p: Some(p.into()),
            ..Default::default()
        }
    }

    /// Match a specific predicate and object.
    pub fn predicate_object(p: impl Into<String>, o: impl Into<String>) -> Self {
        Self {
            p: Some(p.into()),
            o: Some(o.into()),
            ..Default::default()
        }
    }

    /// Match a specific object.
    pub fn object(o: impl Into<String>) -> Self {
        Self {
            o: Some(o.into()),
            ..Default::default()
        }
    }

    /// Match one exact triple.
    pub fn exact(t: &Triple) -> Self {
        Self {
            s: Some(t.s.clone()),
            p: Some(t.p.clone()),
            o: Some(t.o.clone()),
        }
    }

    /// Reject bound-but-empty components.
    pub fn validate(&self) -> Result<()> {
        for (name, component) in [("subject", &self.s), ("predicate", &self.p), ("object", &self.o)]
        {
            if let Some(uri) = component {
                if uri.is_empty() {
                    return Err(Error::invalid_uri(format!("bound {name} is empty")));
                }
            }
        }
        Ok(())
    }

    /// Whether a triple satisfies this pattern.
    pub fn matches(&self, t: &Triple) -> bool {
        self.s.as_deref().is_none_or(|s| s == t.s)
            && self.p.as_deref().is_none_or(|p| p == t.p)
            && self.o.as_deref().is_none_or(|o| o == t.o)
    }
}
