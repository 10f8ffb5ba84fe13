//! Pattern queries: index selection, range scan, rehydration.
//!
//! A pattern resolves its bound URIs through the dictionary (an unknown
//! URI short-circuits to an empty result without interning anything),
//! selects the covering index, and streams the matching index keys back
//! into triples. All reads are snapshot reads: queries never participate
//! in conflict resolution, and dropping the stream mid-way abandons the
//! scan cleanly.

use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use tessella_core::{KeySpace, QueryPlan, Result, Triple, TriplePattern, UriId};
use tessella_kv::{range_stream, KeySelector, KvDatabase, KvTransaction};

use crate::dictionary::Dictionary;

/// Resolve one bound pattern component, or `None` for a wildcard.
///
/// The outer `Option` distinguishes "component not bound" from the inner
/// "bound URI unknown to the dictionary".
async fn resolve_component<T: KvTransaction>(
    dict: &Dictionary,
    tx: &T,
    component: Option<&str>,
) -> Result<Option<Option<UriId>>> {
    match component {
        None => Ok(Some(None)),
        Some(uri) => match dict.lookup_id(tx, uri, true).await? {
            Some(id) => Ok(Some(Some(id))),
            None => Ok(None),
        },
    }
}

/// Open a lazy stream of triples matching `pattern`.
pub(crate) async fn pattern_stream<D: KvDatabase>(
    db: &D,
    keys: Arc<KeySpace>,
    dict: Arc<Dictionary>,
    pattern: &TriplePattern,
) -> Result<BoxStream<'static, Result<Triple>>> {
    pattern.validate()?;
    let tx = db.create_transaction().await?;

    // A bound URI that was never interned cannot match anything.
    let Some(s) = resolve_component(&dict, &tx, pattern.s.as_deref()).await? else {
        return Ok(stream::empty().boxed());
    };
    let Some(p) = resolve_component(&dict, &tx, pattern.p.as_deref()).await? else {
        return Ok(stream::empty().boxed());
    };
    let Some(o) = resolve_component(&dict, &tx, pattern.o.as_deref()).await? else {
        return Ok(stream::empty().boxed());
    };

    let plan = QueryPlan::for_pattern(s, p, o);
    let index = plan.index;
    let object_filter = plan.object_filter;
    let (begin, end) = keys.index_range(index, &plan.prefix);
    tracing::trace!(%index, prefix = plan.prefix.len(), "pattern scan");

    let scan = range_stream(
        tx.clone(),
        KeySelector::first_greater_or_equal(begin),
        KeySelector::first_greater_or_equal(end),
        true,
    );

    Ok(scan
        .try_filter_map(move |kv| {
            let keys = Arc::clone(&keys);
            let dict = Arc::clone(&dict);
            let tx = tx.clone();
            async move {
                let ids = keys.decode_index_key(index, &kv.key)?;
                if let Some(required) = object_filter {
                    if ids.o != required {
                        return Ok(None);
                    }
                }
                let s = dict.lookup_uri(&tx, ids.s, true).await?;
                let p = dict.lookup_uri(&tx, ids.p, true).await?;
                let o = dict.lookup_uri(&tx, ids.o, true).await?;
                Ok(Some(Triple {
                    s: s.to_string(),
                    p: p.to_string(),
                    o: o.to_string(),
                }))
            }
        })
        .boxed())
}
