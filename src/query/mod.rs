//! Lazy predicate queries over table databases.
//!
//! A [`Query`] is an immutable description of a search: conditions, an
//! ordering and optionally a metasearch tree of other queries' conditions.
//! Building one never touches the network. Evaluation methods take the
//! [`Session`] to run on and compile the query into a single
//! [`SearchRequest`].
//!
//! # Caching
//!
//! Index and slice access realize the ordered key list once and then fetch
//! values in chunks (see [`ResultCache`]). `count`, `columns`, `hint` and
//! `delete` are never cached and always run a fresh search.
//!
//! # Example
//!
//! ```no_run
//! use tyrant::{Tyrant, SessionConfig};
//!
//! # fn main() -> Result<(), tyrant::TyrantError> {
//! let mut db = Tyrant::connect(&SessionConfig::default())?;
//! let cheap = db.query().filter("price__lt", 3).order_by("-price");
//! for record in cheap.iter(db.session_mut()) {
//!     let (key, value) = record?;
//!     println!("{key}: {value:?}");
//! }
//! # Ok(())
//! # }
//! ```
pub mod cache;
mod condition;
pub mod lookup;
mod ordering;

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    io::{Read, Write},
    num::NonZeroUsize,
    ops::{Bound, RangeBounds},
    sync::Arc,
};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::{
    TyrantError,
    codec::{Value, ValueCodec},
    protocol::{SearchMode, SearchRequest, Session},
};

pub use cache::{CHUNK_SIZE, Items, Record, RecordSource, ResultCache};
pub use condition::{Condition, Expression, Scalar};
pub use ordering::{Direction, Ordering, SortMethod};
pub use crate::protocol::{OrderType, PreparedCondition, SetOperation};

/// Conditions of other queries grafted onto this one, combined with a single
/// set operation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaSearch {
    operation: SetOperation,
    branches: Vec<Vec<Condition>>,
}

impl MetaSearch {
    pub fn operation(&self) -> SetOperation {
        self.operation
    }

    pub fn branches(&self) -> &[Vec<Condition>] {
        &self.branches
    }
}

/// Iterator returned by [`Query::iter`] and [`Query::items`].
pub type QueryItems<'a, S> = Items<QuerySource<'a, S>>;

#[derive(Debug, Clone)]
pub struct Query {
    codec: ValueCodec,
    conditions: Vec<Condition>,
    ordering: Ordering,
    metasearch: Option<MetaSearch>,
    cache: Arc<Mutex<ResultCache>>,
}

impl Query {
    /// A query matching every record, decoding values with `codec`.
    pub fn new(codec: ValueCodec) -> Self {
        Self {
            codec,
            conditions: Vec::new(),
            ordering: Ordering::default(),
            metasearch: None,
            cache: Arc::new(Mutex::new(ResultCache::default())),
        }
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn ordering(&self) -> &Ordering {
        &self.ordering
    }

    pub fn metasearch(&self) -> Option<&MetaSearch> {
        self.metasearch.as_ref()
    }

    pub fn chunk_size(&self) -> NonZeroUsize {
        self.cache.lock().chunk_size()
    }

    /// Same query with its own empty cache.
    fn derive(&self) -> Self {
        Self {
            cache: Arc::new(Mutex::new(ResultCache::new(self.chunk_size()))),
            ..self.clone()
        }
    }

    /// Adds `column__lookup = expression`, e.g. `filter("price__gt", 1)`.
    pub fn filter(&self, lookup: &str, expression: impl Into<Expression>) -> Self {
        self.filter_by(Condition::new(lookup, expression))
    }

    /// Adds the negation of `column__lookup = expression`.
    pub fn exclude(&self, lookup: &str, expression: impl Into<Expression>) -> Self {
        self.exclude_by(Condition::new(lookup, expression))
    }

    pub fn filter_by(&self, condition: Condition) -> Self {
        let mut query = self.derive();
        query.conditions.push(condition);
        query
    }

    /// Adds `condition` with its negation flipped, so excluding an already
    /// negated condition filters by the positive test.
    pub fn exclude_by(&self, condition: Condition) -> Self {
        self.filter_by(condition.negated())
    }

    /// Replaces the ordering. Accepts `"name"`, `"-name"` or an [`Ordering`].
    ///
    /// Results already cached are kept when the new ordering equals the
    /// current one.
    pub fn order_by(&self, ordering: impl Into<Ordering>) -> Self {
        let ordering = ordering.into();
        if ordering == self.ordering {
            return self.clone();
        }
        let mut query = self.derive();
        query.ordering = ordering;
        query
    }

    /// Same query with a fresh cache fetching `size` records per batch.
    pub fn with_chunk_size(&self, size: NonZeroUsize) -> Self {
        Self {
            cache: Arc::new(Mutex::new(ResultCache::new(size))),
            ..self.clone()
        }
    }

    /// Records matched by this query or by `other`.
    pub fn union(&self, other: &Query) -> Result<Query, TyrantError> {
        self.graft(other, SetOperation::Union)
    }

    /// Records matched by both this query and `other`.
    pub fn intersect(&self, other: &Query) -> Result<Query, TyrantError> {
        self.graft(other, SetOperation::Intersect)
    }

    /// Records matched by this query and not by `other`.
    pub fn minus(&self, other: &Query) -> Result<Query, TyrantError> {
        self.graft(other, SetOperation::Difference)
    }

    /// Only `other`'s conditions travel; its ordering and metasearch do not.
    fn graft(&self, other: &Query, operation: SetOperation) -> Result<Query, TyrantError> {
        if let Some(existing) = self.metasearch.as_ref().filter(|m| m.operation != operation) {
            return Err(TyrantError::Composition {
                existing: existing.operation,
                requested: operation,
            });
        }

        let mut query = self.derive();
        query
            .metasearch
            .get_or_insert_with(|| MetaSearch {
                operation,
                branches: Vec::new(),
            })
            .branches
            .push(other.conditions.clone());
        Ok(query)
    }

    /// Compiles the query. Lookups and expressions are validated here, so a
    /// bad condition never reaches the server.
    pub fn search_request(&self) -> Result<SearchRequest, TyrantError> {
        let mut request = SearchRequest::new(prepare_all(&self.conditions)?);
        if let Some(column) = self.ordering.column() {
            request = request.order(column, self.ordering.order_type());
        }
        if let Some(meta) = &self.metasearch {
            let branches = meta
                .branches
                .iter()
                .map(|branch| prepare_all(branch))
                .collect::<Result<Vec<_>, _>>()?;
            request = request.metasearch(meta.operation, branches);
        }
        debug!(
            "compiled query: {} conditions, ordered: {}, {} metasearch branches",
            request.conditions.len(),
            self.ordering.is_set(),
            self.metasearch.as_ref().map_or(0, |m| m.branches.len())
        );
        Ok(request)
    }

    fn source<'a, S: Read + Write>(&'a self, session: &'a mut Session<S>) -> QuerySource<'a, S> {
        QuerySource {
            query: self,
            session,
        }
    }

    /// The ordered primary keys of every match.
    pub fn keys<S: Read + Write>(
        &self,
        session: &mut Session<S>,
    ) -> Result<Vec<String>, TyrantError> {
        let mut source = self.source(session);
        Ok(self.cache.lock().keys(&mut source)?.to_vec())
    }

    /// Number of matches, from the cached key list.
    pub fn len<S: Read + Write>(&self, session: &mut Session<S>) -> Result<usize, TyrantError> {
        let mut source = self.source(session);
        Ok(self.cache.lock().keys(&mut source)?.len())
    }

    pub fn is_empty<S: Read + Write>(&self, session: &mut Session<S>) -> Result<bool, TyrantError> {
        Ok(self.len(session)? == 0)
    }

    pub fn contains<S: Read + Write>(
        &self,
        session: &mut Session<S>,
        key: &str,
    ) -> Result<bool, TyrantError> {
        let mut source = self.source(session);
        Ok(self.cache.lock().keys(&mut source)?.iter().any(|k| k == key))
    }

    /// The record at `index`.
    pub fn get<S: Read + Write>(
        &self,
        session: &mut Session<S>,
        index: usize,
    ) -> Result<Record, TyrantError> {
        let mut source = self.source(session);
        self.cache.lock().item(index, &mut source)
    }

    pub fn first<S: Read + Write>(
        &self,
        session: &mut Session<S>,
    ) -> Result<Option<Record>, TyrantError> {
        match self.get(session, 0) {
            Ok(record) => Ok(Some(record)),
            Err(TyrantError::IndexOutOfRange(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Records in `range`. Empty or reversed bounded ranges are rejected.
    pub fn slice<S, B>(
        &self,
        session: &mut Session<S>,
        range: B,
    ) -> Result<Vec<Record>, TyrantError>
    where
        S: Read + Write,
        B: RangeBounds<usize>,
    {
        self.items(session, range)?.collect()
    }

    /// Lazy sequence over the records in `range`.
    pub fn items<'a, S, B>(
        &'a self,
        session: &'a mut Session<S>,
        range: B,
    ) -> Result<QueryItems<'a, S>, TyrantError>
    where
        S: Read + Write,
        B: RangeBounds<usize>,
    {
        let (start, stop) = bounds(&range)?;
        Ok(Items::new(self.cache.clone(), self.source(session), start, stop))
    }

    /// Lazy sequence over every record.
    pub fn iter<'a, S: Read + Write>(&'a self, session: &'a mut Session<S>) -> QueryItems<'a, S> {
        Items::new(self.cache.clone(), self.source(session), 0, None)
    }

    /// Number of matches, counted by the server.
    pub fn count<S: Read + Write>(&self, session: &mut Session<S>) -> Result<u64, TyrantError> {
        let request = self.search_request()?.mode(SearchMode::Count);
        let reply = session.search(&request)?;
        let first = reply
            .first()
            .ok_or_else(|| TyrantError::Malformed("count search returned nothing".to_string()))?;
        std::str::from_utf8(first)
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .ok_or_else(|| {
                TyrantError::Malformed(format!(
                    "count search returned {:?}",
                    String::from_utf8_lossy(first)
                ))
            })
    }

    /// Matches with only the named columns, filtered by the server. Primary
    /// keys are not included. No names, or a `*`, fetches whole records.
    pub fn columns<S: Read + Write>(
        &self,
        session: &mut Session<S>,
        names: &[&str],
    ) -> Result<Vec<Value>, TyrantError> {
        if names.is_empty() || names.contains(&"*") {
            return Ok(self
                .slice(session, ..)?
                .into_iter()
                .map(|(_, value)| value)
                .collect());
        }
        let request = self.search_request()?.columns(names.iter().copied());
        session
            .search(&request)?
            .into_iter()
            .map(|raw| self.codec.decode(raw))
            .collect()
    }

    /// The server's description of how it ran the search. Runs the search
    /// again on every call.
    pub fn hint<S: Read + Write>(&self, session: &mut Session<S>) -> Result<String, TyrantError> {
        let request = self.search_request()?.mode(SearchMode::Hint);
        let mut reply = session.search(&request)?;
        let hint = reply
            .pop()
            .ok_or_else(|| TyrantError::Malformed("hint search returned nothing".to_string()))?;
        String::from_utf8(hint).map_err(|e| TyrantError::Malformed(format!("hint: {e}")))
    }

    /// Removes every match from the database.
    ///
    /// The delete reply does not say whether it succeeded, so unless `quick`
    /// is set a second search counts what is left: `Some(true)` when nothing
    /// matches anymore. `quick` skips that check and returns `None`.
    pub fn delete<S: Read + Write>(
        &self,
        session: &mut Session<S>,
        quick: bool,
    ) -> Result<Option<bool>, TyrantError> {
        let request = self.search_request()?.mode(SearchMode::Delete);
        session.search(&request)?;

        let chunk_size = self.chunk_size();
        *self.cache.lock() = ResultCache::new(chunk_size);

        if quick {
            return Ok(None);
        }
        Ok(Some(self.count(session)? == 0))
    }

    /// Distinct values of `column` among the matches, sorted.
    pub fn values<S: Read + Write>(
        &self,
        session: &mut Session<S>,
        column: &str,
    ) -> Result<Vec<String>, TyrantError> {
        let distinct: BTreeSet<String> = self
            .columns(session, &[column])?
            .into_iter()
            .filter_map(|value| value.into_table()?.remove(column))
            .collect();
        Ok(distinct.into_iter().collect())
    }

    /// How many matches carry each column.
    pub fn stat<S: Read + Write>(
        &self,
        session: &mut Session<S>,
    ) -> Result<BTreeMap<String, usize>, TyrantError> {
        let mut collected = BTreeMap::new();
        for record in self.iter(session) {
            let (_, value) = record?;
            if let Some(columns) = value.as_table() {
                for name in columns.keys() {
                    *collected.entry(name.clone()).or_insert(0) += 1;
                }
            }
        }
        Ok(collected)
    }
}

fn prepare_all(conditions: &[Condition]) -> Result<Vec<PreparedCondition>, TyrantError> {
    conditions.iter().map(Condition::prepare).collect()
}

fn bounds<B: RangeBounds<usize>>(range: &B) -> Result<(usize, Option<usize>), TyrantError> {
    let start = match range.start_bound() {
        Bound::Included(start) => *start,
        Bound::Excluded(start) => start.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let stop = match range.end_bound() {
        Bound::Included(end) => Some(end.saturating_add(1)),
        Bound::Excluded(end) => Some(*end),
        Bound::Unbounded => None,
    };
    if let Some(stop) = stop.filter(|stop| *stop <= start) {
        return Err(TyrantError::Value(format!(
            "empty slice {start}..{stop} is not supported"
        )));
    }
    Ok((start, stop))
}

/// Feeds a query's cache from a session: keys from the compiled search,
/// values through `mget`.
pub struct QuerySource<'a, S: Read + Write> {
    query: &'a Query,
    session: &'a mut Session<S>,
}

impl<S: Read + Write> RecordSource for QuerySource<'_, S> {
    fn fetch_keys(&mut self) -> Result<Vec<String>, TyrantError> {
        let request = self.query.search_request()?;
        self.session
            .search(&request)?
            .into_iter()
            .map(|key| {
                String::from_utf8(key).map_err(|e| {
                    TyrantError::Malformed(format!("search returned a non UTF-8 key: {e}"))
                })
            })
            .collect()
    }

    fn fetch_records(&mut self, keys: &[String]) -> Result<Vec<Record>, TyrantError> {
        let mut found: HashMap<Vec<u8>, Vec<u8>> = self.session.mget(keys)?.into_iter().collect();

        let mut records = Vec::with_capacity(found.len());
        for key in keys {
            match found.remove(key.as_bytes()) {
                Some(raw) => records.push((key.clone(), self.query.codec.decode(raw)?)),
                None => warn!("'{key}' disappeared between search and fetch"),
            }
        }
        Ok(records)
    }
}
