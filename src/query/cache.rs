//! Chunked pagination over one query's results.
//!
//! The ordered key list is fetched once. Values are fetched on demand in
//! fixed-size chunks, each chunk with a single batched call, and kept for the
//! lifetime of the cache. Chunk `n` covers key indices
//! `n * size ..= n * size + size - 1`.
use std::{collections::HashMap, num::NonZeroUsize, sync::Arc};

use log::{debug, trace};
use parking_lot::Mutex;

use crate::{TyrantError, codec::Value};

/// Records fetched per round trip unless a query asks otherwise.
pub const CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(size) => size,
    None => panic!("chunk size must be non-zero"),
};

/// A primary key with its decoded value.
pub type Record = (String, Value);

/// Where a [`ResultCache`] gets its keys and values from.
pub trait RecordSource {
    /// The complete ordered key list of the result set.
    fn fetch_keys(&mut self) -> Result<Vec<String>, TyrantError>;

    /// Records for `keys`, in the same order. Keys that no longer exist are
    /// left out.
    fn fetch_records(&mut self, keys: &[String]) -> Result<Vec<Record>, TyrantError>;
}

impl<R: RecordSource + ?Sized> RecordSource for &mut R {
    fn fetch_keys(&mut self) -> Result<Vec<String>, TyrantError> {
        (**self).fetch_keys()
    }

    fn fetch_records(&mut self, keys: &[String]) -> Result<Vec<Record>, TyrantError> {
        (**self).fetch_records(keys)
    }
}

#[derive(Debug)]
pub struct ResultCache {
    keys: Option<Vec<String>>,
    chunks: HashMap<usize, Vec<Record>>,
    chunk_size: NonZeroUsize,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CHUNK_SIZE)
    }
}

impl ResultCache {
    pub fn new(chunk_size: NonZeroUsize) -> Self {
        Self {
            keys: None,
            chunks: HashMap::new(),
            chunk_size,
        }
    }

    pub fn chunk_size(&self) -> NonZeroUsize {
        self.chunk_size
    }

    /// The key list, fetching it on first use.
    pub fn keys<R: RecordSource>(&mut self, source: &mut R) -> Result<&[String], TyrantError> {
        if self.keys.is_none() {
            let keys = source.fetch_keys()?;
            debug!("result set holds {} keys", keys.len());
            self.keys = Some(keys);
        }
        Ok(self.keys.as_deref().unwrap_or_default())
    }

    /// Whether the key list has been fetched.
    pub fn is_realized(&self) -> bool {
        self.keys.is_some()
    }

    pub fn chunk_number(&self, index: usize) -> usize {
        index / self.chunk_size
    }

    /// First and last index (both inclusive) covered by chunk `number`.
    pub fn chunk_boundaries(&self, number: usize) -> (usize, usize) {
        let size = self.chunk_size.get();
        let start = number * size;
        (start, start + size - 1)
    }

    /// Records of chunk `number`, fetching them if needed. `None` when the
    /// chunk lies beyond the end of the key list.
    pub fn chunk<R: RecordSource>(
        &mut self,
        number: usize,
        source: &mut R,
    ) -> Result<Option<&[Record]>, TyrantError> {
        if !self.chunks.contains_key(&number) {
            let (start, stop) = self.chunk_boundaries(number);
            let keys = self.keys(source)?;
            if keys.len() <= start {
                return Ok(None);
            }
            let keys = &keys[start..keys.len().min(stop + 1)];
            let records = source.fetch_records(keys)?;
            debug!(
                "filled chunk {number} with {} of {} records",
                records.len(),
                keys.len()
            );
            self.chunks.insert(number, records);
        } else {
            trace!("chunk {number} served from cache");
        }
        Ok(self.chunks.get(&number).map(Vec::as_slice))
    }

    /// The record at `index` of the result set.
    pub fn item<R: RecordSource>(
        &mut self,
        index: usize,
        source: &mut R,
    ) -> Result<Record, TyrantError> {
        let number = self.chunk_number(index);
        let (start, _) = self.chunk_boundaries(number);
        self.chunk(number, source)?
            .and_then(|records| records.get(index - start))
            .cloned()
            .ok_or(TyrantError::IndexOutOfRange(index))
    }
}

/// Lazy forward sequence over `[start, stop)` of a cached result set.
///
/// The cache is locked only while a single record is produced, so holding an
/// `Items` does not block other users of the same cache between steps.
pub struct Items<R: RecordSource> {
    cache: Arc<Mutex<ResultCache>>,
    source: R,
    index: usize,
    stop: Option<usize>,
    finished: bool,
}

impl<R: RecordSource> Items<R> {
    /// `stop = None` reads to the end of the key list.
    pub fn new(
        cache: Arc<Mutex<ResultCache>>,
        source: R,
        start: usize,
        stop: Option<usize>,
    ) -> Self {
        Self {
            cache,
            source,
            index: start,
            stop,
            finished: false,
        }
    }

    fn advance(&mut self) -> Result<Option<Record>, TyrantError> {
        let mut cache = self.cache.lock();
        loop {
            if self.stop.is_some_and(|stop| self.index >= stop) {
                return Ok(None);
            }
            let number = cache.chunk_number(self.index);
            let (start, stop) = cache.chunk_boundaries(number);
            let Some(records) = cache.chunk(number, &mut self.source)? else {
                return Ok(None);
            };
            match records.get(self.index - start) {
                Some(record) => {
                    self.index += 1;
                    return Ok(Some(record.clone()));
                }
                // the chunk came back short; its remaining indices are empty
                None => self.index = stop + 1,
            }
        }
    }
}

impl<R: RecordSource> Iterator for Items<R> {
    type Item = Result<Record, TyrantError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serves `n` synthetic keys and counts how often each method is hit.
    struct Numbers {
        count: usize,
        key_fetches: usize,
        batches: Vec<usize>,
        missing: Option<String>,
    }

    impl Numbers {
        fn new(count: usize) -> Self {
            Self {
                count,
                key_fetches: 0,
                batches: Vec::new(),
                missing: None,
            }
        }
    }

    impl RecordSource for Numbers {
        fn fetch_keys(&mut self) -> Result<Vec<String>, TyrantError> {
            self.key_fetches += 1;
            Ok((0..self.count).map(|i| format!("k{i:05}")).collect())
        }

        fn fetch_records(&mut self, keys: &[String]) -> Result<Vec<Record>, TyrantError> {
            self.batches.push(keys.len());
            Ok(keys
                .iter()
                .filter(|k| self.missing.as_ref() != Some(*k))
                .map(|k| (k.clone(), Value::from(k.as_str())))
                .collect())
        }
    }

    fn sized(size: usize) -> ResultCache {
        ResultCache::new(NonZeroUsize::new(size).unwrap())
    }

    #[test]
    fn chunk_boundaries_partition_indices() {
        let cache = sized(10);
        assert_eq!(cache.chunk_boundaries(0), (0, 9));
        assert_eq!(cache.chunk_boundaries(1), (10, 19));
        assert_eq!(cache.chunk_number(5), 0);
        assert_eq!(cache.chunk_number(25), 2);

        for index in 0..100 {
            let (start, stop) = cache.chunk_boundaries(cache.chunk_number(index));
            assert!(start <= index && index <= stop);
        }
    }

    #[test]
    fn item_matches_full_sequence() {
        for size in [1, 3, 7, 50] {
            let shared = Arc::new(Mutex::new(sized(size)));
            let all: Vec<Record> = Items::new(shared, Numbers::new(23), 0, None)
                .collect::<Result<_, _>>()
                .unwrap();
            let mut source = Numbers::new(23);
            let mut cache = sized(size);

            assert_eq!(all.len(), 23);
            for (i, expected) in all.iter().enumerate() {
                assert_eq!(&cache.item(i, &mut source).unwrap(), expected);
            }
            assert_eq!(source.key_fetches, 1);
        }
    }

    #[test]
    fn populated_chunks_are_not_refetched() {
        let mut source = Numbers::new(30);
        let mut cache = sized(10);

        cache.item(3, &mut source).unwrap();
        cache.item(4, &mut source).unwrap();
        cache.item(12, &mut source).unwrap();
        assert_eq!(source.batches, vec![10, 10]);
    }

    #[test]
    fn out_of_range_index() {
        let mut source = Numbers::new(5);
        let mut cache = sized(10);

        assert!(matches!(
            cache.item(5, &mut source),
            Err(TyrantError::IndexOutOfRange(5))
        ));
        assert!(matches!(
            cache.item(40, &mut source),
            Err(TyrantError::IndexOutOfRange(40))
        ));
    }

    #[test]
    fn unbounded_range_fetches_each_chunk_once() {
        let shared = Arc::new(Mutex::new(sized(1000)));
        let mut source = Numbers::new(2500);

        let count = Items::new(shared.clone(), &mut source, 0, None).count();
        assert_eq!(count, 2500);
        assert_eq!(source.batches, vec![1000, 1000, 500]);

        let again = Items::new(shared, &mut source, 990, Some(1010)).count();
        assert_eq!(again, 20);
        assert_eq!(source.batches.len(), 3);
    }

    #[test]
    fn bounded_range_stops_early() {
        let shared = Arc::new(Mutex::new(sized(10)));
        let mut source = Numbers::new(100);

        let keys: Vec<String> = Items::new(shared, &mut source, 8, Some(12))
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec!["k00008", "k00009", "k00010", "k00011"]);
        assert_eq!(source.batches, vec![10, 10]);
    }

    #[test]
    fn vanished_key_shortens_its_chunk() {
        let shared = Arc::new(Mutex::new(sized(4)));
        let mut source = Numbers::new(8);
        source.missing = Some("k00001".to_string());

        let keys: Vec<String> = Items::new(shared, &mut source, 0, None)
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys.len(), 7);
        assert!(!keys.contains(&"k00001".to_string()));
    }
}
