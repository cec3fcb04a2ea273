//! Memoizing wrapper for independence tests.
//!
//! The adjacency search, possible-d-sep and bootstrap reruns ask the same
//! question many times. [`CachedTest`] remembers conclusive answers in a
//! bounded LRU cache shared by all worker threads.
//!
//! ## Cache Key Design
//!
//! The key hashes the unordered pair `{x, y}` and the sorted conditioning
//! set, so `x _||_ y | {a, b}` and `y _||_ x | {b, a}` share one entry.
//! Each entry also stores its normalized query, and a hit only counts when
//! the stored query equals the asked one. Inconclusive answers are never
//! cached.

use lru::LruCache;
use parking_lot::RwLock;
use std::hash::Hasher;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use xxhash_rust::xxh64::Xxh64;

use crate::types::{Node, NodeId, ValueKind};
use super::{IndependenceTest, OracleError, TestOutcome};

/// One test query in normal form: ordered pair, sorted conditioning set.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TestQuery {
    pair: (NodeId, NodeId),
    conditioning: Vec<NodeId>,
}

impl TestQuery {
    fn new(x: NodeId, y: NodeId, z: &[NodeId]) -> Self {
        let pair = if x <= y { (x, y) } else { (y, x) };
        let mut conditioning = z.to_vec();
        conditioning.sort();
        Self { pair, conditioning }
    }

    fn digest(&self) -> u64 {
        let mut hasher = Xxh64::new(0);
        hasher.write_u32(self.pair.0.index() as u32);
        hasher.write_u32(self.pair.1.index() as u32);
        hasher.write_u32(self.conditioning.len() as u32);
        for node in &self.conditioning {
            hasher.write_u32(node.index() as u32);
        }
        hasher.finish()
    }
}

/// Cached outcome with the query it answers, checked on every hit.
#[derive(Debug, Clone)]
struct CacheEntry {
    query: TestQuery,
    outcome: TestOutcome,
}

/// Independence test with an LRU cache in front.
///
/// Thread-safe; lookups take a read lock and only inserts take the write lock.
pub struct CachedTest<T> {
    inner: T,
    cache: Option<RwLock<LruCache<u64, CacheEntry>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: IndependenceTest> CachedTest<T> {
    /// Wrap `inner` with a cache of `max_entries` (0 disables caching).
    pub fn new(inner: T, max_entries: usize) -> Self {
        let cache = NonZeroUsize::new(max_entries).map(|size| RwLock::new(LruCache::new(size)));
        Self {
            inner,
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The wrapped test.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Get cache statistics.
    ///
    /// Returns `None` if caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| {
            let cache = cache.read();
            CacheStats {
                len: cache.len(),
                cap: cache.cap().get(),
                hits: self.hits.load(Ordering::Relaxed),
                misses: self.misses.load(Ordering::Relaxed),
            }
        })
    }

    /// Clear the cache.
    ///
    /// Does nothing if caching is disabled.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.write().clear();
        }
    }
}

impl<T: IndependenceTest> IndependenceTest for CachedTest<T> {
    fn variables(&self) -> &[Node] {
        self.inner.variables()
    }

    fn test(&self, x: NodeId, y: NodeId, z: &[NodeId]) -> Result<TestOutcome, OracleError> {
        let Some(cache) = &self.cache else {
            return self.inner.test(x, y, z);
        };

        let query = TestQuery::new(x, y, z);
        let digest = query.digest();
        let cached = cache
            .read()
            .peek(&digest)
            .filter(|entry| entry.query == query)
            .map(|entry| entry.outcome);
        if let Some(outcome) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(outcome);
        }

        // Digest collisions fall through and replace the older entry
        self.misses.fetch_add(1, Ordering::Relaxed);
        let outcome = self.inner.test(x, y, z)?;
        cache.write().put(digest, CacheEntry { query, outcome });
        Ok(outcome)
    }

    fn accepts(&self, kind: ValueKind) -> bool {
        self.inner.accepts(kind)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of entries in the cache.
    pub len: usize,
    /// Maximum capacity of the cache.
    pub cap: usize,
    /// Queries answered from the cache.
    pub hits: u64,
    /// Queries passed to the wrapped test.
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    // ─── Test Helpers ───

    struct CountingTest {
        variables: Vec<Node>,
        calls: AtomicUsize,
        inconclusive: bool,
    }

    impl CountingTest {
        fn new(inconclusive: bool) -> Self {
            Self {
                variables: vec![Node::measured("A"), Node::measured("B"), Node::measured("C")],
                calls: AtomicUsize::new(0),
                inconclusive,
            }
        }
    }

    impl IndependenceTest for CountingTest {
        fn variables(&self) -> &[Node] {
            &self.variables
        }

        fn test(&self, _x: NodeId, _y: NodeId, z: &[NodeId]) -> Result<TestOutcome, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.inconclusive {
                return Err(OracleError::Inconclusive("singular".into()));
            }
            Ok(TestOutcome { independent: !z.is_empty(), statistic: Some(0.5) })
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn id(i: usize) -> NodeId {
        NodeId::new(i)
    }

    // ─── Tests ───

    #[test]
    fn test_cache_hit_on_symmetric_query() {
        let cached = CachedTest::new(CountingTest::new(false), 16);
        let first = cached.test(id(0), id(1), &[id(2)]).unwrap();
        let second = cached.test(id(1), id(0), &[id(2)]).unwrap();

        assert_eq!(first, second);
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 1);
        let stats = cached.cache_stats().unwrap();
        assert_eq!((stats.hits, stats.misses, stats.len), (1, 1, 1));
    }

    #[test]
    fn test_conditioning_order_irrelevant() {
        let a = TestQuery::new(id(0), id(1), &[id(2), id(3)]);
        let b = TestQuery::new(id(1), id(0), &[id(3), id(2)]);
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());

        let c = TestQuery::new(id(0), id(2), &[id(1)]);
        assert_ne!(TestQuery::new(id(0), id(1), &[id(2)]), c);
        assert_ne!(TestQuery::new(id(0), id(1), &[id(2)]).digest(), c.digest());
    }

    #[test]
    fn test_colliding_digest_not_served() {
        let cached = CachedTest::new(CountingTest::new(false), 16);
        let asked = TestQuery::new(id(0), id(1), &[]);
        let stranger = CacheEntry {
            query: TestQuery::new(id(0), id(2), &[id(1)]),
            outcome: TestOutcome { independent: true, statistic: None },
        };
        if let Some(cache) = &cached.cache {
            cache.write().put(asked.digest(), stranger);
        }

        let outcome = cached.test(id(0), id(1), &[]).unwrap();
        assert!(!outcome.independent);
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 1);
        let stats = cached.cache_stats().unwrap();
        assert_eq!((stats.hits, stats.misses, stats.len), (0, 1, 1));

        // The real answer replaced the colliding entry
        assert!(!cached.test(id(1), id(0), &[]).unwrap().independent);
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inconclusive_not_cached() {
        let cached = CachedTest::new(CountingTest::new(true), 16);
        assert!(cached.test(id(0), id(1), &[]).is_err());
        assert!(cached.test(id(0), id(1), &[]).is_err());
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 2);
        assert_eq!(cached.cache_stats().unwrap().len, 0);
    }

    #[test]
    fn test_cache_disabled() {
        let cached = CachedTest::new(CountingTest::new(false), 0);
        cached.test(id(0), id(1), &[]).unwrap();
        cached.test(id(0), id(1), &[]).unwrap();
        assert!(cached.cache_stats().is_none());
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_clear() {
        let cached = CachedTest::new(CountingTest::new(false), 16);
        cached.test(id(0), id(1), &[]).unwrap();
        cached.clear_cache();
        assert_eq!(cached.cache_stats().unwrap().len, 0);
    }
}
