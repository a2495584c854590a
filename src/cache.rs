//! Content-addressed assessment cache
//!
//! Keys are SHA-256 digests of canonical JSON (object keys sorted at every
//! level), so logically equal data and contexts share an entry regardless of
//! key order. Entries expire `ttl` after creation. When the cache is full the
//! entry with the oldest `created_at` is evicted before the new one goes in;
//! lookups never refresh an entry's position.
//!
//! The whole get-or-compute runs under one mutex, so concurrent requests for
//! the same key compute once. A `compute` that calls back into the same cache
//! on the same thread gets its value computed without caching.

use crate::types::PersonalizationContext;
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Hex characters kept from a context signature digest
const SIGNATURE_LEN: usize = 16;

/// Serialize JSON with object keys sorted recursively
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hex SHA-256 of the given parts, separated so that part boundaries matter
pub fn content_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

fn context_value(context: &PersonalizationContext) -> Value {
    Value::Object(context.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

/// Cache key for one assessment: data plus the full effective context
pub fn assessment_key(data: &Value, context: &PersonalizationContext) -> String {
    content_hash(&[&canonical_json(data), &canonical_json(&context_value(context))])
}

/// Stable signature of a context's business attributes (overrides excluded)
pub fn context_signature(context: &PersonalizationContext) -> String {
    let business = Value::Object(context.business_attributes().into_iter().collect());
    let mut digest = content_hash(&[&canonical_json(&business)]);
    digest.truncate(SIGNATURE_LEN);
    digest
}

/// One cached value
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: T,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,

    /// Entries removed to make room
    pub evictions: u64,

    /// Entries found stale and recomputed
    pub expirations: u64,

    /// Current number of entries
    pub size: usize,

    /// Maximum number of entries
    pub capacity: usize,
}

struct CacheState<T> {
    entries: LruCache<String, CacheEntry<T>>,
    stats: CacheStats,
}

static NEXT_CACHE_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Ids of the caches whose lock this thread currently holds
    static HELD_CACHES: RefCell<Vec<usize>> = RefCell::new(Vec::new());
}

/// Marks a cache as held by the current thread until dropped
struct HeldMarker(usize);

impl HeldMarker {
    fn enter(id: usize) -> Self {
        HELD_CACHES.with(|held| held.borrow_mut().push(id));
        Self(id)
    }

    fn is_held(id: usize) -> bool {
        HELD_CACHES.with(|held| held.borrow().contains(&id))
    }
}

impl Drop for HeldMarker {
    fn drop(&mut self) {
        HELD_CACHES.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|id| *id == self.0) {
                held.remove(pos);
            }
        });
    }
}

/// TTL cache with bounded size and oldest-first eviction
pub struct AssessmentCache<T> {
    id: usize,
    state: Mutex<CacheState<T>>,
    ttl: Duration,
}

impl<T: Clone> AssessmentCache<T> {
    pub fn new(max_entries: usize, ttl_seconds: u64) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        // Saturates instead of overflowing for absurdly long TTLs
        let ttl = i64::try_from(ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        Self {
            id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                stats: CacheStats {
                    capacity: capacity.get(),
                    ..CacheStats::default()
                },
            }),
            ttl,
        }
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// The clock is read once the lock is held.
    pub fn get_or_compute<F>(&self, key: &str, compute: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.get_or_compute_with(key, Utc::now, compute)
    }

    /// [`Self::get_or_compute`] against a fixed clock
    pub fn get_or_compute_at<F>(&self, key: &str, now: DateTime<Utc>, compute: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.get_or_compute_with(key, move || now, compute)
    }

    fn get_or_compute_with<C, F>(&self, key: &str, clock: C, compute: F) -> T
    where
        C: FnOnce() -> DateTime<Utc>,
        F: FnOnce() -> T,
    {
        if HeldMarker::is_held(self.id) {
            warn!(
                "Re-entrant lookup of {} while computing; result is not cached",
                short(key)
            );
            return compute();
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let _held = HeldMarker::enter(self.id);
        let now = clock();

        // peek: a hit must not change eviction order
        let cached = state
            .entries
            .peek(key)
            .map(|entry| entry.is_valid(now).then(|| entry.value.clone()));
        match cached {
            Some(Some(value)) => {
                state.stats.hits += 1;
                debug!("Assessment cache hit for {}", short(key));
                return value;
            }
            Some(None) => {
                state.entries.pop(key);
                state.stats.expirations += 1;
                debug!("Assessment cache entry {} expired", short(key));
            }
            None => {}
        }
        state.stats.misses += 1;

        let value = compute();
        let entry = CacheEntry {
            key: key.to_string(),
            value: value.clone(),
            created_at: now,
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        if state.entries.len() >= state.entries.cap().get() && !state.entries.contains(key) {
            evict_oldest(&mut state);
        }
        state.entries.put(key.to_string(), entry);
        value
    }

    /// Whether `key` holds an unexpired entry
    pub fn contains(&self, key: &str) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .entries
            .peek(key)
            .map(|e| e.is_valid(Utc::now()))
            .unwrap_or(false)
    }

    /// Keys from oldest to newest `created_at`, ties in insertion order
    pub fn keys_by_age(&self) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<_> = state
            .entries
            .iter()
            .rev()
            .map(|(k, e)| (e.created_at, k.clone()))
            .collect();
        entries.sort_by_key(|(created_at, _)| *created_at);
        entries.into_iter().map(|(_, k)| k).collect()
    }

    /// Drop entries that have expired by `now`
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| !e.is_valid(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            state.entries.pop(key);
        }
        state.stats.expirations += expired.len() as u64;
        expired.len()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        CacheStats {
            size: state.entries.len(),
            ..state.stats
        }
    }
}

/// Remove the entry with the oldest `created_at`, the least recently inserted on ties
fn evict_oldest<T>(state: &mut CacheState<T>) {
    let oldest = state
        .entries
        .iter()
        .rev()
        .min_by_key(|(_, entry)| entry.created_at)
        .map(|(key, _)| key.clone());
    if let Some(key) = oldest {
        if let Some(evicted) = state.entries.pop(&key) {
            state.stats.evictions += 1;
            debug!(
                "Evicted assessment {} created at {}",
                short(&key),
                evicted.created_at
            );
        }
    }
}

fn short(key: &str) -> &str {
    match key.char_indices().nth(12) {
        Some((end, _)) => &key[..end],
        None => key,
    }
}
