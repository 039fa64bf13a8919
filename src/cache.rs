// SPDX-License-Identifier: MIT
// Response cache: single-flight, TTL- and size-bounded storage for tool
// results and resource reads.
//
// Single-flight is a per-key in-flight map, not a global lock: the first
// caller for a key becomes the builder, later callers wait on a watch
// channel and observe the same outcome. Producer failures are shared with
// waiters and never stored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, trace};

// ─── Options ─────────────────────────────────────────────────────────────────

/// Eviction precedence, lowest first. `NeverRemove` entries are exempt from
/// capacity eviction (explicit removal and clear still apply).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
    NeverRemove,
}

/// At most one controlling expiry policy per entry.
#[derive(Debug, Clone, Copy)]
pub enum Expiry {
    /// Evict this long after creation, regardless of access.
    Absolute(Duration),
    /// Evict once the entry has been idle for this long.
    Sliding(Duration),
}

#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub priority: Priority,
    /// `None` uses the cache's default absolute expiration.
    pub expiry: Option<Expiry>,
    /// Declared size in bytes; `None` estimates from the serialized value.
    pub size: Option<u64>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Normal,
            expiry: None,
            size: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Absolute expiry elapsed.
    Expired,
    /// Sliding idle window elapsed.
    Unused,
    /// Explicit `remove`, pattern removal, or `clear`.
    Removed,
    /// Displaced to bring total size under the limit.
    Capacity,
    /// Overwritten by a newer value for the same key.
    Replaced,
}

/// Invoked after an entry leaves the cache. Runs outside the cache lock;
/// re-entering the cache from the callback is allowed.
pub type EvictCallback = Arc<dyn Fn(&str, EvictionReason) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache producer failed: {0}")]
    Producer(Arc<anyhow::Error>),
    #[error("invalid key pattern: {0}")]
    InvalidPattern(String),
    /// Pattern removal / clear on a backing that cannot enumerate keys.
    #[error("operation not supported by this cache backing")]
    Unsupported,
}

// ─── Internals ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum EntryExpiry {
    Absolute(Instant),
    Sliding(Duration),
}

struct Entry {
    value: Value,
    size: u64,
    priority: Priority,
    expiry: EntryExpiry,
    created_at: Instant,
    last_access: Instant,
    on_evict: Option<EvictCallback>,
}

impl Entry {
    fn expiry_reason(&self, now: Instant) -> Option<EvictionReason> {
        match self.expiry {
            EntryExpiry::Absolute(deadline) if now >= deadline => Some(EvictionReason::Expired),
            EntryExpiry::Sliding(window) if now.duration_since(self.last_access) >= window => {
                Some(EvictionReason::Unused)
            }
            _ => None,
        }
    }
}

type BuildOutcome = Result<Value, Arc<anyhow::Error>>;

struct State {
    entries: HashMap<String, Entry>,
    total_size: u64,
    in_flight: HashMap<String, watch::Receiver<Option<BuildOutcome>>>,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    unused: AtomicU64,
    removed: AtomicU64,
    capacity: AtomicU64,
    replaced: AtomicU64,
}

impl Counters {
    fn record_eviction(&self, reason: EvictionReason) {
        let counter = match reason {
            EvictionReason::Expired => &self.expired,
            EvictionReason::Unused => &self.unused,
            EvictionReason::Removed => &self.removed,
            EvictionReason::Capacity => &self.capacity,
            EvictionReason::Replaced => &self.replaced,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time statistics snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub evicted_expired: u64,
    pub evicted_unused: u64,
    pub evicted_removed: u64,
    pub evicted_capacity: u64,
    pub evicted_replaced: u64,
    pub hit_ratio: f64,
}

// ─── ResponseCache ───────────────────────────────────────────────────────────

pub struct ResponseCache {
    state: Mutex<State>,
    counters: Counters,
    size_limit: Option<u64>,
    compaction_margin: f64,
    default_ttl: Duration,
}

/// Deferred eviction callbacks, run after the state lock is released.
type PendingCallbacks = Vec<(EvictCallback, String, EvictionReason)>;

impl ResponseCache {
    pub fn new(size_limit: Option<u64>, compaction_margin: f64, default_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                entries: HashMap::new(),
                total_size: 0,
                in_flight: HashMap::new(),
            }),
            counters: Counters::default(),
            size_limit,
            compaction_margin: compaction_margin.clamp(0.0, 1.0),
            default_ttl,
        }
    }

    // ─── Lookup / store ─────────────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut pending = PendingCallbacks::new();
        let result = {
            let mut state = self.state.lock().unwrap();
            self.sweep_expired(&mut state, &mut pending);
            match state.entries.get_mut(key) {
                Some(entry) => {
                    entry.last_access = Instant::now();
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    Some(entry.value.clone())
                }
                None => {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    None
                }
            }
        };
        run_callbacks(pending);
        result
    }

    pub fn set(&self, key: &str, value: Value, options: CacheOptions) {
        self.set_with_callback(key, value, options, None);
    }

    pub fn set_with_callback(
        &self,
        key: &str,
        value: Value,
        options: CacheOptions,
        on_evict: Option<EvictCallback>,
    ) {
        let mut pending = PendingCallbacks::new();
        {
            let mut state = self.state.lock().unwrap();
            self.sweep_expired(&mut state, &mut pending);
            self.store_locked(&mut state, key, value, &options, on_evict, &mut pending);
        }
        run_callbacks(pending);
    }

    /// Single-flight lookup-or-build.
    ///
    /// For a given key at most one producer runs at a time; concurrent
    /// callers for the same key observe the producer's outcome. On failure
    /// nothing is stored and every waiter receives the same error.
    pub async fn get_or_compute<F>(
        &self,
        key: &str,
        options: CacheOptions,
        producer: F,
    ) -> Result<Value, CacheError>
    where
        F: std::future::Future<Output = anyhow::Result<Value>>,
    {
        enum Role {
            Hit(Value),
            Waiter(watch::Receiver<Option<BuildOutcome>>),
            Leader(watch::Sender<Option<BuildOutcome>>),
        }

        // One retry loop: a waiter whose leader vanished (dropped without
        // publishing) circles back and may become the leader itself.
        let mut producer = Some(producer);
        loop {
            let role = {
                let mut pending = PendingCallbacks::new();
                let mut state = self.state.lock().unwrap();
                self.sweep_expired(&mut state, &mut pending);
                let role = if let Some(entry) = state.entries.get_mut(key) {
                    entry.last_access = Instant::now();
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    Role::Hit(entry.value.clone())
                } else if let Some(rx) = state.in_flight.get(key) {
                    Role::Waiter(rx.clone())
                } else {
                    let (tx, rx) = watch::channel(None);
                    state.in_flight.insert(key.to_string(), rx);
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    Role::Leader(tx)
                };
                drop(state);
                run_callbacks(pending);
                role
            };

            match role {
                Role::Hit(value) => return Ok(value),
                Role::Leader(tx) => {
                    // If this future is dropped mid-build, the guard clears
                    // the placeholder so waiters can elect a new leader.
                    let mut guard = FlightGuard {
                        cache: self,
                        key,
                        armed: true,
                    };
                    let fut = producer.take().expect("leader runs the producer once");
                    let outcome: BuildOutcome = fut.await.map_err(Arc::new);

                    let mut pending = PendingCallbacks::new();
                    {
                        let mut state = self.state.lock().unwrap();
                        state.in_flight.remove(key);
                        if let Ok(value) = &outcome {
                            self.store_locked(
                                &mut state,
                                key,
                                value.clone(),
                                &options,
                                None,
                                &mut pending,
                            );
                        }
                    }
                    guard.armed = false;
                    run_callbacks(pending);
                    let _ = tx.send(Some(outcome.clone()));
                    return outcome.map_err(CacheError::Producer);
                }
                Role::Waiter(mut rx) => {
                    loop {
                        let published = rx.borrow_and_update().clone();
                        if let Some(outcome) = published {
                            return match outcome {
                                Ok(value) => {
                                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                                    Ok(value)
                                }
                                Err(err) => Err(CacheError::Producer(err)),
                            };
                        }
                        if rx.changed().await.is_err() {
                            // Leader dropped without publishing; retry.
                            break;
                        }
                    }
                    if producer.is_none() {
                        // We already ran the producer once; not reachable,
                        // but do not loop forever if it ever is.
                        return Err(CacheError::Producer(Arc::new(anyhow::anyhow!(
                            "cache builder abandoned"
                        ))));
                    }
                }
            }
        }
    }

    // ─── Removal ────────────────────────────────────────────────────────────

    pub fn remove(&self, key: &str) -> bool {
        let mut pending = PendingCallbacks::new();
        let removed = {
            let mut state = self.state.lock().unwrap();
            self.evict_locked(&mut state, key, EvictionReason::Removed, &mut pending)
        };
        run_callbacks(pending);
        removed
    }

    /// Remove every key matching the glob `pattern` (`*` any substring, `?`
    /// one character, anchored to the full key). Returns the removal count.
    pub fn remove_by_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let regex =
            glob_to_regex(pattern).map_err(|e| CacheError::InvalidPattern(e.to_string()))?;

        let mut pending = PendingCallbacks::new();
        let removed = {
            let mut state = self.state.lock().unwrap();
            let keys: Vec<String> = state
                .entries
                .keys()
                .filter(|k| regex.is_match(k))
                .cloned()
                .collect();
            for key in &keys {
                self.evict_locked(&mut state, key, EvictionReason::Removed, &mut pending);
            }
            keys.len()
        };
        run_callbacks(pending);
        Ok(removed)
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        let mut pending = PendingCallbacks::new();
        {
            let mut state = self.state.lock().unwrap();
            let keys: Vec<String> = state.entries.keys().cloned().collect();
            for key in &keys {
                self.evict_locked(&mut state, key, EvictionReason::Removed, &mut pending);
            }
        }
        run_callbacks(pending);
        Ok(())
    }

    // ─── Statistics ─────────────────────────────────────────────────────────

    pub fn stats(&self) -> CacheStats {
        let (entries, total_size) = {
            let state = self.state.lock().unwrap();
            (state.entries.len(), state.total_size)
        };
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let expired = self.counters.expired.load(Ordering::Relaxed);
        let unused = self.counters.unused.load(Ordering::Relaxed);
        let removed = self.counters.removed.load(Ordering::Relaxed);
        let capacity = self.counters.capacity.load(Ordering::Relaxed);
        let replaced = self.counters.replaced.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            entries,
            total_size,
            hits,
            misses,
            evictions: expired + unused + removed + capacity + replaced,
            evicted_expired: expired,
            evicted_unused: unused,
            evicted_removed: removed,
            evicted_capacity: capacity,
            evicted_replaced: replaced,
            hit_ratio: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    // ─── Locked helpers ─────────────────────────────────────────────────────

    fn store_locked(
        &self,
        state: &mut State,
        key: &str,
        value: Value,
        options: &CacheOptions,
        on_evict: Option<EvictCallback>,
        pending: &mut PendingCallbacks,
    ) {
        let now = Instant::now();
        let size = options
            .size
            .unwrap_or_else(|| estimate_size(&value));

        if let Some(limit) = self.size_limit {
            if size > limit {
                debug!(key, size, limit, "cache entry larger than the size limit — not stored");
                return;
            }
        }

        // Overwriting an existing key evicts the old value first.
        if state.entries.contains_key(key) {
            self.evict_locked(state, key, EvictionReason::Replaced, pending);
        }

        if let Some(limit) = self.size_limit {
            if state.total_size + size > limit {
                let target =
                    ((limit as f64) * (1.0 - self.compaction_margin)).floor() as u64;
                self.compact_locked(state, size, target, pending);
                // Only NeverRemove entries left and still no room: the size
                // bound holds, the new value goes uncached.
                if state.total_size + size > limit {
                    debug!(key, size, "cache full of pinned entries — not storing");
                    return;
                }
            }
        }

        let expiry = match options.expiry.unwrap_or(Expiry::Absolute(self.default_ttl)) {
            Expiry::Absolute(ttl) => EntryExpiry::Absolute(now + ttl),
            Expiry::Sliding(window) => EntryExpiry::Sliding(window),
        };

        state.total_size += size;
        state.entries.insert(
            key.to_string(),
            Entry {
                value,
                size,
                priority: options.priority,
                expiry,
                created_at: now,
                last_access: now,
                on_evict,
            },
        );
        trace!(key, size, "cache store");
    }

    /// Evict ascending (priority, last-access) until the incoming entry fits
    /// under `target`. `NeverRemove` entries are never chosen; if only those
    /// remain the loop stops and the insert proceeds best-effort.
    fn compact_locked(
        &self,
        state: &mut State,
        incoming: u64,
        target: u64,
        pending: &mut PendingCallbacks,
    ) {
        while state.total_size + incoming > target {
            let victim = state
                .entries
                .iter()
                .filter(|(_, e)| e.priority != Priority::NeverRemove)
                .min_by(|a, b| {
                    (a.1.priority, a.1.last_access).cmp(&(b.1.priority, b.1.last_access))
                })
                .map(|(k, _)| k.clone());
            match victim {
                Some(key) => {
                    self.evict_locked(state, &key, EvictionReason::Capacity, pending);
                }
                None => break,
            }
        }
    }

    fn sweep_expired(&self, state: &mut State, pending: &mut PendingCallbacks) {
        let now = Instant::now();
        let expired: Vec<(String, EvictionReason)> = state
            .entries
            .iter()
            .filter_map(|(k, e)| e.expiry_reason(now).map(|r| (k.clone(), r)))
            .collect();
        for (key, reason) in expired {
            self.evict_locked(state, &key, reason, pending);
        }
    }

    fn evict_locked(
        &self,
        state: &mut State,
        key: &str,
        reason: EvictionReason,
        pending: &mut PendingCallbacks,
    ) -> bool {
        match state.entries.remove(key) {
            Some(entry) => {
                state.total_size -= entry.size;
                self.counters.record_eviction(reason);
                if let Some(cb) = entry.on_evict {
                    pending.push((cb, key.to_string(), reason));
                }
                trace!(key, ?reason, "cache evict");
                true
            }
            None => false,
        }
    }
}

fn run_callbacks(pending: PendingCallbacks) {
    for (cb, key, reason) in pending {
        cb(&key, reason);
    }
}

fn estimate_size(value: &Value) -> u64 {
    serde_json::to_string(value).map(|s| s.len() as u64).unwrap_or(0)
}

/// Translate a glob (`*` / `?`) into an anchored regex.
fn glob_to_regex(pattern: &str) -> Result<regex::Regex, regex::Error> {
    let escaped = regex::escape(pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    regex::Regex::new(&format!("^{escaped}$"))
}

struct FlightGuard<'a> {
    cache: &'a ResponseCache,
    key: &'a str,
    armed: bool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.cache.state.lock().unwrap();
            state.in_flight.remove(self.key);
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
