use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::error::CoreError;

/// Refresh interval observed for the chain summary; also the base unit of
/// the idle-eviction policy.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(120_000);

// ==============================================================================
// Query Keys
// ==============================================================================

/// One parameter of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyParam {
    Int(u64),
    Text(String),
    List(Vec<String>),
}

impl From<u64> for KeyParam {
    fn from(n: u64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for KeyParam {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for KeyParam {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<String>> for KeyParam {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

impl std::fmt::Display for KeyParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(n) => n.fmt(f),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::List(items) => write!(f, "{items:?}"),
        }
    }
}

/// Cache address: an operation name plus its ordered parameters.
///
/// Two keys are equal iff the operation and every parameter are equal by
/// value, so requests differing in any parameter never share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    operation: Cow<'static, str>,
    params: Vec<KeyParam>,
}

impl QueryKey {
    pub fn new(operation: impl Into<Cow<'static, str>>) -> Self {
        Self {
            operation: operation.into(),
            params: Vec::new(),
        }
    }

    pub fn with(mut self, param: impl Into<KeyParam>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn params(&self) -> &[KeyParam] {
        &self.params
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.operation)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            param.fmt(f)?;
        }
        f.write_str(")")
    }
}

// ==============================================================================
// Query State
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// No fetch has settled yet.
    Pending,
    Fresh,
    /// The value is older than the entry's freshness window.
    Stale,
    /// The most recent fetch failed. A previous value may still be present.
    Error,
}

/// Snapshot of one cache entry as seen by a consumer.
#[derive(Debug, Clone)]
pub struct QueryState<V> {
    pub status: QueryStatus,
    pub data: Option<V>,
    pub error: Option<CoreError>,
    /// When `data` was last replaced by a successful fetch.
    pub fetched_at: Option<Instant>,
    /// A fetch for this key is currently in flight.
    pub is_fetching: bool,
}

impl<V> QueryState<V> {
    pub fn pending() -> Self {
        Self {
            status: QueryStatus::Pending,
            data: None,
            error: None,
            fetched_at: None,
            is_fetching: false,
        }
    }

    /// A settled value that never went through the cache.
    pub fn ready(data: V) -> Self {
        Self {
            status: QueryStatus::Fresh,
            data: Some(data),
            error: None,
            fetched_at: Some(Instant::now()),
            is_fetching: false,
        }
    }

    /// An error that never went through the cache (e.g. argument validation).
    pub fn failed(error: CoreError) -> Self {
        Self {
            status: QueryStatus::Error,
            data: None,
            error: Some(error),
            fetched_at: None,
            is_fetching: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Pending
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> QueryState<U> {
        QueryState {
            status: self.status,
            data: self.data.map(f),
            error: self.error,
            fetched_at: self.fetched_at,
            is_fetching: self.is_fetching,
        }
    }
}

// ==============================================================================
// Options and Configuration
// ==============================================================================

/// Per-key options supplied by the consumer.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    /// Re-fetch on this interval while at least one subscriber exists.
    pub poll_interval: Option<Duration>,
    /// Overrides [`CacheConfig::stale_after`] for this key.
    pub stale_after: Option<Duration>,
}

impl QueryOptions {
    pub fn polled(interval: Duration) -> Self {
        Self {
            poll_interval: Some(interval),
            stale_after: None,
        }
    }
}

/// Cache-wide settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub default_poll_interval: Duration,
    /// Age after which a `Fresh` value is reported as `Stale`.
    pub stale_after: Duration,
    /// An unobserved entry is evicted after this many poll intervals.
    pub evict_after_idle_cycles: u32,
    /// Upper bound on unobserved entries; the least recently used go first.
    pub max_idle_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_poll_interval: DEFAULT_POLL_INTERVAL,
            stale_after: DEFAULT_POLL_INTERVAL,
            evict_after_idle_cycles: 3,
            max_idle_entries: 512,
        }
    }
}

impl CacheConfig {
    fn idle_ttl(&self) -> Duration {
        self.default_poll_interval
            .saturating_mul(self.evict_after_idle_cycles)
    }
}

// ==============================================================================
// Fetchers
// ==============================================================================

/// Produces one fetch attempt for a key. Invoked once per network call.
pub type Fetcher<V> = Arc<dyn Fn() -> BoxFuture<'static, Result<V, CoreError>> + Send + Sync>;

/// Wrap an async closure as a [`Fetcher`].
pub fn fetcher<V, F, Fut>(f: F) -> Fetcher<V>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, CoreError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, CoreError>>>;

// ==============================================================================
// Cache
// ==============================================================================

struct Entry<V> {
    /// Distinguishes this entry from earlier ones under the same key that
    /// were evicted or disposed.
    generation: u64,
    /// `Pending`, `Fresh`, or `Error`; staleness is derived on read.
    status: QueryStatus,
    value: Option<V>,
    error: Option<CoreError>,
    fetched_at: Option<Instant>,
    in_flight: Option<(u64, SharedFetch<V>)>,
    fetcher: Fetcher<V>,
    options: QueryOptions,
    subscribers: usize,
    poller: Option<JoinHandle<()>>,
    changed: watch::Sender<u64>,
}

impl<V: Clone> Entry<V> {
    fn new(generation: u64, fetcher: Fetcher<V>, options: QueryOptions) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            generation,
            status: QueryStatus::Pending,
            value: None,
            error: None,
            fetched_at: None,
            in_flight: None,
            fetcher,
            options,
            subscribers: 0,
            poller: None,
            changed,
        }
    }

    fn effective_status(&self, now: Instant, default_stale_after: Duration) -> QueryStatus {
        let stale_after = self.options.stale_after.unwrap_or(default_stale_after);
        match (self.status, self.fetched_at) {
            (QueryStatus::Fresh, Some(at)) if now.saturating_duration_since(at) >= stale_after => {
                QueryStatus::Stale
            }
            (status, _) => status,
        }
    }

    fn snapshot(&self, now: Instant, default_stale_after: Duration) -> QueryState<V> {
        QueryState {
            status: self.effective_status(now, default_stale_after),
            data: self.value.clone(),
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            is_fetching: self.in_flight.is_some(),
        }
    }
}

struct State<V> {
    entries: HashMap<QueryKey, Entry<V>>,
    /// Entries with no subscribers, keyed to the instant they became idle.
    idle: LruCache<QueryKey, Instant>,
    next_fetch_id: u64,
    next_generation: u64,
}

impl<V: Clone> State<V> {
    fn insert_entry(
        &mut self,
        key: &QueryKey,
        fetcher: Fetcher<V>,
        options: QueryOptions,
    ) -> &mut Entry<V> {
        let next_generation = &mut self.next_generation;
        self.entries.entry(key.clone()).or_insert_with(|| {
            debug!(query = %key, "cache entry created");
            let generation = *next_generation;
            *next_generation += 1;
            Entry::new(generation, fetcher, options)
        })
    }
}

struct Inner<V> {
    config: CacheConfig,
    state: Mutex<State<V>>,
}

/// Keyed cache of in-flight and completed queries.
///
/// Cloning is cheap and yields a handle to the same cache. One entry exists
/// per distinct [`QueryKey`]; concurrent requests for a key share a single
/// in-flight fetch. Subscribed keys with a poll interval are re-fetched on a
/// timer until their last [`Subscription`] is dropped.
///
/// The state lock is never held across an `.await`. Operations that start a
/// fetch spawn onto the current tokio runtime and panic outside of one.
pub struct QueryCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for QueryCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> QueryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    entries: HashMap::new(),
                    idle: LruCache::unbounded(),
                    next_fetch_id: 0,
                    next_generation: 0,
                }),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Return the current state for `key` without waiting.
    ///
    /// Creates the entry and starts the first fetch when the key is new.
    /// An `Error` entry gets a fresh attempt; a `Stale` entry is refreshed in
    /// the background while its old value is returned.
    pub fn get(&self, key: QueryKey, fetcher: Fetcher<V>, options: QueryOptions) -> QueryState<V> {
        self.inner.acquire(key, fetcher, options).0
    }

    /// Like [`get`](Self::get), but waits for the in-flight fetch when the
    /// entry has no usable result yet (`Pending` or `Error`).
    pub async fn fetch(
        &self,
        key: QueryKey,
        fetcher: Fetcher<V>,
        options: QueryOptions,
    ) -> QueryState<V> {
        let (state, pending) = self.inner.acquire(key.clone(), fetcher, options);
        let Some(pending) = pending else {
            return state;
        };
        // The shared future records its result in the entry before it
        // resolves, so the snapshot below already reflects it.
        let _ = pending.await;
        self.peek(&key).unwrap_or(state)
    }

    /// Register a consumer of `key`, starting the poller when the options
    /// carry a poll interval. Dropping the subscription unregisters it.
    pub fn subscribe(
        &self,
        key: QueryKey,
        fetcher: Fetcher<V>,
        options: QueryOptions,
    ) -> Subscription<V> {
        let (generation, changes) = self.inner.subscribe(&key, fetcher, options);
        Subscription {
            inner: Arc::clone(&self.inner),
            key,
            generation,
            changes,
        }
    }

    /// Start a new fetch for an existing key even if one is in flight.
    /// Results are applied in completion order. Returns `false` for unknown keys.
    pub fn refetch(&self, key: &QueryKey) -> bool {
        let mut guard = self.inner.state.lock();
        self.inner.start_fetch(&mut guard, key).is_some()
    }

    /// Current state of `key`, if an entry exists. Never starts a fetch.
    pub fn peek(&self, key: &QueryKey) -> Option<QueryState<V>> {
        let state = self.inner.state.lock();
        state
            .entries
            .get(key)
            .map(|entry| entry.snapshot(Instant::now(), self.inner.config.stale_after))
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.inner.state.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every poller and drop every entry. Outstanding subscriptions see
    /// `changed()` return `None`; late fetch results are discarded.
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock();
        for (_, entry) in state.entries.drain() {
            if let Some(poller) = entry.poller {
                poller.abort();
            }
        }
        state.idle.clear();
        debug!("query cache disposed");
    }
}

impl<V> Inner<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn acquire(
        self: &Arc<Self>,
        key: QueryKey,
        fetcher: Fetcher<V>,
        options: QueryOptions,
    ) -> (QueryState<V>, Option<SharedFetch<V>>) {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let entry = state.insert_entry(&key, fetcher, options);
        let unobserved = entry.subscribers == 0;
        let idle_fetch = entry.in_flight.is_none();
        let status = entry.effective_status(now, self.config.stale_after);
        if unobserved {
            state.idle.put(key.clone(), now);
        }

        if idle_fetch && status != QueryStatus::Fresh {
            self.start_fetch(state, &key);
        }

        let entry = &state.entries[&key];
        let snapshot = entry.snapshot(now, self.config.stale_after);
        let wait = match status {
            QueryStatus::Pending | QueryStatus::Error => {
                entry.in_flight.as_ref().map(|(_, fetch)| fetch.clone())
            }
            QueryStatus::Fresh | QueryStatus::Stale => None,
        };

        self.sweep(state, now);
        (snapshot, wait)
    }

    fn subscribe(
        self: &Arc<Self>,
        key: &QueryKey,
        fetcher: Fetcher<V>,
        options: QueryOptions,
    ) -> (u64, watch::Receiver<u64>) {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        state.idle.pop(key);
        let entry = state.insert_entry(key, fetcher, options);
        entry.subscribers += 1;
        let generation = entry.generation;
        if options.poll_interval.is_some() {
            entry.options.poll_interval = options.poll_interval;
        }
        let changes = entry.changed.subscribe();
        let poll_interval = entry.options.poll_interval;

        match poll_interval {
            Some(period) if entry.poller.is_none() => {
                debug!(query = %key, period_ms = period.as_millis() as u64, "poller started");
                entry.poller = Some(self.spawn_poller(key.clone(), period));
            }
            Some(_) => {}
            None => {
                let status = entry.effective_status(now, self.config.stale_after);
                if entry.in_flight.is_none() && status != QueryStatus::Fresh {
                    self.start_fetch(state, key);
                }
            }
        }

        self.sweep(state, now);
        (generation, changes)
    }

    /// Drop one consumer of the entry it registered with. An entry created
    /// later under the same key is left alone.
    fn unsubscribe(&self, key: &QueryKey, generation: u64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(entry) = state
            .entries
            .get_mut(key)
            .filter(|entry| entry.generation == generation)
        else {
            return;
        };

        entry.subscribers = entry.subscribers.saturating_sub(1);
        if entry.subscribers == 0 {
            if let Some(poller) = entry.poller.take() {
                poller.abort();
                debug!(query = %key, "last subscriber left; poller stopped");
            }
            state.idle.put(key.clone(), Instant::now());
        }
    }

    fn spawn_poller(self: &Arc<Self>, key: QueryKey, period: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if !inner.poll_tick(&key) {
                    break;
                }
            }
        })
    }

    /// One scheduled refresh. Returns `false` when the poller should exit.
    fn poll_tick(self: &Arc<Self>, key: &QueryKey) -> bool {
        let mut guard = self.state.lock();
        let Some(entry) = guard.entries.get(key) else {
            return false;
        };
        if entry.subscribers == 0 {
            return false;
        }
        if entry.in_flight.is_some() {
            trace!(query = %key, "poll tick skipped; previous fetch still in flight");
            return true;
        }
        self.start_fetch(&mut guard, key);
        true
    }

    /// Invoke the key's fetcher and record it as the in-flight fetch.
    ///
    /// The returned future stores its own result in the entry before
    /// resolving, and is also spawned so it completes with no awaiter.
    fn start_fetch(self: &Arc<Self>, state: &mut State<V>, key: &QueryKey) -> Option<SharedFetch<V>> {
        let id = state.next_fetch_id;
        state.next_fetch_id += 1;
        let entry = state.entries.get_mut(key)?;

        debug!(query = %key, fetch.id = id, "fetch started");
        let request = (entry.fetcher)();
        let weak = Arc::downgrade(self);
        let settle_key = key.clone();
        let shared = async move {
            let result = request.await;
            if let Some(inner) = weak.upgrade() {
                inner.settle(&settle_key, id, &result);
            }
            result
        }
        .boxed()
        .shared();

        entry.in_flight = Some((id, shared.clone()));
        tokio::spawn(shared.clone().map(|_| ()));
        Some(shared)
    }

    fn settle(&self, key: &QueryKey, id: u64, result: &Result<V, CoreError>) {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get_mut(key) else {
            trace!(query = %key, fetch.id = id, "discarding result for evicted entry");
            return;
        };

        if entry.in_flight.as_ref().is_some_and(|(current, _)| *current == id) {
            entry.in_flight = None;
        }
        match result {
            Ok(value) => {
                debug!(query = %key, fetch.id = id, "fetch settled");
                entry.value = Some(value.clone());
                entry.error = None;
                entry.status = QueryStatus::Fresh;
                entry.fetched_at = Some(Instant::now());
            }
            Err(err) => {
                // Any previous value stays in place next to the error.
                warn!(query = %key, fetch.id = id, error = %err, "fetch failed");
                entry.error = Some(err.clone());
                entry.status = QueryStatus::Error;
            }
        }
        entry.changed.send_modify(|version| *version += 1);
    }

    /// Evict idle entries that outlived the idle TTL or overflow the idle
    /// capacity, least recently used first. In-flight entries are skipped.
    fn sweep(&self, state: &mut State<V>, now: Instant) {
        let ttl = self.config.idle_ttl();
        let mut excess = state.idle.len().saturating_sub(self.config.max_idle_entries);
        let mut victims = Vec::new();

        for (key, since) in state.idle.iter().rev() {
            let expired = now.saturating_duration_since(*since) >= ttl;
            if !expired && excess == 0 {
                break;
            }
            let in_flight = state
                .entries
                .get(key)
                .is_some_and(|entry| entry.in_flight.is_some());
            if in_flight {
                continue;
            }
            victims.push(key.clone());
            excess = excess.saturating_sub(1);
        }

        for key in victims {
            state.idle.pop(&key);
            state.entries.remove(&key);
            debug!(query = %key, "idle cache entry evicted");
        }
    }
}

// ==============================================================================
// Subscriptions
// ==============================================================================

/// A registered consumer of one key. Dropping it unregisters the consumer;
/// when the last one goes the key's poller stops.
pub struct Subscription<V>
where
    V: Clone + Send + Sync + 'static,
{
    inner: Arc<Inner<V>>,
    key: QueryKey,
    generation: u64,
    changes: watch::Receiver<u64>,
}

impl<V> Subscription<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn state(&self) -> QueryState<V> {
        let state = self.inner.state.lock();
        state
            .entries
            .get(&self.key)
            .filter(|entry| entry.generation == self.generation)
            .map(|entry| entry.snapshot(Instant::now(), self.inner.config.stale_after))
            .unwrap_or_else(QueryState::pending)
    }

    /// Wait for the next settled fetch. `None` once the entry is gone
    /// (cache disposed).
    pub async fn changed(&mut self) -> Option<QueryState<V>> {
        self.changes.changed().await.ok()?;
        Some(self.state())
    }
}

impl<V> Drop for Subscription<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.inner.unsubscribe(&self.key, self.generation);
    }
}
