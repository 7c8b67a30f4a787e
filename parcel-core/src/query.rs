//! Query cache — keyed read models with de-duplicated, generation-tagged fetches
//!
//! A `QueryClient` owns one entry per `QueryKey`. Consumers hold a
//! `Subscription<T>`; while at least one enabled subscription exists the
//! entry is "active" and:
//! - is fetched on subscribe when it has no data, is older than the stale
//!   window, or was invalidated
//! - is refetched on every tick of a subscription's `refetch_interval`
//! - is refetched right away when invalidated
//!
//! Invariants:
//! - at most one fetch per key is in flight; overlapping triggers coalesce
//! - every fetch carries a generation from a client-wide counter; a result
//!   whose generation is not the entry's latest is dropped on arrival
//! - a failed fetch records the error and keeps the last good value
//! - a subscription's poll task dies with the subscription (drop cancels it)
//! - entries with no subscribers are removed after `gc_time`

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tokio_util::sync::CancellationToken;

use crate::client::ApiError;
use crate::config::QueryConfig;

// ============================================================================
// Keys
// ============================================================================

/// Resource name plus ordered scope parameters, e.g. `admin-chat-messages:42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    parts: Vec<String>,
}

impl QueryKey {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            parts: vec![resource.into()],
        }
    }

    pub fn with(mut self, param: impl fmt::Display) -> Self {
        self.parts.push(param.to_string());
        self
    }

    pub fn resource(&self) -> &str {
        &self.parts[0]
    }

    pub fn params(&self) -> &[String] {
        &self.parts[1..]
    }

    /// Prefix match used by invalidation: `["a"]` covers `["a", "1"]`.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.parts.len() >= prefix.parts.len() && self.parts[..prefix.parts.len()] == prefix.parts[..]
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parts.join(":"))
    }
}

// ============================================================================
// Options and observed state
// ============================================================================

#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Background refetch cadence while this subscription is enabled.
    pub refetch_interval: Option<Duration>,
    /// A disabled subscription neither fetches nor polls.
    pub enabled: bool,
    /// Overrides the client-wide stale window for this subscription.
    pub stale_time: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            refetch_interval: None,
            enabled: true,
            stale_time: None,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refetch_every(mut self, interval: Duration) -> Self {
        self.refetch_interval = Some(interval);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Pending,
    Success,
    Error,
}

/// Typed view of an entry at one point in time.
#[derive(Debug)]
pub struct QueryState<T> {
    pub data: Option<Arc<T>>,
    /// Error from the most recent fetch, if it failed.
    pub error: Option<Arc<ApiError>>,
    pub updated_at: Option<Instant>,
    pub is_fetching: bool,
    pub is_invalidated: bool,
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            updated_at: self.updated_at,
            is_fetching: self.is_fetching,
            is_invalidated: self.is_invalidated,
        }
    }
}

impl<T> QueryState<T> {
    pub fn status(&self) -> QueryStatus {
        if self.error.is_some() {
            QueryStatus::Error
        } else if self.data.is_some() {
            QueryStatus::Success
        } else {
            QueryStatus::Pending
        }
    }

    /// First load: nothing to show yet and a fetch is running.
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.is_fetching
    }
}

type AnyValue = Arc<dyn Any + Send + Sync>;
type ErasedFetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<AnyValue, ApiError>> + Send + Sync>;

#[derive(Clone, Default)]
struct Snapshot {
    data: Option<AnyValue>,
    error: Option<Arc<ApiError>>,
    updated_at: Option<Instant>,
    is_fetching: bool,
    is_invalidated: bool,
}

impl Snapshot {
    fn typed<T: Send + Sync + 'static>(self, key: &QueryKey) -> QueryState<T> {
        let data = self.data.and_then(|d| match d.downcast::<T>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(key = %key, "Cached value has a different type than requested");
                None
            }
        });
        QueryState {
            data,
            error: self.error,
            updated_at: self.updated_at,
            is_fetching: self.is_fetching,
            is_invalidated: self.is_invalidated,
        }
    }
}

// ============================================================================
// Entries
// ============================================================================

struct Entry {
    /// Distinguishes this entry from later ones created under the same key
    /// after `remove` / `clear`.
    id: u64,
    fetcher: Option<ErasedFetcher>,
    data: Option<AnyValue>,
    error: Option<Arc<ApiError>>,
    updated_at: Option<Instant>,
    invalidated: bool,
    subscribers: usize,
    active: usize,
    generation: u64,
    in_flight: bool,
    refetch_after: bool,
    gc: Option<CancellationToken>,
    tx: watch::Sender<Snapshot>,
}

impl Entry {
    fn new(id: u64) -> Self {
        let (tx, _rx) = watch::channel(Snapshot::default());
        Self {
            id,
            fetcher: None,
            data: None,
            error: None,
            updated_at: None,
            invalidated: false,
            subscribers: 0,
            active: 0,
            generation: 0,
            in_flight: false,
            refetch_after: false,
            gc: None,
            tx,
        }
    }

    fn publish(&self) {
        self.tx.send_replace(Snapshot {
            data: self.data.clone(),
            error: self.error.clone(),
            updated_at: self.updated_at,
            is_fetching: self.in_flight,
            is_invalidated: self.invalidated,
        });
    }

    fn needs_fetch(&self, stale_time: Duration) -> bool {
        match self.updated_at {
            _ if self.data.is_none() || self.invalidated => true,
            Some(at) => at.elapsed() >= stale_time,
            None => true,
        }
    }
}

// ============================================================================
// QueryClient
// ============================================================================

struct Inner {
    entries: Mutex<HashMap<QueryKey, Entry>>,
    generation: AtomicU64,
    entry_ids: AtomicU64,
    config: QueryConfig,
}

/// Shared, cheaply cloneable handle to the query cache.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("entries", &self.inner.entries.lock().len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl QueryClient {
    pub fn new(config: QueryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                entry_ids: AtomicU64::new(0),
                config,
            }),
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.inner.config
    }

    /// Subscribe to `key`. The fetcher replaces any fetcher registered by an
    /// earlier subscriber of the same key.
    ///
    /// Must be called inside a tokio runtime.
    pub fn subscribe<T, F, Fut>(&self, key: QueryKey, fetcher: F, options: QueryOptions) -> Subscription<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let erased: ErasedFetcher = Arc::new(move || {
            let fut = fetcher();
            async move { fut.await.map(|v| Arc::new(v) as AnyValue) }.boxed()
        });
        let stale_time = options.stale_time.unwrap_or(self.inner.config.stale_time());

        let (rx, entry_id, should_fetch) = {
            let mut entries = self.inner.entries.lock();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(self.inner.entry_ids.fetch_add(1, Ordering::SeqCst) + 1));
            if let Some(gc) = entry.gc.take() {
                gc.cancel();
            }
            entry.fetcher = Some(erased);
            entry.subscribers += 1;
            if options.enabled {
                entry.active += 1;
            }
            (
                entry.tx.subscribe(),
                entry.id,
                options.enabled && entry.needs_fetch(stale_time),
            )
        };

        tracing::debug!(
            key = %key,
            enabled = options.enabled,
            interval_ms = options.refetch_interval.map(|d| d.as_millis() as u64),
            "Query subscribed"
        );

        if should_fetch {
            self.start_fetch(&key);
        }

        let (enabled_tx, enabled_rx) = watch::channel(options.enabled);
        let cancel = CancellationToken::new();
        if let Some(interval) = options.refetch_interval {
            tokio::spawn(poll_loop(
                self.clone(),
                key.clone(),
                entry_id,
                interval,
                enabled_rx,
                cancel.clone(),
            ));
        }

        Subscription {
            client: self.clone(),
            key,
            entry_id,
            rx,
            enabled: enabled_tx,
            stale_time,
            cancel,
            _marker: PhantomData,
        }
    }

    /// One-shot read through the cache: subscribe, wait for the fetch to
    /// settle, return the data or the fetch error.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> Result<Arc<T>, Arc<ApiError>>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let mut sub = self.subscribe(key.clone(), fetcher, QueryOptions::default());
        let state = sub.settled().await;
        match (state.data, state.error) {
            (_, Some(error)) => Err(error),
            (Some(data), None) => Ok(data),
            (None, None) => Err(Arc::new(ApiError::Decode(format!(
                "query {} settled without data",
                key
            )))),
        }
    }

    /// Mark every entry under `prefix` stale and refetch the active ones.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        self.invalidate_many(std::slice::from_ref(prefix))
    }

    /// Single invalidation pass over several prefixes. Returns the number of
    /// entries marked.
    pub fn invalidate_many(&self, prefixes: &[QueryKey]) -> usize {
        let mut to_fetch = Vec::new();
        let mut marked = 0;
        {
            let mut entries = self.inner.entries.lock();
            for (key, entry) in entries.iter_mut() {
                if !prefixes.iter().any(|p| key.starts_with(p)) {
                    continue;
                }
                marked += 1;
                entry.invalidated = true;
                if entry.in_flight {
                    entry.refetch_after = true;
                } else if entry.active > 0 {
                    to_fetch.push(key.clone());
                }
                entry.publish();
            }
        }

        tracing::debug!(
            prefixes = ?prefixes.iter().map(ToString::to_string).collect::<Vec<_>>(),
            marked,
            refetching = to_fetch.len(),
            "Queries invalidated"
        );

        for key in to_fetch {
            self.start_fetch(&key);
        }
        marked
    }

    /// Drop an entry outright. Its in-flight fetch, if any, is discarded on
    /// arrival.
    pub fn remove(&self, key: &QueryKey) -> bool {
        let removed = self.inner.entries.lock().remove(key);
        match removed {
            Some(entry) => {
                if let Some(gc) = entry.gc {
                    gc.cancel();
                }
                true
            }
            None => false,
        }
    }

    /// Drop every entry (logout).
    pub fn clear(&self) {
        let drained: Vec<Entry> = self.inner.entries.lock().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            if let Some(gc) = &entry.gc {
                gc.cancel();
            }
        }
        tracing::debug!(entries = drained.len(), "Query cache cleared");
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.inner.entries.lock().contains_key(key)
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.inner
            .entries
            .lock()
            .get(key)
            .map(|e| e.in_flight)
            .unwrap_or(false)
    }

    pub fn is_invalidated(&self, key: &QueryKey) -> bool {
        self.inner
            .entries
            .lock()
            .get(key)
            .map(|e| e.invalidated)
            .unwrap_or(false)
    }

    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        self.inner
            .entries
            .lock()
            .get(key)
            .map(|e| e.subscribers)
            .unwrap_or(0)
    }

    /// Current cached state without subscribing.
    pub fn snapshot<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<QueryState<T>> {
        let snapshot = self.inner.entries.lock().get(key).map(|e| e.tx.borrow().clone())?;
        Some(snapshot.typed(key))
    }

    fn start_fetch(&self, key: &QueryKey) {
        self.start_fetch_for(key, None);
    }

    /// With `entry_id`, only fetch while that entry is still the live one.
    fn start_fetch_for(&self, key: &QueryKey, entry_id: Option<u64>) {
        let (generation, fetcher) = {
            let mut entries = self.inner.entries.lock();
            let Some(entry) = entries.get_mut(key) else {
                return;
            };
            if entry_id.is_some_and(|id| id != entry.id) {
                tracing::trace!(key = %key, "Fetch for a replaced entry skipped");
                return;
            }
            if entry.in_flight {
                tracing::trace!(key = %key, "Fetch already in flight, coalesced");
                return;
            }
            let Some(fetcher) = entry.fetcher.clone() else {
                return;
            };
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            entry.generation = generation;
            entry.in_flight = true;
            entry.publish();
            (generation, fetcher)
        };

        tracing::debug!(key = %key, generation, "Query fetch started");

        let client = self.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let result = client.run_fetcher(&fetcher).await;
            client.apply(&key, generation, result);
        });
    }

    async fn run_fetcher(&self, fetcher: &ErasedFetcher) -> Result<AnyValue, ApiError> {
        let config = &self.inner.config;
        let strategy = ExponentialBackoff::from_millis(2)
            .factor((config.retry_delay_ms / 2).max(1))
            .max_delay(Duration::from_secs(30))
            .map(jitter)
            .take(config.retry);

        RetryIf::start(strategy, || fetcher(), |e: &ApiError| e.is_retryable()).await
    }

    fn apply(&self, key: &QueryKey, generation: u64, result: Result<AnyValue, ApiError>) {
        let refetch = {
            let mut entries = self.inner.entries.lock();
            let Some(entry) = entries.get_mut(key) else {
                tracing::debug!(key = %key, generation, "Result for removed query dropped");
                return;
            };
            if entry.generation != generation {
                tracing::debug!(
                    key = %key,
                    generation,
                    latest = entry.generation,
                    "Superseded query result discarded"
                );
                return;
            }

            entry.in_flight = false;
            let raced_invalidation = std::mem::take(&mut entry.refetch_after);
            match result {
                Ok(value) => {
                    entry.data = Some(value);
                    entry.error = None;
                    entry.updated_at = Some(Instant::now());
                    // an invalidation that raced this fetch keeps the entry stale
                    entry.invalidated = raced_invalidation;
                    tracing::debug!(key = %key, generation, "Query fetch succeeded");
                }
                Err(e) => {
                    tracing::warn!(
                        key = %key,
                        generation,
                        error = %e,
                        kept_previous = entry.data.is_some(),
                        "Query fetch failed"
                    );
                    entry.error = Some(Arc::new(e));
                }
            }
            entry.publish();
            raced_invalidation && entry.active > 0
        };

        if refetch {
            self.start_fetch(key);
        }
    }

    fn activate(&self, key: &QueryKey, entry_id: u64, stale_time: Duration) {
        let should_fetch = {
            let mut entries = self.inner.entries.lock();
            match entries.get_mut(key).filter(|e| e.id == entry_id) {
                Some(entry) => {
                    entry.active += 1;
                    entry.needs_fetch(stale_time)
                }
                None => false,
            }
        };
        if should_fetch {
            self.start_fetch(key);
        }
    }

    fn deactivate(&self, key: &QueryKey, entry_id: u64) {
        if let Some(entry) = self.inner.entries.lock().get_mut(key).filter(|e| e.id == entry_id) {
            entry.active = entry.active.saturating_sub(1);
        }
    }

    fn unsubscribe(&self, key: &QueryKey, entry_id: u64, was_enabled: bool) {
        let gc_time = self.inner.config.gc_time();
        let mut entries = self.inner.entries.lock();
        let Some(entry) = entries.get_mut(key).filter(|e| e.id == entry_id) else {
            tracing::trace!(key = %key, "Unsubscribe from a replaced entry ignored");
            return;
        };
        entry.subscribers = entry.subscribers.saturating_sub(1);
        if was_enabled {
            entry.active = entry.active.saturating_sub(1);
        }
        if entry.subscribers > 0 {
            return;
        }

        let runtime = tokio::runtime::Handle::try_current();
        if gc_time.is_zero() || runtime.is_err() {
            entries.remove(key);
            tracing::debug!(key = %key, "Query removed");
            return;
        }

        let token = CancellationToken::new();
        entry.gc = Some(token.clone());
        drop(entries);

        let client = self.clone();
        let key = key.clone();
        if let Ok(handle) = runtime {
            handle.spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(gc_time) => client.collect(&key, entry_id),
                    _ = token.cancelled() => {}
                }
            });
        }
    }

    fn collect(&self, key: &QueryKey, entry_id: u64) {
        let mut entries = self.inner.entries.lock();
        if entries
            .get(key)
            .map(|e| e.id == entry_id && e.subscribers == 0)
            .unwrap_or(false)
        {
            entries.remove(key);
            tracing::debug!(key = %key, "Inactive query garbage-collected");
        }
    }
}

async fn poll_loop(
    client: QueryClient,
    key: QueryKey,
    entry_id: u64,
    interval: Duration,
    mut enabled: watch::Receiver<bool>,
    cancel: CancellationToken,
) {
    loop {
        while !*enabled.borrow_and_update() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = enabled.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::debug!(key = %key, interval_ms = interval.as_millis() as u64, "Polling started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(key = %key, "Polling stopped");
                    return;
                }
                changed = enabled.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if !*enabled.borrow() {
                        tracing::debug!(key = %key, "Polling paused");
                        break;
                    }
                }
                _ = ticker.tick() => client.start_fetch_for(&key, Some(entry_id)),
            }
        }
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Live handle on one query key. Dropping it unsubscribes and stops its
/// poll task.
pub struct Subscription<T> {
    client: QueryClient,
    key: QueryKey,
    entry_id: u64,
    rx: watch::Receiver<Snapshot>,
    enabled: watch::Sender<bool>,
    stale_time: Duration,
    cancel: CancellationToken,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("enabled", &*self.enabled.borrow())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Subscription<T> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn state(&self) -> QueryState<T> {
        self.rx.borrow().clone().typed(&self.key)
    }

    pub fn data(&self) -> Option<Arc<T>> {
        self.state().data
    }

    /// Wait for the next published change. Returns `None` once the entry has
    /// been removed from the cache.
    pub async fn changed(&mut self) -> Option<QueryState<T>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone().typed(&self.key))
    }

    /// Wait until no fetch is running and the entry holds data or an error.
    /// Disabled subscriptions return the current state immediately.
    pub async fn settled(&mut self) -> QueryState<T> {
        loop {
            let snapshot = self.rx.borrow_and_update().clone();
            let done = !snapshot.is_fetching
                && (snapshot.data.is_some() || snapshot.error.is_some() || !self.is_enabled());
            if done || self.rx.changed().await.is_err() {
                return snapshot.typed(&self.key);
            }
        }
    }

    /// Force a fetch now (coalesced with one already in flight).
    pub fn refetch(&self) {
        self.client.start_fetch_for(&self.key, Some(self.entry_id));
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.borrow()
    }

    /// Toggle the subscription. Enabling runs the on-mount staleness check;
    /// disabling stops polling.
    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.send_replace(enabled) == enabled {
            return;
        }
        if enabled {
            self.client.activate(&self.key, self.entry_id, self.stale_time);
        } else {
            self.client.deactivate(&self.key, self.entry_id);
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
        let was_enabled = *self.enabled.borrow();
        self.client.unsubscribe(&self.key, self.entry_id, was_enabled);
        tracing::debug!(key = %self.key, "Query unsubscribed");
    }
}

// ============================================================================
// ScopedQuery
// ============================================================================

type ScopedFetcher<P, T> = Arc<dyn Fn(P) -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

/// A subscription whose key carries a scope parameter (country, shipping
/// method, chat counterparty). Changing the scope drops the old subscription
/// and subscribes the new key, so the previous scope's data is never exposed
/// under the new one.
pub struct ScopedQuery<P, T> {
    client: QueryClient,
    base: QueryKey,
    options: QueryOptions,
    fetch: ScopedFetcher<P, T>,
    current: Option<(P, Subscription<T>)>,
}

impl<P, T> ScopedQuery<P, T>
where
    P: Clone + PartialEq + fmt::Display + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    pub fn new<F, Fut>(client: QueryClient, base: QueryKey, options: QueryOptions, fetch: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Self {
            client,
            base,
            options,
            fetch: Arc::new(move |p| fetch(p).boxed()),
            current: None,
        }
    }

    pub fn scope(&self) -> Option<&P> {
        self.current.as_ref().map(|(p, _)| p)
    }

    pub fn key(&self) -> Option<&QueryKey> {
        self.current.as_ref().map(|(_, s)| s.key())
    }

    pub fn key_for(&self, scope: &P) -> QueryKey {
        self.base.clone().with(scope)
    }

    pub fn subscription(&self) -> Option<&Subscription<T>> {
        self.current.as_ref().map(|(_, s)| s)
    }

    pub fn subscription_mut(&mut self) -> Option<&mut Subscription<T>> {
        self.current.as_mut().map(|(_, s)| s)
    }

    pub fn data(&self) -> Option<Arc<T>> {
        self.subscription().and_then(Subscription::data)
    }

    pub fn state(&self) -> Option<QueryState<T>> {
        self.subscription().map(Subscription::state)
    }

    /// Switch scope. Returns `true` when the key changed.
    pub fn set_scope(&mut self, scope: Option<P>) -> bool {
        if self.scope() == scope.as_ref() {
            return false;
        }

        if let Some((previous, _sub)) = self.current.take() {
            tracing::debug!(base = %self.base, scope = %previous, "Scope released");
        }

        if let Some(scope) = scope {
            let key = self.key_for(&scope);
            let fetch = self.fetch.clone();
            let param = scope.clone();
            let sub = self
                .client
                .subscribe(key, move || fetch(param.clone()), self.options.clone());
            self.current = Some((scope, sub));
        }
        true
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.options.enabled = enabled;
        if let Some((_, sub)) = &self.current {
            sub.set_enabled(enabled);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
