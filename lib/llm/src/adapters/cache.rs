// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # Adapter Cache
//! A bounded set of materialized adapters shared by every request.
//!
//! ## Acquire
//! - Resident entry → increment its pin count (and take it out of the LRU if it was idle)
//! - Load already in flight → wait on it
//! - Neither → reserve a slot, evicting the least recently used idle entry if full,
//!   and start a load. If every slot is pinned or loading, fail with `CapacityExhausted`
//!
//! ## Release
//! - Decrement the pin count. At zero the entry joins the LRU, or is destroyed if it
//!   was invalidated while pinned
//!
//! ## Loads
//! A load runs as its own task and publishes its result on a `watch` channel, so
//! every waiter sees the same outcome and a cancelled waiter does not strand the rest.
//! Each waiter holds one pin on the slot; pins move onto the entry when the load lands.
//!
//! Pins are counted by hand rather than through `Arc` strong counts, the `Arc` only
//! keeps the weights alive for handles that outlive an eviction.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::ops::Deref;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::Instrument;

use super::evictor::{LRUEvictor, Recency};
use super::{AdapterError, AdapterSource, LoadedAdapter, TenantId};
use crate::metrics::CacheMetrics;

/// Retry hint attached to `CapacityExhausted` unless configured otherwise
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

type LoadResult = Result<Arc<LoadedAdapter>, AdapterError>;

/// Point-in-time occupancy of the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub capacity: usize,
    pub resident: usize,
    pub pinned: usize,
    pub loading: usize,
}

#[derive(Clone)]
pub struct AdapterCache {
    inner: Arc<Inner>,
}

struct Inner {
    capacity: usize,
    retry_after: Duration,
    source: Arc<dyn AdapterSource>,
    metrics: Option<CacheMetrics>,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<TenantId, CacheEntry>,
    /// Entries with a pin count of zero
    inactive: LRUEvictor<TenantId>,
    loading: HashMap<TenantId, LoadSlot>,
    next_seq: u64,
    next_load_id: u64,
}

struct CacheEntry {
    adapter: Arc<LoadedAdapter>,
    last_access: Instant,
    pin_count: usize,
    seq: u64,
    /// Identifies the load that produced this entry. Handles carry it so a release can
    /// never land on a later entry for the same tenant.
    load_id: u64,
    stale: bool,
    /// The tenant's adapter was removed from the store. No new pins are handed out.
    deleted: bool,
}

impl CacheEntry {
    fn recency(&self) -> Recency {
        Recency {
            last_access: self.last_access,
            seq: self.seq,
        }
    }
}

struct LoadSlot {
    load_id: u64,
    waiters: usize,
    stale: bool,
    deleted: bool,
    tx: watch::Sender<Option<LoadResult>>,
}

impl AdapterCache {
    pub fn new(source: Arc<dyn AdapterSource>, capacity: NonZeroUsize) -> Self {
        Self::with_options(source, capacity, DEFAULT_RETRY_AFTER, None)
    }

    pub fn with_options(
        source: Arc<dyn AdapterSource>,
        capacity: NonZeroUsize,
        retry_after: Duration,
        metrics: Option<CacheMetrics>,
    ) -> Self {
        AdapterCache {
            inner: Arc::new(Inner {
                capacity: capacity.get(),
                retry_after,
                source,
                metrics,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Pin the tenant's adapter, loading it from the source on a miss.
    pub async fn acquire(&self, tenant_id: &TenantId) -> Result<AdapterHandle, AdapterError> {
        let (mut rx, load_id) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            if let Some(entry) = state.entries.get_mut(tenant_id) {
                if entry.deleted {
                    return Err(AdapterError::NotFound {
                        tenant: tenant_id.to_string(),
                    });
                }
                if entry.pin_count == 0 {
                    state.inactive.remove(tenant_id);
                }
                entry.pin_count += 1;
                entry.last_access = Instant::now();
                let handle = AdapterHandle {
                    cache: self.clone(),
                    tenant_id: tenant_id.clone(),
                    load_id: entry.load_id,
                    adapter: entry.adapter.clone(),
                };
                drop(guard);
                self.record(|m| m.hits.inc());
                return Ok(handle);
            }

            self.record(|m| m.misses.inc());
            match state.loading.get_mut(tenant_id) {
                Some(slot) => {
                    slot.waiters += 1;
                    (slot.tx.subscribe(), slot.load_id)
                }
                None => {
                    self.reserve_slot(state)?;
                    let load_id = state.next_load_id;
                    state.next_load_id += 1;
                    let (tx, rx) = watch::channel(None);
                    state.loading.insert(
                        tenant_id.clone(),
                        LoadSlot {
                            load_id,
                            waiters: 1,
                            stale: false,
                            deleted: false,
                            tx,
                        },
                    );
                    self.update_gauges(state);
                    self.spawn_load(tenant_id.clone(), load_id);
                    (rx, load_id)
                }
            }
        };

        let mut reservation = Reservation {
            cache: self,
            tenant_id,
            load_id,
            armed: true,
        };
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(value) => (*value)
                .clone()
                .unwrap_or_else(|| Err(self.load_abandoned(tenant_id))),
            Err(_) => Err(self.load_abandoned(tenant_id)),
        };
        // A successful load already moved our pin onto the entry, a failed one never
        // created an entry. Either way the handle (or nothing) owns it from here.
        reservation.armed = false;

        outcome.map(|adapter| AdapterHandle {
            cache: self.clone(),
            tenant_id: tenant_id.clone(),
            load_id,
            adapter,
        })
    }

    /// Give back a pin. Dropping the handle does the same.
    pub fn release(&self, handle: AdapterHandle) {
        drop(handle);
    }

    /// Forget the tenant's materialized adapter, typically after a new version was stored.
    ///
    /// An idle entry is dropped immediately. A pinned entry, or a load in flight, is
    /// marked stale and destroyed once its last pin is released.
    pub fn invalidate(&self, tenant_id: &TenantId) {
        self.invalidate_where(tenant_id, |_| true);
    }

    /// Like [`AdapterCache::invalidate`], but keeps an entry that already holds
    /// `version` or newer. In-flight loads are always marked stale.
    pub fn invalidate_older_than(&self, tenant_id: &TenantId, version: u64) {
        self.invalidate_where(tenant_id, |adapter| adapter.version() < version);
    }

    /// Forget a tenant whose adapter was deleted from the store.
    ///
    /// Acquisitions fail with `NotFound` from here on, including waiters of a load in
    /// flight. Handles already out keep their adapter until dropped. A later store of
    /// the tenant followed by [`AdapterCache::invalidate`] lifts this.
    pub fn remove(&self, tenant_id: &TenantId) {
        self.mark_outdated(tenant_id, true, |_| true);
    }

    fn invalidate_where(&self, tenant_id: &TenantId, outdated: impl Fn(&LoadedAdapter) -> bool) {
        self.mark_outdated(tenant_id, false, outdated);
    }

    fn mark_outdated(
        &self,
        tenant_id: &TenantId,
        deleted: bool,
        outdated: impl Fn(&LoadedAdapter) -> bool,
    ) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        if let Some(slot) = state.loading.get_mut(tenant_id) {
            slot.stale = true;
            slot.deleted = deleted;
        }
        let Some(entry) = state.entries.get_mut(tenant_id) else {
            return;
        };
        // A tenant stored again after a delete drains its old entry like any stale one
        let was_deleted = std::mem::replace(&mut entry.deleted, deleted);
        if !was_deleted && !outdated(&entry.adapter) {
            return;
        }
        if entry.pin_count == 0 {
            state.inactive.remove(tenant_id);
            state.entries.remove(tenant_id);
            self.record(|m| m.invalidations.inc());
            tracing::debug!(tenant = %tenant_id, deleted, "invalidated idle adapter");
        } else {
            entry.stale = true;
            tracing::debug!(
                tenant = %tenant_id,
                pins = entry.pin_count,
                deleted,
                "adapter marked stale"
            );
        }
        self.update_gauges(state);
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        CacheStats {
            capacity: self.inner.capacity,
            resident: state.entries.len(),
            pinned: state.entries.values().filter(|e| e.pin_count > 0).count(),
            loading: state.loading.len(),
        }
    }

    /// Whether the tenant's adapter is currently materialized
    pub fn contains(&self, tenant_id: &TenantId) -> bool {
        self.inner.state.lock().entries.contains_key(tenant_id)
    }

    pub fn pin_count(&self, tenant_id: &TenantId) -> Option<usize> {
        self.inner
            .state
            .lock()
            .entries
            .get(tenant_id)
            .map(|e| e.pin_count)
    }

    /// Make room for one more entry or load, evicting an idle entry if needed.
    fn reserve_slot(&self, state: &mut CacheState) -> Result<(), AdapterError> {
        if state.entries.len() + state.loading.len() < self.inner.capacity {
            return Ok(());
        }
        let Some(victim) = state.inactive.evict() else {
            return Err(AdapterError::CapacityExhausted {
                capacity: self.inner.capacity,
                retry_after: self.inner.retry_after,
            });
        };
        if let Some(evicted) = state.entries.remove(&victim) {
            debug_assert_eq!(evicted.pin_count, 0);
            tracing::debug!(
                tenant = %victim,
                version = evicted.adapter.version(),
                "evicting idle adapter"
            );
        }
        self.record(|m| m.evictions.inc());
        Ok(())
    }

    fn spawn_load(&self, tenant_id: TenantId, load_id: u64) {
        self.record(|m| m.loads.inc());
        let span = tracing::debug_span!("adapter_load", tenant = %tenant_id, load_id);
        let cache = self.clone();
        tokio::spawn(
            async move {
                let started = Instant::now();
                let result = match AssertUnwindSafe(cache.inner.source.load(&tenant_id))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result.map(Arc::new),
                    Err(_) => Err(cache.load_failure("adapter load panicked")),
                };
                cache.finish_load(&tenant_id, load_id, result, started.elapsed());
            }
            .instrument(span),
        );
    }

    fn finish_load(
        &self,
        tenant_id: &TenantId,
        load_id: u64,
        result: LoadResult,
        elapsed: Duration,
    ) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let Some(slot) = state.loading.remove(tenant_id) else {
            tracing::error!(load_id, "finished load has no slot");
            return;
        };
        debug_assert_eq!(slot.load_id, load_id);

        let result = match result {
            Ok(_) if slot.deleted => Err(AdapterError::NotFound {
                tenant: tenant_id.to_string(),
            }),
            result => result,
        };
        match &result {
            Ok(adapter) => {
                if slot.waiters == 0 && slot.stale {
                    tracing::debug!("discarding stale load nobody waits for");
                } else {
                    let seq = state.next_seq;
                    state.next_seq += 1;
                    let entry = CacheEntry {
                        adapter: adapter.clone(),
                        last_access: Instant::now(),
                        pin_count: slot.waiters,
                        seq,
                        load_id,
                        stale: slot.stale,
                        deleted: false,
                    };
                    if entry.pin_count == 0 {
                        state.inactive.insert(tenant_id.clone(), entry.recency());
                    }
                    state.entries.insert(tenant_id.clone(), entry);
                }
                tracing::debug!(
                    version = adapter.version(),
                    waiters = slot.waiters,
                    elapsed = %humantime::format_duration(elapsed),
                    "adapter loaded"
                );
            }
            Err(err) => {
                self.record(|m| m.load_failures.inc());
                tracing::warn!(%err, waiters = slot.waiters, "adapter load failed");
            }
        }
        self.update_gauges(state);
        slot.tx.send_replace(Some(result));
    }

    fn unpin(&self, tenant_id: &TenantId, load_id: u64) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if !self.unpin_locked(state, tenant_id, load_id) {
            tracing::warn!(
                tenant = %tenant_id,
                load_id,
                "release of an adapter that is not pinned"
            );
        }
        self.update_gauges(state);
    }

    fn unpin_locked(&self, state: &mut CacheState, tenant_id: &TenantId, load_id: u64) -> bool {
        let Some(entry) = state.entries.get_mut(tenant_id) else {
            return false;
        };
        if entry.load_id != load_id || entry.pin_count == 0 {
            return false;
        }
        entry.pin_count -= 1;
        if entry.pin_count > 0 {
            return true;
        }
        if entry.stale {
            state.entries.remove(tenant_id);
            self.record(|m| m.invalidations.inc());
            tracing::debug!(tenant = %tenant_id, "stale adapter drained");
        } else {
            let recency = entry.recency();
            state.inactive.insert(tenant_id.clone(), recency);
        }
        true
    }

    fn load_failure(&self, message: impl std::fmt::Display) -> AdapterError {
        AdapterError::runtime(message, self.inner.retry_after)
    }

    fn load_abandoned(&self, tenant_id: &TenantId) -> AdapterError {
        self.load_failure(format!("load of adapter for '{tenant_id}' was abandoned"))
    }

    fn record(&self, f: impl FnOnce(&CacheMetrics)) {
        if let Some(metrics) = &self.inner.metrics {
            f(metrics);
        }
    }

    fn update_gauges(&self, state: &CacheState) {
        self.record(|m| {
            m.resident.set(state.entries.len() as i64);
            m.loading.set(state.loading.len() as i64);
        });
    }
}

impl std::fmt::Debug for AdapterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterCache")
            .field("stats", &self.stats())
            .finish()
    }
}


/// A waiter's pin while its load is in flight. Dropped armed only when the acquire
/// future is cancelled.
struct Reservation<'a> {
    cache: &'a AdapterCache,
    tenant_id: &'a TenantId,
    load_id: u64,
    armed: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut guard = self.cache.inner.state.lock();
        let state = &mut *guard;
        if let Some(slot) = state.loading.get_mut(self.tenant_id) {
            if slot.load_id == self.load_id {
                slot.waiters = slot.waiters.saturating_sub(1);
                return;
            }
        }
        // The load landed before we were dropped, so our pin is on the entry
        self.cache
            .unpin_locked(state, self.tenant_id, self.load_id);
        self.cache.update_gauges(state);
    }
}

/// A pinned adapter. The pin is released when the handle is dropped.
pub struct AdapterHandle {
    cache: AdapterCache,
    tenant_id: TenantId,
    load_id: u64,
    adapter: Arc<LoadedAdapter>,
}

impl AdapterHandle {
    pub fn adapter(&self) -> &LoadedAdapter {
        &self.adapter
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn version(&self) -> u64 {
        self.adapter.version()
    }

    pub fn release(self) {
        drop(self);
    }

    /// Whether both handles pin the same materialized entry
    pub fn same_entry(&self, other: &AdapterHandle) -> bool {
        Arc::ptr_eq(&self.adapter, &other.adapter)
    }
}

impl Deref for AdapterHandle {
    type Target = LoadedAdapter;

    fn deref(&self) -> &LoadedAdapter {
        &self.adapter
    }
}

impl Drop for AdapterHandle {
    fn drop(&mut self) {
        self.cache.unpin(&self.tenant_id, self.load_id);
    }
}

impl std::fmt::Debug for AdapterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterHandle")
            .field("tenant_id", &self.tenant_id)
            .field("version", &self.version())
            .field("load_id", &self.load_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterStore;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    /// Store-backed source that counts loads and can hold them until the gate opens
    struct CountingSource {
        store: AdapterStore,
        loads: AtomicUsize,
        gate: Option<Semaphore>,
    }

    impl CountingSource {
        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AdapterSource for CountingSource {
        async fn load(&self, tenant_id: &TenantId) -> Result<LoadedAdapter, AdapterError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                let _permit = gate
                    .acquire()
                    .await
                    .map_err(|err| AdapterError::runtime(err, DEFAULT_RETRY_AFTER))?;
            }
            self.store.load(tenant_id).await
        }
    }

    fn tenant(id: &str) -> TenantId {
        id.parse().unwrap()
    }

    async fn setup(
        capacity: usize,
        tenants: &[&str],
        gated: bool,
    ) -> (AdapterCache, Arc<CountingSource>) {
        let store = AdapterStore::default();
        for id in tenants {
            store
                .put(&tenant(id), Bytes::from(id.to_string()), 1)
                .await
                .unwrap();
        }
        let source = Arc::new(CountingSource {
            store,
            loads: AtomicUsize::new(0),
            gate: gated.then(|| Semaphore::new(0)),
        });
        let cache = AdapterCache::new(source.clone(), NonZeroUsize::new(capacity).unwrap());
        (cache, source)
    }

    async fn wait_for_loads(cache: &AdapterCache) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while cache.stats().loading > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("load did not finish");
    }

    #[tokio::test]
    async fn test_hit_after_miss() {
        let (cache, source) = setup(2, &["a"], false).await;
        let a = tenant("a");

        let first = cache.acquire(&a).await.unwrap();
        assert_eq!(first.weights().as_ref(), b"a");
        let second = cache.acquire(&a).await.unwrap();
        assert!(first.same_entry(&second));
        assert_eq!(cache.pin_count(&a), Some(2));
        assert_eq!(source.loads(), 1);

        cache.release(first);
        second.release();
        assert_eq!(cache.pin_count(&a), Some(0));
        assert_eq!(
            cache.stats(),
            CacheStats {
                capacity: 2,
                resident: 1,
                pinned: 0,
                loading: 0
            }
        );
    }

    #[tokio::test]
    async fn test_lru_eviction_and_reload() {
        let (cache, source) = setup(2, &["a", "b", "c"], false).await;
        let (a, b, c) = (tenant("a"), tenant("b"), tenant("c"));

        cache.acquire(&a).await.unwrap().release();
        cache.acquire(&b).await.unwrap().release();
        let hc = cache.acquire(&c).await.unwrap();
        assert!(!cache.contains(&a));
        assert!(cache.contains(&b));
        assert!(cache.contains(&c));
        drop(hc);

        // a comes back from the store and pushes out b, the older of b and c
        cache.acquire(&a).await.unwrap().release();
        assert_eq!(source.loads(), 4);
        assert!(!cache.contains(&b));
        assert_eq!(cache.stats().resident, 2);
    }

    #[tokio::test]
    async fn test_hit_refreshes_recency() {
        let (cache, _source) = setup(2, &["a", "b", "c"], false).await;
        let (a, b, c) = (tenant("a"), tenant("b"), tenant("c"));

        cache.acquire(&a).await.unwrap().release();
        cache.acquire(&b).await.unwrap().release();
        cache.acquire(&a).await.unwrap().release();
        cache.acquire(&c).await.unwrap().release();
        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
    }

    #[tokio::test]
    async fn test_capacity_exhausted_when_all_pinned() {
        let (cache, _source) = setup(1, &["a", "b"], false).await;
        let (a, b) = (tenant("a"), tenant("b"));

        let ha = cache.acquire(&a).await.unwrap();
        let err = cache.acquire(&b).await.unwrap_err();
        assert_matches!(
            err,
            AdapterError::CapacityExhausted { capacity: 1, retry_after }
                if retry_after == DEFAULT_RETRY_AFTER
        );
        // the pinned entry survived
        assert_eq!(ha.tenant_id(), &a);
        assert!(cache.contains(&a));

        drop(ha);
        let hb = cache.acquire(&b).await.unwrap();
        assert_eq!(hb.tenant_id(), &b);
        assert!(!cache.contains(&a));
    }

    #[tokio::test]
    async fn test_concurrent_acquires_share_one_load() {
        let (cache, source) = setup(2, &["a"], true).await;
        let a = tenant("a");

        let acquires = futures::future::join_all((0..8).map(|_| cache.acquire(&a)));
        let open = async {
            tokio::task::yield_now().await;
            if let Some(gate) = &source.gate {
                gate.add_permits(1);
            }
        };
        let (handles, ()) = tokio::join!(acquires, open);
        let handles: Vec<AdapterHandle> = handles.into_iter().map(Result::unwrap).collect();

        assert_eq!(source.loads(), 1);
        assert_eq!(cache.pin_count(&a), Some(8));
        assert!(handles.iter().all(|h| h.same_entry(&handles[0])));
        drop(handles);
        assert_eq!(cache.pin_count(&a), Some(0));
    }

    #[tokio::test]
    async fn test_failed_load_reaches_every_waiter() {
        let (cache, source) = setup(2, &[], false).await;
        let ghost = tenant("ghost");

        let (r1, r2) = tokio::join!(cache.acquire(&ghost), cache.acquire(&ghost));
        assert_matches!(r1, Err(AdapterError::NotFound { .. }));
        assert_matches!(r2, Err(AdapterError::NotFound { .. }));
        assert_eq!(source.loads(), 1);
        assert_eq!(cache.stats().resident, 0);
        assert_eq!(cache.stats().loading, 0);

        // failures are not cached
        assert!(cache.acquire(&ghost).await.is_err());
        assert_eq!(source.loads(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_returns_its_pin() {
        let (cache, source) = setup(1, &["a"], true).await;
        let a = tenant("a");

        let timed_out = tokio::time::timeout(Duration::from_millis(20), cache.acquire(&a)).await;
        assert!(timed_out.is_err());
        assert_eq!(cache.stats().loading, 1);

        if let Some(gate) = &source.gate {
            gate.add_permits(1);
        }
        wait_for_loads(&cache).await;
        // nobody was waiting, so the entry lands idle and evictable
        assert_eq!(cache.pin_count(&a), Some(0));
        assert_eq!(cache.stats().pinned, 0);
    }

    #[tokio::test]
    async fn test_loading_slot_counts_against_capacity() {
        let (cache, source) = setup(1, &["a", "b"], true).await;
        let (a, b) = (tenant("a"), tenant("b"));

        let pending = tokio::spawn({
            let cache = cache.clone();
            let a = a.clone();
            async move { cache.acquire(&a).await.map(|h| h.version()) }
        });
        while cache.stats().loading == 0 {
            tokio::task::yield_now().await;
        }
        assert_matches!(
            cache.acquire(&b).await,
            Err(AdapterError::CapacityExhausted { .. })
        );

        if let Some(gate) = &source.gate {
            gate.add_permits(1);
        }
        assert_eq!(pending.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_idle_entry() {
        let (cache, source) = setup(2, &["a"], false).await;
        let a = tenant("a");
        cache.acquire(&a).await.unwrap().release();

        cache.invalidate(&a);
        assert!(!cache.contains(&a));
        cache.acquire(&a).await.unwrap().release();
        assert_eq!(source.loads(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_pinned_entry_drains() {
        let (cache, source) = setup(2, &["a"], false).await;
        let a = tenant("a");
        let held = cache.acquire(&a).await.unwrap();

        cache.invalidate(&a);
        assert!(cache.contains(&a));
        let joined = cache.acquire(&a).await.unwrap();
        assert!(held.same_entry(&joined));
        assert_eq!(source.loads(), 1);

        drop(held);
        assert!(cache.contains(&a));
        drop(joined);
        assert!(!cache.contains(&a));

        cache.acquire(&a).await.unwrap().release();
        assert_eq!(source.loads(), 2);
        assert!(cache.contains(&a));
    }

    #[tokio::test]
    async fn test_invalidate_older_than_keeps_current() {
        let (cache, source) = setup(2, &["a"], false).await;
        let a = tenant("a");
        cache.acquire(&a).await.unwrap().release();

        cache.invalidate_older_than(&a, 1);
        assert!(cache.contains(&a));
        cache.invalidate_older_than(&a, 2);
        assert!(!cache.contains(&a));
        assert_eq!(source.loads(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_during_load() {
        let (cache, source) = setup(2, &["a"], true).await;
        let a = tenant("a");

        let acquire = cache.acquire(&a);
        let invalidate = async {
            tokio::task::yield_now().await;
            cache.invalidate(&a);
            if let Some(gate) = &source.gate {
                gate.add_permits(2);
            }
        };
        let (handle, ()) = tokio::join!(acquire, invalidate);
        let handle = handle.unwrap();
        drop(handle);
        assert!(!cache.contains(&a));
    }

    #[tokio::test]
    async fn test_removed_tenant_refuses_new_pins() {
        let (cache, source) = setup(2, &["a"], false).await;
        let a = tenant("a");
        let held = cache.acquire(&a).await.unwrap();

        source.store.delete(&a).await.unwrap();
        cache.remove(&a);
        assert_matches!(cache.acquire(&a).await, Err(AdapterError::NotFound { .. }));
        assert_eq!(held.weights().as_ref(), b"a");
        assert_eq!(cache.pin_count(&a), Some(1));

        drop(held);
        assert!(!cache.contains(&a));
        assert_matches!(cache.acquire(&a).await, Err(AdapterError::NotFound { .. }));
        assert_eq!(cache.stats().resident, 0);
    }

    #[tokio::test]
    async fn test_store_after_remove_serves_again() {
        let (cache, source) = setup(2, &["a"], false).await;
        let a = tenant("a");
        let held = cache.acquire(&a).await.unwrap();

        source.store.delete(&a).await.unwrap();
        cache.remove(&a);
        source
            .store
            .put(&a, Bytes::from_static(b"a2"), 2)
            .await
            .unwrap();
        cache.invalidate_older_than(&a, 2);

        // the old entry is stale again rather than deleted, and drains with its pins
        let joined = cache.acquire(&a).await.unwrap();
        assert!(held.same_entry(&joined));
        drop(held);
        drop(joined);
        assert!(!cache.contains(&a));

        let fresh = cache.acquire(&a).await.unwrap();
        assert_eq!(fresh.version(), 2);
        assert_eq!(fresh.weights().as_ref(), b"a2");
    }

    #[tokio::test]
    async fn test_remove_during_load() {
        let (cache, source) = setup(2, &["a"], true).await;
        let a = tenant("a");

        let acquire = cache.acquire(&a);
        let remove = async {
            tokio::task::yield_now().await;
            cache.remove(&a);
            if let Some(gate) = &source.gate {
                gate.add_permits(2);
            }
        };
        let (result, ()) = tokio::join!(acquire, remove);
        assert_matches!(result, Err(AdapterError::NotFound { .. }));
        assert!(!cache.contains(&a));
        assert_eq!(cache.stats().loading, 0);
    }

    #[tokio::test]
    async fn test_handle_accessors() {
        let (cache, _source) = setup(1, &["a"], false).await;
        let a = tenant("a");
        let handle = cache.acquire(&a).await.unwrap();
        assert_eq!(handle.version(), 1);
        assert_eq!(handle.adapter().record().tenant_id, a);
        let debug = format!("{handle:?}");
        assert!(debug.contains("version: 1"));
        drop(handle);
        assert_eq!(cache.stats().pinned, 0);
    }
}
