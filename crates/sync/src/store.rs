//! In-memory recipient store with atomic, coalesced refresh.
//!
//! [`RecipientStore`] keeps the last good snapshot of recipients and the
//! district / aid-type lookup tables. A refresh walks every page through the
//! collector and swaps the snapshot in one step only if the whole walk
//! succeeded; on failure the previous snapshot stays in place.
//!
//! At most one page walk runs per store, with at most one more queued
//! behind it. A refresh requested while a walk is running never joins that
//! walk, since its pages may predate the request: it joins the queued walk
//! instead (creating it if needed), which starts once the running walk has
//! finished. Every caller of a queued walk receives the same result.
//!
//! A walk is cancelled when every caller awaiting it has dropped its future,
//! or when [`RecipientStore::abandon`] is called. A cancelled walk never
//! touches the snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use bansos_client::api::ApiClient;
use bansos_client::pagination::{collect_all, CollectError, FailureKind, PageSource};
use bansos_core::filter::{filter_records, RecipientFilter};
use bansos_core::recipient::{AidTypeRef, DistrictRef, RecipientRecord};
use bansos_core::statistics::StatusBreakdown;
use bansos_core::types::DbId;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Errors surfaced by [`RecipientStore::refresh`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Collect(#[from] CollectError),

    /// The walk was cancelled before it could replace the snapshot.
    #[error("Refresh abandoned before completion")]
    Abandoned,
}

impl RefreshError {
    /// Fetch/parse classification, or `None` for an abandoned walk.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Collect(e) => Some(e.kind()),
            Self::Abandoned => None,
        }
    }
}

/// Outcome of a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Snapshot generation after the swap.
    pub generation: u64,
    pub recipients: usize,
    /// Set only when the reference tables were refreshed too.
    pub districts: Option<usize>,
    pub aid_types: Option<usize>,
    pub elapsed: Duration,
}

/// List endpoints the store walks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEndpoints {
    pub recipients: String,
    pub districts: String,
    pub aid_types: String,
}

impl StoreEndpoints {
    pub fn from_client(client: &ApiClient) -> Result<Self, CollectError> {
        Ok(Self {
            recipients: client.recipients_url(None)?,
            districts: client.districts_url(),
            aid_types: client.aid_types_url(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshScope {
    Recipients,
    All,
}

impl RefreshScope {
    fn covers(self, other: RefreshScope) -> bool {
        self == RefreshScope::All || self == other
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<RefreshSummary, RefreshError>>>;

struct Walk {
    id: u64,
    scope: RefreshScope,
    /// Child of the store-wide token, so [`RecipientStore::abandon`]
    /// reaches every walk.
    token: CancellationToken,
    future: SharedRefresh,
    /// Callers currently awaiting `future` through [`Step::Join`].
    waiters: usize,
}

#[derive(Default)]
struct Slots {
    /// The walk that is fetching pages.
    running: Option<Walk>,
    /// The walk that starts once `running` has finished.
    queued: Option<Walk>,
}

#[derive(Default)]
struct Snapshot {
    generation: u64,
    records: Arc<Vec<RecipientRecord>>,
    districts: Arc<Vec<DistrictRef>>,
    aid_types: Arc<Vec<AidTypeRef>>,
}

struct Fresh {
    records: Vec<RecipientRecord>,
    lookups: Option<(Vec<DistrictRef>, Vec<AidTypeRef>)>,
}

struct Inner {
    source: Arc<dyn PageSource>,
    endpoints: StoreEndpoints,
    max_pages: usize,
    snapshot: RwLock<Snapshot>,
    /// Lock order: `slots` before `cancel`.
    slots: Mutex<Slots>,
    cancel: Mutex<CancellationToken>,
    next_walk_id: AtomicU64,
    updates: watch::Sender<u64>,
}

/// Shared handle to the recipient snapshot. Cheap to clone.
#[derive(Clone)]
pub struct RecipientStore {
    inner: Arc<Inner>,
}

enum Step {
    Join { id: u64, future: SharedRefresh },
    WaitThenRetry(SharedRefresh),
}

/// Counts one caller of a walk; dropping the last one cancels the walk.
struct Waiter<'a> {
    inner: &'a Inner,
    id: u64,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        self.inner.leave(self.id);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RecipientStore {
    pub fn new(source: Arc<dyn PageSource>, endpoints: StoreEndpoints, max_pages: usize) -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                source,
                endpoints,
                max_pages,
                snapshot: RwLock::new(Snapshot::default()),
                slots: Mutex::new(Slots::default()),
                cancel: Mutex::new(CancellationToken::new()),
                next_walk_id: AtomicU64::new(0),
                updates,
            }),
        }
    }

    /// Build a store that walks the endpoints of `client`.
    pub fn from_client(client: ApiClient) -> Result<Self, CollectError> {
        let endpoints = StoreEndpoints::from_client(&client)?;
        let max_pages = client.config().max_pages;
        Ok(Self::new(Arc::new(client), endpoints, max_pages))
    }

    // ---- refresh ----

    /// Replace the recipient collection with a complete fresh walk.
    ///
    /// Every page is fetched after this call was made. Call after any
    /// successful create/update/delete/upload.
    pub async fn refresh(&self) -> Result<RefreshSummary, RefreshError> {
        self.run(RefreshScope::Recipients).await
    }

    /// Refresh recipients, districts, and aid types together. Nothing is
    /// replaced unless all three walks succeed.
    pub async fn refresh_all(&self) -> Result<RefreshSummary, RefreshError> {
        self.run(RefreshScope::All).await
    }

    /// Cancel the running and queued refreshes, if any. Their results are
    /// discarded and every caller waiting on them receives
    /// [`RefreshError::Abandoned`]. Later refreshes run normally.
    pub fn abandon(&self) {
        let mut slots = lock(&self.inner.slots);
        let mut cancel = lock(&self.inner.cancel);
        cancel.cancel();
        *cancel = CancellationToken::new();
        for walk in [slots.running.take(), slots.queued.take()].into_iter().flatten() {
            tracing::info!(walk_id = walk.id, "Abandoned in-flight refresh");
        }
    }

    /// `true` while a page walk is running or queued.
    pub fn is_refreshing(&self) -> bool {
        let slots = lock(&self.inner.slots);
        slots.running.is_some() || slots.queued.is_some()
    }

    /// Receiver that observes the snapshot generation after every swap.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.updates.subscribe()
    }

    async fn run(&self, scope: RefreshScope) -> Result<RefreshSummary, RefreshError> {
        loop {
            match self.join_or_start(scope) {
                Step::Join { id, future } => {
                    let _waiter = Waiter {
                        inner: &self.inner,
                        id,
                    };
                    return future.await;
                }
                Step::WaitThenRetry(future) => {
                    let _ = future.await;
                }
            }
        }
    }

    fn join_or_start(&self, scope: RefreshScope) -> Step {
        let mut slots = lock(&self.inner.slots);

        if let Some(queued) = slots.queued.as_mut() {
            if queued.scope.covers(scope) {
                queued.waiters += 1;
                tracing::debug!(walk_id = queued.id, "Joining queued refresh");
                return Step::Join {
                    id: queued.id,
                    future: queued.future.clone(),
                };
            }
            tracing::debug!(walk_id = queued.id, "Waiting behind narrower queued refresh");
            return Step::WaitThenRetry(queued.future.clone());
        }

        let previous = slots.running.as_ref().map(|w| w.future.clone());
        let is_queued = previous.is_some();

        let id = self.inner.next_walk_id.fetch_add(1, Ordering::Relaxed);
        let token = lock(&self.inner.cancel).child_token();
        let inner = Arc::clone(&self.inner);
        let walk_token = token.clone();
        let future = async move { inner.walk(id, scope, walk_token, previous).await }
            .boxed()
            .shared();

        let walk = Walk {
            id,
            scope,
            token,
            future: future.clone(),
            waiters: 1,
        };
        if is_queued {
            tracing::debug!(walk_id = id, "Queued refresh behind running walk");
            slots.queued = Some(walk);
        } else {
            slots.running = Some(walk);
        }
        Step::Join { id, future }
    }

    // ---- reads ----

    pub fn generation(&self) -> u64 {
        self.read(|s| s.generation)
    }

    /// The full recipient collection in server order.
    pub fn records(&self) -> Arc<Vec<RecipientRecord>> {
        self.read(|s| Arc::clone(&s.records))
    }

    pub fn districts(&self) -> Arc<Vec<DistrictRef>> {
        self.read(|s| Arc::clone(&s.districts))
    }

    pub fn aid_types(&self) -> Arc<Vec<AidTypeRef>> {
        self.read(|s| Arc::clone(&s.aid_types))
    }

    pub fn len(&self) -> usize {
        self.read(|s| s.records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn recipient(&self, id: DbId) -> Option<RecipientRecord> {
        self.read(|s| s.records.iter().find(|r| r.id == id).cloned())
    }

    pub fn district(&self, id: DbId) -> Option<DistrictRef> {
        self.read(|s| s.districts.iter().find(|d| d.id == id).cloned())
    }

    pub fn aid_type(&self, id: DbId) -> Option<AidTypeRef> {
        self.read(|s| s.aid_types.iter().find(|a| a.id == id).cloned())
    }

    /// Records matching `criteria`, in server order. Read-only.
    pub fn filter(&self, criteria: &RecipientFilter) -> Vec<RecipientRecord> {
        filter_records(&self.records(), criteria)
    }

    pub fn summary(&self) -> StatusBreakdown {
        StatusBreakdown::from_records(&self.records())
    }

    fn read<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        let snapshot = self
            .inner
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&snapshot)
    }
}

impl Inner {
    async fn walk(
        self: Arc<Self>,
        id: u64,
        scope: RefreshScope,
        token: CancellationToken,
        previous: Option<SharedRefresh>,
    ) -> Result<RefreshSummary, RefreshError> {
        let outcome = self.fetch_and_commit(id, scope, &token, previous).await;

        match &outcome {
            Ok(summary) => tracing::info!(
                walk_id = id,
                generation = summary.generation,
                recipients = summary.recipients,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "Store refreshed",
            ),
            Err(RefreshError::Abandoned) => {
                tracing::info!(walk_id = id, "Refresh abandoned, result discarded")
            }
            Err(e) => tracing::warn!(walk_id = id, error = %e, "Refresh failed, keeping previous data"),
        }

        self.finish(id);
        outcome
    }

    async fn fetch_and_commit(
        &self,
        id: u64,
        scope: RefreshScope,
        token: &CancellationToken,
        previous: Option<SharedRefresh>,
    ) -> Result<RefreshSummary, RefreshError> {
        if let Some(previous) = previous {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(RefreshError::Abandoned),
                _ = previous => self.promote(id),
            }
        }

        let started = Instant::now();
        let collected = tokio::select! {
            biased;
            _ = token.cancelled() => Err(RefreshError::Abandoned),
            result = self.collect(scope) => result,
        };

        // No await between this check and the swap.
        match collected {
            Ok(_) if token.is_cancelled() => Err(RefreshError::Abandoned),
            Ok(fresh) => Ok(self.commit(fresh, started)),
            Err(e) => Err(e),
        }
    }

    async fn collect(&self, scope: RefreshScope) -> Result<Fresh, RefreshError> {
        let source = &*self.source;
        let endpoints = &self.endpoints;
        match scope {
            RefreshScope::Recipients => {
                let records = collect_all(source, &endpoints.recipients, self.max_pages).await?;
                Ok(Fresh {
                    records,
                    lookups: None,
                })
            }
            RefreshScope::All => {
                let (records, districts, aid_types) = tokio::try_join!(
                    collect_all::<RecipientRecord, _>(source, &endpoints.recipients, self.max_pages),
                    collect_all::<DistrictRef, _>(source, &endpoints.districts, self.max_pages),
                    collect_all::<AidTypeRef, _>(source, &endpoints.aid_types, self.max_pages),
                )?;
                Ok(Fresh {
                    records,
                    lookups: Some((districts, aid_types)),
                })
            }
        }
    }

    fn commit(&self, fresh: Fresh, started: Instant) -> RefreshSummary {
        let mut snapshot = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        snapshot.generation += 1;
        let recipients = fresh.records.len();
        snapshot.records = Arc::new(fresh.records);

        let (districts, aid_types) = match fresh.lookups {
            Some((districts, aid_types)) => {
                let counts = (Some(districts.len()), Some(aid_types.len()));
                snapshot.districts = Arc::new(districts);
                snapshot.aid_types = Arc::new(aid_types);
                counts
            }
            None => (None, None),
        };

        let generation = snapshot.generation;
        drop(snapshot);
        self.updates.send_replace(generation);

        RefreshSummary {
            generation,
            recipients,
            districts,
            aid_types,
            elapsed: started.elapsed(),
        }
    }

    /// Move a queued walk into the running slot once its predecessor is done.
    fn promote(&self, id: u64) {
        let mut slots = lock(&self.slots);
        if slots.queued.as_ref().is_some_and(|w| w.id == id) {
            slots.running = slots.queued.take();
        }
    }

    fn finish(&self, id: u64) {
        let mut guard = lock(&self.slots);
        let slots = &mut *guard;
        for slot in [&mut slots.running, &mut slots.queued] {
            if slot.as_ref().is_some_and(|w| w.id == id) {
                *slot = None;
            }
        }
    }

    /// One caller of walk `id` went away. The last one out cancels the walk
    /// and frees its slot; a walk that already finished is not in a slot.
    fn leave(&self, id: u64) {
        let mut guard = lock(&self.slots);
        let slots = &mut *guard;
        for slot in [&mut slots.running, &mut slots.queued] {
            let Some(walk) = slot.as_mut().filter(|w| w.id == id) else {
                continue;
            };
            walk.waiters = walk.waiters.saturating_sub(1);
            if walk.waiters == 0 {
                walk.token.cancel();
                *slot = None;
                tracing::info!(walk_id = id, "Every caller dropped the refresh, abandoning it");
            }
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;

    struct NoPages;

    #[async_trait]
    impl PageSource for NoPages {
        async fn fetch_page(&self, url: &str) -> Result<Value, CollectError> {
            Err(CollectError::Transport {
                url: url.to_string(),
                reason: "offline".into(),
            })
        }
    }

    fn endpoints() -> StoreEndpoints {
        StoreEndpoints {
            recipients: "http://api.test/api/penerima-bantuan/".into(),
            districts: "http://api.test/api/kecamatan/".into(),
            aid_types: "http://api.test/api/jenis-bantuan/".into(),
        }
    }

    #[test]
    fn all_scope_covers_recipients_but_not_the_reverse() {
        assert!(RefreshScope::All.covers(RefreshScope::Recipients));
        assert!(RefreshScope::All.covers(RefreshScope::All));
        assert!(RefreshScope::Recipients.covers(RefreshScope::Recipients));
        assert!(!RefreshScope::Recipients.covers(RefreshScope::All));
    }

    #[test]
    fn new_store_is_empty_at_generation_zero() {
        let store = RecipientStore::new(Arc::new(NoPages), endpoints(), 10);
        assert!(store.is_empty());
        assert_eq!(store.generation(), 0);
        assert!(store.districts().is_empty());
        assert!(!store.is_refreshing());
        assert_eq!(store.summary().total, 0);
    }

    #[tokio::test]
    async fn transport_failure_is_fetch_kind_and_clears_slot() {
        let store = RecipientStore::new(Arc::new(NoPages), endpoints(), 10);
        let err = store.refresh().await.unwrap_err();

        assert_eq!(err.kind(), Some(FailureKind::Fetch));
        assert!(!store.is_refreshing());
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn abandoned_error_has_no_failure_kind() {
        assert_eq!(RefreshError::Abandoned.kind(), None);
    }
}
