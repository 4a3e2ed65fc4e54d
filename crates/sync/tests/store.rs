//! Integration tests for the recipient store and its hand-off to the
//! marker reconciler.
//!
//! Pages come from an in-memory [`ScriptedSource`]. Its optional gate holds
//! every fetch until permits are added, which lets tests interleave
//! concurrent refreshes deterministically on the current-thread runtime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use bansos_client::pagination::{CollectError, FailureKind, PageSource};
use bansos_core::filter::RecipientFilter;
use bansos_core::status::EconomicStatus;
use bansos_core::types::DbId;
use bansos_sync::reconciler::MarkerReconciler;
use bansos_sync::store::{RecipientStore, RefreshError, StoreEndpoints};
use bansos_sync::surface::{FitRequest, MapSurface, MarkerSpec};
use futures::FutureExt;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

const RECIPIENTS: &str = "http://api.test/api/penerima-bantuan/";
const RECIPIENTS_P2: &str = "http://api.test/api/penerima-bantuan/?page=2";
const DISTRICTS: &str = "http://api.test/api/kecamatan/";
const AID_TYPES: &str = "http://api.test/api/jenis-bantuan/";

#[derive(Default)]
struct ScriptedSource {
    pages: Mutex<HashMap<String, Result<Value, CollectError>>>,
    requests: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedSource {
    fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    fn set(&self, url: &str, body: Value) {
        self.pages.lock().unwrap().insert(url.to_string(), Ok(body));
    }

    fn fail(&self, url: &str, status: u16) {
        self.pages.lock().unwrap().insert(
            url.to_string(),
            Err(CollectError::Status {
                url: url.to_string(),
                status,
                body: "Server error".into(),
            }),
        );
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_page(&self, url: &str) -> Result<Value, CollectError> {
        self.requests.lock().unwrap().push(url.to_string());
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.pages.lock().unwrap().get(url).cloned().unwrap_or_else(|| {
            Err(CollectError::Status {
                url: url.to_string(),
                status: 404,
                body: "Not found.".into(),
            })
        })
    }
}

fn endpoints() -> StoreEndpoints {
    StoreEndpoints {
        recipients: RECIPIENTS.into(),
        districts: DISTRICTS.into(),
        aid_types: AID_TYPES.into(),
    }
}

fn store_over(source: &Arc<ScriptedSource>) -> RecipientStore {
    RecipientStore::new(source.clone(), endpoints(), 50)
}

fn recipient(id: DbId, name: &str, district: &str, income: &str, coords: Option<(&str, &str)>) -> Value {
    json!({
        "id": id,
        "nama_kepala_keluarga": name,
        "jumlah_anggota_keluarga": 4,
        "kecamatan": 1,
        "kecamatan_nama": district,
        "nama_desa": "Kadipaten",
        "alamat": "Jl. Veteran",
        "jenis_bantuan": 1,
        "jenis_bantuan_nama": "PKH",
        "pendapatan_per_bulan": income,
        "latitude": coords.map(|c| c.0),
        "longitude": coords.map(|c| c.1),
        "photos": [],
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-01T00:00:00Z"
    })
}

fn lookup(id: DbId, name: &str) -> Value {
    json!({
        "id": id,
        "nama": name,
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-01T00:00:00Z"
    })
}

/// Two pages: Budi (mapped, severely poor) and Siti (mapped, vulnerable)
/// then Agus (unmapped, poor).
fn seed_two_pages(source: &ScriptedSource) {
    source.set(
        RECIPIENTS,
        json!({
            "count": 3,
            "next": RECIPIENTS_P2,
            "results": [
                recipient(1, "Budi Santoso", "Bojonegoro", "750000.00", Some(("-7.15", "111.88"))),
                recipient(2, "Siti Aminah", "Kapas", "2500000.00", Some(("-7.18", "111.90"))),
            ]
        }),
    );
    source.set(
        RECIPIENTS_P2,
        json!({
            "count": 3,
            "next": null,
            "results": [recipient(3, "Agus Salim", "Dander", "1500000.00", None)]
        }),
    );
}

fn seed_lookups(source: &ScriptedSource) {
    source.set(DISTRICTS, json!([lookup(1, "Bojonegoro"), lookup(2, "Kapas")]));
    source.set(AID_TYPES, json!({"next": null, "results": [lookup(1, "PKH")]}));
}

fn ids(records: &[bansos_core::recipient::RecipientRecord]) -> Vec<DbId> {
    records.iter().map(|r| r.id).collect()
}

// ---------------------------------------------------------------------------
// Test: refresh replaces the collection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refresh_walks_every_page_and_swaps_snapshot() {
    let source = Arc::new(ScriptedSource::default());
    seed_two_pages(&source);
    let store = store_over(&source);

    let summary = store.refresh().await.unwrap();

    assert_eq!(summary.generation, 1);
    assert_eq!(summary.recipients, 3);
    assert_eq!(summary.districts, None);
    assert_eq!(ids(&store.records()), vec![1, 2, 3]);
    assert_eq!(source.request_count(), 2);
}

#[tokio::test]
async fn refresh_drops_records_deleted_on_the_server() {
    let source = Arc::new(ScriptedSource::default());
    seed_two_pages(&source);
    let store = store_over(&source);
    store.refresh().await.unwrap();

    source.set(
        RECIPIENTS,
        json!([recipient(2, "Siti Aminah", "Kapas", "2500000.00", None)]),
    );
    store.refresh().await.unwrap();

    assert_eq!(ids(&store.records()), vec![2]);
    assert!(store.recipient(1).is_none());
    assert_eq!(store.generation(), 2);
}

#[tokio::test]
async fn filter_reads_from_the_current_snapshot() {
    let source = Arc::new(ScriptedSource::default());
    seed_two_pages(&source);
    let store = store_over(&source);
    store.refresh().await.unwrap();

    let by_district = store.filter(&RecipientFilter::default().search("bojonegoro"));
    assert_eq!(ids(&by_district), vec![1]);

    let poor = store.filter(&RecipientFilter::default().status(EconomicStatus::Poor));
    assert_eq!(ids(&poor), vec![3]);

    assert_eq!(store.filter(&RecipientFilter::default()).len(), 3);
}

#[tokio::test]
async fn summary_counts_current_records() {
    let source = Arc::new(ScriptedSource::default());
    seed_two_pages(&source);
    let store = store_over(&source);
    store.refresh().await.unwrap();

    let summary = store.summary();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.with_coordinates, 2);
    assert_eq!(summary.count(EconomicStatus::SeverelyPoor), 1);
    assert_eq!(summary.count(EconomicStatus::Vulnerable), 1);
}

#[tokio::test]
async fn subscribers_observe_each_generation() {
    let source = Arc::new(ScriptedSource::default());
    seed_two_pages(&source);
    let store = store_over(&source);
    let mut updates = store.subscribe();

    store.refresh().await.unwrap();
    assert!(updates.has_changed().unwrap());
    assert_eq!(*updates.borrow_and_update(), 1);

    source.fail(RECIPIENTS, 500);
    store.refresh().await.unwrap_err();
    assert!(!updates.has_changed().unwrap());
}

// ---------------------------------------------------------------------------
// Test: failures keep the previous snapshot
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_refresh_keeps_previous_records() {
    let source = Arc::new(ScriptedSource::default());
    seed_two_pages(&source);
    let store = store_over(&source);
    store.refresh().await.unwrap();

    source.fail(RECIPIENTS, 503);
    let err = store.refresh().await.unwrap_err();

    assert_matches!(err, RefreshError::Collect(CollectError::Status { status: 503, .. }));
    assert_eq!(err.kind(), Some(FailureKind::Fetch));
    assert_eq!(ids(&store.records()), vec![1, 2, 3]);
    assert_eq!(store.generation(), 1);
}

#[tokio::test]
async fn failure_on_a_later_page_keeps_previous_records() {
    let source = Arc::new(ScriptedSource::default());
    seed_two_pages(&source);
    let store = store_over(&source);
    store.refresh().await.unwrap();

    source.set(
        RECIPIENTS,
        json!({"next": RECIPIENTS_P2, "results": [recipient(9, "Baru", "Kapas", "100", None)]}),
    );
    source.fail(RECIPIENTS_P2, 500);
    store.refresh().await.unwrap_err();

    assert_eq!(ids(&store.records()), vec![1, 2, 3]);
    assert!(store.recipient(9).is_none());
}

#[tokio::test]
async fn unparsable_page_is_reported_as_parse_failure() {
    let source = Arc::new(ScriptedSource::default());
    source.set(RECIPIENTS, json!({"detail": "Invalid page."}));
    let store = store_over(&source);

    let err = store.refresh().await.unwrap_err();
    assert_eq!(err.kind(), Some(FailureKind::Parse));
    assert!(store.is_empty());
}

// ---------------------------------------------------------------------------
// Test: reference tables
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refresh_all_loads_lookup_tables() {
    let source = Arc::new(ScriptedSource::default());
    seed_two_pages(&source);
    seed_lookups(&source);
    let store = store_over(&source);

    let summary = store.refresh_all().await.unwrap();

    assert_eq!(summary.recipients, 3);
    assert_eq!(summary.districts, Some(2));
    assert_eq!(summary.aid_types, Some(1));
    assert_eq!(store.district(2).map(|d| d.name), Some("Kapas".to_string()));
    assert_eq!(store.aid_type(1).map(|a| a.name), Some("PKH".to_string()));
}

#[tokio::test]
async fn refresh_all_is_all_or_nothing() {
    let source = Arc::new(ScriptedSource::default());
    seed_two_pages(&source);
    seed_lookups(&source);
    let store = store_over(&source);
    store.refresh_all().await.unwrap();

    source.set(RECIPIENTS, json!([]));
    source.set(DISTRICTS, json!([]));
    source.fail(AID_TYPES, 500);
    store.refresh_all().await.unwrap_err();

    assert_eq!(store.len(), 3);
    assert_eq!(store.districts().len(), 2);
    assert_eq!(store.aid_types().len(), 1);
    assert_eq!(store.generation(), 1);
}

#[tokio::test]
async fn recipient_refresh_leaves_lookup_tables_alone() {
    let source = Arc::new(ScriptedSource::default());
    seed_two_pages(&source);
    seed_lookups(&source);
    let store = store_over(&source);
    store.refresh_all().await.unwrap();

    source.set(DISTRICTS, json!([]));
    store.refresh().await.unwrap();

    assert_eq!(store.districts().len(), 2);
}

// ---------------------------------------------------------------------------
// Test: concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refreshes_during_a_walk_share_one_queued_walk() {
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(ScriptedSource::gated(gate.clone()));
    source.set(RECIPIENTS, json!([recipient(1, "Budi", "Kapas", "500000", None)]));
    let store = store_over(&source);

    let (first, second, third, ()) =
        tokio::join!(store.refresh(), store.refresh(), store.refresh(), async {
            tokio::task::yield_now().await;
            gate.add_permits(10);
        });

    let (first, second, third) = (first.unwrap(), second.unwrap(), third.unwrap());
    assert_eq!(first.generation, 1);
    assert_eq!(second, third);
    assert_eq!(second.generation, 2);
    // The running walk plus one queued walk, never one per caller.
    assert_eq!(source.request_count(), 2);
    assert!(!store.is_refreshing());
}

#[tokio::test]
async fn refresh_requested_mid_walk_sees_later_server_data() {
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(ScriptedSource::gated(gate.clone()));
    source.set(RECIPIENTS, json!([recipient(1, "Budi", "Kapas", "500000", None)]));
    let store = store_over(&source);

    let (first, after_write, ()) = tokio::join!(store.refresh(), store.refresh(), async {
        tokio::task::yield_now().await;
        source.set(RECIPIENTS, json!([recipient(2, "Siti", "Kapas", "500000", None)]));
        gate.add_permits(10);
    });

    assert_eq!(first.unwrap().generation, 1);
    assert_eq!(after_write.unwrap().generation, 2);
    assert_eq!(ids(&store.records()), vec![2]);
    assert_eq!(source.request_count(), 2);
}

#[tokio::test]
async fn wider_refresh_waits_for_in_flight_walk() {
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(ScriptedSource::gated(gate.clone()));
    source.set(RECIPIENTS, json!([recipient(1, "Budi", "Kapas", "500000", None)]));
    seed_lookups(&source);
    let store = store_over(&source);

    let (narrow, wide, ()) = tokio::join!(store.refresh(), store.refresh_all(), async {
        tokio::task::yield_now().await;
        gate.add_permits(10);
    });

    assert_eq!(narrow.unwrap().generation, 1);
    let wide = wide.unwrap();
    assert_eq!(wide.generation, 2);
    assert_eq!(wide.districts, Some(2));
    // One walk for recipients, then recipients + districts + aid types.
    assert_eq!(source.request_count(), 4);
}

#[tokio::test]
async fn abandoned_refresh_is_discarded() {
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(ScriptedSource::gated(gate.clone()));
    source.set(RECIPIENTS, json!([recipient(1, "Budi", "Kapas", "500000", None)]));
    let store = store_over(&source);

    let (result, ()) = tokio::join!(store.refresh(), async {
        tokio::task::yield_now().await;
        store.abandon();
        gate.add_permits(10);
    });

    assert_matches!(result, Err(RefreshError::Abandoned));
    assert!(store.is_empty());
    assert_eq!(store.generation(), 0);
    assert!(!store.is_refreshing());

    // The store is still usable afterwards.
    store.refresh().await.unwrap();
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn dropped_refresh_never_touches_the_store() {
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(ScriptedSource::gated(gate.clone()));
    source.set(RECIPIENTS, json!([recipient(1, "Budi", "Kapas", "500000", None)]));
    let store = store_over(&source);

    // The caller goes away while the first page is still outstanding.
    assert!(store.refresh().now_or_never().is_none());
    assert!(!store.is_refreshing());

    source.set(RECIPIENTS, json!([recipient(2, "Siti", "Kapas", "500000", None)]));
    gate.add_permits(10);
    let summary = store.refresh().await.unwrap();

    assert_eq!(summary.generation, 1);
    assert_eq!(ids(&store.records()), vec![2]);
    assert_eq!(source.request_count(), 2);
}

#[tokio::test]
async fn timed_out_refresh_is_not_reused() {
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(ScriptedSource::gated(gate.clone()));
    source.set(RECIPIENTS, json!([recipient(1, "Budi", "Kapas", "500000", None)]));
    let store = store_over(&source);

    let timed_out = tokio::time::timeout(Duration::from_millis(20), store.refresh()).await;
    assert!(timed_out.is_err());
    assert!(!store.is_refreshing());

    source.set(RECIPIENTS, json!([recipient(2, "Siti", "Kapas", "500000", None)]));
    gate.add_permits(10);
    store.refresh().await.unwrap();

    assert_eq!(ids(&store.records()), vec![2]);
    assert_eq!(source.request_count(), 2);
}

#[tokio::test]
async fn queued_walk_survives_one_caller_dropping() {
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(ScriptedSource::gated(gate.clone()));
    source.set(RECIPIENTS, json!([recipient(1, "Budi", "Kapas", "500000", None)]));
    let store = store_over(&source);

    let (first, queued, ()) = tokio::join!(store.refresh(), store.refresh(), async {
        // Joins the queued walk, then gives up on it.
        assert!(store.refresh().now_or_never().is_none());
        gate.add_permits(10);
    });

    assert_eq!(first.unwrap().generation, 1);
    assert_eq!(queued.unwrap().generation, 2);
    assert_eq!(source.request_count(), 2);
}

#[tokio::test]
async fn abandon_without_refresh_is_harmless() {
    let source = Arc::new(ScriptedSource::default());
    seed_two_pages(&source);
    let store = store_over(&source);

    store.abandon();
    store.refresh().await.unwrap();
    assert_eq!(store.len(), 3);
}

// ---------------------------------------------------------------------------
// Test: store feeding the reconciler
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CountingSurface {
    next_handle: u64,
    live: HashMap<u64, MarkerSpec>,
    adds: usize,
    updates: usize,
    removes: usize,
    fits: Vec<FitRequest>,
}

impl MapSurface for CountingSurface {
    type Handle = u64;

    fn add_marker(&mut self, marker: &MarkerSpec) -> u64 {
        self.next_handle += 1;
        self.live.insert(self.next_handle, *marker);
        self.adds += 1;
        self.next_handle
    }

    fn update_marker(&mut self, handle: &mut u64, marker: &MarkerSpec) {
        self.live.insert(*handle, *marker);
        self.updates += 1;
    }

    fn remove_marker(&mut self, handle: u64) {
        self.live.remove(&handle);
        self.removes += 1;
    }

    fn fit_bounds(&mut self, request: FitRequest) {
        self.fits.push(request);
    }
}

#[tokio::test]
async fn filtered_view_drives_the_map() {
    let source = Arc::new(ScriptedSource::default());
    seed_two_pages(&source);
    let store = store_over(&source);
    store.refresh().await.unwrap();

    let mut surface = CountingSurface::default();
    let mut markers = MarkerReconciler::<CountingSurface>::default();

    // Agus has no coordinates and never gets a marker.
    let report = markers.reconcile(&mut surface, &store.filter(&RecipientFilter::default()));
    assert_eq!((report.created, report.malformed), (2, 0));
    assert_eq!(surface.live.len(), 2);

    // Narrowing the filter removes the hidden marker.
    let kapas = store.filter(&RecipientFilter::default().search("kapas"));
    let report = markers.reconcile(&mut surface, &kapas);
    assert_eq!((report.created, report.updated, report.removed), (0, 0, 1));
    assert_eq!(markers.tracked_ids(), vec![2]);

    // Server data changes: Siti moves, Agus gains coordinates.
    source.set(
        RECIPIENTS,
        json!([
            recipient(2, "Siti Aminah", "Kapas", "2500000.00", Some(("-7.20", "111.95"))),
            recipient(3, "Agus Salim", "Dander", "1500000.00", Some(("-7.10", "111.80"))),
        ]),
    );
    store.refresh().await.unwrap();

    surface.fits.clear();
    let report = markers.reconcile(&mut surface, &store.filter(&RecipientFilter::default()));
    assert_eq!((report.created, report.updated, report.removed), (1, 1, 0));
    assert_eq!(surface.fits.len(), 1);
    assert_eq!(surface.adds, 3);
    assert_eq!(surface.updates, 1);
    assert_eq!(surface.removes, 1);

    // Same data again changes nothing.
    let report = markers.reconcile(&mut surface, &store.filter(&RecipientFilter::default()));
    assert!(report.is_noop());
}
