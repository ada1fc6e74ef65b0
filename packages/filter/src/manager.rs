//! Filter State Manager.
//!
//! Owns the current [`FilterSpec`], triggers exactly one gateway fetch per
//! change, and publishes incident snapshots through a `watch` channel.
//!
//! Fetches may complete out of order. Each one is tagged with a sequence
//! number at initiation and its result is only published if no newer fetch
//! has been initiated since, so the map always reflects the latest request.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crisp_incident_models::Incident;
use crisp_server_models::IncidentQueryParams;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{FilterSpec, FilterUpdate, IncidentGateway, to_query};

/// Consecutive failed fetches after which [`FetchStatus::Degraded`] is
/// reported.
pub const FAILURE_NOTICE_THRESHOLD: u32 = 3;

/// Health of the incident feed, for a non-blocking notice in the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    /// Last fetch succeeded, or failures are below the notice threshold.
    Ok,
    /// Several fetches in a row failed. The last good snapshot is still
    /// displayed.
    Degraded {
        consecutive_failures: u32,
        last_error: String,
    },
}

struct Shared<G> {
    gateway: G,
    spec: Mutex<FilterSpec>,
    /// Sequence number of the most recently initiated fetch.
    latest: AtomicU64,
    /// Serializes the staleness check with the publish.
    publish: Mutex<()>,
    failures: AtomicU32,
    last_error: Mutex<Option<String>>,
    incidents: watch::Sender<Arc<[Incident]>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds the filter selection and the incident snapshot derived from it.
///
/// Cheap to clone; clones share state.
pub struct FilterStateManager<G> {
    shared: Arc<Shared<G>>,
}

impl<G> Clone for FilterStateManager<G> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<G: IncidentGateway + 'static> FilterStateManager<G> {
    /// Creates a manager with `spec` as the initial selection. No fetch is
    /// made until [`Self::refresh`] or [`Self::set_filter`] is called.
    #[must_use]
    pub fn new(gateway: G, spec: FilterSpec) -> Self {
        let (incidents, _) = watch::channel(Arc::<[Incident]>::from(Vec::new()));
        Self {
            shared: Arc::new(Shared {
                gateway,
                spec: Mutex::new(spec),
                latest: AtomicU64::new(0),
                publish: Mutex::new(()),
                failures: AtomicU32::new(0),
                last_error: Mutex::new(None),
                incidents,
            }),
        }
    }

    /// The current filter selection.
    #[must_use]
    pub fn spec(&self) -> FilterSpec {
        lock(&self.shared.spec).clone()
    }

    /// The most recently published incident snapshot.
    #[must_use]
    pub fn incidents(&self) -> Arc<[Incident]> {
        self.shared.incidents.borrow().clone()
    }

    /// Subscribes to incident snapshot changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<[Incident]>> {
        self.shared.incidents.subscribe()
    }

    /// Merges `update` into the selection and starts one fetch for the
    /// result.
    ///
    /// The returned handle resolves once that fetch has been applied or
    /// discarded; callers are free to drop it.
    pub fn set_filter(&self, update: FilterUpdate) -> JoinHandle<()> {
        let (seq, query) = {
            let mut spec = lock(&self.shared.spec);
            *spec = spec.merge(update);
            log::debug!("Filter changed: {spec:?}");
            (self.shared.next_seq(), to_query(&spec))
        };
        self.spawn_fetch(seq, query)
    }

    /// Fetches again for the current selection.
    pub fn refresh(&self) -> JoinHandle<()> {
        let (seq, query) = {
            let spec = lock(&self.shared.spec);
            (self.shared.next_seq(), to_query(&spec))
        };
        self.spawn_fetch(seq, query)
    }

    /// Whether the feed is currently failing repeatedly.
    #[must_use]
    pub fn fetch_status(&self) -> FetchStatus {
        let consecutive_failures = self.shared.failures.load(Ordering::SeqCst);
        if consecutive_failures < FAILURE_NOTICE_THRESHOLD {
            return FetchStatus::Ok;
        }
        FetchStatus::Degraded {
            consecutive_failures,
            last_error: lock(&self.shared.last_error)
                .clone()
                .unwrap_or_default(),
        }
    }

    fn spawn_fetch(&self, seq: u64, query: IncidentQueryParams) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.fetch(seq, query).await })
    }
}

impl<G> Shared<G> {
    /// Claims the next sequence number. Called with the spec lock held so
    /// sequence order matches the order selections were made in.
    fn next_seq(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl<G: IncidentGateway> Shared<G> {
    async fn fetch(&self, seq: u64, query: IncidentQueryParams) {
        let result = self.gateway.fetch(&query).await;

        let _guard = lock(&self.publish);
        let latest = self.latest.load(Ordering::SeqCst);
        if seq != latest {
            log::debug!("Discarding stale incident fetch #{seq} (latest is #{latest})");
            return;
        }

        match result {
            Ok(incidents) => {
                log::debug!("Fetch #{seq} returned {} incidents", incidents.len());
                self.failures.store(0, Ordering::SeqCst);
                *lock(&self.last_error) = None;
                self.incidents.send_replace(Arc::from(incidents));
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                log::error!("Failed to fetch incidents ({failures} in a row): {e}");
                *lock(&self.last_error) = Some(e.to_string());
            }
        }
    }
}
