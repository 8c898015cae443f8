use crate::grouping::{build_groups, patch_groups, patch_records};
use crate::join::{changed_records, join_records, reload_profiles};
use crate::lookup::RecordLookup;
use crate::naming::{OwnerNaming, SharedUidNaming};
use crate::policy::{CaseFoldCollator, LabelCollator, filter_and_sort};
use crate::profile_store::ProfileStore;
use crate::search::build_search;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use sumgr_contracts::AppResult;
use sumgr_contracts::models::{AppRecord, DirectoryFilters, DirectorySnapshot};
use sumgr_kernel::runtime::{lock_mutex, run_blocking};
use sumgr_service::ServiceConnectionManager;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RefreshMode {
    Full,
    ProfileOnly,
    Incremental,
    Skipped,
    Joined,
}

impl RefreshMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::ProfileOnly => "profile_only",
            Self::Incremental => "incremental",
            Self::Skipped => "skipped",
            Self::Joined => "joined",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub mode: RefreshMode,
    pub generation: u64,
    pub record_count: usize,
    pub duration_ms: u64,
}

impl RefreshOutcome {
    fn new(mode: RefreshMode, snapshot: &DirectorySnapshot, started_at: Instant) -> Self {
        Self {
            mode,
            generation: snapshot.generation,
            record_count: snapshot.all_records.len(),
            duration_ms: started_at.elapsed().as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DirectoryOptions {
    /// Package of the managing application, never listed.
    pub self_package: String,
    /// Forwarded to the package listing call.
    pub package_flags: u32,
    pub filters: DirectoryFilters,
}

enum ViewUpdate {
    Rebuild,
    Keep,
}

struct PublishState {
    filters: DirectoryFilters,
    search_text: String,
    needs_refresh: bool,
}

struct DirectoryInner {
    service: ServiceConnectionManager,
    store: Arc<dyn ProfileStore>,
    naming: Arc<dyn OwnerNaming>,
    collator: Arc<dyn LabelCollator>,
    options: DirectoryOptions,
    refresh_lock: tokio::sync::Mutex<()>,
    full_epoch: AtomicU64,
    last_full: Mutex<Option<AppResult<RefreshOutcome>>>,
    publish_state: Mutex<PublishState>,
    sender: watch::Sender<Arc<DirectorySnapshot>>,
}

/// Clears `is_refreshing` if a full refresh is abandoned before it publishes.
struct RefreshingReset<'a> {
    inner: &'a DirectoryInner,
    armed: bool,
}

impl<'a> RefreshingReset<'a> {
    fn arm(inner: &'a DirectoryInner) -> Self {
        inner.publish(|_, next| {
            next.is_refreshing = true;
            ViewUpdate::Keep
        });
        Self { inner, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RefreshingReset<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!(event = "app_directory_full_refresh_abandoned");
        self.inner.publish(|_, next| {
            next.is_refreshing = false;
            ViewUpdate::Keep
        });
    }
}

impl DirectoryInner {
    fn snapshot(&self) -> Arc<DirectorySnapshot> {
        Arc::clone(&self.sender.borrow())
    }

    /// Derives and publishes the next snapshot. Every writer goes through
    /// here, so views always combine the newest flags with the newest records.
    fn publish<F>(&self, edit: F) -> Arc<DirectorySnapshot>
    where
        F: FnOnce(&mut PublishState, &mut DirectorySnapshot) -> ViewUpdate,
    {
        let mut state = lock_mutex(&self.publish_state, "app_directory_publish");
        let current = self.snapshot();
        let mut next = DirectorySnapshot::clone(&current);

        let update = edit(&mut state, &mut next);
        next.generation = current.generation + 1;
        next.filters = state.filters;
        next.needs_refresh = state.needs_refresh;
        if matches!(update, ViewUpdate::Rebuild) {
            next.visible_records = filter_and_sort(
                next.all_records.as_slice(),
                state.filters,
                &self.options.self_package,
                self.collator.as_ref(),
            );
            next.groups = build_groups(
                &next.visible_records,
                self.store.as_ref(),
                self.naming.as_ref(),
            );
        }
        next.search = build_search(
            &state.search_text,
            &next.visible_records,
            &next.groups,
            next.is_refreshing && next.all_records.is_empty(),
        );

        let next = Arc::new(next);
        self.sender.send_replace(Arc::clone(&next));
        next
    }

    async fn enumerate(&self) -> AppResult<(BTreeSet<i32>, Vec<AppRecord>)> {
        let flags = self.options.package_flags;
        let (live_user_ids, packages) = self
            .service
            .with_channel("app_directory_enumerate", move |lease| {
                let live_user_ids = lease.list_user_ids()?;
                let packages = lease.list_packages(flags)?;
                Ok((live_user_ids, packages))
            })
            .await?;

        let store = Arc::clone(&self.store);
        let records = run_blocking("app_directory_join_profiles", move || {
            Ok(join_records(packages, store.as_ref()))
        })
        .await?;
        Ok((live_user_ids, records))
    }

    async fn run_full(&self) -> AppResult<RefreshOutcome> {
        let started_at = Instant::now();
        let mut refreshing = RefreshingReset::arm(self);
        tracing::info!(event = "app_directory_full_refresh_started");

        match self.enumerate().await {
            Ok((live_user_ids, records)) => {
                refreshing.disarm();
                let snapshot = self.publish(move |state, next| {
                    next.all_records = Arc::new(records);
                    next.live_user_ids = live_user_ids;
                    next.is_refreshing = false;
                    next.last_error = None;
                    state.needs_refresh = false;
                    ViewUpdate::Rebuild
                });
                let outcome = RefreshOutcome::new(RefreshMode::Full, &snapshot, started_at);
                tracing::info!(
                    event = "app_directory_full_refresh_finished",
                    generation = outcome.generation,
                    records = outcome.record_count,
                    visible = snapshot.visible_records.len(),
                    groups = snapshot.groups.len(),
                    users = snapshot.live_user_ids.len(),
                    duration_ms = outcome.duration_ms
                );
                Ok(outcome)
            }
            Err(error) => {
                refreshing.disarm();
                let kind = error.kind();
                self.publish(|_, next| {
                    next.is_refreshing = false;
                    next.last_error = Some(kind);
                    ViewUpdate::Keep
                });
                tracing::warn!(
                    event = "app_directory_full_refresh_failed",
                    kind = %kind,
                    code = error.code.as_str(),
                    message = error.message.as_str(),
                    duration_ms = started_at.elapsed().as_millis() as u64
                );
                Err(error)
            }
        }
    }

    fn joined_outcome(&self) -> AppResult<RefreshOutcome> {
        let last = lock_mutex(&self.last_full, "app_directory_last_full").clone();
        tracing::debug!(event = "app_directory_refresh_joined");
        match last {
            Some(Ok(outcome)) => Ok(RefreshOutcome {
                mode: RefreshMode::Joined,
                ..outcome
            }),
            Some(Err(error)) => Err(error),
            None => Ok(RefreshOutcome {
                mode: RefreshMode::Joined,
                generation: self.snapshot().generation,
                record_count: self.snapshot().all_records.len(),
                duration_ms: 0,
            }),
        }
    }

    async fn reload_profiles(&self, resort: bool) -> AppResult<RefreshOutcome> {
        let started_at = Instant::now();
        let _refresh = self.refresh_lock.lock().await;
        let current = self.snapshot();
        if current.all_records.is_empty() {
            tracing::debug!(event = "app_directory_profile_refresh_skipped");
            return Ok(RefreshOutcome::new(RefreshMode::Skipped, &current, started_at));
        }

        let previous = Arc::clone(&current.all_records);
        let store = Arc::clone(&self.store);
        let source = Arc::clone(&previous);
        let reloaded = run_blocking("app_directory_reload_profiles", move || {
            Ok(reload_profiles(source.as_slice(), store.as_ref()))
        })
        .await?;

        let (mode, snapshot) = if resort {
            let snapshot = self.publish(move |state, next| {
                next.all_records = Arc::new(reloaded);
                state.needs_refresh = false;
                ViewUpdate::Rebuild
            });
            (RefreshMode::ProfileOnly, snapshot)
        } else {
            let patches = changed_records(previous.as_slice(), reloaded.as_slice());
            let snapshot = self.publish(move |state, next| {
                patch_records(&mut next.visible_records, &patches);
                patch_groups(&mut next.groups, &patches);
                next.all_records = Arc::new(reloaded);
                state.needs_refresh = false;
                ViewUpdate::Keep
            });
            (RefreshMode::Incremental, snapshot)
        };

        let outcome = RefreshOutcome::new(mode, &snapshot, started_at);
        tracing::info!(
            event = "app_directory_profile_refresh_finished",
            mode = mode.as_str(),
            generation = outcome.generation,
            records = outcome.record_count,
            duration_ms = outcome.duration_ms
        );
        Ok(outcome)
    }
}

/// The single source of truth for installed apps and their profile state.
/// Cloning yields another handle to the same directory.
#[derive(Clone)]
pub struct AppDirectory {
    inner: Arc<DirectoryInner>,
}

impl AppDirectory {
    pub fn new(
        service: ServiceConnectionManager,
        store: Arc<dyn ProfileStore>,
        options: DirectoryOptions,
    ) -> Self {
        Self::with_parts(
            service,
            store,
            Arc::new(SharedUidNaming::new()),
            Arc::new(CaseFoldCollator),
            options,
        )
    }

    pub fn with_parts(
        service: ServiceConnectionManager,
        store: Arc<dyn ProfileStore>,
        naming: Arc<dyn OwnerNaming>,
        collator: Arc<dyn LabelCollator>,
        options: DirectoryOptions,
    ) -> Self {
        let initial = DirectorySnapshot {
            filters: options.filters,
            ..DirectorySnapshot::default()
        };
        let (sender, _) = watch::channel(Arc::new(initial));
        Self {
            inner: Arc::new(DirectoryInner {
                service,
                store,
                naming,
                collator,
                publish_state: Mutex::new(PublishState {
                    filters: options.filters,
                    search_text: String::new(),
                    needs_refresh: false,
                }),
                options,
                refresh_lock: tokio::sync::Mutex::new(()),
                full_epoch: AtomicU64::new(0),
                last_full: Mutex::new(None),
                sender,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<DirectorySnapshot>> {
        self.inner.sender.subscribe()
    }

    pub fn snapshot(&self) -> Arc<DirectorySnapshot> {
        self.inner.snapshot()
    }

    pub fn record_lookup(&self) -> RecordLookup {
        RecordLookup::new(self.inner.sender.subscribe())
    }

    pub fn service(&self) -> &ServiceConnectionManager {
        &self.inner.service
    }

    /// `force` or an empty cache runs a full refresh; otherwise profiles are
    /// re-read, re-sorted when `resort` is set and patched in place when not.
    pub async fn trigger_refresh(&self, force: bool, resort: bool) -> AppResult<RefreshOutcome> {
        if force || self.snapshot().all_records.is_empty() {
            return self.fetch().await;
        }
        if resort {
            self.refresh().await
        } else {
            self.refresh_incremental().await
        }
    }

    /// Full refresh through the enumeration service. A caller arriving while
    /// one is running waits for it and shares its outcome.
    pub async fn fetch(&self) -> AppResult<RefreshOutcome> {
        let inner = self.inner.as_ref();
        let observed_epoch = inner.full_epoch.load(Ordering::SeqCst);
        let _refresh = inner.refresh_lock.lock().await;
        if inner.full_epoch.load(Ordering::SeqCst) != observed_epoch {
            return inner.joined_outcome();
        }

        let result = inner.run_full().await;
        *lock_mutex(&inner.last_full, "app_directory_last_full") = Some(result.clone());
        inner.full_epoch.fetch_add(1, Ordering::SeqCst);
        result
    }

    /// Profile-only refresh with re-sort. No-op on an empty cache.
    pub async fn refresh(&self) -> AppResult<RefreshOutcome> {
        self.inner.reload_profiles(true).await
    }

    pub async fn refresh_incremental(&self) -> AppResult<RefreshOutcome> {
        self.inner.reload_profiles(false).await
    }

    pub fn set_show_system_apps(&self, show: bool) -> Arc<DirectorySnapshot> {
        self.inner.publish(|state, _| {
            state.filters.show_system_apps = show;
            ViewUpdate::Rebuild
        })
    }

    pub fn set_show_only_primary_user_apps(&self, only_primary: bool) -> Arc<DirectorySnapshot> {
        self.inner.publish(|state, _| {
            state.filters.show_only_primary_user_apps = only_primary;
            ViewUpdate::Rebuild
        })
    }

    pub fn update_search_text(&self, text: impl Into<String>) -> Arc<DirectorySnapshot> {
        let text = text.into();
        self.inner.publish(move |state, _| {
            state.search_text = text;
            ViewUpdate::Keep
        })
    }

    pub fn mark_needs_refresh(&self) -> Arc<DirectorySnapshot> {
        self.inner.publish(|state, _| {
            state.needs_refresh = true;
            ViewUpdate::Keep
        })
    }
}

#[cfg(test)]
#[path = "../tests/directory/directory_tests.rs"]
mod directory_tests;
