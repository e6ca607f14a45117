//! Periodic refresh coordination.
//!
//! One [`SymbolUpdateCoordinator`] exists per refresh-interval group. It runs
//! fetch cycles strictly one at a time, keeps the merged quote data, schedules
//! the next cycle (nominal interval after success, a fixed short interval
//! after failure) and notifies registered listeners after every cycle.

mod groups;
mod timer;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::UpdateFailed;
use crate::models::{QuoteData, QuoteRecord, ScanInterval};
use crate::provider::QuoteSource;
use crate::reconcile::{extract_result, reconcile};

pub use groups::CoordinatorGroups;
use timer::TimerSlot;

/// Retry delay after a failed cycle.
pub const FAILURE_REFRESH_INTERVAL: Duration = Duration::from_secs(20);

/// Delay before the refresh that follows `add_symbol`.
pub const FOLLOW_UP_REFRESH_DELAY: Duration = Duration::from_secs(5);

/// Timing settings shared by coordinators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Delay before the next cycle after a failed one.
    pub failure_interval: Duration,
    /// Debounce delay for the refresh following `add_symbol`.
    pub follow_up_delay: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            failure_interval: FAILURE_REFRESH_INTERVAL,
            follow_up_delay: FOLLOW_UP_REFRESH_DELAY,
        }
    }
}

/// Where the coordinator is in its refresh cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CyclePhase {
    Idle,
    Fetching,
    Succeeded,
    Failed,
}

/// Callback invoked after every refresh cycle.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`SymbolUpdateCoordinator::add_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Serializable view of a coordinator.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorSnapshot {
    pub name: String,
    pub scan_interval: ScanInterval,
    pub symbols: Vec<String>,
    pub last_update_success: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub phase: CyclePhase,
    pub data: BTreeMap<String, QuoteRecord>,
}

struct CycleState {
    symbols: Vec<String>,
    data: QuoteData,
    last_update_success: bool,
    last_updated: Option<DateTime<Utc>>,
    last_error: Option<UpdateFailed>,
    phase: CyclePhase,
}

struct Inner {
    name: String,
    update_interval: ScanInterval,
    settings: CoordinatorSettings,
    source: Arc<dyn QuoteSource>,
    state: RwLock<CycleState>,
    cycle_lock: tokio::sync::Mutex<()>,
    refresh_requested: AtomicBool,
    closed: AtomicBool,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener_id: AtomicU64,
    poll_timer: TimerSlot,
    follow_up_timer: TimerSlot,
}

/// Refresh coordinator for one group of symbols sharing a poll period.
///
/// Cheap to clone; clones share the same state. Scheduling methods spawn
/// tokio tasks and must be called from within a runtime.
#[derive(Clone)]
pub struct SymbolUpdateCoordinator {
    inner: Arc<Inner>,
}

/// Non-owning handle to a coordinator, used by timers and listeners.
#[derive(Clone)]
pub struct WeakCoordinator {
    inner: Weak<Inner>,
}

impl WeakCoordinator {
    pub fn upgrade(&self) -> Option<SymbolUpdateCoordinator> {
        self.inner
            .upgrade()
            .map(|inner| SymbolUpdateCoordinator { inner })
    }
}

impl SymbolUpdateCoordinator {
    pub fn new(
        name: impl Into<String>,
        symbols: Vec<String>,
        update_interval: ScanInterval,
        source: Arc<dyn QuoteSource>,
        settings: CoordinatorSettings,
    ) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if !unique.contains(&symbol) {
                unique.push(symbol);
            }
        }

        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                update_interval,
                settings,
                source,
                state: RwLock::new(CycleState {
                    symbols: unique,
                    data: QuoteData::new(),
                    last_update_success: false,
                    last_updated: None,
                    last_error: None,
                    phase: CyclePhase::Idle,
                }),
                cycle_lock: tokio::sync::Mutex::new(()),
                refresh_requested: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
                poll_timer: TimerSlot::default(),
                follow_up_timer: TimerSlot::default(),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakCoordinator {
        WeakCoordinator {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ========================================================================
    // State Access
    // ========================================================================

    fn state(&self) -> RwLockReadGuard<'_, CycleState> {
        self.inner.state.read().unwrap_or_else(|poisoned| {
            warn!("Coordinator state lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, CycleState> {
        self.inner.state.write().unwrap_or_else(|poisoned| {
            warn!("Coordinator state lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        self.inner.listeners.lock().unwrap_or_else(|poisoned| {
            warn!("Coordinator listener lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn update_interval(&self) -> ScanInterval {
        self.inner.update_interval
    }

    /// Symbols tracked by this coordinator, in request order.
    pub fn get_symbols(&self) -> Vec<String> {
        self.state().symbols.clone()
    }

    /// Copy of the merged quote data.
    pub fn data(&self) -> QuoteData {
        self.state().data.clone()
    }

    pub fn record(&self, symbol: &str) -> Option<QuoteRecord> {
        self.state().data.get(symbol).cloned()
    }

    pub fn last_update_success(&self) -> bool {
        self.state().last_update_success
    }

    pub fn last_error(&self) -> Option<UpdateFailed> {
        self.state().last_error.clone()
    }

    /// Time of the last successful cycle.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state().last_updated
    }

    pub fn phase(&self) -> CyclePhase {
        self.state().phase
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        let state = self.state();
        CoordinatorSnapshot {
            name: self.inner.name.clone(),
            scan_interval: self.inner.update_interval,
            symbols: state.symbols.clone(),
            last_update_success: state.last_update_success,
            last_updated: state.last_updated,
            last_error: state.last_error.as_ref().map(|e| e.to_string()),
            phase: state.phase,
            data: state
                .data
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// Register a callback run after every cycle, successful or not.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn notify_listeners(&self) {
        let listeners: Vec<Listener> = self
            .lock_listeners()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener();
        }
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Delay until the next automatic cycle.
    ///
    /// The nominal interval after a success, the fixed failure interval after
    /// a failure (however many failures in a row), and `None` for a manual
    /// group whose last cycle succeeded.
    pub fn get_next_update_interval(&self) -> Option<Duration> {
        if self.last_update_success() {
            self.inner.update_interval.period()
        } else {
            let delay = self.inner.settings.failure_interval;
            warn!(
                "{}: error obtaining data, retrying in {} seconds",
                self.inner.name,
                delay.as_secs()
            );
            Some(delay)
        }
    }

    fn schedule_refresh(&self) {
        match self.get_next_update_interval() {
            Some(delay) => self.arm_poll_timer(delay),
            None => self.inner.poll_timer.cancel(),
        }
    }

    fn arm_poll_timer(&self, delay: Duration) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }

        let weak = self.downgrade();
        self.inner.poll_timer.arm(delay, move || async move {
            if let Some(coordinator) = weak.upgrade() {
                let _ = coordinator.refresh().await;
            }
        });
    }

    /// True while an automatic cycle is scheduled.
    pub fn has_scheduled_refresh(&self) -> bool {
        self.inner.poll_timer.is_pending()
    }

    /// True while the refresh following `add_symbol` is pending.
    pub fn has_pending_follow_up(&self) -> bool {
        self.inner.follow_up_timer.is_pending()
    }

    /// Cancel every timer. Cycles already running finish but do not reschedule.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.poll_timer.cancel();
        self.inner.follow_up_timer.cancel();
        debug!("{}: shut down", self.inner.name);
    }

    // ========================================================================
    // Symbols
    // ========================================================================

    /// Start tracking `symbol`.
    ///
    /// Schedules a refresh after the follow-up delay; further additions
    /// before it fires push it back, so a burst of additions costs one
    /// request. Returns false when the symbol is already tracked.
    pub fn add_symbol(&self, symbol: &str) -> bool {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return false;
        }

        {
            let mut state = self.state_mut();
            if state.symbols.contains(&symbol) {
                return false;
            }
            state.symbols.push(symbol.clone());
        }

        let delay = self.inner.settings.follow_up_delay;
        let weak = self.downgrade();
        self.inner.follow_up_timer.arm(delay, move || async move {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.request_refresh().await;
            }
        });

        info!(
            "{}: added {} and requested update in {} seconds",
            self.inner.name,
            symbol,
            delay.as_secs()
        );
        true
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Run a refresh cycle now, waiting for any cycle in flight to finish.
    pub async fn refresh(&self) -> Result<(), UpdateFailed> {
        let guard = self.inner.cycle_lock.lock().await;
        self.inner.refresh_requested.store(false, Ordering::Release);
        let result = self.run_cycle().await;
        match self.drain_requests(guard).await {
            Some(later) => later,
            None => result,
        }
    }

    /// Ask for a refresh.
    ///
    /// Runs a cycle right away when none is in flight; otherwise the request
    /// is folded into one extra cycle after the current one. The cycle runs
    /// on its own task, so dropping the returned future does not cancel it.
    pub async fn request_refresh(&self) {
        self.inner.refresh_requested.store(true, Ordering::Release);

        let coordinator = self.clone();
        let task = tokio::spawn(async move {
            match coordinator.inner.cycle_lock.try_lock() {
                Ok(guard) => {
                    coordinator.drain_requests(guard).await;
                }
                Err(_) => debug!(
                    "{}: refresh in progress, request coalesced",
                    coordinator.inner.name
                ),
            }
        });

        if let Err(e) = task.await {
            warn!("{}: refresh task failed: {}", self.inner.name, e);
        }
    }

    /// Run cycles while requests are pending, then release the cycle lock.
    async fn drain_requests(
        &self,
        guard: tokio::sync::MutexGuard<'_, ()>,
    ) -> Option<Result<(), UpdateFailed>> {
        let mut guard = guard;
        let mut last = None;

        loop {
            while self.inner.refresh_requested.swap(false, Ordering::AcqRel) {
                last = Some(self.run_cycle().await);
            }
            drop(guard);

            // A request may have landed between the last check and the unlock.
            if !self.inner.refresh_requested.load(Ordering::Acquire) {
                return last;
            }
            match self.inner.cycle_lock.try_lock() {
                Ok(next) => guard = next,
                Err(_) => return last,
            }
        }
    }

    /// One cycle. Callers hold the cycle lock.
    async fn run_cycle(&self) -> Result<(), UpdateFailed> {
        // Replaced by the real interval at the end; covers a cycle that never
        // finishes.
        self.arm_poll_timer(self.inner.settings.failure_interval);

        let symbols = {
            let mut state = self.state_mut();
            state.phase = CyclePhase::Fetching;
            state.symbols.clone()
        };

        let outcome = self.fetch_and_reconcile(&symbols).await;

        let result = {
            let mut state = self.state_mut();
            match outcome {
                Ok(data) => {
                    state.data = data;
                    state.last_update_success = true;
                    state.last_updated = Some(Utc::now());
                    state.last_error = None;
                    state.phase = CyclePhase::Succeeded;
                    Ok(())
                }
                Err(err) => {
                    warn!("{}: update failed: {}", self.inner.name, err);
                    state.last_update_success = false;
                    state.last_error = Some(err.clone());
                    state.phase = CyclePhase::Failed;
                    Err(err)
                }
            }
        };

        self.notify_listeners();
        self.schedule_refresh();
        result
    }

    async fn fetch_and_reconcile(&self, symbols: &[String]) -> Result<QuoteData, UpdateFailed> {
        if symbols.is_empty() {
            debug!("{}: no symbols to update", self.inner.name);
            return Ok(self.data());
        }

        let source = &self.inner.source;
        let json = source.fetch(symbols).await.map_err(|e| {
            UpdateFailed::new(
                format!("Error requesting data from {}: {}", source.id(), e),
                e,
            )
        })?;

        let results = extract_result(&json)?;
        let outcome = reconcile(symbols, results, self.data());

        if outcome.error_encountered {
            info!(
                "{}: updated {} symbols, some were missing or unexpected",
                self.inner.name,
                symbols.len()
            );
        } else {
            debug!("{}: all {} symbols updated", self.inner.name, symbols.len());
        }

        Ok(outcome.data)
    }
}
