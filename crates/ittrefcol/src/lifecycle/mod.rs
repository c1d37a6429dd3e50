//! Collector lifecycle: one context object per process, started by the first
//! static part that registers and torn down once at exit.
//!
//! ```text
//! Uninitialized ─► LoggerReady ─► MutexReady ─► Active ─► TornDown
//! ```
//!
//! Every intercepted call enters through [`Collector::enter`], which counts
//! it as in flight. Teardown flips the state to `TornDown` first, so no new
//! call gets in, then waits for the in-flight count to reach zero before it
//! frees anything.

use std::ops::Deref;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use ittrefcol_abi::{GroupId, IttGlobal};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::binder::{self, BindReport, SymbolSource};
use crate::config::{CollectorConfig, install_trace_subscriber};
use crate::error::CollectorError;
use crate::log::CallLog;
use crate::registry::{Found, Registry};
use crate::spill::{self, MergeReport};

#[cfg(test)]
mod tests;

/// How long teardown waits for in-flight calls before giving up on freeing
/// the registry.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Function name on the call log lines teardown writes.
const RELEASE: &str = "__itt_refcol_release";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninitialized = 0,
    /// The call log is open (or known to be unavailable).
    LoggerReady = 1,
    /// The registry accepts find-or-create calls.
    MutexReady = 2,
    Active = 3,
    TornDown = 4,
}

impl State {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => State::Uninitialized,
            1 => State::LoggerReady,
            2 => State::MutexReady,
            3 => State::Active,
            _ => State::TornDown,
        }
    }
}

pub struct Collector {
    config: CollectorConfig,
    state: AtomicU8,
    init_lock: Mutex<()>,
    log: CallLog,
    registry: Registry,
    in_flight: AtomicUsize,
    parts: AtomicUsize,
}

/// Proof that a call was admitted while the collector was active. Teardown
/// does not free the registry while any guard is alive.
pub struct CallGuard<'a> {
    collector: &'a Collector,
}

impl Deref for CallGuard<'_> {
    type Target = Collector;

    fn deref(&self) -> &Collector {
        self.collector
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.collector.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What registering one static part did.
#[derive(Debug)]
pub struct PartReport {
    pub bind: BindReport,
    pub merge: MergeReport,
    /// Objects in the part's lists that could not be described (no name).
    pub skipped: usize,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(State::Uninitialized as u8),
            init_lock: Mutex::new(()),
            log: CallLog::disabled(),
            registry: Registry::new(),
            in_flight: AtomicUsize::new(0),
            parts: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn advance(&self, to: State) {
        self.state.store(to as u8, Ordering::SeqCst);
        debug!(state = ?to, "collector state");
    }

    /// Brings the collector to `Active` if nothing has started it yet.
    /// Concurrent starters serialize on the init lock; all but the first
    /// find the work done. A torn-down collector stays torn down.
    pub fn start(&self) -> State {
        let state = self.state();
        if state != State::Uninitialized {
            return state;
        }
        let _init = self.init_lock.lock();
        let state = self.state();
        if state != State::Uninitialized {
            return state;
        }

        if let Some(filter) = &self.config.trace_filter {
            install_trace_subscriber(filter);
        }
        match self.log.open(&self.config) {
            Ok(path) => info!(path = %path.display(), "call log opened"),
            Err(e) => {
                warn!(%e, "call logging disabled for this process");
                eprintln!("ittnotify_refcol: {e}; call logging disabled");
            }
        }
        self.advance(State::LoggerReady);

        self.registry.mark_ready();
        self.advance(State::MutexReady);

        self.advance(State::Active);
        State::Active
    }

    /// Admits one call. `None` once the collector is not active; the caller
    /// must then return a null/no-op result without touching anything.
    pub fn enter(&self) -> Option<CallGuard<'_>> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = CallGuard { collector: self };
        (self.state() == State::Active).then_some(guard)
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Static parts registered and not yet finalized.
    pub fn part_count(&self) -> usize {
        self.parts.load(Ordering::SeqCst)
    }

    /// `__itt_api_init`: starts the collector if needed, fills `part`'s
    /// function slots from `source`, then spills the part's own objects into
    /// the registry.
    ///
    /// # Safety
    /// `part` must be a live `__itt_global` whose resolution table and
    /// object lists are well formed.
    pub unsafe fn register_part(
        &self,
        part: Option<&IttGlobal>,
        groups: GroupId,
        source: &impl SymbolSource,
    ) -> Result<PartReport, CollectorError> {
        const FUNCTION: &str = "__itt_api_init";

        let Some(part) = part else {
            eprintln!("ERROR: Failed to initialize dynamic library");
            warn!("static part handle is null");
            return Err(CollectorError::NullPart);
        };
        if !part.has_magic() {
            debug!("static part has no ITT magic, registering anyway");
        }

        self.start();
        let call = self.enter().ok_or(CollectorError::NotActive)?;

        let bind = unsafe { binder::bind(part, source) };
        let collected = unsafe { spill::collect(part) };
        let merge = call.registry.merge(&collected.descriptors);
        let index = call.parts.fetch_add(1, Ordering::SeqCst) + 1;

        call.log.info(
            FUNCTION,
            format_args!(
                "function args: init_groups={groups:#x} (part {index}: {} bound, {} fallback, {} spilled)",
                bind.resolved,
                bind.fallback,
                collected.descriptors.len(),
            ),
        );
        for (descriptor, result) in collected.descriptors.iter().zip(&merge.merged) {
            match result {
                Ok(Found::Created(_)) => call.log.info(
                    FUNCTION,
                    format_args!("spilled {descriptor} (created new {})", descriptor.kind()),
                ),
                Ok(Found::Existing(_)) => call.log.info(
                    FUNCTION,
                    format_args!("spilled {descriptor} ({} already exists)", descriptor.kind()),
                ),
                Err(e) => call
                    .log
                    .warn(FUNCTION, format_args!("Cannot merge {descriptor}: {e}")),
            }
        }
        info!(
            part = index,
            resolved = bind.resolved,
            fallback = bind.fallback,
            unresolved = bind.unresolved,
            created = merge.created(),
            existing = merge.existing(),
            failed = merge.failed(),
            "static part registered"
        );

        Ok(PartReport {
            bind,
            merge,
            skipped: collected.skipped,
        })
    }

    /// `__itt_api_fini`: a part is going away. Its objects stay in the
    /// registry until teardown, since other parts may share them.
    pub fn unregister_part(&self, part: *const IttGlobal) {
        let Some(call) = self.enter() else {
            return;
        };
        let remaining = call
            .parts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map_or(0, |n| n - 1);
        call.log.info(
            "__itt_api_fini",
            format_args!("function args: part={part:p} (parts remaining={remaining})"),
        );
    }

    fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight.load(Ordering::SeqCst) != 0 {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// `Active → TornDown`, once. Writes a registry summary to the call log,
    /// frees the registry and closes the log. Every later call returns
    /// `false` and does nothing.
    ///
    /// If calls are still in flight after [`DRAIN_TIMEOUT`], the registry is
    /// left allocated (handles they hold stay valid) and only the log is
    /// closed.
    pub fn teardown(&self) -> bool {
        let _init = self.init_lock.lock();
        if self
            .state
            .compare_exchange(
                State::Active as u8,
                State::TornDown as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return false;
        }
        debug!(state = ?State::TornDown, "collector state");

        if !self.drain(DRAIN_TIMEOUT) {
            let in_flight = self.in_flight.load(Ordering::SeqCst);
            warn!(in_flight, "calls still in flight at teardown, registry left allocated");
            self.log.warn(
                RELEASE,
                format_args!("{in_flight} calls still in flight, registry left allocated"),
            );
            self.log.close();
            return true;
        }

        let snapshot = self.registry.snapshot();
        match facet_json::to_string(&snapshot) {
            Ok(json) => self.log.info(RELEASE, format_args!("registry={json}")),
            Err(e) => warn!(%e, "could not serialize registry snapshot"),
        }
        self.registry.clear();
        self.log.close();
        info!(
            domains = snapshot.domains.len(),
            string_handles = snapshot.string_handles.len(),
            counters = snapshot.counters.len(),
            histograms = snapshot.histograms.len(),
            "collector torn down"
        );
        true
    }
}

// ── Process-wide instance ────────────────────────────────

static COLLECTOR: OnceLock<Collector> = OnceLock::new();

/// The process collector, created from the environment on first use. Its
/// teardown is registered with `atexit` at the same time.
pub fn global() -> &'static Collector {
    COLLECTOR.get_or_init(|| {
        // SAFETY: `release_at_exit` is a plain extern "C" fn with no captures.
        if unsafe { libc::atexit(release_at_exit) } != 0 {
            warn!("could not register exit hook, registry will not be released");
        }
        Collector::new(CollectorConfig::from_env())
    })
}

/// The process collector if any static part has touched it.
pub fn try_global() -> Option<&'static Collector> {
    COLLECTOR.get()
}

extern "C" fn release_at_exit() {
    if let Some(collector) = try_global() {
        collector.teardown();
    }
}
