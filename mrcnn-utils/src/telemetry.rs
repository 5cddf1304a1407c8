//! Scoped timing logs for the preparation stages.
//!
//! A [`TimingGuard`] measures the lifetime of a scope and, on drop, logs the elapsed time
//! under the `mrcnn::telemetry` target. Guards only become active when telemetry has been
//! switched on with [`configure`] and the requested level passes both the configured
//! telemetry threshold and the global logger filter.

use std::{
    borrow::Cow,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use log::{Level, LevelFilter, log, log_enabled};

/// Log target used by every timing guard.
pub const TELEMETRY_TARGET: &str = "mrcnn::telemetry";

static TELEMETRY_ENABLED: AtomicBool = AtomicBool::new(false);
static TELEMETRY_LEVEL: AtomicUsize = AtomicUsize::new(LevelFilter::Off as usize);

/// RAII helper that logs how long a scope took.
pub struct TimingGuard {
    label: Cow<'static, str>,
    level: Level,
    start: Instant,
    items: Option<usize>,
    active: bool,
}

impl TimingGuard {
    /// Returns `true` when the guard will emit a log entry on drop.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Attach an item count (pixels, anchors, images) to the final log line.
    pub fn record_items(&mut self, items: usize) {
        self.items = Some(items);
    }

    /// Elapsed time since the guard was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let elapsed = self.start.elapsed();
        match self.items {
            Some(items) => log!(
                target: TELEMETRY_TARGET,
                self.level,
                "{} completed in {:.2?} ({} items)",
                self.label,
                elapsed,
                items
            ),
            None => log!(
                target: TELEMETRY_TARGET,
                self.level,
                "{} completed in {:.2?}",
                self.label,
                elapsed
            ),
        }
    }
}

/// Start timing a scope at the given level.
pub fn timing_guard(label: impl Into<Cow<'static, str>>, level: Level) -> TimingGuard {
    let active = telemetry_allows(level) && log_enabled!(target: TELEMETRY_TARGET, level);
    TimingGuard {
        label: label.into(),
        level,
        start: Instant::now(),
        items: None,
        active,
    }
}

/// Set the global telemetry switch and threshold.
pub fn configure(enabled: bool, level: LevelFilter) {
    TELEMETRY_ENABLED.store(enabled, Ordering::Relaxed);
    TELEMETRY_LEVEL.store(level as usize, Ordering::Relaxed);
}

/// Returns whether telemetry logging is currently enabled.
pub fn telemetry_enabled() -> bool {
    TELEMETRY_ENABLED.load(Ordering::Relaxed)
}

/// Returns `true` when telemetry is on and `level` is within the configured threshold.
pub fn telemetry_allows(level: Level) -> bool {
    telemetry_enabled() && (level as usize) <= TELEMETRY_LEVEL.load(Ordering::Relaxed)
}
