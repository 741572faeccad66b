use crate::config::AggregatorConfig;
use crate::error::{ConfigError, Result};
use crate::observability::{noop_metrics, SharedMetrics};
use crate::window::{
    timestamp_from_f64, validate_id, SharedClock, SystemClock, ViewEvent, WindowBucket,
    WindowClock,
};
use ahash::AHashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) const NUM_SHARDS: usize = 16;

/// One subject's buckets keyed by window start
pub(crate) type SubjectWindows = BTreeMap<i64, WindowBucket>;
pub(crate) type Shard = AHashMap<String, SubjectWindows>;

fn hash_subject(subject_id: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    subject_id.hash(&mut hasher);
    (hasher.finish() as usize) % NUM_SHARDS
}

/// WindowStore distributes subjects across shards using hash partitioning.
///
/// **Consistency Model:**
/// - Each subject lives in exactly one shard; all of its buckets are
///   mutated under that shard's write lock, so counter increments and
///   user-set inserts for one window never race
/// - Subjects in different shards never contend
/// - `serialize` holds every shard's read lock at once and sees a single
///   point in time; `deserialize` swaps every shard under its write lock
///
/// Cloning is cheap and shares the underlying state.
#[derive(Clone)]
pub struct WindowStore {
    shards: Arc<[RwLock<Shard>; NUM_SHARDS]>,
    window_clock: WindowClock,
    config: AggregatorConfig,
    clock: SharedClock,
    metrics: SharedMetrics,
}

impl WindowStore {
    pub fn new(config: AggregatorConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    /// Store with 10 minute windows and 144 windows per subject
    pub fn with_defaults() -> Self {
        Self::from_validated(AggregatorConfig::default())
    }

    fn from_validated(config: AggregatorConfig) -> Self {
        let shards: [RwLock<Shard>; NUM_SHARDS] = std::array::from_fn(|_| RwLock::new(Shard::new()));
        WindowStore {
            shards: Arc::new(shards),
            window_clock: WindowClock::new(config.window_size_ms()),
            config,
            clock: Arc::new(SystemClock),
            metrics: noop_metrics(),
        }
    }

    /// Replace the clock used for events without a timestamp
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn window_clock(&self) -> WindowClock {
        self.window_clock
    }

    pub fn window_size_ms(&self) -> i64 {
        self.window_clock.window_size_ms()
    }

    pub fn max_windows_to_keep(&self) -> usize {
        self.config.max_windows_to_keep
    }

    /// Start of the window containing `timestamp_ms`
    pub fn window_start_time(&self, timestamp_ms: i64) -> Result<i64> {
        self.window_clock.window_start(timestamp_ms)
    }

    /// Record one view of `subject_id` by `user_id` at `timestamp_ms`.
    ///
    /// Opens the bucket if needed, bumps the view counter, adds the user to
    /// the bucket's set and then trims the subject back to the retention cap.
    pub fn add_event(&self, subject_id: &str, user_id: &str, timestamp_ms: i64) -> Result<()> {
        if let Err(e) = validate_id("subject id", subject_id).and(validate_id("user id", user_id)) {
            warn!(subject = subject_id, user = user_id, "rejected view event: {}", e);
            self.metrics.record_rejected("invalid_id");
            return Err(e);
        }

        let (window_start, window_end) = match self.window_clock.window_bounds(timestamp_ms) {
            Ok(bounds) => bounds,
            Err(e) => {
                warn!(subject = subject_id, timestamp_ms, "rejected view event: {}", e);
                self.metrics.record_rejected("invalid_timestamp");
                return Err(e);
            }
        };
        let max_windows = self.config.max_windows_to_keep;

        let mut shard = self.shards[hash_subject(subject_id)].write();
        let windows = shard.entry(subject_id.to_string()).or_default();

        let bucket = windows.entry(window_start).or_insert_with(|| {
            self.metrics.record_window_created();
            WindowBucket::new(window_start, window_end)
        });
        bucket.record(user_id, timestamp_ms);

        let evicted = enforce_retention(windows, max_windows);
        drop(shard);

        self.metrics.record_event();
        if evicted > 0 {
            debug!(subject = subject_id, evicted, "evicted windows past retention cap");
            self.metrics.record_eviction(evicted);
        }
        Ok(())
    }

    /// Record a producer-supplied event; a missing timestamp means now
    pub fn add_view(&self, event: &ViewEvent) -> Result<()> {
        let timestamp_ms = match event.timestamp {
            Some(raw) => timestamp_from_f64(raw).map_err(|e| {
                warn!(subject = %event.subject_id, "rejected view event: {}", e);
                self.metrics.record_rejected("invalid_timestamp");
                e
            })?,
            None => self.clock.now_millis(),
        };
        self.add_event(&event.subject_id, &event.user_id, timestamp_ms)
    }

    /// Record a view at the store clock's current time
    pub fn add_event_now(&self, subject_id: &str, user_id: &str) -> Result<()> {
        self.add_event(subject_id, user_id, self.clock.now_millis())
    }

    pub fn subject_count(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    /// Retained windows for one subject (0 if unknown)
    pub fn window_count(&self, subject_id: &str) -> usize {
        self.with_subject(subject_id, |w| w.len()).unwrap_or(0)
    }

    /// All known subjects, sorted
    pub fn subjects(&self) -> Vec<String> {
        let mut subjects: Vec<String> = self
            .shards
            .iter()
            .flat_map(|s| s.read().keys().cloned().collect::<Vec<_>>())
            .collect();
        subjects.sort();
        subjects
    }

    /// Run `f` against a subject's buckets under its shard's read lock
    pub(crate) fn with_subject<R, F>(&self, subject_id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&SubjectWindows) -> R,
    {
        let shard = self.shards[hash_subject(subject_id)].read();
        shard.get(subject_id).map(f)
    }

    /// Read guards on every shard, taken in index order
    pub(crate) fn read_all(&self) -> Vec<RwLockReadGuard<'_, Shard>> {
        self.shards.iter().map(|s| s.read()).collect()
    }

    /// Write guards on every shard, taken in index order
    pub(crate) fn write_all(&self) -> Vec<RwLockWriteGuard<'_, Shard>> {
        self.shards.iter().map(|s| s.write()).collect()
    }

    pub(crate) fn shard_index(subject_id: &str) -> usize {
        hash_subject(subject_id)
    }

    pub(crate) fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }
}

impl Default for WindowStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for WindowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowStore")
            .field("config", &self.config)
            .field("subjects", &self.subject_count())
            .finish()
    }
}

/// Drop the oldest buckets until at most `max_windows` remain.
/// Returns how many were dropped.
pub(crate) fn enforce_retention(windows: &mut SubjectWindows, max_windows: usize) -> usize {
    let mut evicted = 0;
    while windows.len() > max_windows {
        if windows.pop_first().is_none() {
            break;
        }
        evicted += 1;
    }
    evicted
}
