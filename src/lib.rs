//! # view-windows
//!
//! Fixed-size time-window aggregation of per-subject view events.
//!
//! Each subject (a post, a page, ...) keeps a bounded, ordered set of
//! windows. A window counts views and the distinct users seen inside it.
//! Read queries sum windows over a time range and estimate unique visitors
//! with fixed correction factors; the whole store snapshots to JSON or a
//! checksummed binary checkpoint.
//!
//! ```rust
//! use view_windows::{AggregatorConfig, TargetPeriod, WindowStore};
//!
//! let store = WindowStore::new(AggregatorConfig::default()).unwrap();
//! store.add_event("post-1", "alice", 5_000).unwrap();
//! store.add_event("post-1", "bob", 5_000).unwrap();
//!
//! let metrics = store.aggregated_metrics("post-1", 0, 600_000);
//! assert_eq!(metrics.total_views, 2);
//!
//! let hour = store.compress_windows("post-1", 0, 3_600_000, &TargetPeriod::Hour);
//! assert_eq!(hour.unwrap().unique_users, 2);
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod store;
pub mod window;
pub mod workers;

pub use config::{AggregatorConfig, CheckpointConfig};
pub use error::{AggregatorError, ConfigError, Result, SnapshotCodecError};
pub use store::{AggregatedMetrics, CompressedWindow, Snapshot, TargetPeriod, WindowStore};
pub use window::{ViewEvent, WindowClock, WindowView};
