mod query;
mod snapshot;
mod window_store;

pub use query::{
    correction_factor, AggregatedMetrics, CompressedWindow, TargetPeriod,
    CORRECTION_PER_WINDOW, DEFAULT_DUPLICATION_FACTOR, MIN_CORRECTION_FACTOR,
};
pub use snapshot::{RecordMetrics, Snapshot, WindowRecord};
pub use window_store::WindowStore;
