mod bucket;
mod clock;
mod event;

pub use bucket::{WindowBucket, WindowMetrics, WindowView};
pub use clock::{
    check_timestamp, timestamp_from_f64, Clock, ManualClock, SharedClock, SystemClock, WindowClock,
    MAX_TIMESTAMP_MS,
};
pub use event::ViewEvent;
pub(crate) use event::validate_id;
