use ahash::AHashSet;
use serde::Serialize;

/// Aggregate for one (subject, window) pair
#[derive(Debug, Clone, PartialEq)]
pub struct WindowBucket {
    pub start_time: i64,
    pub end_time: i64,
    pub total_views: u64,
    pub unique_users: AHashSet<String>,
    pub last_updated: i64,
}

impl WindowBucket {
    /// Empty bucket; `last_updated` starts at the window start
    pub fn new(start_time: i64, end_time: i64) -> Self {
        WindowBucket {
            start_time,
            end_time,
            total_views: 0,
            unique_users: AHashSet::new(),
            last_updated: start_time,
        }
    }

    /// Count one view. Returns true if the user was new to this bucket.
    pub fn record(&mut self, user_id: &str, timestamp_ms: i64) -> bool {
        self.total_views += 1;
        let inserted = if self.unique_users.contains(user_id) {
            false
        } else {
            self.unique_users.insert(user_id.to_string())
        };
        self.last_updated = self.last_updated.max(timestamp_ms);
        inserted
    }

    pub fn unique_count(&self) -> usize {
        self.unique_users.len()
    }

    /// Fully contained in `[start, end]`; partial overlaps do not count
    #[inline]
    pub fn within(&self, start: i64, end: i64) -> bool {
        self.start_time >= start && self.end_time <= end
    }

    pub fn view(&self) -> WindowView {
        WindowView {
            start_time: self.start_time,
            end_time: self.end_time,
            metrics: WindowMetrics {
                unique_users: self.unique_count(),
                total_views: self.total_views,
            },
            last_updated: self.last_updated,
        }
    }
}

/// Read-only projection of a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowView {
    pub start_time: i64,
    pub end_time: i64,
    pub metrics: WindowMetrics,
    pub last_updated: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowMetrics {
    pub unique_users: usize,
    pub total_views: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_dedups_within_bucket() {
        let mut bucket = WindowBucket::new(0, 600_000);
        assert!(bucket.record("a", 5_000));
        assert!(!bucket.record("a", 5_000));
        assert!(bucket.record("b", 4_000));

        assert_eq!(bucket.total_views, 3);
        assert_eq!(bucket.unique_count(), 2);
        assert_eq!(bucket.last_updated, 5_000);
    }

    #[test]
    fn test_last_updated_never_regresses() {
        let mut bucket = WindowBucket::new(600_000, 1_200_000);
        assert_eq!(bucket.last_updated, 600_000);
        bucket.record("a", 900_000);
        bucket.record("a", 700_000);
        assert_eq!(bucket.last_updated, 900_000);
    }

    #[test]
    fn test_within_is_strict_containment() {
        let bucket = WindowBucket::new(600_000, 1_200_000);
        assert!(bucket.within(600_000, 1_200_000));
        assert!(bucket.within(0, 2_000_000));
        assert!(!bucket.within(600_001, 1_200_000));
        assert!(!bucket.within(600_000, 1_199_999));
    }

    #[test]
    fn test_view_serializes_camel_case() {
        let mut bucket = WindowBucket::new(0, 600_000);
        bucket.record("a", 10);
        let json = serde_json::to_value(bucket.view()).unwrap();
        assert_eq!(json["startTime"], 0);
        assert_eq!(json["endTime"], 600_000);
        assert_eq!(json["metrics"]["uniqueUsers"], 1);
        assert_eq!(json["metrics"]["totalViews"], 1);
        assert_eq!(json["lastUpdated"], 10);
    }
}
