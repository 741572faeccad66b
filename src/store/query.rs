//! Read-side queries over a [`WindowStore`]
//!
//! Unique-user figures here are deliberately approximate: buckets only
//! dedup users within themselves, so summing bucket sizes over-counts
//! anyone seen in more than one window. The fixed correction and
//! duplication factors scale that sum back down.

use super::window_store::{SubjectWindows, WindowStore};
use crate::window::{WindowBucket, WindowView};
use serde::Serialize;
use std::convert::Infallible;
use std::str::FromStr;

/// Floor for the per-window correction factor
pub const MIN_CORRECTION_FACTOR: f64 = 0.7;
/// Correction applied per selected window
pub const CORRECTION_PER_WINDOW: f64 = 0.01;
/// Duplication factor for unrecognized target periods
pub const DEFAULT_DUPLICATION_FACTOR: f64 = 0.5;

/// Totals over every window fully inside a time range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedMetrics {
    /// Sum of per-window unique user counts (not a true union)
    pub unique_users_count: u64,
    pub unique_users_estimate: u64,
    pub total_views: u64,
    pub windows_count: usize,
}

/// Several windows merged into one coarser-period summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedWindow {
    pub start_time: i64,
    pub end_time: i64,
    pub total_views: u64,
    pub unique_users: u64,
}

/// Granularity a set of windows is compressed into
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetPeriod {
    Hour,
    Day,
    Week,
    Month,
    /// Any other name; compressed with the default factor
    Other(String),
}

impl TargetPeriod {
    /// Estimated share of users that are distinct across the period's windows
    pub fn duplication_factor(&self) -> f64 {
        match self {
            TargetPeriod::Hour => 0.95,
            TargetPeriod::Day => 0.7,
            TargetPeriod::Week => 0.5,
            TargetPeriod::Month => 0.3,
            TargetPeriod::Other(_) => DEFAULT_DUPLICATION_FACTOR,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TargetPeriod::Hour => "hour",
            TargetPeriod::Day => "day",
            TargetPeriod::Week => "week",
            TargetPeriod::Month => "month",
            TargetPeriod::Other(name) => name,
        }
    }
}

impl FromStr for TargetPeriod {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "hour" => TargetPeriod::Hour,
            "day" => TargetPeriod::Day,
            "week" => TargetPeriod::Week,
            "month" => TargetPeriod::Month,
            other => TargetPeriod::Other(other.to_string()),
        })
    }
}

impl From<&str> for TargetPeriod {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(period) => period,
            Err(never) => match never {},
        }
    }
}

impl std::fmt::Display for TargetPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `max(0.7, 1 - windows * 0.01)`
pub fn correction_factor(windows_count: usize) -> f64 {
    (1.0 - windows_count as f64 * CORRECTION_PER_WINDOW).max(MIN_CORRECTION_FACTOR)
}

#[inline]
fn scale(count: u64, factor: f64) -> u64 {
    (count as f64 * factor).round() as u64
}

/// Buckets with `start_time >= start` and `end_time <= end`, oldest first
fn contained(windows: &SubjectWindows, start: i64, end: i64) -> impl Iterator<Item = &WindowBucket> {
    windows
        .range(start..)
        .take_while(move |(window_start, _)| **window_start <= end)
        .map(|(_, bucket)| bucket)
        .filter(move |bucket| bucket.within(start, end))
}

#[derive(Default)]
struct RangeTotals {
    windows: usize,
    views: u64,
    unique_sum: u64,
}

fn range_totals(windows: &SubjectWindows, start: i64, end: i64) -> RangeTotals {
    contained(windows, start, end).fold(RangeTotals::default(), |mut acc, bucket| {
        acc.windows += 1;
        acc.views += bucket.total_views;
        acc.unique_sum += bucket.unique_count() as u64;
        acc
    })
}

impl WindowStore {
    /// Every retained window of a subject, ascending by start time.
    /// Unknown subjects yield an empty list.
    pub fn windows_for_subject(&self, subject_id: &str) -> Vec<WindowView> {
        self.with_subject(subject_id, |windows| {
            windows.values().map(WindowBucket::view).collect()
        })
        .unwrap_or_default()
    }

    /// Totals over windows fully contained in `[start_time, end_time]`.
    ///
    /// An empty selection is a valid all-zero result.
    pub fn aggregated_metrics(&self, subject_id: &str, start_time: i64, end_time: i64) -> AggregatedMetrics {
        let totals = self
            .with_subject(subject_id, |windows| range_totals(windows, start_time, end_time))
            .unwrap_or_default();

        AggregatedMetrics {
            unique_users_count: totals.unique_sum,
            unique_users_estimate: scale(totals.unique_sum, correction_factor(totals.windows)),
            total_views: totals.views,
            windows_count: totals.windows,
        }
    }

    /// Merge windows fully contained in `[start_time, end_time]` into one
    /// summary for `target_period`. Returns `None` when no window matches.
    pub fn compress_windows(
        &self,
        subject_id: &str,
        start_time: i64,
        end_time: i64,
        target_period: &TargetPeriod,
    ) -> Option<CompressedWindow> {
        let totals = self.with_subject(subject_id, |windows| range_totals(windows, start_time, end_time))?;
        if totals.windows == 0 {
            return None;
        }

        Some(CompressedWindow {
            start_time,
            end_time,
            total_views: totals.views,
            unique_users: scale(totals.unique_sum, target_period.duplication_factor()),
        })
    }
}
