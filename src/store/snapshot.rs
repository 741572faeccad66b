//! Snapshot and restore of a whole [`WindowStore`]
//!
//! The JSON form is a plain nested mapping:
//!
//! ```json
//! { "<subjectId>": { "<windowStart>": {
//!     "metrics": { "uniqueUsers": ["u1", "u2"], "totalViews": 3 },
//!     "lastUpdated": 1700000005000 } } }
//! ```
//!
//! Window size and retention are configuration, not state, and are not
//! exported. Restored buckets take their `end_time` from the restoring
//! store's window size.
//!
//! For checkpoints handed to a persistence layer, [`Snapshot::to_bytes`]
//! wraps a bincode payload in a checksummed envelope:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | magic `VWSN` |
//! | 4 | 1 | envelope version |
//! | 5 | 4 | CRC32 of payload (big endian) |
//! | 9 | .. | bincode payload |

use super::window_store::{enforce_retention, Shard, SubjectWindows, WindowStore, NUM_SHARDS};
use crate::error::{AggregatorError, Result, SnapshotCodecError};
use crate::window::{check_timestamp, validate_id, WindowBucket};
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

const MAGIC: &[u8; 4] = b"VWSN";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 9;

/// Point-in-time copy of every subject's windows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    /// subject id -> window start (decimal string) -> window
    pub subjects: BTreeMap<String, BTreeMap<String, WindowRecord>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowRecord {
    pub metrics: RecordMetrics,
    pub last_updated: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetrics {
    /// Sorted, so equal stores serialize identically
    pub unique_users: Vec<String>,
    pub total_views: u64,
}

impl Snapshot {
    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    pub fn window_count(&self) -> usize {
        self.subjects.values().map(|w| w.len()).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode as a checksummed binary checkpoint
    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, SnapshotCodecError> {
        let payload = bincode::serialize(self)?;
        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.extend_from_slice(MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&crc32fast::hash(&payload).to_be_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode a checkpoint produced by [`Snapshot::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, SnapshotCodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(SnapshotCodecError::BufferTooShort {
                expected: HEADER_LEN,
                found: bytes.len(),
            });
        }
        if &bytes[0..4] != MAGIC {
            return Err(SnapshotCodecError::InvalidHeader);
        }
        if bytes[4] != VERSION {
            return Err(SnapshotCodecError::UnsupportedVersion(bytes[4]));
        }

        let expected = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
        let payload = &bytes[HEADER_LEN..];
        let found = crc32fast::hash(payload);
        if expected != found {
            return Err(SnapshotCodecError::ChecksumMismatch { expected, found });
        }

        Ok(bincode::deserialize(payload)?)
    }
}

fn record_of(bucket: &WindowBucket) -> WindowRecord {
    let mut unique_users: Vec<String> = bucket.unique_users.iter().cloned().collect();
    unique_users.sort();
    WindowRecord {
        metrics: RecordMetrics {
            unique_users,
            total_views: bucket.total_views,
        },
        last_updated: bucket.last_updated,
    }
}

/// Window key in the exact form `serialize` writes: canonical base-10,
/// no sign prefix, no leading zeros, within the accepted timestamp range
fn parse_window_key(subject_id: &str, key: &str) -> Result<i64> {
    let invalid = || {
        AggregatorError::Serialization(format!(
            "subject {:?}: window key {:?} is not a canonical integer timestamp",
            subject_id, key
        ))
    };
    let start_time = key.parse::<i64>().map_err(|_| invalid())?;
    if start_time.to_string() != key {
        return Err(invalid());
    }
    check_timestamp(start_time).map_err(|_| invalid())
}

impl WindowStore {
    /// Copy the whole store.
    ///
    /// Read locks on every shard are held together, so no event lands
    /// halfway through the copy.
    pub fn serialize(&self) -> Snapshot {
        let guards = self.read_all();

        let mut subjects = BTreeMap::new();
        for shard in guards.iter() {
            for (subject_id, windows) in shard.iter() {
                let records: BTreeMap<String, WindowRecord> = windows
                    .iter()
                    .map(|(start, bucket)| (start.to_string(), record_of(bucket)))
                    .collect();
                subjects.insert(subject_id.clone(), records);
            }
        }
        drop(guards);

        let snapshot = Snapshot { subjects };
        self.metrics()
            .record_snapshot("serialize", snapshot.subject_count(), snapshot.window_count());
        snapshot
    }

    pub fn serialize_json(&self) -> Result<String> {
        self.serialize().to_json()
    }

    pub fn serialize_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.serialize().to_bytes()?)
    }

    /// Replace the entire store with `snapshot`.
    ///
    /// The replacement is fully built and validated before any shard is
    /// touched; on error the live store is unchanged. Subjects holding more
    /// windows than the retention cap keep only the newest.
    pub fn deserialize(&self, snapshot: &Snapshot) -> Result<()> {
        let window_clock = self.window_clock();
        let max_windows = self.max_windows_to_keep();

        let mut rebuilt: Vec<Shard> = (0..NUM_SHARDS).map(|_| Shard::new()).collect();
        let mut trimmed = 0usize;

        for (subject_id, records) in &snapshot.subjects {
            validate_id("subject id", subject_id)
                .map_err(|e| AggregatorError::Serialization(e.to_string()))?;

            let mut windows = SubjectWindows::new();
            for (key, record) in records {
                let start_time = parse_window_key(subject_id, key)?;

                let mut unique_users = AHashSet::with_capacity(record.metrics.unique_users.len());
                for user_id in &record.metrics.unique_users {
                    validate_id("user id", user_id).map_err(|e| {
                        AggregatorError::Serialization(format!("subject {:?}: {}", subject_id, e))
                    })?;
                    unique_users.insert(user_id.clone());
                }

                let end_time = window_clock.window_end(start_time).map_err(|e| {
                    AggregatorError::Serialization(format!("subject {:?}: {}", subject_id, e))
                })?;
                let bucket = WindowBucket {
                    start_time,
                    end_time,
                    total_views: record.metrics.total_views,
                    unique_users,
                    last_updated: record.last_updated,
                };
                if windows.insert(start_time, bucket).is_some() {
                    return Err(AggregatorError::Serialization(format!(
                        "subject {:?}: duplicate window {}",
                        subject_id, start_time
                    )));
                }
            }

            trimmed += enforce_retention(&mut windows, max_windows);
            rebuilt[WindowStore::shard_index(subject_id)].insert(subject_id.clone(), windows);
        }

        let mut guards = self.write_all();
        for (guard, shard) in guards.iter_mut().zip(rebuilt) {
            **guard = shard;
        }
        drop(guards);

        info!(
            subjects = snapshot.subject_count(),
            windows = snapshot.window_count() - trimmed,
            trimmed,
            "restored window store from snapshot"
        );
        self.metrics().record_snapshot(
            "deserialize",
            snapshot.subject_count(),
            snapshot.window_count() - trimmed,
        );
        if trimmed > 0 {
            self.metrics().record_eviction(trimmed);
        }
        Ok(())
    }

    /// Parse and restore the JSON form. Nothing changes if parsing fails.
    pub fn deserialize_json(&self, json: &str) -> Result<()> {
        let snapshot = Snapshot::from_json(json)?;
        self.deserialize(&snapshot)
    }

    /// Restore a binary checkpoint. Nothing changes if decoding fails.
    pub fn deserialize_bytes(&self, bytes: &[u8]) -> Result<()> {
        let snapshot = Snapshot::from_bytes(bytes)?;
        self.deserialize(&snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AggregatorConfig;

    fn store(window_minutes: f64, max_windows: usize) -> WindowStore {
        WindowStore::new(AggregatorConfig::new(window_minutes, max_windows)).unwrap()
    }

    fn populated() -> WindowStore {
        let store = store(10.0, 144);
        store.add_event("1", "b", 5_000).unwrap();
        store.add_event("1", "a", 7_000).unwrap();
        store.add_event("1", "a", 600_100).unwrap();
        store.add_event("2", "c", 1_200_000).unwrap();
        store
    }

    #[test]
    fn test_json_layout() {
        let json = populated().serialize_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(
            value["1"]["0"],
            serde_json::json!({
                "metrics": { "uniqueUsers": ["a", "b"], "totalViews": 2 },
                "lastUpdated": 7_000
            })
        );
        assert_eq!(value["1"]["600000"]["metrics"]["totalViews"], 1);
        assert_eq!(value["2"]["1200000"]["lastUpdated"], 1_200_000);
    }

    #[test]
    fn test_serialize_is_deterministic() {
        let a = populated().serialize_json().unwrap();
        let b = populated().serialize_json().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_json_round_trip() {
        let source = populated();
        let json = source.serialize_json().unwrap();

        let restored = store(10.0, 144);
        restored.add_event("stale", "x", 0).unwrap();
        restored.deserialize_json(&json).unwrap();

        assert_eq!(restored.subjects(), vec!["1", "2"]);
        for subject in ["1", "2"] {
            assert_eq!(
                restored.windows_for_subject(subject),
                source.windows_for_subject(subject)
            );
        }
        assert_eq!(restored.serialize(), source.serialize());
    }

    #[test]
    fn test_end_time_follows_current_config() {
        let json = populated().serialize_json().unwrap();

        let restored = store(60.0, 144);
        restored.deserialize_json(&json).unwrap();

        let windows = restored.windows_for_subject("1");
        assert_eq!(windows[0].start_time, 0);
        assert_eq!(windows[0].end_time, 3_600_000);
    }

    #[test]
    fn test_duplicate_users_collapse() {
        let store = store(10.0, 144);
        store
            .deserialize_json(
                r#"{"s":{"0":{"metrics":{"uniqueUsers":["a","a","b"],"totalViews":9},"lastUpdated":10}}}"#,
            )
            .unwrap();
        let w = store.windows_for_subject("s");
        assert_eq!(w[0].metrics.unique_users, 2);
        assert_eq!(w[0].metrics.total_views, 9);
    }

    #[test]
    fn test_malformed_input_leaves_store_untouched() {
        let store = populated();
        let before = store.serialize();

        let bad_inputs = [
            "not json",
            r#"{"1":{"0":{"metrics":{"totalViews":1},"lastUpdated":0}}}"#,
            r#"{"1":{"0":{"metrics":{"uniqueUsers":[],"totalViews":-1},"lastUpdated":0}}}"#,
            r#"{"1":{"abc":{"metrics":{"uniqueUsers":[],"totalViews":1},"lastUpdated":0}}}"#,
            r#"{"1":{" 12":{"metrics":{"uniqueUsers":[],"totalViews":1},"lastUpdated":0}}}"#,
            r#"{"1":{"+0":{"metrics":{"uniqueUsers":[],"totalViews":1},"lastUpdated":0}}}"#,
            r#"{"1":{"012":{"metrics":{"uniqueUsers":[],"totalViews":5},"lastUpdated":0},"12":{"metrics":{"uniqueUsers":[],"totalViews":7},"lastUpdated":0}}}"#,
            r#"{"1":{"-0":{"metrics":{"uniqueUsers":[],"totalViews":1},"lastUpdated":0}}}"#,
            r#"{"1":{"9223372036854775807":{"metrics":{"uniqueUsers":[],"totalViews":1},"lastUpdated":0}}}"#,
            r#"{"":{"0":{"metrics":{"uniqueUsers":[],"totalViews":1},"lastUpdated":0}}}"#,
            r#"{"1":{"0":{"metrics":{"uniqueUsers":[""],"totalViews":1},"lastUpdated":0}}}"#,
        ];
        for input in bad_inputs {
            let err = store.deserialize_json(input).unwrap_err();
            assert!(
                matches!(err, AggregatorError::Serialization(_)),
                "input {:?} gave {:?}",
                input,
                err
            );
            assert_eq!(store.serialize(), before, "store changed after {:?}", input);
        }
    }

    #[test]
    fn test_restore_applies_retention_cap() {
        let json = {
            let source = store(10.0, 10);
            for i in 0..5 {
                source.add_event("s", "u", i * 600_000).unwrap();
            }
            source.serialize_json().unwrap()
        };

        let restored = store(10.0, 2);
        restored.deserialize_json(&json).unwrap();
        let starts: Vec<i64> = restored
            .windows_for_subject("s")
            .iter()
            .map(|w| w.start_time)
            .collect();
        assert_eq!(starts, vec![1_800_000, 2_400_000]);
    }

    #[test]
    fn test_empty_snapshot_clears_store() {
        let store = populated();
        store.deserialize_json("{}").unwrap();
        assert_eq!(store.subject_count(), 0);
    }

    #[test]
    fn test_binary_round_trip() {
        let source = populated();
        let bytes = source.serialize_bytes().unwrap();
        assert_eq!(&bytes[0..4], b"VWSN");

        let restored = store(10.0, 144);
        restored.deserialize_bytes(&bytes).unwrap();
        assert_eq!(restored.serialize(), source.serialize());
    }

    #[test]
    fn test_binary_envelope_errors() {
        let bytes = populated().serialize().to_bytes().unwrap();

        assert!(matches!(
            Snapshot::from_bytes(&bytes[..4]),
            Err(SnapshotCodecError::BufferTooShort { expected: 9, found: 4 })
        ));

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert_eq!(Snapshot::from_bytes(&bad_magic), Err(SnapshotCodecError::InvalidHeader));

        let mut bad_version = bytes.clone();
        bad_version[4] = 9;
        assert_eq!(
            Snapshot::from_bytes(&bad_version),
            Err(SnapshotCodecError::UnsupportedVersion(9))
        );

        let mut flipped = bytes.clone();
        let last = flipped.len() - 1;
        flipped[last] ^= 0xff;
        assert!(matches!(
            Snapshot::from_bytes(&flipped),
            Err(SnapshotCodecError::ChecksumMismatch { .. })
        ));

        let store = populated();
        let before = store.serialize();
        assert!(store.deserialize_bytes(&flipped).is_err());
        assert_eq!(store.serialize(), before);
    }
}
