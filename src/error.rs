//! Error types for the window aggregator
//!
//! Every failure is local and reported synchronously to the caller.
//! Empty query ranges are not errors (see [`crate::store::AggregatedMetrics`]).

/// Errors returned by store operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregatorError {
    /// Malformed event or clock input (non-finite timestamp, empty id, ...)
    InvalidInput(String),
    /// Snapshot could not be parsed or failed validation
    Serialization(String),
}

impl std::fmt::Display for AggregatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregatorError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            AggregatorError::Serialization(msg) => write!(f, "serialization error: {}", msg),
        }
    }
}

impl std::error::Error for AggregatorError {}

impl From<serde_json::Error> for AggregatorError {
    fn from(e: serde_json::Error) -> Self {
        AggregatorError::Serialization(e.to_string())
    }
}

impl From<SnapshotCodecError> for AggregatorError {
    fn from(e: SnapshotCodecError) -> Self {
        AggregatorError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AggregatorError>;

/// Errors while loading or validating configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read
    Io(std::io::Error),
    /// TOML did not parse into the config struct
    Parse(toml::de::Error),
    /// Environment override was not a valid number
    Env { var: &'static str, value: String },
    /// Values parsed but are out of range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config: {}", e),
            ConfigError::Parse(e) => write!(f, "failed to parse config: {}", e),
            ConfigError::Env { var, value } => {
                write!(f, "invalid value for {}: {:?}", var, value)
            }
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Errors from the binary checkpoint envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotCodecError {
    /// Input buffer shorter than the header
    BufferTooShort { expected: usize, found: usize },
    /// Magic bytes did not match
    InvalidHeader,
    /// Envelope version this build cannot read
    UnsupportedVersion(u8),
    /// Payload checksum mismatch
    ChecksumMismatch { expected: u32, found: u32 },
    /// Payload failed to encode or decode
    Corrupted(String),
}

impl std::fmt::Display for SnapshotCodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotCodecError::BufferTooShort { expected, found } => {
                write!(f, "buffer too short: expected {}, found {}", expected, found)
            }
            SnapshotCodecError::InvalidHeader => write!(f, "invalid header"),
            SnapshotCodecError::UnsupportedVersion(v) => write!(f, "unsupported version: {}", v),
            SnapshotCodecError::ChecksumMismatch { expected, found } => write!(
                f,
                "checksum mismatch: expected {:08x}, found {:08x}",
                expected, found
            ),
            SnapshotCodecError::Corrupted(msg) => write!(f, "corrupted data: {}", msg),
        }
    }
}

impl std::error::Error for SnapshotCodecError {}

impl From<bincode::Error> for SnapshotCodecError {
    fn from(e: bincode::Error) -> Self {
        SnapshotCodecError::Corrupted(e.to_string())
    }
}
