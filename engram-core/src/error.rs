//! Error types for the store.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the arena, string table, and graph file.
///
/// `Corrupt` and `UnsupportedVersion` occur only at open and are terminal.
/// `Oom` and `Range` leave the store in its pre-operation state only if
/// raised before any write began; callers treat them as fatal for the
/// current mutation. `Lock` is retryable with back-off.
#[derive(Error, Debug)]
pub enum StoreError {
    /// File magic mismatch, impossible header values, or an offset that
    /// points outside the structure it claims to describe.
    #[error("corrupt store file: {0}")]
    Corrupt(String),

    /// Graph version outside the supported set {1, 2} at open.
    #[error("unsupported graph version {0}")]
    UnsupportedVersion(u32),

    /// The underlying arena refused to grow, or an internal allocation
    /// (hash rehash, new adjacency block) could not be satisfied.
    #[error("arena out of memory: {0}")]
    Oom(String),

    /// A read or write would cross the end of the mapped file.
    #[error("access out of range: offset {offset} + len {len} exceeds file size {file_size}")]
    Range {
        /// Requested start offset.
        offset: u64,
        /// Requested length in bytes.
        len: u64,
        /// Current size of the mapping.
        file_size: u64,
    },

    /// Advisory-lock acquisition failed at the OS level.
    #[error("file lock failed: {0}")]
    Lock(#[source] std::io::Error),

    /// Attempt to add a third observation to an entity.
    #[error("entity already holds two observations")]
    ObservationsFull,

    /// Input string exceeds the 65 535-byte entry limit.
    #[error("string of {0} bytes exceeds the 65535-byte limit")]
    StringTooLong(usize),

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Stable error code, suitable for a wire protocol or log fields.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Corrupt(_) => "CORRUPT",
            StoreError::UnsupportedVersion(_) => "UNSUPPORTED_VERSION",
            StoreError::Oom(_) => "OOM",
            StoreError::Range { .. } => "RANGE",
            StoreError::Lock(_) => "LOCK",
            StoreError::ObservationsFull => "OBS_FULL",
            StoreError::StringTooLong(_) => "STRING_TOO_LONG",
            StoreError::Io(_) => "IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(StoreError::Corrupt("x".into()).code(), "CORRUPT");
        assert_eq!(StoreError::UnsupportedVersion(7).code(), "UNSUPPORTED_VERSION");
        assert_eq!(StoreError::ObservationsFull.code(), "OBS_FULL");
        assert_eq!(StoreError::StringTooLong(70_000).code(), "STRING_TOO_LONG");
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::Range { offset: 100, len: 8, file_size: 64 };
        let msg = err.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("64"));
    }
}
