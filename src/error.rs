//! Pipeline error taxonomy.
//!
//! Every failure in the core is one of these variants; there are no retries
//! and no partial-success results. Each variant carries a stable numeric
//! code (see [`Error::code`]) kept compatible with the transform service's
//! wire codes, so remote-reported errors and local ones share one space.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Settings rejected a configuration payload.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// A filter named a secondary key without its primary (js).
    #[error("place is not set")]
    PlaceNotSet,

    /// A filter named a secondary key without its primary (css).
    #[error("condition is not set")]
    ConditionNotSet,

    /// A source file or remote body could not be read.
    #[error("cannot read `{path}`")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A registered source path does not exist under the path root.
    #[error("file `{0}` does not exist")]
    FileNotFound(String),

    #[error("token cannot be empty")]
    EmptyToken,

    #[error("token secret cannot be empty")]
    EmptyTokenSecret,

    /// A remote operation was attempted without a token and the bootstrap
    /// call did not supply one.
    #[error("token is not set")]
    TokenNotSet,

    #[error("token secret is not set")]
    TokenSecretNotSet,

    /// Compression requested with an empty compressor spec.
    #[error("compressors cannot be empty")]
    NoCompressors,

    /// The remote service answered with something other than the expected
    /// envelope.
    #[error("no result available, service returned:\n\n{0}")]
    MalformedResponse(String),

    #[error("cache dir not set")]
    CacheDirNotSet,

    /// Offset below the valid range for caller-assigned offsets.
    #[error("offset must be an integer > {min}, got {given}")]
    OffsetTooSmall { min: i64, given: i64 },

    /// The merge-sentinel offset cannot be assigned or removed by a caller.
    #[error("offset cannot be the merge sentinel `{0}`")]
    ReservedOffset(i64),

    /// Removal targeted an offset with no entry.
    #[error("no entry exists at offset `{0}`")]
    OffsetNotFound(i64),

    /// `all_offset` reassignment only accepts non-negative values.
    #[error("sentinel index must be >= 0, got {0}")]
    InvalidSentinelIndex(i64),

    #[error("path root `{0}` does not exist")]
    PathRootMissing(PathBuf),

    #[error("path root not set")]
    PathRootNotSet,

    /// Cache directory still not writable after one permission repair.
    #[error("cache dir `{0}` is not writable")]
    CacheDirNotWritable(PathBuf),

    /// Cache directory missing and creation is disabled (or failed).
    #[error("cache dir `{0}` does not exist")]
    CacheDirMissing(PathBuf),

    /// Query against a bin that was never populated.
    #[error("no entries registered under `{primary}` / `{secondary}`")]
    NoSuchBin { primary: String, secondary: String },

    /// Error reported by the remote transform, passed through verbatim.
    #[error("remote service error {code}: {message}")]
    Remote { code: i64, message: String },

    /// Transport-level failure talking to the remote transform.
    #[error("transport error calling `{endpoint}`: {message}")]
    Transport { endpoint: String, message: String },
}

impl Error {
    /// Stable numeric code for this error kind.
    pub fn code(&self) -> i64 {
        match self {
            Error::Transport { .. } => 8,
            Error::InvalidSettings(_) => 31,
            Error::PlaceNotSet => 32,
            Error::FileRead { .. } => 33,
            Error::EmptyToken => 34,
            Error::EmptyTokenSecret => 35,
            Error::TokenNotSet => 36,
            Error::TokenSecretNotSet => 37,
            Error::NoCompressors => 38,
            Error::ConditionNotSet => 39,
            Error::MalformedResponse(_) => 40,
            Error::CacheDirNotSet => 41,
            Error::FileNotFound(_) => 45,
            Error::OffsetTooSmall { .. } => 46,
            Error::ReservedOffset(_) => 47,
            Error::OffsetNotFound(_) => 48,
            Error::InvalidSentinelIndex(_) => 49,
            Error::PathRootMissing(_) => 51,
            Error::PathRootNotSet => 52,
            Error::CacheDirNotWritable(_) => 53,
            Error::CacheDirMissing(_) => 54,
            Error::NoSuchBin { .. } => 55,
            Error::Remote { code, .. } => *code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(Error::ReservedOffset(-1000).code(), 47);
        assert_eq!(Error::OffsetNotFound(3).code(), 48);
        assert_eq!(
            Error::NoSuchBin {
                primary: "none".into(),
                secondary: "all".into()
            }
            .code(),
            55
        );
    }

    #[test]
    fn test_remote_code_passes_through() {
        let err = Error::Remote {
            code: 1234,
            message: "bad compressor".into(),
        };
        assert_eq!(err.code(), 1234);
        assert!(err.to_string().contains("bad compressor"));
    }
}
