//! Error types for platfs.
//!
//! Store operations report plain `io::Error`s and the overlay passes them
//! through untouched. The types here cover the two things the overlay
//! itself can get wrong: bad configuration, caught at construction, and
//! failed probes, which are recovered from and never returned to callers.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Invalid overlay configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A qualifier that would produce a malformed candidate path.
    #[error("invalid qualifier {qualifier:?}: {reason}")]
    InvalidQualifier {
        qualifier: String,
        reason: &'static str,
    },

    /// The same qualifier appears twice in one list.
    #[error("duplicate qualifier {0:?}")]
    DuplicateQualifier(String),

    /// A platform name outside [`Platform::ALL`](crate::Platform::ALL).
    #[error("unknown platform {0:?} (expected one of: ios, android)")]
    UnknownPlatform(String),

    /// Neither a target platform nor an explicit qualifier list was given.
    #[error("no target platform: set `platform` or `qualifiers`")]
    MissingPlatform,

    /// The config file could not be read.
    #[error("reading config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The config file is not valid TOML for [`OverlayConfig`](crate::OverlayConfig).
    #[error("parsing config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// A candidate probe that failed for a reason other than "not found".
///
/// Handled inside the overlay according to its
/// [`ProbePolicy`](crate::ProbePolicy).
#[derive(Debug, Error)]
#[error("probing {candidate}: {source}")]
pub struct ProbeError {
    pub candidate: PathBuf,
    #[source]
    pub source: io::Error,
}

impl ProbeError {
    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_qualifier_message() {
        let err = ConfigError::InvalidQualifier {
            qualifier: "a/b".to_string(),
            reason: "contains a path separator",
        };
        assert_eq!(
            err.to_string(),
            "invalid qualifier \"a/b\": contains a path separator"
        );
    }

    #[test]
    fn test_probe_error_keeps_kind() {
        let err = ProbeError {
            candidate: PathBuf::from("a.ios.ts"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(err.to_string(), "probing a.ios.ts: denied");
    }
}
