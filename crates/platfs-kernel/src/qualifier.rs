//! Platform qualifiers.
//!
//! A qualifier is the token spliced into a file-name stem to name a
//! platform variant: `app.component.ts` → `app.component.ios.ts`.
//! A [`QualifierList`] is tried in order, most specific first.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Validated, ordered list of qualifiers. Immutable once built.
///
/// An empty list is legal; an overlay built from it is a pure pass-through.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QualifierList(Vec<String>);

impl QualifierList {
    /// Build a list, failing on the first qualifier that could not be
    /// spliced into a file name safely.
    pub fn new<I, S>(qualifiers: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list: Vec<String> = Vec::new();
        for qualifier in qualifiers {
            let qualifier = qualifier.into();
            validate(&qualifier)?;
            if list.contains(&qualifier) {
                return Err(ConfigError::DuplicateQualifier(qualifier));
            }
            list.push(qualifier);
        }
        Ok(Self(list))
    }

    /// The list with no qualifiers.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// `prefix` followed by the platform's own identifier.
    ///
    /// `for_platform(&["tns"], Platform::Ios)` yields `[tns, ios]`.
    pub fn for_platform<S: AsRef<str>>(
        prefix: &[S],
        platform: Platform,
    ) -> Result<Self, ConfigError> {
        Self::new(
            prefix
                .iter()
                .map(|q| q.as_ref().to_string())
                .chain(std::iter::once(platform.as_str().to_string())),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

fn validate(qualifier: &str) -> Result<(), ConfigError> {
    let reason = if qualifier.is_empty() {
        "is empty"
    } else if qualifier.contains(['/', '\\']) {
        "contains a path separator"
    } else if qualifier == "." || qualifier == ".." {
        "is a relative path component"
    } else if qualifier.contains('\0') {
        "contains a NUL byte"
    } else {
        return Ok(());
    };
    Err(ConfigError::InvalidQualifier {
        qualifier: qualifier.to_string(),
        reason,
    })
}

impl fmt::Display for QualifierList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Target mobile platform of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    /// Every known platform.
    pub const ALL: [Platform; 2] = [Platform::Ios, Platform::Android];

    /// The qualifier used for this platform's variant files.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownPlatform(s.to_string()))
    }
}

/// What the overlay does when probing a candidate fails with an error
/// other than "not found".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbePolicy {
    /// Give up on qualifiers and use the logical path. Later qualifiers
    /// are not consulted, even if their sibling exists.
    #[default]
    StopOnError,
    /// Treat the failed candidate as a miss and keep trying.
    ContinueOnError,
}

impl fmt::Display for ProbePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProbePolicy::StopOnError => "stop-on-error",
            ProbePolicy::ContinueOnError => "continue-on-error",
        })
    }
}
