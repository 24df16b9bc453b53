//! Platform-overlay filesystem.
//!
//! [`PlatformOverlayFs`] wraps a store and redirects every path to its
//! platform variant when one exists:
//!
//! ```text
//! qualifiers: [tns, ios]
//!
//! app.component.ts      ──►  app.component.tns.ts   (if it is a file)
//!                       ──►  app.component.ios.ts   (else, if it is a file)
//!                       ──►  app.component.ts       (otherwise)
//! ```
//!
//! Each call resolves its path arguments once, with a fresh probe, and
//! then makes exactly one call on the store. Nothing is cached.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::OverlayConfig;
use crate::error::{ConfigError, ProbeError};
use crate::qualifier::{ProbePolicy, QualifierList};
use crate::vfs::{Capabilities, DirEntry, Filesystem, WatchOptions, WatchStream};

/// Splice `qualifier` into the file-name stem of `path`.
///
/// `src/app.module.ts` + `ios` → `src/app.module.ios.ts`. Paths without an
/// extension get the qualifier appended (`Makefile` → `Makefile.ios`).
/// Returns `None` when `path` has no file name to qualify (`""`, `/`, `..`).
pub fn qualified_path(path: &Path, qualifier: &str) -> Option<PathBuf> {
    let stem = path.file_stem()?;

    let mut name = stem.to_os_string();
    name.push(".");
    name.push(qualifier);
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    Some(path.with_file_name(name))
}

/// Outcome of resolving one logical path, with the reason.
#[derive(Debug)]
pub enum Resolution {
    /// A platform variant exists and was selected.
    Qualified { path: PathBuf, qualifier: String },
    /// No variant exists; the logical path is used.
    Unqualified { path: PathBuf },
    /// Probing failed; the logical path is used.
    ProbeFailed { path: PathBuf, error: ProbeError },
}

impl Resolution {
    /// The path the operation will actually use.
    pub fn path(&self) -> &Path {
        match self {
            Resolution::Qualified { path, .. }
            | Resolution::Unqualified { path }
            | Resolution::ProbeFailed { path, .. } => path,
        }
    }

    pub fn into_path(self) -> PathBuf {
        match self {
            Resolution::Qualified { path, .. }
            | Resolution::Unqualified { path }
            | Resolution::ProbeFailed { path, .. } => path,
        }
    }

    pub fn is_qualified(&self) -> bool {
        matches!(self, Resolution::Qualified { .. })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Qualified { path, qualifier } => {
                write!(f, "{} (variant: {})", path.display(), qualifier)
            }
            Resolution::Unqualified { path } => write!(f, "{} (no variant)", path.display()),
            Resolution::ProbeFailed { path, error } => {
                write!(f, "{} (probe failed: {})", path.display(), error)
            }
        }
    }
}

/// A [`Filesystem`] that substitutes platform variants for logical paths.
///
/// Holds nothing but the store, the qualifiers and the probe policy.
#[derive(Debug)]
pub struct PlatformOverlayFs<F> {
    inner: F,
    qualifiers: QualifierList,
    policy: ProbePolicy,
}

impl<F: Filesystem> PlatformOverlayFs<F> {
    /// Wrap `inner`, stopping at the first probe error.
    pub fn new(inner: F, qualifiers: QualifierList) -> Self {
        Self::with_policy(inner, qualifiers, ProbePolicy::default())
    }

    pub fn with_policy(inner: F, qualifiers: QualifierList, policy: ProbePolicy) -> Self {
        Self {
            inner,
            qualifiers,
            policy,
        }
    }

    /// Build an overlay from a loaded configuration.
    ///
    /// Fails if the configuration does not yield a valid qualifier list.
    pub fn from_config(inner: F, config: &OverlayConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_policy(
            inner,
            config.qualifier_list()?,
            config.probe_policy,
        ))
    }

    pub fn qualifiers(&self) -> &QualifierList {
        &self.qualifiers
    }

    pub fn policy(&self) -> ProbePolicy {
        self.policy
    }

    /// The wrapped store.
    pub fn inner(&self) -> &F {
        &self.inner
    }

    pub fn into_inner(self) -> F {
        self.inner
    }

    /// Resolve a logical path to the path the store will be asked for.
    pub async fn resolve(&self, path: &Path) -> PathBuf {
        self.explain(path).await.into_path()
    }

    /// Resolve a logical path, reporting why the result was chosen.
    pub async fn explain(&self, path: &Path) -> Resolution {
        let mut first_error = None;

        for qualifier in self.qualifiers.iter() {
            let Some(candidate) = qualified_path(path, qualifier) else {
                break;
            };

            match self.probe(&candidate).await {
                Ok(true) => {
                    tracing::debug!(
                        logical = %path.display(),
                        resolved = %candidate.display(),
                        qualifier,
                        "platform variant selected"
                    );
                    return Resolution::Qualified {
                        path: candidate,
                        qualifier: qualifier.to_string(),
                    };
                }
                Ok(false) => {}
                Err(error) => {
                    tracing::debug!(logical = %path.display(), %error, policy = %self.policy, "probe failed");
                    match self.policy {
                        ProbePolicy::StopOnError => {
                            return Resolution::ProbeFailed {
                                path: path.to_path_buf(),
                                error,
                            };
                        }
                        ProbePolicy::ContinueOnError => {
                            first_error.get_or_insert(error);
                        }
                    }
                }
            }
        }

        match first_error {
            Some(error) => Resolution::ProbeFailed {
                path: path.to_path_buf(),
                error,
            },
            None => Resolution::Unqualified {
                path: path.to_path_buf(),
            },
        }
    }

    /// Is `candidate` an existing regular file?
    ///
    /// A missing candidate, or one whose parent is not a directory, is a
    /// plain miss. Anything else the store reports is a probe error.
    async fn probe(&self, candidate: &Path) -> Result<bool, ProbeError> {
        match self.inner.stat(candidate).await {
            Ok(entry) => Ok(entry.is_file()),
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
                Ok(false)
            }
            Err(source) => Err(ProbeError {
                candidate: candidate.to_path_buf(),
                source,
            }),
        }
    }
}

#[async_trait]
impl<F: Filesystem> Filesystem for PlatformOverlayFs<F> {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let resolved = self.resolve(path).await;
        self.inner.read(&resolved).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let resolved = self.resolve(path).await;
        self.inner.write(&resolved, data).await
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let resolved = self.resolve(path).await;
        self.inner.list(&resolved).await
    }

    async fn stat(&self, path: &Path) -> io::Result<DirEntry> {
        let resolved = self.resolve(path).await;
        self.inner.stat(&resolved).await
    }

    async fn mkdir(&self, path: &Path) -> io::Result<()> {
        let resolved = self.resolve(path).await;
        self.inner.mkdir(&resolved).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        let resolved = self.resolve(path).await;
        self.inner.remove(&resolved).await
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn read_only(&self) -> bool {
        self.inner.read_only()
    }

    async fn exists(&self, path: &Path) -> bool {
        let resolved = self.resolve(path).await;
        self.inner.exists(&resolved).await
    }

    async fn is_file(&self, path: &Path) -> bool {
        let resolved = self.resolve(path).await;
        self.inner.is_file(&resolved).await
    }

    async fn is_dir(&self, path: &Path) -> bool {
        let resolved = self.resolve(path).await;
        self.inner.is_dir(&resolved).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let from = self.resolve(from).await;
        let to = self.resolve(to).await;
        self.inner.rename(&from, &to).await
    }

    async fn watch(&self, path: &Path, options: WatchOptions) -> io::Result<WatchStream> {
        let resolved = self.resolve(path).await;
        self.inner.watch(&resolved, options).await
    }
}
