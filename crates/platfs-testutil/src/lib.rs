//! Test utilities for platfs.
//!
//! [`RecordingFs`] wraps any store, logs every call it receives, and can be
//! told to fail chosen calls. Tests use it to check exactly what a wrapper
//! such as the platform overlay asked of the store underneath.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use platfs_kernel::vfs::{Capabilities, DirEntry, Filesystem, WatchOptions, WatchStream};

/// A `Filesystem` method, as seen by [`RecordingFs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Read,
    Write,
    List,
    Stat,
    Mkdir,
    Remove,
    Exists,
    IsFile,
    IsDir,
    Rename,
    Watch,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    /// Path arguments in signature order (`rename` records two).
    pub paths: Vec<PathBuf>,
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let paths: Vec<_> = self.paths.iter().map(|p| p.display().to_string()).collect();
        write!(f, "{:?}({})", self.op, paths.join(", "))
    }
}

/// Store wrapper that records calls and injects failures.
pub struct RecordingFs<F> {
    inner: F,
    calls: Mutex<Vec<Call>>,
    faults: Mutex<HashMap<(Op, PathBuf), io::ErrorKind>>,
}

/// Poisoning only happens after a panicking test; keep the data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<F: Filesystem> RecordingFs<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(HashMap::new()),
        }
    }

    /// Make every `op` on `path` fail with `kind`.
    pub fn fail_on(self, op: Op, path: impl Into<PathBuf>, kind: io::ErrorKind) -> Self {
        self.inject(op, path, kind);
        self
    }

    /// Like [`fail_on`](Self::fail_on), on a shared reference.
    pub fn inject(&self, op: Op, path: impl Into<PathBuf>, kind: io::ErrorKind) {
        lock(&self.faults).insert((op, path.into()), kind);
    }

    /// Remove all injected failures.
    pub fn heal(&self) {
        lock(&self.faults).clear();
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Everything recorded so far, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    /// Recorded calls of one kind.
    pub fn calls_to(&self, op: Op) -> Vec<Vec<PathBuf>> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.op == op)
            .map(|c| c.paths.clone())
            .collect()
    }

    pub fn count(&self, op: Op) -> usize {
        lock(&self.calls).iter().filter(|c| c.op == op).count()
    }

    pub fn clear(&self) {
        lock(&self.calls).clear();
    }

    fn record(&self, op: Op, paths: &[&Path]) -> io::Result<()> {
        lock(&self.calls).push(Call {
            op,
            paths: paths.iter().map(|p| p.to_path_buf()).collect(),
        });

        let faults = lock(&self.faults);
        for path in paths {
            if let Some(kind) = faults.get(&(op, path.to_path_buf())) {
                return Err(io::Error::new(
                    *kind,
                    format!("injected {:?} failure: {}", op, path.display()),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<F: Filesystem> Filesystem for RecordingFs<F> {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.record(Op::Read, &[path])?;
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.record(Op::Write, &[path])?;
        self.inner.write(path, data).await
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        self.record(Op::List, &[path])?;
        self.inner.list(path).await
    }

    async fn stat(&self, path: &Path) -> io::Result<DirEntry> {
        self.record(Op::Stat, &[path])?;
        self.inner.stat(path).await
    }

    async fn mkdir(&self, path: &Path) -> io::Result<()> {
        self.record(Op::Mkdir, &[path])?;
        self.inner.mkdir(path).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        self.record(Op::Remove, &[path])?;
        self.inner.remove(path).await
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    // Boolean queries cannot carry an error; an injected fault reads as `false`.
    async fn exists(&self, path: &Path) -> bool {
        self.record(Op::Exists, &[path]).is_ok() && self.inner.exists(path).await
    }

    async fn is_file(&self, path: &Path) -> bool {
        self.record(Op::IsFile, &[path]).is_ok() && self.inner.is_file(path).await
    }

    async fn is_dir(&self, path: &Path) -> bool {
        self.record(Op::IsDir, &[path]).is_ok() && self.inner.is_dir(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.record(Op::Rename, &[from, to])?;
        self.inner.rename(from, to).await
    }

    async fn watch(&self, path: &Path, options: WatchOptions) -> io::Result<WatchStream> {
        self.record(Op::Watch, &[path])?;
        self.inner.watch(path, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platfs_kernel::MemoryFs;

    #[tokio::test]
    async fn test_records_calls_in_order() {
        let fs = RecordingFs::new(MemoryFs::new());
        fs.write(Path::new("a.txt"), b"a").await.unwrap();
        fs.read(Path::new("a.txt")).await.unwrap();
        fs.rename(Path::new("a.txt"), Path::new("b.txt")).await.unwrap();

        let calls: Vec<String> = fs.calls().iter().map(|c| c.to_string()).collect();
        assert_eq!(calls, vec!["Write(a.txt)", "Read(a.txt)", "Rename(a.txt, b.txt)"]);
    }

    #[tokio::test]
    async fn test_injected_fault() {
        let fs = RecordingFs::new(MemoryFs::new()).fail_on(
            Op::Stat,
            "secret.txt",
            io::ErrorKind::PermissionDenied,
        );

        let err = fs.stat(Path::new("secret.txt")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        // Other ops on the same path are untouched
        assert_eq!(
            fs.read(Path::new("secret.txt")).await.unwrap_err().kind(),
            io::ErrorKind::NotFound
        );

        fs.heal();
        assert_eq!(
            fs.stat(Path::new("secret.txt")).await.unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_boolean_queries_do_not_record_stat() {
        let fs = RecordingFs::new(MemoryFs::new());
        fs.inner().write(Path::new("a.txt"), b"a").await.unwrap();

        assert!(fs.is_file(Path::new("a.txt")).await);
        assert!(fs.exists(Path::new("a.txt")).await);
        assert_eq!(fs.count(Op::Stat), 0);
        assert_eq!(fs.count(Op::IsFile), 1);
        assert_eq!(fs.count(Op::Exists), 1);
    }
}
