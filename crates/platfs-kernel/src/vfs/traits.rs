//! The store interface every filesystem in platfs implements.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use serde::Serialize;

use super::watch::{WatchOptions, WatchStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirEntryKind {
    File,
    Directory,
    Symlink,
}

/// Metadata for one object in a store, from `list()` or `stat()`.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Final path component only.
    pub name: String,
    pub kind: DirEntryKind,
    /// Byte length; 0 for directories.
    pub size: u64,
    pub modified: Option<SystemTime>,
    /// Unix mode bits where the store has them.
    pub permissions: Option<u32>,
    /// Where a symlink points, as stored in the link.
    pub symlink_target: Option<PathBuf>,
}

impl DirEntry {
    fn new(name: impl Into<String>, kind: DirEntryKind, size: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            size,
            modified: None,
            permissions: None,
            symlink_target: None,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, DirEntryKind::Directory, 0)
    }

    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self::new(name, DirEntryKind::File, size)
    }

    pub fn is_file(&self) -> bool {
        self.kind == DirEntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == DirEntryKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == DirEntryKind::Symlink
    }
}

/// What a store supports beyond reading.
///
/// Wrappers report their store's answer unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Capabilities {
    /// `write`, `mkdir`, `remove` and `rename` are accepted.
    pub writable: bool,
    /// `watch` produces change events.
    pub watch: bool,
    /// Contents outlive the process.
    pub persistent: bool,
}

/// A store of files and directories addressed by relative paths.
///
/// A leading `/` means the store root, not the host root: a store rooted at
/// `/work/app` serves `/src/main.ts` from `/work/app/src/main.ts`.
///
/// Failures are plain `io::Error`s whose kind callers may match on
/// (`NotFound`, `PermissionDenied`, `IsADirectory`, ...).
#[async_trait]
pub trait Filesystem: Send + Sync {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace the file's contents, creating it and its parents as needed.
    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Entries directly under a directory, sorted by name.
    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Metadata for a path, following symlinks.
    async fn stat(&self, path: &Path) -> io::Result<DirEntry>;

    /// Create a directory and any missing parents. Existing directories are fine.
    async fn mkdir(&self, path: &Path) -> io::Result<()>;

    /// Delete a file or an empty directory.
    async fn remove(&self, path: &Path) -> io::Result<()>;

    fn capabilities(&self) -> Capabilities;

    fn read_only(&self) -> bool {
        !self.capabilities().writable
    }

    async fn exists(&self, path: &Path) -> bool {
        self.stat(path).await.is_ok()
    }

    async fn is_file(&self, path: &Path) -> bool {
        self.stat(path).await.is_ok_and(|entry| entry.is_file())
    }

    async fn is_dir(&self, path: &Path) -> bool {
        self.stat(path).await.is_ok_and(|entry| entry.is_dir())
    }

    /// Move a file or directory, creating the destination's parents.
    ///
    /// Stores without a native rename get a non-atomic copy and delete
    /// that only handles files.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if self.stat(from).await?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("cannot move directory {}: store has no native rename", from.display()),
            ));
        }
        let data = self.read(from).await?;
        self.write(to, &data).await?;
        self.remove(from).await
    }

    /// Stream changes to a path until the returned stream is dropped.
    async fn watch(&self, path: &Path, options: WatchOptions) -> io::Result<WatchStream> {
        let _ = options;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot watch {}: store does not support watching", path.display()),
        ))
    }
}

/// Shared handles forward every call, so `Arc<dyn Filesystem>` can be
/// wrapped anywhere a concrete store can.
#[async_trait]
impl<F: Filesystem + ?Sized> Filesystem for Arc<F> {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        (**self).read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        (**self).write(path, data).await
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        (**self).list(path).await
    }

    async fn stat(&self, path: &Path) -> io::Result<DirEntry> {
        (**self).stat(path).await
    }

    async fn mkdir(&self, path: &Path) -> io::Result<()> {
        (**self).mkdir(path).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        (**self).remove(path).await
    }

    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    fn read_only(&self) -> bool {
        (**self).read_only()
    }

    async fn exists(&self, path: &Path) -> bool {
        (**self).exists(path).await
    }

    async fn is_file(&self, path: &Path) -> bool {
        (**self).is_file(path).await
    }

    async fn is_dir(&self, path: &Path) -> bool {
        (**self).is_dir(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        (**self).rename(from, to).await
    }

    async fn watch(&self, path: &Path, options: WatchOptions) -> io::Result<WatchStream> {
        (**self).watch(path, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryFs;

    /// A store that only implements the required methods, over a MemoryFs.
    struct Minimal(MemoryFs);

    #[async_trait]
    impl Filesystem for Minimal {
        async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            self.0.read(path).await
        }
        async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
            self.0.write(path, data).await
        }
        async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
            self.0.list(path).await
        }
        async fn stat(&self, path: &Path) -> io::Result<DirEntry> {
            self.0.stat(path).await
        }
        async fn mkdir(&self, path: &Path) -> io::Result<()> {
            self.0.mkdir(path).await
        }
        async fn remove(&self, path: &Path) -> io::Result<()> {
            self.0.remove(path).await
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities {
                writable: false,
                ..Capabilities::default()
            }
        }
    }

    #[tokio::test]
    async fn test_default_queries() {
        let fs = Minimal(MemoryFs::new());
        fs.write(Path::new("app/main.ts"), b"x").await.unwrap();

        assert!(fs.exists(Path::new("app")).await);
        assert!(fs.is_dir(Path::new("app")).await);
        assert!(fs.is_file(Path::new("app/main.ts")).await);
        assert!(!fs.is_file(Path::new("app/none.ts")).await);
        assert!(fs.read_only());
    }

    #[tokio::test]
    async fn test_default_rename_copies_files_only() {
        let fs = Minimal(MemoryFs::new());
        fs.write(Path::new("app/main.ts"), b"x").await.unwrap();

        fs.rename(Path::new("app/main.ts"), Path::new("out/main.ts")).await.unwrap();
        assert_eq!(fs.read(Path::new("out/main.ts")).await.unwrap(), b"x");
        assert!(!fs.exists(Path::new("app/main.ts")).await);

        let dir = fs.rename(Path::new("app"), Path::new("src")).await.unwrap_err();
        assert_eq!(dir.kind(), io::ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_default_watch_unsupported() {
        let fs = Minimal(MemoryFs::new());
        let err = fs.watch(Path::new(""), WatchOptions::default()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_arc_dyn_forwards() {
        let fs: Arc<dyn Filesystem> = Arc::new(MemoryFs::new());
        fs.write(Path::new("a.ts"), b"a").await.unwrap();

        assert_eq!(fs.read(Path::new("a.ts")).await.unwrap(), b"a");
        assert_eq!(fs.capabilities(), MemoryFs::new().capabilities());
    }
}
