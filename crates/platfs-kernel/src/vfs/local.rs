//! Local filesystem store.
//!
//! Serves a directory tree on disk. Paths are relative to the store root and
//! may not leave it, through `..` or through symlinks.

use std::ffi::OsString;
use std::fs::Metadata;
use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use notify::{RecursiveMode, Watcher};
use tokio::fs;
use tokio::sync::mpsc;

use super::traits::{Capabilities, DirEntry, DirEntryKind, Filesystem};
use super::watch::{WATCH_CHANNEL_CAPACITY, WatchEvent, WatchEventKind, WatchOptions, WatchStream};

/// Symlinks followed while resolving one path before giving up.
const MAX_SYMLINK_HOPS: usize = 40;

/// A directory on disk, optionally read-only.
///
/// With root `/work/app`, `read("src/main.ts")` reads `/work/app/src/main.ts`.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
    read_only: bool,
}

impl LocalFs {
    /// Serve `root`, which should be an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: false,
        }
    }

    /// Serve `root`, refusing every mutation with `PermissionDenied`.
    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        Self {
            read_only: true,
            ..Self::new(root)
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn canonical_root(&self) -> PathBuf {
        self.root.canonicalize().unwrap_or_else(|_| self.root.clone())
    }

    /// Map a store path to its place on disk, following every symlink.
    async fn locate(&self, path: &Path) -> io::Result<PathBuf> {
        self.walk(path, true).await
    }

    /// Like [`locate`](Self::locate), but a symlink in the final position is
    /// returned as the link itself.
    async fn locate_entry(&self, path: &Path) -> io::Result<PathBuf> {
        self.walk(path, false).await
    }

    /// Resolve `path` one component at a time from the canonical root.
    ///
    /// Each symlink met on the way is read and its target spliced into the
    /// remaining components, so a dangling link is checked as strictly as a
    /// live one. Stepping above the root, or a link whose absolute target lies
    /// outside it, is `PermissionDenied`. Components past the first missing
    /// one are appended as written.
    async fn walk(&self, path: &Path, follow_last: bool) -> io::Result<PathBuf> {
        let root = self.canonical_root();
        let mut pending: Vec<OsString> = Vec::new();
        push_components(&mut pending, path);

        let mut current = root.clone();
        let mut hops = 0;
        while let Some(component) = pending.pop() {
            if component == ".." {
                if current == root {
                    return Err(escapes(path, &root));
                }
                current.pop();
                continue;
            }

            let next = current.join(&component);
            if pending.is_empty() && !follow_last {
                return Ok(next);
            }

            match fs::symlink_metadata(&next).await {
                Ok(meta) if meta.file_type().is_symlink() => {
                    hops += 1;
                    if hops > MAX_SYMLINK_HOPS {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            format!("too many levels of symbolic links: {}", path.display()),
                        ));
                    }
                    let target = fs::read_link(&next).await?;
                    if target.is_absolute() {
                        let inside = target
                            .strip_prefix(&root)
                            .or_else(|_| target.strip_prefix(&self.root))
                            .map_err(|_| escapes(path, &root))?;
                        push_components(&mut pending, inside);
                        current = root.clone();
                    } else {
                        push_components(&mut pending, &target);
                    }
                }
                Ok(_) => current = next,
                Err(e) if e.kind() == io::ErrorKind::NotFound => current = next,
                Err(e) => return Err(e),
            }
        }
        Ok(current)
    }

    fn ensure_writable(&self) -> io::Result<()> {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("read-only store: {}", self.root.display()),
            ));
        }
        Ok(())
    }
}

/// Queue `path`'s components so the first one is popped first. Root and
/// `.` components are dropped; a leading `/` means the store root.
fn push_components(pending: &mut Vec<OsString>, path: &Path) {
    let at = pending.len();
    for component in path.components() {
        match component {
            Component::Normal(name) => pending.insert(at, name.to_os_string()),
            Component::ParentDir => pending.insert(at, OsString::from("..")),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
}

fn escapes(path: &Path, root: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("path escapes root: {} is not under {}", path.display(), root.display()),
    )
}

/// Describe an on-disk object. Sockets, pipes and devices count as files.
fn describe(name: String, meta: &Metadata, symlink_target: Option<PathBuf>) -> DirEntry {
    let kind = if symlink_target.is_some() {
        DirEntryKind::Symlink
    } else if meta.is_dir() {
        DirEntryKind::Directory
    } else {
        DirEntryKind::File
    };

    DirEntry {
        name,
        kind,
        size: if kind == DirEntryKind::Directory { 0 } else { meta.len() },
        modified: meta.modified().ok(),
        permissions: mode_bits(meta),
        symlink_target,
    }
}

#[cfg(unix)]
fn mode_bits(meta: &Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode())
}

#[cfg(not(unix))]
fn mode_bits(_meta: &Metadata) -> Option<u32> {
    None
}

/// Translate a notify event into root-relative terms.
///
/// Access events carry no change and are dropped.
fn translate_event(root: &Path, event: notify::Event) -> Option<WatchEvent> {
    use notify::EventKind;
    use notify::event::ModifyKind;

    let kind = match event.kind {
        EventKind::Create(_) => WatchEventKind::Created,
        EventKind::Modify(ModifyKind::Name(_)) => WatchEventKind::Renamed,
        EventKind::Modify(_) => WatchEventKind::Modified,
        EventKind::Remove(_) => WatchEventKind::Removed,
        EventKind::Access(_) => return None,
        EventKind::Any | EventKind::Other => WatchEventKind::Other,
    };

    let paths = event
        .paths
        .into_iter()
        .map(|p| p.strip_prefix(root).map(Path::to_path_buf).unwrap_or(p))
        .collect();

    Some(WatchEvent::new(kind, paths))
}

fn watch_error(err: notify::Error) -> io::Error {
    match err.kind {
        notify::ErrorKind::Io(e) => e,
        notify::ErrorKind::PathNotFound => {
            io::Error::new(io::ErrorKind::NotFound, "watch path not found")
        }
        other => io::Error::other(format!("watch failed: {:?}", other)),
    }
}

#[async_trait]
impl Filesystem for LocalFs {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(self.locate(path).await?).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.ensure_writable()?;
        let target = self.locate(path).await?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, data).await
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut dir = fs::read_dir(self.locate(path).await?).await?;
        let mut listing = Vec::new();

        while let Some(child) = dir.next_entry().await? {
            // Listings show links as links; stat() follows them
            let meta = fs::symlink_metadata(child.path()).await?;
            let target = if meta.file_type().is_symlink() {
                fs::read_link(child.path()).await.ok()
            } else {
                None
            };
            let name = child.file_name().to_string_lossy().into_owned();
            listing.push(describe(name, &meta, target));
        }

        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    async fn stat(&self, path: &Path) -> io::Result<DirEntry> {
        let meta = fs::metadata(self.locate(path).await?).await?;
        let name = path
            .file_name()
            .map_or_else(|| "/".to_string(), |n| n.to_string_lossy().into_owned());
        Ok(describe(name, &meta, None))
    }

    async fn mkdir(&self, path: &Path) -> io::Result<()> {
        self.ensure_writable()?;
        fs::create_dir_all(self.locate(path).await?).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        self.ensure_writable()?;
        // Links are removed, never their targets
        let target = self.locate_entry(path).await?;
        if fs::symlink_metadata(&target).await?.is_dir() {
            fs::remove_dir(&target).await
        } else {
            fs::remove_file(&target).await
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.ensure_writable()?;
        let source = self.locate_entry(from).await?;
        let dest = self.locate_entry(to).await?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&source, &dest).await
    }

    async fn watch(&self, path: &Path, options: WatchOptions) -> io::Result<WatchStream> {
        let target = self.locate(path).await?;
        let root = self.canonical_root();

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        if let Some(event) = translate_event(&root, event) {
                            // try_send: drop the event if the consumer is behind
                            let _ = tx.try_send(event);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "File watcher error");
                    }
                }
            })
            .map_err(watch_error)?;

        let mode = if options.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&target, mode).map_err(watch_error)?;
        tracing::debug!(path = %target.display(), recursive = options.recursive, "watching");

        Ok(WatchStream::with_guard(rx, watcher))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            writable: !self.read_only,
            watch: true,
            persistent: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    /// A small app tree: `app/main.ts`, `app/main.ios.ts`, `app/views/`.
    fn project() -> (LocalFs, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("app/views")).unwrap();
        std::fs::write(dir.path().join("app/main.ts"), "main").unwrap();
        std::fs::write(dir.path().join("app/main.ios.ts"), "ios").unwrap();
        (LocalFs::new(dir.path()), dir)
    }

    #[tokio::test]
    async fn test_read_relative_and_rooted_paths() {
        let (fs, _dir) = project();

        assert_eq!(fs.read(Path::new("app/main.ios.ts")).await.unwrap(), b"ios");
        assert_eq!(fs.read(Path::new("/app/main.ts")).await.unwrap(), b"main");
        assert_eq!(
            fs.read(Path::new("app/none.ts")).await.unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_write_creates_parents_on_disk() {
        let (fs, dir) = project();

        fs.write(Path::new("build/ios/bundle.js"), b"out").await.unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("build/ios/bundle.js")).unwrap(),
            b"out"
        );
    }

    #[tokio::test]
    async fn test_read_only_refuses_mutation() {
        let (_, dir) = project();
        let fs = LocalFs::read_only(dir.path());

        for result in [
            fs.write(Path::new("app/main.ts"), b"x").await,
            fs.mkdir(Path::new("out")).await,
            fs.remove(Path::new("app/main.ts")).await,
            fs.rename(Path::new("app/main.ts"), Path::new("b.ts")).await,
        ] {
            assert_eq!(result.unwrap_err().kind(), io::ErrorKind::PermissionDenied);
        }
        assert!(fs.read_only());
        assert_eq!(fs.read(Path::new("app/main.ts")).await.unwrap(), b"main");
    }

    #[tokio::test]
    async fn test_list_sorted() {
        let (fs, _dir) = project();

        let entries = fs.list(Path::new("app")).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["main.ios.ts", "main.ts", "views"]);
        assert!(entries[2].is_dir());
        assert_eq!(entries[0].size, 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_shows_symlinks_stat_follows_them() {
        let (fs, dir) = project();
        std::os::unix::fs::symlink("main.ts", dir.path().join("app/alias.ts")).unwrap();

        let entries = fs.list(Path::new("app")).await.unwrap();
        let alias = entries.iter().find(|e| e.name == "alias.ts").unwrap();
        assert!(alias.is_symlink());
        assert_eq!(alias.symlink_target, Some(PathBuf::from("main.ts")));

        let followed = fs.stat(Path::new("app/alias.ts")).await.unwrap();
        assert!(followed.is_file());
        assert_eq!(followed.size, 4);
    }

    #[tokio::test]
    async fn test_stat() {
        let (fs, _dir) = project();

        let file = fs.stat(Path::new("app/main.ts")).await.unwrap();
        assert!(file.is_file());
        assert_eq!(file.name, "main.ts");
        assert_eq!(file.size, 4);

        let dir = fs.stat(Path::new("app/views")).await.unwrap();
        assert!(dir.is_dir());
        assert_eq!(dir.size, 0);
    }

    #[tokio::test]
    async fn test_remove_and_rename() {
        let (fs, dir) = project();

        fs.rename(Path::new("app/main.ios.ts"), Path::new("platforms/ios/main.ts"))
            .await
            .unwrap();
        assert!(!dir.path().join("app/main.ios.ts").exists());
        assert_eq!(
            std::fs::read(dir.path().join("platforms/ios/main.ts")).unwrap(),
            b"ios"
        );

        fs.remove(Path::new("app/views")).await.unwrap();
        assert!(!dir.path().join("app/views").exists());

        let busy = fs.remove(Path::new("app")).await.unwrap_err();
        assert_ne!(busy.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_escapes_are_refused() {
        let (fs, _dir) = project();

        let up = fs.stat(Path::new("../../../etc/passwd")).await.unwrap_err();
        assert_eq!(up.kind(), io::ErrorKind::PermissionDenied);

        let write_up = fs.write(Path::new("app/../../escape.txt"), b"x").await.unwrap_err();
        assert_eq!(write_up.kind(), io::ErrorKind::PermissionDenied);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_out_of_root_is_refused() {
        let (fs, dir) = project();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.ts"), "s").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("app/linked")).unwrap();

        let err = fs.read(Path::new("app/linked/secret.ts")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dangling_symlink_out_of_root_is_refused() {
        let (fs, dir) = project();
        let outside = tempfile::tempdir().unwrap();
        let planted = outside.path().join("planted.ts");
        std::os::unix::fs::symlink(&planted, dir.path().join("app/link.ts")).unwrap();

        let err = fs.write(Path::new("app/link.ts"), b"escaped").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(!planted.exists());

        // through a dangling directory link too
        std::os::unix::fs::symlink(outside.path().join("gen"), dir.path().join("app/gen")).unwrap();
        let err = fs.write(Path::new("app/gen/out.ts"), b"escaped").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(!outside.path().join("gen").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_relative_symlink_climbing_out_is_refused() {
        let (fs, dir) = project();
        std::os::unix::fs::symlink("../../outside.ts", dir.path().join("app/up.ts")).unwrap();

        let err = fs.write(Path::new("app/up.ts"), b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dangling_symlink_inside_root_is_written_through() {
        let (fs, dir) = project();
        std::os::unix::fs::symlink("fresh.ts", dir.path().join("app/pending.ts")).unwrap();

        fs.write(Path::new("app/pending.ts"), b"new").await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("app/fresh.ts")).unwrap(), b"new");
        assert!(dir.path().join("app/pending.ts").is_symlink());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_remove_symlink_keeps_target() {
        let (fs, dir) = project();
        std::os::unix::fs::symlink("main.ts", dir.path().join("app/alias.ts")).unwrap();
        std::os::unix::fs::symlink("views", dir.path().join("app/screens")).unwrap();

        fs.remove(Path::new("app/alias.ts")).await.unwrap();
        fs.remove(Path::new("app/screens")).await.unwrap();

        assert!(!dir.path().join("app/alias.ts").is_symlink());
        assert!(!dir.path().join("app/screens").is_symlink());
        assert_eq!(std::fs::read(dir.path().join("app/main.ts")).unwrap(), b"main");
        assert!(dir.path().join("app/views").is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rename_symlink_moves_the_link() {
        let (fs, dir) = project();
        std::os::unix::fs::symlink("main.ts", dir.path().join("app/alias.ts")).unwrap();

        fs.rename(Path::new("app/alias.ts"), Path::new("app/other.ts")).await.unwrap();

        let moved = dir.path().join("app/other.ts");
        assert!(moved.is_symlink());
        assert_eq!(std::fs::read_link(&moved).unwrap(), PathBuf::from("main.ts"));
        assert_eq!(std::fs::read(dir.path().join("app/main.ts")).unwrap(), b"main");
        assert!(!dir.path().join("app/alias.ts").is_symlink());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_cycle_is_an_error() {
        let (fs, dir) = project();
        std::os::unix::fs::symlink("b", dir.path().join("a")).unwrap();
        std::os::unix::fs::symlink("a", dir.path().join("b")).unwrap();

        let err = fs.read(Path::new("a")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_missing_ancestors_stay_inside_root() {
        let (fs, dir) = project();

        let absent = fs.stat(Path::new("a/b/c.ios.ts")).await.unwrap_err();
        assert_eq!(absent.kind(), io::ErrorKind::NotFound);

        fs.mkdir(Path::new("a/b")).await.unwrap();
        assert!(dir.path().join("a/b").is_dir());
    }

    #[test]
    fn test_capabilities() {
        let dir = tempfile::tempdir().unwrap();

        let caps = LocalFs::new(dir.path()).capabilities();
        assert!(caps.writable && caps.watch && caps.persistent);
        assert!(!LocalFs::read_only(dir.path()).capabilities().writable);
    }

    #[tokio::test]
    async fn test_watch_reports_new_file() {
        let (fs, _dir) = project();

        let mut stream = fs.watch(Path::new("app"), WatchOptions::default()).await.unwrap();
        fs.write(Path::new("app/main.android.ts"), b"android").await.unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = stream.recv().await {
                if event.paths.contains(&PathBuf::from("app/main.android.ts")) {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(seen);
    }

    #[tokio::test]
    async fn test_watch_missing_path_fails() {
        let (fs, _dir) = project();
        assert!(fs.watch(Path::new("nope"), WatchOptions::default()).await.is_err());
    }

    #[test]
    fn test_translate_drops_access_events() {
        use notify::event::{AccessKind, EventKind};
        let event = notify::Event::new(EventKind::Access(AccessKind::Any)).add_path("/r/a".into());
        assert!(translate_event(Path::new("/r"), event).is_none());
    }

    #[test]
    fn test_translate_relativizes_paths() {
        use notify::event::{CreateKind, EventKind, ModifyKind, RenameMode};

        let created = notify::Event::new(EventKind::Create(CreateKind::File))
            .add_path("/r/src/a.ts".into());
        let translated = translate_event(Path::new("/r"), created).unwrap();
        assert_eq!(translated.kind, WatchEventKind::Created);
        assert_eq!(translated.paths, vec![PathBuf::from("src/a.ts")]);

        let renamed = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/r/a.ts".into())
            .add_path("/r/b.ts".into());
        let translated = translate_event(Path::new("/r"), renamed).unwrap();
        assert_eq!(translated.kind, WatchEventKind::Renamed);
        assert_eq!(translated.paths, vec![PathBuf::from("a.ts"), PathBuf::from("b.ts")]);
    }
}
