//! In-memory filesystem.
//!
//! Backs tests and dry runs. Nothing survives the value being dropped.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};

use super::traits::{Capabilities, DirEntry, Filesystem};
use super::watch::{WATCH_CHANNEL_CAPACITY, WatchEvent, WatchEventKind, WatchOptions, WatchStream};

#[derive(Debug, Clone)]
enum Node {
    File { data: Vec<u8>, modified: SystemTime },
    Dir { modified: SystemTime },
}

impl Node {
    fn dir() -> Self {
        Node::Dir {
            modified: SystemTime::now(),
        }
    }

    fn file(data: &[u8]) -> Self {
        Node::File {
            data: data.to_vec(),
            modified: SystemTime::now(),
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Node::Dir { .. })
    }

    fn describe(&self, name: String) -> DirEntry {
        match self {
            Node::File { data, modified } => DirEntry {
                modified: Some(*modified),
                ..DirEntry::file(name, data.len() as u64)
            },
            Node::Dir { modified } => DirEntry {
                modified: Some(*modified),
                ..DirEntry::directory(name)
            },
        }
    }
}

/// A live `watch()` registration.
#[derive(Debug)]
struct Watcher {
    path: PathBuf,
    recursive: bool,
    tx: mpsc::Sender<WatchEvent>,
}

impl Watcher {
    /// The watched path and its direct children; every descendant when recursive.
    fn covers(&self, changed: &Path) -> bool {
        changed == self.path
            || changed.parent() == Some(self.path.as_path())
            || (self.recursive && changed.starts_with(&self.path))
    }
}

/// Nodes and watchers behind one lock, so events leave in mutation order.
#[derive(Debug)]
struct Tree {
    nodes: HashMap<PathBuf, Node>,
    watchers: Vec<Watcher>,
}

impl Tree {
    fn lookup(&self, key: &Path, shown: &Path) -> io::Result<&Node> {
        self.nodes.get(key).ok_or_else(|| not_found(shown))
    }

    fn has_children(&self, dir: &Path) -> bool {
        self.nodes.keys().any(|k| k.parent() == Some(dir) && k != dir)
    }

    /// Create the missing ancestors of `key`, announcing each one.
    fn make_parents(&mut self, key: &Path) -> io::Result<()> {
        let Some(parent) = key.parent() else {
            return Ok(());
        };

        let mut current = PathBuf::new();
        for component in parent.components() {
            current.push(component);
            match self.nodes.get(&current) {
                Some(Node::Dir { .. }) => {}
                Some(Node::File { .. }) => return Err(not_a_directory(&current)),
                None => {
                    self.nodes.insert(current.clone(), Node::dir());
                    self.emit(WatchEventKind::Created, vec![current.clone()]);
                }
            }
        }
        Ok(())
    }

    /// Hand an event to every live watcher that covers one of its paths.
    fn emit(&mut self, kind: WatchEventKind, paths: Vec<PathBuf>) {
        self.watchers.retain(|w| !w.tx.is_closed());

        for watcher in &self.watchers {
            if !paths.iter().any(|p| watcher.covers(p)) {
                continue;
            }
            // A consumer that falls behind loses events rather than stalling writers
            if watcher.tx.try_send(WatchEvent::new(kind, paths.clone())).is_err() {
                tracing::debug!(path = %watcher.path.display(), "watch channel full, event dropped");
            }
        }
    }
}

/// In-memory filesystem.
#[derive(Debug)]
pub struct MemoryFs {
    tree: RwLock<Tree>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// An empty filesystem holding only the root directory.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(PathBuf::new(), Node::dir());
        Self {
            tree: RwLock::new(Tree {
                nodes,
                watchers: Vec::new(),
            }),
        }
    }
}

/// Map a caller's path to a node key: no root, no `.`, `..` applied.
fn key(path: &Path) -> PathBuf {
    let mut key = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(name) => key.push(name),
            Component::ParentDir => {
                key.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    key
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("not found: {}", path.display()))
}

fn is_a_directory(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::IsADirectory, format!("is a directory: {}", path.display()))
}

fn not_a_directory(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotADirectory, format!("not a directory: {}", path.display()))
}

fn refuse_root(action: &str) -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, format!("cannot {action} root directory"))
}

#[async_trait]
impl Filesystem for MemoryFs {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let tree = self.tree.read().await;
        match tree.lookup(&key(path), path)? {
            Node::File { data, .. } => Ok(data.clone()),
            Node::Dir { .. } => Err(is_a_directory(path)),
        }
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let key = key(path);
        let mut tree = self.tree.write().await;

        if tree.nodes.get(&key).is_some_and(Node::is_dir) {
            return Err(is_a_directory(path));
        }
        tree.make_parents(&key)?;

        let kind = match tree.nodes.insert(key.clone(), Node::file(data)) {
            Some(_) => WatchEventKind::Modified,
            None => WatchEventKind::Created,
        };
        tree.emit(kind, vec![key]);
        Ok(())
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let dir = key(path);
        let tree = self.tree.read().await;

        if !tree.lookup(&dir, path)?.is_dir() {
            return Err(not_a_directory(path));
        }

        let mut listing: Vec<DirEntry> = tree
            .nodes
            .iter()
            .filter(|(k, _)| k.parent() == Some(dir.as_path()) && **k != dir)
            .filter_map(|(k, node)| {
                let name = k.file_name()?.to_string_lossy().into_owned();
                Some(node.describe(name))
            })
            .collect();
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    async fn stat(&self, path: &Path) -> io::Result<DirEntry> {
        let key = key(path);
        let name = key
            .file_name()
            .map_or_else(|| "/".to_string(), |n| n.to_string_lossy().into_owned());

        let tree = self.tree.read().await;
        Ok(tree.lookup(&key, path)?.describe(name))
    }

    async fn mkdir(&self, path: &Path) -> io::Result<()> {
        let key = key(path);
        let mut tree = self.tree.write().await;

        match tree.nodes.get(&key) {
            Some(Node::Dir { .. }) => return Ok(()),
            Some(Node::File { .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("file exists: {}", path.display()),
                ));
            }
            None => {}
        }

        tree.make_parents(&key)?;
        tree.nodes.insert(key.clone(), Node::dir());
        tree.emit(WatchEventKind::Created, vec![key]);
        Ok(())
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        let key = key(path);
        if key.as_os_str().is_empty() {
            return Err(refuse_root("remove"));
        }

        let mut tree = self.tree.write().await;
        if tree.lookup(&key, path)?.is_dir() && tree.has_children(&key) {
            return Err(io::Error::new(
                io::ErrorKind::DirectoryNotEmpty,
                format!("directory not empty: {}", path.display()),
            ));
        }

        tree.nodes.remove(&key);
        tree.emit(WatchEventKind::Removed, vec![key]);
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let src = key(from);
        let dst = key(to);
        if src.as_os_str().is_empty() {
            return Err(refuse_root("rename"));
        }

        let mut tree = self.tree.write().await;
        let moving_dir = tree.lookup(&src, from)?.is_dir();
        match tree.nodes.get(&dst) {
            Some(existing) if existing.is_dir() && !moving_dir => {
                return Err(io::Error::new(
                    io::ErrorKind::IsADirectory,
                    format!("destination is a directory: {}", to.display()),
                ));
            }
            Some(existing) if !existing.is_dir() && moving_dir => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("destination is not a directory: {}", to.display()),
                ));
            }
            Some(_) if moving_dir && dst != src && tree.has_children(&dst) => {
                return Err(io::Error::new(
                    io::ErrorKind::DirectoryNotEmpty,
                    format!("destination not empty: {}", to.display()),
                ));
            }
            _ => {}
        }
        if moving_dir && dst.starts_with(&src) && dst != src {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot move {} into itself", from.display()),
            ));
        }

        tree.make_parents(&dst)?;

        // A directory takes its whole subtree along
        let moved: Vec<PathBuf> = tree
            .nodes
            .keys()
            .filter(|k| k.starts_with(&src))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = tree.nodes.remove(&old)
                && let Ok(rest) = old.strip_prefix(&src)
            {
                let new = if rest.as_os_str().is_empty() {
                    dst.clone()
                } else {
                    dst.join(rest)
                };
                tree.nodes.insert(new, node);
            }
        }

        tree.emit(WatchEventKind::Renamed, vec![src, dst]);
        Ok(())
    }

    async fn watch(&self, path: &Path, options: WatchOptions) -> io::Result<WatchStream> {
        let key = key(path);
        let mut tree = self.tree.write().await;
        tree.lookup(&key, path)?;

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        tree.watchers.push(Watcher {
            path: key,
            recursive: options.recursive,
            tx,
        });
        Ok(WatchStream::new(rx))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            writable: true,
            watch: true,
            persistent: false,
        }
    }
}
