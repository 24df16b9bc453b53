//! Change notification types shared by all watchable backends.

use std::any::Any;
use std::fmt;
use std::path::PathBuf;

use tokio::sync::mpsc;

/// Events buffered per stream before new ones are dropped.
///
/// Consumers treat events as "something under this path changed", so
/// dropping intermediate events under load is acceptable.
pub const WATCH_CHANNEL_CAPACITY: usize = 256;

/// Options for [`Filesystem::watch`](super::Filesystem::watch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchOptions {
    /// Also report changes in nested directories.
    pub recursive: bool,
}

impl WatchOptions {
    pub fn recursive() -> Self {
        Self { recursive: true }
    }
}

/// What happened to the paths in a [`WatchEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Modified,
    Removed,
    /// `paths` holds the source followed by the destination when both are known.
    Renamed,
    Other,
}

impl fmt::Display for WatchEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WatchEventKind::Created => "created",
            WatchEventKind::Modified => "modified",
            WatchEventKind::Removed => "removed",
            WatchEventKind::Renamed => "renamed",
            WatchEventKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// A single change reported by a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    /// Affected paths, relative to the filesystem root.
    pub paths: Vec<PathBuf>,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, paths: Vec<PathBuf>) -> Self {
        Self { kind, paths }
    }
}

/// Stream of change events for one watch.
///
/// Dropping the stream ends the watch. Backends that need an OS handle
/// to stay alive hand it over as the guard.
pub struct WatchStream {
    rx: mpsc::Receiver<WatchEvent>,
    guard: Option<Box<dyn Any + Send>>,
}

impl WatchStream {
    pub fn new(rx: mpsc::Receiver<WatchEvent>) -> Self {
        Self { rx, guard: None }
    }

    /// Create a stream that owns `guard` for as long as it lives.
    pub fn with_guard(rx: mpsc::Receiver<WatchEvent>, guard: impl Any + Send) -> Self {
        Self {
            rx,
            guard: Some(Box::new(guard)),
        }
    }

    /// Wait for the next event. Returns `None` once the producer is gone.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }

    /// Take an already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<WatchEvent> {
        self.rx.try_recv().ok()
    }
}

impl fmt::Debug for WatchStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchStream")
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}
