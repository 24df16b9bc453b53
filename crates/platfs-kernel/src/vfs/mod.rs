//! Stores for platfs.
//!
//! - **MemoryFs**: ephemeral tree for tests and dry runs
//! - **LocalFs**: a directory on disk, confined to its root
//!
//! Both implement [`Filesystem`]. So does
//! [`PlatformOverlayFs`](crate::PlatformOverlayFs), which means overlays
//! wrap stores, shared `Arc<dyn Filesystem>` handles, or other overlays.

mod local;
mod memory;
mod traits;
mod watch;

pub use local::LocalFs;
pub use memory::MemoryFs;
pub use traits::{Capabilities, DirEntry, DirEntryKind, Filesystem};
pub use watch::{WATCH_CHANNEL_CAPACITY, WatchEvent, WatchEventKind, WatchOptions, WatchStream};
