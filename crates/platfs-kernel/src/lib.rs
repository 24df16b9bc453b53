//! platfs-kernel: the core of platfs.
//!
//! This crate provides:
//!
//! - **VFS**: the [`Filesystem`] trait plus in-memory and local stores
//! - **Overlay**: [`PlatformOverlayFs`], which serves platform variants
//!   (`app.ios.ts`) in place of logical files (`app.ts`)
//! - **Qualifiers**: validated qualifier lists, target platforms, probe policies
//! - **Config**: `platfs.toml` loading and discovery
//!
//! ```no_run
//! use std::path::Path;
//! use platfs_kernel::{LocalFs, Platform, PlatformOverlayFs, QualifierList};
//! use platfs_kernel::vfs::Filesystem;
//!
//! # async fn demo() -> std::io::Result<()> {
//! let qualifiers = QualifierList::for_platform(&["tns"], Platform::Ios)
//!     .map_err(std::io::Error::other)?;
//! let fs = PlatformOverlayFs::new(LocalFs::new("app"), qualifiers);
//! let source = fs.read(Path::new("app.component.ts")).await?;
//! # let _ = source;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod overlay;
pub mod paths;
pub mod qualifier;
pub mod vfs;

pub use config::{CONFIG_FILE_NAME, OverlayConfig};
pub use error::{ConfigError, ProbeError};
pub use overlay::{PlatformOverlayFs, Resolution, qualified_path};
pub use qualifier::{Platform, ProbePolicy, QualifierList};
pub use vfs::{Filesystem, LocalFs, MemoryFs};
