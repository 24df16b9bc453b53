//! platfs command-line front end.
//!
//! Every command runs against a [`PlatformOverlayFs`] over the local
//! filesystem, so paths on the command line are logical: building for iOS,
//! `platfs cat app.ts` prints `app.ios.ts` when that variant exists.
//!
//! Settings come from the nearest `platfs.toml` (or the user config), and
//! command-line flags override them.

use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use platfs_kernel::vfs::{DirEntry, DirEntryKind, WatchEvent, WatchOptions};
use platfs_kernel::{
    Filesystem, LocalFs, OverlayConfig, Platform, PlatformOverlayFs, ProbePolicy,
};

/// Serve platform-specific file variants in place of logical paths
#[derive(Parser, Debug)]
#[command(name = "platfs", version)]
pub struct Cli {
    /// Config file (default: nearest platfs.toml, then the user config)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Store root
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Target platform (ios, android)
    #[arg(short, long, global = true)]
    pub platform: Option<Platform>,

    /// Qualifier tried before the platform's own (repeatable)
    #[arg(long, global = true, value_name = "QUALIFIER")]
    pub prefix: Vec<String>,

    /// Explicit qualifier list, replacing --prefix and --platform (repeatable)
    #[arg(short, long = "qualifier", global = true, value_name = "QUALIFIER")]
    pub qualifiers: Vec<String>,

    /// Keep probing later qualifiers after a probe error
    #[arg(long, global = true)]
    pub continue_on_probe_error: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the path each logical path resolves to
    Resolve {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Show how each logical path resolves, and why
    Explain {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Print a file
    Cat { path: PathBuf },
    /// List a directory
    Ls {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Show file metadata
    Stat {
        path: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write stdin to a file
    Write { path: PathBuf },
    /// Create a directory
    Mkdir { path: PathBuf },
    /// Remove a file or empty directory
    Rm { path: PathBuf },
    /// Rename a file
    Mv { from: PathBuf, to: PathBuf },
    /// Print change events until interrupted
    Watch {
        path: PathBuf,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Print what the store supports, as JSON
    Caps,
    /// Print the effective configuration, as JSON
    Config,
}

/// Configuration after command-line overrides, and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// The config file that was loaded, if any.
    pub source: Option<PathBuf>,
    pub config: OverlayConfig,
}

impl Cli {
    /// Load the config that applies to `cwd` and apply the flags on top.
    pub fn settings(&self, cwd: &Path) -> Result<Settings> {
        let (source, mut config) = match &self.config {
            Some(path) => {
                let path = cwd.join(path);
                let config = OverlayConfig::load(&path)?;
                (Some(path), config)
            }
            None => match OverlayConfig::discover(cwd)? {
                Some((path, config)) => (Some(path), config),
                None => (None, OverlayConfig::default()),
            },
        };

        if let Some(root) = &self.root {
            config.root = Some(root.clone());
        }
        if let Some(platform) = self.platform {
            config.platform = Some(platform);
        }
        if !self.prefix.is_empty() {
            config.prefix = self.prefix.clone();
        }
        if !self.qualifiers.is_empty() {
            config.qualifiers = self.qualifiers.clone();
        }
        if self.continue_on_probe_error {
            config.probe_policy = ProbePolicy::ContinueOnError;
        }

        Ok(Settings { source, config })
    }
}

impl Settings {
    /// Open the overlay these settings describe. Relative roots are taken
    /// from `cwd`.
    pub fn overlay(&self, cwd: &Path) -> Result<PlatformOverlayFs<LocalFs>> {
        let root = cwd.join(self.config.root());
        if !root.is_dir() {
            anyhow::bail!("root {} is not a directory", root.display());
        }
        let fs = PlatformOverlayFs::from_config(LocalFs::new(&root), &self.config)
            .context("invalid overlay configuration")?;
        tracing::debug!(
            root = %root.display(),
            qualifiers = %fs.qualifiers(),
            policy = %fs.policy(),
            "opened overlay"
        );
        Ok(fs)
    }
}

/// Parse-free entry point: load settings, open the store, run `cli.command`.
pub async fn run(
    cli: Cli,
    cwd: &Path,
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
) -> Result<()> {
    let settings = cli.settings(cwd)?;
    let fs = settings.overlay(cwd)?;
    execute(&fs, &settings, cli.command, stdin, stdout).await
}

/// Run one command against an open overlay.
pub async fn execute<F: Filesystem>(
    fs: &PlatformOverlayFs<F>,
    settings: &Settings,
    command: Command,
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
) -> Result<()> {
    match command {
        Command::Resolve { paths } => {
            for path in paths {
                writeln!(stdout, "{}", fs.resolve(&path).await.display())?;
            }
        }
        Command::Explain { paths } => {
            for path in paths {
                writeln!(stdout, "{}: {}", path.display(), fs.explain(&path).await)?;
            }
        }
        Command::Cat { path } => {
            let data = fs.read(&path).await.with_context(|| at("reading", &path))?;
            stdout.write_all(&data)?;
        }
        Command::Ls { path } => {
            let mut entries = fs.list(&path).await.with_context(|| at("listing", &path))?;
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            for entry in entries {
                if entry.is_dir() {
                    writeln!(stdout, "{}/", entry.name)?;
                } else {
                    writeln!(stdout, "{}", entry.name)?;
                }
            }
        }
        Command::Stat { path, json } => {
            let entry = fs.stat(&path).await.with_context(|| at("stat", &path))?;
            let report = StatReport::from(&entry);
            if json {
                serde_json::to_writer_pretty(&mut *stdout, &report)?;
                writeln!(stdout)?;
            } else {
                write!(stdout, "{report}")?;
            }
        }
        Command::Write { path } => {
            let mut data = Vec::new();
            stdin.read_to_end(&mut data).context("reading stdin")?;
            fs.write(&path, &data).await.with_context(|| at("writing", &path))?;
            tracing::debug!(path = %path.display(), bytes = data.len(), "wrote file");
        }
        Command::Mkdir { path } => {
            fs.mkdir(&path).await.with_context(|| at("creating", &path))?;
        }
        Command::Rm { path } => {
            fs.remove(&path).await.with_context(|| at("removing", &path))?;
        }
        Command::Mv { from, to } => {
            fs.rename(&from, &to)
                .await
                .with_context(|| format!("renaming {} to {}", from.display(), to.display()))?;
        }
        Command::Watch { path, recursive } => {
            let options = if recursive {
                WatchOptions::recursive()
            } else {
                WatchOptions::default()
            };
            let mut stream = fs
                .watch(&path, options)
                .await
                .with_context(|| at("watching", &path))?;
            tracing::info!(path = %path.display(), recursive, "watching");

            loop {
                tokio::select! {
                    event = stream.recv() => match event {
                        Some(event) => {
                            writeln!(stdout, "{}", EventLine(&event))?;
                            stdout.flush()?;
                        }
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
        Command::Caps => {
            serde_json::to_writer_pretty(&mut *stdout, &fs.capabilities())?;
            writeln!(stdout)?;
        }
        Command::Config => {
            let report = ConfigReport {
                source: settings.source.as_deref(),
                qualifiers: fs.qualifiers().as_slice(),
                probe_policy: fs.policy(),
                root: settings.config.root(),
            };
            serde_json::to_writer_pretty(&mut *stdout, &report)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}

fn at(action: &str, path: &Path) -> String {
    format!("{action} {}", path.display())
}

/// Output of `platfs stat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatReport {
    pub name: String,
    pub kind: &'static str,
    pub size: u64,
    /// Seconds since the Unix epoch.
    pub modified: Option<u64>,
    /// Octal mode bits, e.g. `"644"`.
    pub permissions: Option<String>,
}

impl From<&DirEntry> for StatReport {
    fn from(entry: &DirEntry) -> Self {
        Self {
            name: entry.name.clone(),
            kind: match entry.kind {
                DirEntryKind::File => "file",
                DirEntryKind::Directory => "directory",
                DirEntryKind::Symlink => "symlink",
            },
            size: entry.size,
            modified: entry
                .modified
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs()),
            permissions: entry.permissions.map(|mode| format!("{:o}", mode & 0o7777)),
        }
    }
}

impl fmt::Display for StatReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "name: {}", self.name)?;
        writeln!(f, "kind: {}", self.kind)?;
        writeln!(f, "size: {}", self.size)?;
        if let Some(modified) = self.modified {
            writeln!(f, "modified: {modified}")?;
        }
        if let Some(permissions) = &self.permissions {
            writeln!(f, "permissions: {permissions}")?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct ConfigReport<'a> {
    source: Option<&'a Path>,
    qualifiers: &'a [String],
    probe_policy: ProbePolicy,
    root: PathBuf,
}

/// One line of `platfs watch` output: `<kind> <path>...`.
struct EventLine<'a>(&'a WatchEvent);

impl fmt::Display for EventLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.kind)?;
        for path in &self.0.paths {
            write!(f, " {}", path.display())?;
        }
        Ok(())
    }
}
