//! Filesystem notification source
//!
//! Wraps a `notify` watcher and fans its callback out into two tokio
//! channels, one for change events and one for watcher errors, which the
//! daemon loop selects over.

use anyhow::{Context, Result};
use notify::event::{AccessKind, ModifyKind};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tokio::sync::mpsc;
use tracing::debug;

/// The directory under observation and the device name used in commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    path: PathBuf,
    device: String,
}

impl WatchTarget {
    pub fn new(path: impl Into<PathBuf>, device: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            device: device.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

/// Coarse classification of a filesystem change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Write,
    Remove,
    Rename,
    Other,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Create => "create",
            ChangeKind::Write => "write",
            ChangeKind::Remove => "remove",
            ChangeKind::Rename => "rename",
            ChangeKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// A change somewhere under the watch target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub paths: Vec<PathBuf>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            paths: vec![path.into()],
        }
    }

    /// Convert a raw notify event, dropping events that change nothing
    pub fn from_notify(event: Event) -> Option<Self> {
        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Create,
            EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Rename,
            EventKind::Modify(_) => ChangeKind::Write,
            EventKind::Remove(_) => ChangeKind::Remove,
            // inotify reports a finished write as close-after-write
            EventKind::Access(AccessKind::Close(notify::event::AccessMode::Write)) => {
                ChangeKind::Write
            }
            EventKind::Access(_) => return None,
            EventKind::Any | EventKind::Other => ChangeKind::Other,
        };

        Some(Self {
            kind,
            paths: event.paths,
        })
    }

    /// First affected path, if the backend reported any
    pub fn path(&self) -> Option<&Path> {
        self.paths.first().map(PathBuf::as_path)
    }

    /// True when every affected path lies in a `.git` directory below `root`
    pub fn is_git_internal(&self, root: &Path) -> bool {
        !self.paths.is_empty() && self.paths.iter().all(|path| in_git_dir(root, path))
    }
}

fn in_git_dir(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .any(|component| matches!(component, Component::Normal(name) if name == ".git"))
}

/// Notifications buffered before the watcher's delivery thread blocks
pub const CHANNEL_CAPACITY: usize = 16;

/// Receiving ends of the watcher's two delivery channels
#[derive(Debug)]
pub struct EventSources {
    pub events: mpsc::Receiver<ChangeEvent>,
    pub errors: mpsc::Receiver<notify::Error>,
}

/// Sending ends matching [`EventSources`], for feeding the loop by hand
#[derive(Debug, Clone)]
pub struct EventSinks {
    pub events: mpsc::Sender<ChangeEvent>,
    pub errors: mpsc::Sender<notify::Error>,
}

impl EventSources {
    /// Create a connected pair of sinks and sources, each holding at most
    /// [`CHANNEL_CAPACITY`] undelivered items
    pub fn channel() -> (EventSinks, EventSources) {
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            EventSinks {
                events: event_tx,
                errors: error_tx,
            },
            EventSources {
                events: event_rx,
                errors: error_rx,
            },
        )
    }
}

/// A live registration of the watch target with the OS notification facility.
///
/// Dropping the watcher closes both channels. Once [`EventSources`] is
/// dropped, pending deliveries are discarded instead of blocking.
pub struct FsWatcher {
    watcher: RecommendedWatcher,
    path: PathBuf,
}

impl FsWatcher {
    /// Create the OS watcher and register the target path with it
    pub fn start(target: &WatchTarget, recursive: bool) -> Result<(Self, EventSources)> {
        let (sinks, sources) = EventSources::channel();
        let root = target.path().to_path_buf();
        let callback_root = root.clone();

        // The callback runs on notify's own thread, so a busy loop stalls delivery there
        let mut watcher = recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => {
                let Some(change) = ChangeEvent::from_notify(event) else {
                    return;
                };
                if change.is_git_internal(&callback_root) {
                    return;
                }
                let _ = sinks.events.blocking_send(change);
            }
            Err(err) => {
                let _ = sinks.errors.blocking_send(err);
            }
        })
        .context("Failed to create filesystem watcher")?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        watcher
            .watch(&root, mode)
            .with_context(|| format!("Failed to watch path: {}", root.display()))?;

        debug!(path = %root.display(), recursive, "watching path");

        Ok((
            Self {
                watcher,
                path: root,
            },
            sources,
        ))
    }

    /// Unregister the watch target and release the OS watcher
    pub fn close(mut self) -> Result<()> {
        self.watcher
            .unwatch(&self.path)
            .with_context(|| format!("Failed to unwatch path: {}", self.path.display()))?;
        debug!(path = %self.path.display(), "watcher released");
        Ok(())
    }
}
