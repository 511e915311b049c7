//! autosync - keep a git working tree in sync with its remote
//!
//! autosync watches a directory and, after each burst of filesystem changes,
//! pulls, stages, commits and pushes the repository it lives in.
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`command`]: External command execution
//! - [`git`]: The git operations making up a sync attempt
//! - [`debounce`]: Suppression of change bursts
//! - [`watcher`]: Filesystem notification source
//! - [`daemon`]: The event loop tying everything together

pub mod command;
pub mod config;
pub mod daemon;
pub mod debounce;
pub mod git;
pub mod watcher;

pub use command::{CommandError, CommandRunner, ProcessRunner};
pub use config::Config;
pub use daemon::{AttemptOutcome, Daemon, LoopExit, SyncStats, SyncStep};
pub use debounce::DebounceGate;
pub use git::GitClient;
pub use watcher::{ChangeEvent, ChangeKind, EventSinks, EventSources, FsWatcher, WatchTarget};
