//! Daemon - the watch, debounce and sync loop
//!
//! The daemon performs one mandatory pull, then waits on three sources at
//! once: a shutdown signal, filesystem change events and watcher errors.
//! Each change that passes the debounce gate runs one sync attempt
//! (pull, stage, commit, push) to completion before the loop looks at its
//! sources again.

use crate::command::{CommandError, CommandRunner, ProcessRunner};
use crate::debounce::DebounceGate;
use crate::git::{is_nothing_to_commit, GitClient};
use crate::watcher::{ChangeEvent, EventSources, FsWatcher, WatchTarget};
use crate::Config;
use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// One step of a sync attempt, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    Pull,
    StageAll,
    Commit,
    Push,
}

impl SyncStep {
    pub const ORDER: [SyncStep; 4] = [
        SyncStep::Pull,
        SyncStep::StageAll,
        SyncStep::Commit,
        SyncStep::Push,
    ];
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStep::Pull => "pull",
            SyncStep::StageAll => "add",
            SyncStep::Commit => "commit",
            SyncStep::Push => "push",
        };
        f.write_str(name)
    }
}

/// How a single sync attempt ended
#[derive(Debug)]
pub enum AttemptOutcome {
    /// All four steps succeeded
    Completed,
    /// Commit found nothing staged; push was not attempted
    NothingToCommit,
    /// A step failed and the remaining steps were skipped
    Failed { step: SyncStep, error: CommandError },
}

/// Why the event loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Shutdown was requested
    Cancelled,
    /// The change event channel closed
    EventsClosed,
    /// The watcher error channel closed
    ErrorsClosed,
}

impl fmt::Display for LoopExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopExit::Cancelled => f.write_str("shutdown requested"),
            LoopExit::EventsClosed => f.write_str("watcher events channel closed"),
            LoopExit::ErrorsClosed => f.write_str("watcher errors channel closed"),
        }
    }
}

/// Counters kept by the event loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub events_received: u64,
    pub events_suppressed: u64,
    pub attempts: u64,
    pub completed: u64,
    pub nothing_to_commit: u64,
    pub failed: u64,
    pub watcher_errors: u64,
}

impl SyncStats {
    fn record(&mut self, outcome: &AttemptOutcome) {
        self.attempts += 1;
        match outcome {
            AttemptOutcome::Completed => self.completed += 1,
            AttemptOutcome::NothingToCommit => self.nothing_to_commit += 1,
            AttemptOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Daemon state and control
pub struct Daemon {
    target: WatchTarget,
    recursive: bool,
    git: GitClient,
    quiet_window: Duration,
    stats: SyncStats,
}

impl Daemon {
    /// Create a daemon that runs real git processes
    pub fn new(config: Config) -> Result<Self> {
        Self::with_runner(config, Arc::new(ProcessRunner))
    }

    /// Create a daemon that sends every command through `runner`
    pub fn with_runner(config: Config, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let target = config.watch_target()?;
        let quiet_window = config.quiet_window()?;
        let git = GitClient::new(
            runner,
            config.sync.git_binary.clone(),
            target.path(),
            target.device(),
        );

        Ok(Self {
            target,
            recursive: config.watch.recursive,
            git,
            quiet_window,
            stats: SyncStats::default(),
        })
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Run until interrupted: watch the target, pull once, then sync on every change
    pub async fn run(&mut self) -> Result<()> {
        info!(
            path = %self.target.path().display(),
            device = %self.target.device(),
            quiet_window = ?self.quiet_window,
            "Starting autosync daemon"
        );

        let (watcher, sources) = FsWatcher::start(&self.target, self.recursive)?;

        let (shutdown_sender, shutdown_receiver) = broadcast::channel(1);
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            info!("Shutdown signal received, stopping daemon...");
            let _ = shutdown_sender.send(());
        });

        let exit = self.drive(sources, shutdown_receiver).await?;

        watcher
            .close()
            .context("Failed to release filesystem watcher")?;

        match exit {
            LoopExit::Cancelled => Ok(()),
            closed => Err(anyhow!("Event loop terminated: {}", closed)),
        }
    }

    /// Pull once, then process events until a source ends the loop.
    ///
    /// A failed startup pull is returned as an error before any event is read.
    pub async fn drive(
        &mut self,
        sources: EventSources,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<LoopExit> {
        self.git.pull().await.with_context(|| {
            format!("Failed to pull {}", self.target.path().display())
        })?;

        Ok(self.event_loop(sources, shutdown).await)
    }

    async fn event_loop(
        &mut self,
        mut sources: EventSources,
        mut shutdown: broadcast::Receiver<()>,
    ) -> LoopExit {
        let mut gate = DebounceGate::new(self.quiet_window, Instant::now());

        info!("Daemon loop started with quiet window: {:?}", self.quiet_window);

        let exit = loop {
            tokio::select! {
                biased;

                // A closed shutdown channel means nobody can ask us to stop any more
                _ = shutdown.recv() => {
                    info!("exiting");
                    break LoopExit::Cancelled;
                }

                event = sources.events.recv() => {
                    let Some(event) = event else {
                        error!("watcher events channel closed");
                        break LoopExit::EventsClosed;
                    };
                    self.handle_event(&mut gate, event).await;
                }

                err = sources.errors.recv() => {
                    let Some(err) = err else {
                        error!("watcher errors channel closed");
                        break LoopExit::ErrorsClosed;
                    };
                    self.stats.watcher_errors += 1;
                    error!(error = %err, "error received");
                }
            }
        };

        let stats = &self.stats;
        info!(
            reason = %exit,
            events = stats.events_received,
            suppressed = stats.events_suppressed,
            attempts = stats.attempts,
            completed = stats.completed,
            nothing_to_commit = stats.nothing_to_commit,
            failed = stats.failed,
            watcher_errors = stats.watcher_errors,
            "Daemon loop exiting"
        );

        exit
    }

    async fn handle_event(&mut self, gate: &mut DebounceGate, event: ChangeEvent) {
        self.stats.events_received += 1;

        let now = Instant::now();
        if !gate.admit(now) {
            self.stats.events_suppressed += 1;
            debug!(
                kind = %event.kind,
                paths = ?event.paths,
                since_last = ?now.saturating_duration_since(gate.last_accepted()),
                "skip event"
            );
            return;
        }

        let name = event
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        info!(kind = %event.kind, name = %name, "event received");

        self.sync_once().await;
    }

    /// Run one sync attempt: pull, stage everything, commit, push.
    ///
    /// The first failing step ends the attempt; nothing is rolled back.
    pub async fn sync_once(&mut self) -> AttemptOutcome {
        let outcome = self.attempt().await;

        match &outcome {
            AttemptOutcome::Completed => {
                info!(device = %self.git.device(), "sync attempt completed");
            }
            AttemptOutcome::NothingToCommit => {
                info!("nothing to commit, skipping push");
            }
            AttemptOutcome::Failed { step, error } => {
                error!(
                    step = %step,
                    error = %error,
                    output = %error.output().trim_end(),
                    "failed to {}",
                    step
                );
            }
        }

        self.stats.record(&outcome);
        outcome
    }

    async fn attempt(&self) -> AttemptOutcome {
        for step in SyncStep::ORDER {
            let result = match step {
                SyncStep::Pull => self.git.pull().await,
                SyncStep::StageAll => self.git.add_all().await,
                SyncStep::Commit => self.git.commit().await,
                SyncStep::Push => self.git.push().await,
            };

            match result {
                Ok(_) => debug!(step = %step, "sync step succeeded"),
                Err(error) if step == SyncStep::Commit && is_nothing_to_commit(&error) => {
                    return AttemptOutcome::NothingToCommit;
                }
                Err(error) => return AttemptOutcome::Failed { step, error },
            }
        }

        AttemptOutcome::Completed
    }
}

/// Wait for shutdown signals (Ctrl+C, and SIGTERM on unix)
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = terminate.recv() => debug!("SIGTERM received"),
                }
                return;
            }
            Err(e) => warn!("Failed to listen for SIGTERM: {}", e),
        }
    }

    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => debug!("Ctrl+C received"),
        Err(e) => {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::MockCommandRunner;
    use assert_matches::assert_matches;

    fn config() -> Config {
        let mut config = Config::default();
        config.watch.path = "/srv/notes".to_string();
        config.watch.device = "laptop".to_string();
        config
    }

    fn exit_error(output: &str) -> CommandError {
        CommandError::Exit {
            command: "git".to_string(),
            code: Some(1),
            output: output.to_string(),
        }
    }

    #[test]
    fn test_step_order_and_names() {
        let names: Vec<String> = SyncStep::ORDER.iter().map(|s| s.to_string()).collect();
        assert_eq!(names, ["pull", "add", "commit", "push"]);
    }

    #[test]
    fn test_invalid_quiet_window_is_rejected() {
        let mut config = config();
        config.sync.quiet_window = "whenever".to_string();
        let result = Daemon::with_runner(config, Arc::new(MockCommandRunner::new()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_sync_once_stops_at_failing_step() {
        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .withf(|_, _, args: &[String]| args[0] == "pull" || args[0] == "add")
            .times(2)
            .returning(|_, _, args| {
                if args[0] == "add" {
                    Err(exit_error("fatal: Unable to create '.git/index.lock'"))
                } else {
                    Ok(String::new())
                }
            });

        let mut daemon = Daemon::with_runner(config(), Arc::new(mock)).unwrap();
        let outcome = daemon.sync_once().await;

        assert_matches!(outcome, AttemptOutcome::Failed { step: SyncStep::StageAll, .. });
        assert_eq!(daemon.stats().failed, 1);
        assert_eq!(daemon.stats().attempts, 1);
    }

    #[tokio::test]
    async fn test_sync_once_treats_clean_tree_as_nothing_to_commit() {
        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .withf(|_, _, args: &[String]| args[0] != "push")
            .times(3)
            .returning(|_, _, args| {
                if args[0] == "commit" {
                    Err(exit_error("nothing to commit, working tree clean\n"))
                } else {
                    Ok(String::new())
                }
            });

        let mut daemon = Daemon::with_runner(config(), Arc::new(mock)).unwrap();
        let outcome = daemon.sync_once().await;

        assert_matches!(outcome, AttemptOutcome::NothingToCommit);
        assert_eq!(daemon.stats().nothing_to_commit, 1);
        assert_eq!(daemon.stats().failed, 0);
    }

    #[tokio::test]
    async fn test_sync_once_completes_all_steps() {
        let mut mock = MockCommandRunner::new();
        mock.expect_run().times(4).returning(|_, _, _| Ok(String::new()));

        let mut daemon = Daemon::with_runner(config(), Arc::new(mock)).unwrap();
        assert_matches!(daemon.sync_once().await, AttemptOutcome::Completed);
        assert_eq!(daemon.stats().completed, 1);
    }
}
