use std::path::PathBuf;
use std::sync::Arc;

use crate::command::{CommandError, CommandRunner};

/// The four git operations that make up a sync attempt, bound to one working tree
#[derive(Clone)]
pub struct GitClient {
    runner: Arc<dyn CommandRunner>,
    program: String,
    workdir: PathBuf,
    device: String,
}

impl GitClient {
    /// Create a client that runs `program` (normally `git`) inside `workdir`
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        program: impl Into<String>,
        workdir: impl Into<PathBuf>,
        device: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            program: program.into(),
            workdir: workdir.into(),
            device: device.into(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// `git pull`
    pub async fn pull(&self) -> Result<String, CommandError> {
        self.git(&["pull"]).await
    }

    /// `git add .`
    pub async fn add_all(&self) -> Result<String, CommandError> {
        self.git(&["add", "."]).await
    }

    /// `git commit -m "auto sync from <device>"`
    pub async fn commit(&self) -> Result<String, CommandError> {
        let message = commit_message(&self.device);
        self.git(&["commit", "-m", &message]).await
    }

    /// `git push`
    pub async fn push(&self) -> Result<String, CommandError> {
        self.git(&["push"]).await
    }

    async fn git(&self, args: &[&str]) -> Result<String, CommandError> {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        self.runner.run(&self.workdir, &self.program, &args).await
    }
}

/// Commit message recorded for every automatic commit
pub fn commit_message(device: &str) -> String {
    format!("auto sync from {}", device)
}

/// Whether a failed commit only means the index had nothing new in it.
///
/// git exits with status 1 and says so on stdout; any other failure is genuine.
pub fn is_nothing_to_commit(error: &CommandError) -> bool {
    match error {
        CommandError::Exit { code, output, .. } => {
            *code == Some(1)
                && (output.contains("nothing to commit")
                    || output.contains("no changes added to commit"))
        }
        CommandError::Spawn { .. } => false,
    }
}
