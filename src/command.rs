//! External command execution
//!
//! Every version-control operation goes through a [`CommandRunner`]. The
//! production implementation spawns a real process; tests substitute a
//! scripted runner so the sync loop can be exercised without a repository.

use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command as AsyncCommand;
use tracing::{error, info};

/// Failure of a single external command invocation
#[derive(Debug, Error)]
pub enum CommandError {
    /// The process could not be started at all
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The process ran and exited with a non-zero status
    #[error("`{command}` exited with status {}: {}", display_code(.code), .output.trim())]
    Exit {
        command: String,
        code: Option<i32>,
        output: String,
    },
}

impl CommandError {
    /// Captured output of the failed process (empty if it never started)
    pub fn output(&self) -> &str {
        match self {
            CommandError::Spawn { .. } => "",
            CommandError::Exit { output, .. } => output,
        }
    }

    /// Rendered command line that failed
    pub fn command(&self) -> &str {
        match self {
            CommandError::Spawn { command, .. } | CommandError::Exit { command, .. } => command,
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// Runs an external program in a working directory and captures its output
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` inside `dir`, returning combined stdout and stderr.
    ///
    /// Waits for the process to terminate. No timeout is applied.
    async fn run(&self, dir: &Path, program: &str, args: &[String]) -> Result<String, CommandError>;
}

/// [`CommandRunner`] backed by real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, dir: &Path, program: &str, args: &[String]) -> Result<String, CommandError> {
        let command = render_command(program, args);

        let output = match AsyncCommand::new(program)
            .args(args)
            .current_dir(dir)
            // output is matched against git's untranslated messages
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .output()
            .await
        {
            Ok(output) => output,
            Err(source) => {
                error!(command = %command, dir = %dir.display(), error = %source, "failed to execute command");
                return Err(CommandError::Spawn { command, source });
            }
        };

        let combined = combine_output(&output.stdout, &output.stderr);

        if output.status.success() {
            info!(command = %command, output = %combined.trim_end(), "command executed");
            Ok(combined)
        } else {
            let code = output.status.code();
            error!(
                command = %command,
                status = %display_code(&code),
                output = %combined.trim_end(),
                "failed to execute command"
            );
            Err(CommandError::Exit {
                command,
                code,
                output: combined,
            })
        }
    }
}

/// Render a program and its arguments the way a shell user would type them
pub fn render_command(program: &str, args: &[String]) -> String {
    let mut rendered = program.to_string();
    for arg in args {
        rendered.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            rendered.push('"');
            rendered.push_str(arg);
            rendered.push('"');
        } else {
            rendered.push_str(arg);
        }
    }
    rendered
}

// stdout first, then stderr; git writes progress and hints to stderr
fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::from_utf8_lossy(stdout).into_owned();
    let stderr = String::from_utf8_lossy(stderr);
    if !stderr.is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&stderr);
    }
    combined
}
