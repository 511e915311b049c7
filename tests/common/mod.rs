/// Common test utilities and helpers for autosync tests

#[allow(dead_code)]
pub mod helpers {
    use async_trait::async_trait;
    use autosync::{CommandError, CommandRunner, Config};
    use std::collections::{HashMap, VecDeque};
    use std::path::Path;
    use std::process::Command;
    use std::sync::{Arc, Mutex};

    /// One recorded invocation: the git subcommand and its arguments
    pub type Call = Vec<String>;

    /// A [`CommandRunner`] that records every call and replays scripted failures.
    ///
    /// Failures are queued per subcommand (`pull`, `add`, `commit`, `push`) and
    /// consumed in order; anything not scripted succeeds with empty output.
    #[derive(Default)]
    pub struct ScriptedRunner {
        calls: Mutex<Vec<Call>>,
        failures: Mutex<HashMap<String, VecDeque<String>>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Make the next invocation of `subcommand` exit with status 1 and `output`
        pub fn fail_next(&self, subcommand: &str, output: &str) {
            self.failures
                .lock()
                .unwrap()
                .entry(subcommand.to_string())
                .or_default()
                .push_back(output.to_string());
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        /// Just the subcommand names, in call order
        pub fn subcommands(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .map(|call| call.first().cloned().unwrap_or_default())
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            _dir: &Path,
            program: &str,
            args: &[String],
        ) -> Result<String, CommandError> {
            self.calls.lock().unwrap().push(args.to_vec());

            let subcommand = args.first().cloned().unwrap_or_default();
            let failure = self
                .failures
                .lock()
                .unwrap()
                .get_mut(&subcommand)
                .and_then(VecDeque::pop_front);

            match failure {
                Some(output) => Err(CommandError::Exit {
                    command: format!("{} {}", program, args.join(" ")),
                    code: Some(1),
                    output,
                }),
                None => Ok(String::new()),
            }
        }
    }

    /// Config pointing at `path` with the default five second quiet window
    pub fn test_config(path: &Path) -> Config {
        let mut config = Config::default();
        config.watch.path = path.to_string_lossy().into_owned();
        config.watch.device = "test-device".to_string();
        config
    }

    pub fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Run git in `dir`, panicking with its output on failure
    pub fn git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .expect("Failed to execute git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}{}",
            args,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }
}
