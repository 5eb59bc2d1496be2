use anyhow::Result;
use std::path::Path;
use std::process::{Command, Output};

/// Trait for executing system commands, allowing for mocking in tests
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with arguments and return output
    fn execute(&self, command: &str, args: &[&str], working_dir: &Path) -> Result<Output>;
}

/// Real command executor using std::process::Command
pub struct RealCommandExecutor;

impl RealCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RealCommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, command: &str, args: &[&str], working_dir: &Path) -> Result<Output> {
        let output = Command::new(command)
            .args(args)
            .current_dir(working_dir)
            .output()?;

        Ok(output)
    }
}

/// Mock command executor for testing.
///
/// Results are matched by program name and consumed in order, so a test can
/// queue the output of `sops --version` followed by the output of `sops -d`.
#[cfg(test)]
pub struct MockCommandExecutor {
    outputs: std::sync::Mutex<Vec<MockCommandResult>>,
}

#[cfg(test)]
#[derive(Clone, Debug)]
pub struct MockCommandResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[cfg(test)]
impl MockCommandResult {
    pub fn ok(command: &str, stdout: &str) -> Self {
        Self {
            command: command.to_string(),
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failing(command: &str, exit_code: i32, stderr: &str) -> Self {
        Self {
            command: command.to_string(),
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

#[cfg(test)]
impl MockCommandExecutor {
    pub fn new() -> Self {
        Self {
            outputs: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_outputs(outputs: Vec<MockCommandResult>) -> Self {
        Self {
            outputs: std::sync::Mutex::new(outputs),
        }
    }
}

#[cfg(test)]
impl Default for MockCommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl CommandExecutor for MockCommandExecutor {
    fn execute(&self, command: &str, _args: &[&str], _working_dir: &Path) -> Result<Output> {
        let mut outputs = self.outputs.lock().unwrap();

        if let Some(position) = outputs.iter().position(|r| r.command == command) {
            let result = outputs.remove(position);
            return Ok(Output {
                status: create_exit_status(result.exit_code),
                stdout: result.stdout.into_bytes(),
                stderr: result.stderr.into_bytes(),
            });
        }

        // No configured result: behave like a missing binary
        anyhow::bail!("command not found: {}", command)
    }
}

#[cfg(test)]
fn create_exit_status(code: i32) -> std::process::ExitStatus {
    // ExitStatus can't be constructed directly; go through the platform
    // extension traits instead.
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(code)
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(code as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_mock_executor_returns_configured_output() {
        let executor = MockCommandExecutor::with_outputs(vec![MockCommandResult::ok(
            "sops",
            "sops 3.9.0",
        )]);

        let output = executor.execute("sops", &["--version"], &PathBuf::from(".")).unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "sops 3.9.0");
    }

    #[test]
    fn test_mock_executor_consumes_results_in_order() {
        let executor = MockCommandExecutor::with_outputs(vec![
            MockCommandResult::ok("sops", "first"),
            MockCommandResult::failing("sops", 1, "second"),
        ]);

        let first = executor.execute("sops", &[], &PathBuf::from(".")).unwrap();
        assert_eq!(String::from_utf8_lossy(&first.stdout), "first");

        let second = executor.execute("sops", &[], &PathBuf::from(".")).unwrap();
        assert!(!second.status.success());
    }

    #[test]
    fn test_mock_executor_unknown_command_errors() {
        let executor = MockCommandExecutor::new();
        assert!(executor.execute("sops", &[], &PathBuf::from(".")).is_err());
    }
}
