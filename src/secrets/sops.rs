//! Thin wrapper over the `sops` CLI.
//!
//! All invocations go through the `CommandExecutor` trait so tests can run
//! without the binary installed.

use crate::traits::CommandExecutor;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Client for SOPS encryption/decryption operations
pub struct SopsClient {
    command: Arc<dyn CommandExecutor>,
    working_dir: PathBuf,
}

impl SopsClient {
    pub fn new(command: Arc<dyn CommandExecutor>, working_dir: &Path) -> Self {
        Self {
            command,
            working_dir: working_dir.to_path_buf(),
        }
    }

    /// Check whether the `sops` binary is available
    pub fn is_installed(&self) -> bool {
        match self
            .command
            .execute("sops", &["--version"], &self.working_dir)
        {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    /// Decrypt an encrypted YAML file, returning the plaintext content
    pub fn decrypt(&self, path: &Path) -> Result<String> {
        let file = path.to_string_lossy();
        let args = ["--input-type", "yaml", "--output-type", "yaml", "-d", &file];

        let output = self
            .command
            .execute("sops", &args, &self.working_dir)
            .context("Failed to run sops")?;

        if !output.status.success() {
            anyhow::bail!(
                "SOPS decryption failed for {:?}: {}",
                path,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let plaintext = String::from_utf8_lossy(&output.stdout).to_string();
        if plaintext.trim().is_empty() {
            anyhow::bail!("SOPS decryption produced empty output for {:?}", path);
        }

        Ok(plaintext)
    }

    /// Encrypt a plaintext YAML file, returning the encrypted content
    pub fn encrypt(&self, path: &Path) -> Result<String> {
        let file = path.to_string_lossy();
        let args = ["--input-type", "yaml", "--output-type", "yaml", "-e", &file];

        let output = self
            .command
            .execute("sops", &args, &self.working_dir)
            .context("Failed to run sops")?;

        if !output.status.success() {
            anyhow::bail!(
                "SOPS encryption failed for {:?}: {}",
                path,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let ciphertext = String::from_utf8_lossy(&output.stdout).to_string();
        if ciphertext.trim().is_empty() {
            anyhow::bail!("SOPS encryption produced empty output for {:?}", path);
        }

        Ok(ciphertext)
    }

    /// Re-encrypt an existing encrypted file against the current key group
    pub fn update_keys(&self, path: &Path) -> Result<()> {
        let file = path.to_string_lossy();
        let args = ["updatekeys", "--yes", &file];

        let output = self
            .command
            .execute("sops", &args, &self.working_dir)
            .context("Failed to run sops")?;

        if !output.status.success() {
            anyhow::bail!(
                "SOPS updatekeys failed for {:?}: {}",
                path,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MockCommandExecutor, MockCommandResult};

    fn client(results: Vec<MockCommandResult>) -> SopsClient {
        SopsClient::new(
            Arc::new(MockCommandExecutor::with_outputs(results)),
            Path::new("/project"),
        )
    }

    #[test]
    fn test_is_installed_true_when_version_succeeds() {
        let sops = client(vec![MockCommandResult::ok("sops", "sops 3.9.0")]);
        assert!(sops.is_installed());
    }

    #[test]
    fn test_is_installed_false_when_binary_missing() {
        let sops = client(Vec::new());
        assert!(!sops.is_installed());
    }

    #[test]
    fn test_decrypt_returns_stdout() {
        let sops = client(vec![MockCommandResult::ok("sops", "application:\n  secret_key: s3cret\n")]);
        let plaintext = sops.decrypt(Path::new("/project/secrets/dev/secrets.enc.yaml")).unwrap();
        assert!(plaintext.contains("s3cret"));
    }

    #[test]
    fn test_decrypt_failure_includes_stderr() {
        let sops = client(vec![MockCommandResult::failing("sops", 1, "no key found")]);
        let err = sops
            .decrypt(Path::new("/project/secrets/dev/secrets.enc.yaml"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("no key found"));
    }

    #[test]
    fn test_decrypt_rejects_empty_output() {
        let sops = client(vec![MockCommandResult::ok("sops", "  \n")]);
        let err = sops
            .decrypt(Path::new("/project/secrets/dev/secrets.enc.yaml"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("empty output"));
    }
}
