//! `groundwork secrets` - SOPS workflow over the `secrets/` tree.
//!
//! Encrypt walks `*.dec.yaml` files and only re-encrypts when content
//! actually changed, comparing digests of the plaintext against a fresh
//! decryption of the existing ciphertext. Nothing here ever leaves an
//! empty or invalid encrypted file behind.

use crate::context::Context;
use crate::secrets::loader::flatten_env_vars;
use crate::secrets::{SecretsLoader, SopsClient};
use anyhow::{Context as AnyhowContext, Result};
use serde_json::Value;
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DECRYPTED_SUFFIX: &str = ".dec.yaml";
const ENCRYPTED_SUFFIX: &str = ".enc.yaml";

/// Outcome of the change check before encrypting a file
enum EncryptDecision {
    Encrypt(&'static str),
    Skip(&'static str),
}

pub struct SecretsCommand;

impl SecretsCommand {
    pub fn execute_encrypt(ctx: &Context, base_dir: Option<&str>, update_keys: bool) -> Result<()> {
        let project_root =
            std::env::current_dir().context("Failed to determine current directory")?;
        Self::encrypt_in(ctx, &project_root, base_dir, update_keys)
    }

    pub fn execute_decrypt(ctx: &Context, base_dir: Option<&str>) -> Result<()> {
        let project_root =
            std::env::current_dir().context("Failed to determine current directory")?;
        Self::decrypt_in(ctx, &project_root, base_dir)
    }

    pub fn execute_updatekeys(ctx: &Context, base_dir: Option<&str>) -> Result<()> {
        let project_root =
            std::env::current_dir().context("Failed to determine current directory")?;
        Self::updatekeys_in(ctx, &project_root, base_dir)
    }

    pub fn execute_export(ctx: &Context, environment: &str, output: Option<&str>) -> Result<()> {
        let project_root =
            std::env::current_dir().context("Failed to determine current directory")?;
        Self::export_in(ctx, &project_root, environment, output)
    }

    pub(crate) fn encrypt_in(
        ctx: &Context,
        project_root: &Path,
        base_dir: Option<&str>,
        update_keys: bool,
    ) -> Result<()> {
        ctx.output.section("Encrypt secrets");
        let sops = Self::require_sops(ctx, project_root)?;

        let files = Self::find_files(ctx, project_root, base_dir, DECRYPTED_SUFFIX)?;
        if files.is_empty() {
            ctx.output.info("No plaintext secrets files found");
            return Ok(());
        }

        let mut encrypted = 0;
        let mut failed = 0;
        for dec_file in &files {
            let enc_file = Self::sibling(dec_file, DECRYPTED_SUFFIX, ENCRYPTED_SUFFIX);

            match Self::should_encrypt(ctx, &sops, dec_file, &enc_file) {
                EncryptDecision::Skip(reason) => {
                    ctx.output
                        .dimmed(&format!("skipping {} ({})", dec_file.display(), reason));
                }
                EncryptDecision::Encrypt(reason) => {
                    ctx.output
                        .dimmed(&format!("encrypting {} ({})", dec_file.display(), reason));
                    match sops.encrypt(dec_file) {
                        Ok(ciphertext) => {
                            ctx.fs.write(&enc_file, &ciphertext)?;
                            encrypted += 1;
                            if update_keys {
                                if let Err(err) = sops.update_keys(&enc_file) {
                                    ctx.output.warning(&format!(
                                        "Key update failed for {} ({:#}), encryption kept",
                                        enc_file.display(),
                                        err
                                    ));
                                }
                            }
                        }
                        Err(err) => {
                            ctx.output.error(&format!(
                                "Failed to encrypt {}: {:#}",
                                dec_file.display(),
                                err
                            ));
                            failed += 1;
                        }
                    }
                }
            }
        }

        ctx.output.blank();
        ctx.output.success(&format!(
            "Encrypted {} of {} files",
            encrypted,
            files.len()
        ));
        if failed > 0 {
            anyhow::bail!("{} files failed to encrypt", failed);
        }
        Ok(())
    }

    pub(crate) fn decrypt_in(
        ctx: &Context,
        project_root: &Path,
        base_dir: Option<&str>,
    ) -> Result<()> {
        ctx.output.section("Decrypt secrets");
        let sops = Self::require_sops(ctx, project_root)?;

        let files = Self::find_files(ctx, project_root, base_dir, ENCRYPTED_SUFFIX)?;
        if files.is_empty() {
            ctx.output.info("No encrypted secrets files found");
            return Ok(());
        }

        let mut decrypted = 0;
        let mut failed = 0;
        for enc_file in &files {
            let dec_file = Self::sibling(enc_file, ENCRYPTED_SUFFIX, DECRYPTED_SUFFIX);
            match sops.decrypt(enc_file) {
                Ok(plaintext) => {
                    if serde_yaml::from_str::<Value>(&plaintext).is_err() {
                        ctx.output.error(&format!(
                            "Decryption of {} produced invalid YAML",
                            enc_file.display()
                        ));
                        failed += 1;
                        continue;
                    }
                    ctx.fs.write(&dec_file, &plaintext)?;
                    ctx.fs.restrict_permissions(&dec_file)?;
                    decrypted += 1;
                }
                Err(err) => {
                    ctx.output.error(&format!(
                        "Failed to decrypt {}: {:#}",
                        enc_file.display(),
                        err
                    ));
                    failed += 1;
                }
            }
        }

        ctx.output.blank();
        ctx.output.success(&format!(
            "Decrypted {} of {} files",
            decrypted,
            files.len()
        ));
        if failed > 0 {
            anyhow::bail!("{} files failed to decrypt", failed);
        }
        Ok(())
    }

    pub(crate) fn updatekeys_in(
        ctx: &Context,
        project_root: &Path,
        base_dir: Option<&str>,
    ) -> Result<()> {
        ctx.output.section("Update keys");
        let sops = Self::require_sops(ctx, project_root)?;

        let files = Self::find_files(ctx, project_root, base_dir, ENCRYPTED_SUFFIX)?;
        if files.is_empty() {
            ctx.output.info("No encrypted secrets files found");
            return Ok(());
        }

        let mut updated = 0;
        let mut failed = 0;
        for enc_file in &files {
            match sops.update_keys(enc_file) {
                Ok(()) => {
                    ctx.output.dimmed(&format!("updated {}", enc_file.display()));
                    updated += 1;
                }
                Err(err) => {
                    ctx.output.error(&format!(
                        "Failed to update keys for {}: {:#}",
                        enc_file.display(),
                        err
                    ));
                    failed += 1;
                }
            }
        }

        ctx.output.blank();
        ctx.output
            .success(&format!("Updated keys on {} of {} files", updated, files.len()));
        if failed > 0 {
            anyhow::bail!("{} files failed key update", failed);
        }
        Ok(())
    }

    /// Decrypt one environment's secrets and write them as `KEY=value`
    /// lines for CI consumption.
    pub(crate) fn export_in(
        ctx: &Context,
        project_root: &Path,
        environment: &str,
        output: Option<&str>,
    ) -> Result<()> {
        ctx.output.section("Export secrets");

        let loader = SecretsLoader::new(ctx, project_root);
        let mapping = loader.load(environment)?;
        let flattened = flatten_env_vars(&mapping);

        let mut lines: Vec<String> = flattened
            .iter()
            .map(|(key, value)| format!("{}={}", key, quote_value(value)))
            .collect();
        lines.push(String::new());

        let output_path = match output {
            Some(path) => PathBuf::from(path),
            None => project_root.join(format!(".env.{}", environment)),
        };
        ctx.fs.write(&output_path, &lines.join("\n"))?;
        ctx.fs.restrict_permissions(&output_path)?;

        ctx.output.success(&format!(
            "Wrote {} variables to {}",
            flattened.len(),
            output_path.display()
        ));
        // Keys only; values stay out of the terminal
        for key in flattened.keys() {
            ctx.output.dimmed(&format!("{}=***", key));
        }

        Ok(())
    }

    fn require_sops(ctx: &Context, project_root: &Path) -> Result<SopsClient> {
        let sops = SopsClient::new(Arc::clone(&ctx.command), project_root);
        if !sops.is_installed() {
            anyhow::bail!("sops is not installed or not in PATH");
        }
        Ok(sops)
    }

    fn find_files(
        ctx: &Context,
        project_root: &Path,
        base_dir: Option<&str>,
        suffix: &str,
    ) -> Result<Vec<PathBuf>> {
        let dir = project_root.join(base_dir.unwrap_or("secrets"));
        if !ctx.fs.exists(&dir) {
            return Ok(Vec::new());
        }

        let mut files: Vec<PathBuf> = ctx
            .fs
            .walk_dir(&dir)?
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with(suffix))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn sibling(path: &Path, from_suffix: &str, to_suffix: &str) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().replace(from_suffix, to_suffix))
            .unwrap_or_default();
        path.with_file_name(name)
    }

    fn should_encrypt(
        ctx: &Context,
        sops: &SopsClient,
        dec_file: &Path,
        enc_file: &Path,
    ) -> EncryptDecision {
        let plaintext = match ctx.fs.read_to_string(dec_file) {
            Ok(contents) => contents,
            Err(_) => return EncryptDecision::Skip("source file is unreadable"),
        };
        if plaintext.trim().is_empty() || serde_yaml::from_str::<Value>(&plaintext).is_err() {
            return EncryptDecision::Skip("source file is empty or invalid YAML");
        }

        if !ctx.fs.is_file(enc_file) {
            return EncryptDecision::Encrypt("no encrypted file exists");
        }
        let encrypted_empty = ctx
            .fs
            .read_to_string(enc_file)
            .map(|contents| contents.trim().is_empty())
            .unwrap_or(true);
        if encrypted_empty {
            return EncryptDecision::Encrypt("encrypted file is empty");
        }

        match sops.decrypt(enc_file) {
            Ok(current) => {
                if digest(&plaintext) == digest(&current) {
                    EncryptDecision::Skip("no changes detected")
                } else {
                    EncryptDecision::Encrypt("content has changed")
                }
            }
            // Can't verify the existing ciphertext; encrypt to be safe
            Err(_) => EncryptDecision::Encrypt("unable to verify encrypted content"),
        }
    }
}

fn digest(contents: &str) -> String {
    format!("{:x}", Sha1::digest(contents.as_bytes()))
}

/// Quote a value for `.env` files when it contains whitespace or shell
/// metacharacters.
fn quote_value(value: &str) -> String {
    let needs_quoting = value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '$' | '`' | '\\' | '#'));
    if needs_quoting {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MockCommandExecutor, MockCommandResult, MockFileSystem, MockOutput};
    use std::sync::Arc;

    const SECRETS_YAML: &str = "application:\n  secret_key: abc\n  jwt_secret: jwt\n";

    fn test_context(
        fs: MockFileSystem,
        command: MockCommandExecutor,
    ) -> (Context, Arc<MockFileSystem>, Arc<MockOutput>) {
        let fs = Arc::new(fs);
        let output = Arc::new(MockOutput::new());
        let ctx = Context::test_with(
            Arc::clone(&fs) as Arc<dyn crate::traits::FileSystem>,
            Arc::new(crate::traits::MockUserInput::with_responses(Vec::new())),
            Arc::clone(&output) as Arc<dyn crate::traits::Output>,
            Arc::new(command),
        );
        (ctx, fs, output)
    }

    #[test]
    fn test_encrypt_requires_sops() {
        let (ctx, _, _) = test_context(MockFileSystem::new(), MockCommandExecutor::new());
        let err = SecretsCommand::encrypt_in(&ctx, Path::new("/p"), None, false)
            .unwrap_err()
            .to_string();
        assert!(err.contains("not installed"));
    }

    #[test]
    fn test_encrypt_creates_missing_encrypted_file() {
        let fs = MockFileSystem::with_files(vec![(
            "/p/secrets/dev/secrets.dec.yaml",
            SECRETS_YAML,
        )]);
        let command = MockCommandExecutor::with_outputs(vec![
            MockCommandResult::ok("sops", "sops 3.9.0"),
            MockCommandResult::ok("sops", "ENC[AES256_GCM,data:...]"),
        ]);

        let (ctx, fs, _) = test_context(fs, command);
        SecretsCommand::encrypt_in(&ctx, Path::new("/p"), None, false).unwrap();

        let encrypted = fs
            .get_file_contents(Path::new("/p/secrets/dev/secrets.enc.yaml"))
            .unwrap();
        assert!(encrypted.contains("ENC[AES256_GCM"));
    }

    #[test]
    fn test_encrypt_skips_unchanged_content() {
        let fs = MockFileSystem::with_files(vec![
            ("/p/secrets/dev/secrets.dec.yaml", SECRETS_YAML),
            ("/p/secrets/dev/secrets.enc.yaml", "ENC[AES256_GCM,old]"),
        ]);
        // version probe, then decrypt of the existing ciphertext returns
        // identical plaintext
        let command = MockCommandExecutor::with_outputs(vec![
            MockCommandResult::ok("sops", "sops 3.9.0"),
            MockCommandResult::ok("sops", SECRETS_YAML),
        ]);

        let (ctx, fs, output) = test_context(fs, command);
        SecretsCommand::encrypt_in(&ctx, Path::new("/p"), None, false).unwrap();

        // Ciphertext untouched
        assert_eq!(
            fs.get_file_contents(Path::new("/p/secrets/dev/secrets.enc.yaml"))
                .unwrap(),
            "ENC[AES256_GCM,old]"
        );
        assert!(output.messages().iter().any(|m| matches!(
            m,
            crate::traits::output::OutputMessage::Dimmed(text) if text.contains("no changes detected")
        )));
    }

    #[test]
    fn test_encrypt_skips_invalid_source_yaml() {
        let fs = MockFileSystem::with_files(vec![(
            "/p/secrets/dev/secrets.dec.yaml",
            "not: [valid",
        )]);
        let command = MockCommandExecutor::with_outputs(vec![MockCommandResult::ok(
            "sops",
            "sops 3.9.0",
        )]);

        let (ctx, fs, _) = test_context(fs, command);
        SecretsCommand::encrypt_in(&ctx, Path::new("/p"), None, false).unwrap();
        assert!(!fs.has_file(Path::new("/p/secrets/dev/secrets.enc.yaml")));
    }

    #[test]
    fn test_decrypt_writes_plaintext_sibling() {
        let fs = MockFileSystem::with_files(vec![(
            "/p/secrets/dev/secrets.enc.yaml",
            "ENC[AES256_GCM,data]",
        )]);
        let command = MockCommandExecutor::with_outputs(vec![
            MockCommandResult::ok("sops", "sops 3.9.0"),
            MockCommandResult::ok("sops", SECRETS_YAML),
        ]);

        let (ctx, fs, _) = test_context(fs, command);
        SecretsCommand::decrypt_in(&ctx, Path::new("/p"), None).unwrap();

        assert_eq!(
            fs.get_file_contents(Path::new("/p/secrets/dev/secrets.dec.yaml"))
                .unwrap(),
            SECRETS_YAML
        );
    }

    #[test]
    fn test_export_writes_env_file_with_quoting() {
        let fs = MockFileSystem::with_files(vec![(
            "/p/secrets/ci/secrets.enc.yaml",
            "application:\n  secret_key: 'has space'\n  jwt_secret: plain\n",
        )]);
        // No sops: loader reads the file as plaintext YAML
        let (ctx, fs, _) = test_context(fs, MockCommandExecutor::new());
        SecretsCommand::export_in(&ctx, Path::new("/p"), "ci", None).unwrap();

        let env_file = fs.get_file_contents(Path::new("/p/.env.ci")).unwrap();
        assert!(env_file.contains("APPLICATION_SECRET_KEY=\"has space\""));
        assert!(env_file.contains("APPLICATION_JWT_SECRET=plain"));
    }

    #[test]
    fn test_export_fails_when_secrets_missing() {
        let (ctx, _, _) = test_context(MockFileSystem::new(), MockCommandExecutor::new());
        assert!(SecretsCommand::export_in(&ctx, Path::new("/p"), "ci", None).is_err());
    }

    #[test]
    fn test_quote_value() {
        assert_eq!(quote_value("plain"), "plain");
        assert_eq!(quote_value("has space"), "\"has space\"");
        assert_eq!(quote_value("pa$$word"), "\"pa$$word\"");
        assert_eq!(quote_value("say \"hi\""), "\"say \\\"hi\\\"\"");
    }
}
