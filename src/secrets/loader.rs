//! Loads the per-environment secrets mapping that seeds the Secrets Manager
//! secret and the container environment.
//!
//! The happy path decrypts `secrets/<env>/secrets.enc.yaml` with SOPS. When
//! the binary is missing the file is read as plaintext YAML, and when loading
//! fails entirely `load_with_fallback` substitutes environment-variable
//! defaults so synthesis always has a mapping to work with.

use crate::config::ci;
use crate::context::Context;
use crate::secrets::SopsClient;
use crate::traits::{FileSystem, Output};
use anyhow::{Context as AnyhowContext, Result};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Encrypted secrets file name inside `secrets/<environment>/`
pub const SECRETS_FILE: &str = "secrets.enc.yaml";

/// Dot paths that must be present and non-empty in any loaded mapping
const REQUIRED_SECRETS: &[&str] = &["application.secret_key", "application.jwt_secret"];

pub struct SecretsLoader {
    fs: Arc<dyn FileSystem>,
    output: Arc<dyn Output>,
    sops: SopsClient,
    project_root: PathBuf,
    resolved: Option<Value>,
}

impl SecretsLoader {
    pub fn new(ctx: &Context, project_root: &Path) -> Self {
        Self {
            fs: Arc::clone(&ctx.fs),
            output: Arc::clone(&ctx.output),
            sops: SopsClient::new(Arc::clone(&ctx.command), project_root),
            project_root: project_root.to_path_buf(),
            resolved: None,
        }
    }

    /// Path of the encrypted secrets file for an environment
    pub fn secrets_file(&self, environment: &str) -> PathBuf {
        self.project_root
            .join("secrets")
            .join(environment)
            .join(SECRETS_FILE)
    }

    /// Load and validate the secrets mapping for an environment.
    ///
    /// Fails when the file is missing, decryption fails, the content is not
    /// valid YAML, or a required secret is absent. A missing `sops` binary
    /// is not fatal: the file is read as plaintext YAML instead.
    pub fn load(&self, environment: &str) -> Result<Value> {
        let path = self.secrets_file(environment);
        if !self.fs.is_file(&path) {
            anyhow::bail!("Secrets file not found: {:?}", path);
        }

        let contents = if self.sops.is_installed() {
            self.sops.decrypt(&path)?
        } else {
            self.output
                .warning("sops is not installed; reading secrets file as plaintext YAML");
            self.fs.read_to_string(&path)?
        };

        let mapping: Value = serde_yaml::from_str(&contents)
            .with_context(|| format!("Secrets file is not valid YAML: {:?}", path))?;

        validate_required(&mapping)?;
        Ok(mapping)
    }

    /// Load secrets, substituting environment-variable defaults on any
    /// failure. Never fails. In CI the fallback is used directly since no
    /// SOPS keyring is available there.
    pub fn load_with_fallback(&mut self, environment: &str) -> Value {
        let mapping = if ci::is_ci() {
            self.output
                .warning("CI environment detected; using environment variable fallbacks for secrets");
            fallback_from_env()
        } else {
            match self.load(environment) {
                Ok(mapping) => mapping,
                Err(err) => {
                    self.output.warning(&format!(
                        "Failed to load secrets for '{}' ({:#}); falling back to environment variables",
                        environment, err
                    ));
                    fallback_from_env()
                }
            }
        };

        self.resolved = Some(mapping.clone());
        mapping
    }

    /// Dot-path lookup into the fallback-resolved mapping
    pub fn get(&self, path: &str) -> Result<String> {
        let mapping = self
            .resolved
            .as_ref()
            .context("Secrets have not been loaded; call load_with_fallback first")?;

        let value =
            lookup_path(mapping, path).with_context(|| format!("Secret not found: {}", path))?;

        match value.as_str() {
            Some(s) => Ok(s.to_string()),
            None => anyhow::bail!("Secret at '{}' is not a string", path),
        }
    }

    /// Flatten the resolved mapping into environment-variable form
    pub fn export_as_env_vars(&self) -> Result<BTreeMap<String, String>> {
        let mapping = self
            .resolved
            .as_ref()
            .context("Secrets have not been loaded; call load_with_fallback first")?;

        Ok(flatten_env_vars(mapping))
    }
}

/// Recursively flatten a mapping into upper-cased, underscore-joined keys:
/// `application.secret_key` becomes `APPLICATION_SECRET_KEY`.
pub fn flatten_env_vars(mapping: &Value) -> BTreeMap<String, String> {
    let mut flattened = BTreeMap::new();
    flatten_into("", mapping, &mut flattened);
    flattened
}

fn flatten_into(prefix: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                let env_key = key.to_uppercase().replace(['-', '.'], "_");
                let joined = if prefix.is_empty() {
                    env_key
                } else {
                    format!("{}_{}", prefix, env_key)
                };
                flatten_into(&joined, nested, out);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Null => {
            out.insert(prefix.to_string(), String::new());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

/// Resolve a dot path (`application.secret_key`) inside a nested mapping
pub fn lookup_path<'a>(mapping: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = mapping;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn validate_required(mapping: &Value) -> Result<()> {
    for path in REQUIRED_SECRETS {
        let value = lookup_path(mapping, path);
        let present = value
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty());
        if !present {
            anyhow::bail!("Required secret missing or empty: {}", path);
        }
    }
    Ok(())
}

/// The fixed-shape mapping used when secrets cannot be loaded
fn fallback_from_env() -> Value {
    json!({
        "application": {
            "secret_key": env_or("APPLICATION_SECRET_KEY", "default-secret"),
            "jwt_secret": env_or("JWT_SECRET", "default-jwt-secret"),
            "required_setting": env_or("REQUIRED_SETTING", "default-setting"),
        },
        "external_services": {
            "api_key": env_or("EXTERNAL_API_KEY", "default-api-key"),
            "webhook_secret": env_or("WEBHOOK_SECRET", "default-webhook-secret"),
        },
        "monitoring": {
            "datadog_api_key": env_or("DATADOG_API_KEY", ""),
            "sentry_dsn": env_or("SENTRY_DSN", ""),
        },
    })
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MockCommandExecutor, MockCommandResult, MockFileSystem};

    const VALID_SECRETS: &str = "application:\n  secret_key: abc123\n  jwt_secret: jwt456\n  required_setting: setting\nexternal_services:\n  api_key: key\n  webhook_secret: hook\nmonitoring:\n  datadog_api_key: dd\n  sentry_dsn: https://sentry.example.com\n";

    fn loader_with(fs: MockFileSystem, command: MockCommandExecutor) -> SecretsLoader {
        let ctx = Context::test(fs, command);
        SecretsLoader::new(&ctx, Path::new("/project"))
    }

    #[test]
    fn test_load_fails_when_file_missing() {
        let loader = loader_with(MockFileSystem::new(), MockCommandExecutor::new());
        let err = loader.load("dev").unwrap_err().to_string();
        assert!(err.contains("not found"));
    }

    #[test]
    fn test_load_decrypts_via_sops() {
        let fs = MockFileSystem::with_files(vec![(
            "/project/secrets/dev/secrets.enc.yaml",
            "ENC[AES256_GCM,...]",
        )]);
        let command = MockCommandExecutor::with_outputs(vec![
            MockCommandResult::ok("sops", "sops 3.9.0"),
            MockCommandResult::ok("sops", VALID_SECRETS),
        ]);

        let mapping = loader_with(fs, command).load("dev").unwrap();
        assert_eq!(
            lookup_path(&mapping, "application.secret_key").unwrap(),
            "abc123"
        );
    }

    #[test]
    fn test_load_falls_back_to_plaintext_when_sops_missing() {
        let fs = MockFileSystem::with_files(vec![(
            "/project/secrets/dev/secrets.enc.yaml",
            VALID_SECRETS,
        )]);
        // No configured command results: every sops invocation fails like a
        // missing binary.
        let mapping = loader_with(fs, MockCommandExecutor::new()).load("dev").unwrap();
        assert_eq!(
            lookup_path(&mapping, "external_services.api_key").unwrap(),
            "key"
        );
    }

    #[test]
    fn test_load_rejects_missing_required_secret() {
        let fs = MockFileSystem::with_files(vec![(
            "/project/secrets/dev/secrets.enc.yaml",
            "application:\n  secret_key: abc123\n  jwt_secret: ''\n",
        )]);
        let err = loader_with(fs, MockCommandExecutor::new())
            .load("dev")
            .unwrap_err()
            .to_string();
        assert!(err.contains("application.jwt_secret"));
    }

    #[test]
    fn test_load_with_fallback_never_fails() {
        // Empty filesystem, no sops, nothing configured: still resolves
        let mut loader = loader_with(MockFileSystem::new(), MockCommandExecutor::new());
        let mapping = loader.load_with_fallback("dev");

        assert_eq!(
            lookup_path(&mapping, "application.secret_key").unwrap(),
            &json!(env_or("APPLICATION_SECRET_KEY", "default-secret"))
        );
        assert_eq!(
            lookup_path(&mapping, "external_services.webhook_secret").unwrap(),
            &json!(env_or("WEBHOOK_SECRET", "default-webhook-secret"))
        );
    }

    #[test]
    fn test_get_requires_loaded_mapping() {
        let loader = loader_with(MockFileSystem::new(), MockCommandExecutor::new());
        assert!(loader.get("application.secret_key").is_err());
    }

    #[test]
    fn test_get_rejects_non_string_values() {
        let mut loader = loader_with(MockFileSystem::new(), MockCommandExecutor::new());
        loader.load_with_fallback("dev");

        assert!(loader.get("application.secret_key").is_ok());
        let err = loader.get("application").unwrap_err().to_string();
        assert!(err.contains("not a string"));
        assert!(loader.get("application.nope").is_err());
    }

    #[test]
    fn test_flatten_env_vars_upper_cases_dot_paths() {
        let mapping: Value = serde_yaml::from_str(VALID_SECRETS).unwrap();
        let flattened = flatten_env_vars(&mapping);

        assert_eq!(flattened.get("APPLICATION_SECRET_KEY").unwrap(), "abc123");
        assert_eq!(flattened.get("MONITORING_SENTRY_DSN").unwrap(), "https://sentry.example.com");
        assert_eq!(flattened.len(), 7);
    }

    #[test]
    fn test_flatten_env_vars_stringifies_scalars() {
        let mapping = json!({ "app": { "debug": false, "workers": 4, "empty": null } });
        let flattened = flatten_env_vars(&mapping);

        assert_eq!(flattened.get("APP_DEBUG").unwrap(), "false");
        assert_eq!(flattened.get("APP_WORKERS").unwrap(), "4");
        assert_eq!(flattened.get("APP_EMPTY").unwrap(), "");
    }
}
