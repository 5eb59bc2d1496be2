//! `groundwork init` - scaffold a new environment: deploy configuration
//! plus a plaintext secrets skeleton to fill in and encrypt.

use crate::config::DeployConfig;
use crate::config::environment::ContainerConfig;
use crate::context::Context;
use anyhow::{Context as AnyhowContext, Result};
use std::path::Path;

const SECRETS_SKELETON: &str = "\
application:
  secret_key: change-me
  jwt_secret: change-me
  required_setting: change-me
external_services:
  api_key: change-me
  webhook_secret: change-me
monitoring:
  datadog_api_key: \"\"
  sentry_dsn: \"\"
";

pub struct InitCommand;

impl InitCommand {
    pub fn execute(ctx: &Context) -> Result<()> {
        let project_root =
            std::env::current_dir().context("Failed to determine current directory")?;
        Self::execute_in(ctx, &project_root)
    }

    pub(crate) fn execute_in(ctx: &Context, project_root: &Path) -> Result<()> {
        ctx.output.section("New environment");

        let app_name = ctx.input.text("Application name", Some("webapp"))?;
        let environment = ctx.input.select(
            "Environment",
            vec![
                "dev".to_string(),
                "staging".to_string(),
                "production".to_string(),
            ],
        )?;

        let domain = ctx.input.text("Domain name (leave empty for none)", Some(""))?;
        let domain_name = if domain.trim().is_empty() {
            None
        } else {
            Some(domain.trim().to_string())
        };
        let enable_https = match &domain_name {
            Some(_) => ctx
                .input
                .confirm("Terminate TLS at the load balancer?", true)?,
            None => false,
        };

        let config = DeployConfig {
            app_name,
            environment: environment.clone(),
            domain_name,
            enable_https,
            certificate_arn: None,
            create_certificate: true,
            container: ContainerConfig::default(),
            desired_count: None,
        };
        config.validate()?;

        let config_path = project_root
            .join("environments")
            .join(format!("{}.yaml", environment));
        if ctx.fs.exists(&config_path) {
            let overwrite = ctx.input.confirm(
                &format!("{} already exists. Overwrite?", config_path.display()),
                false,
            )?;
            if !overwrite {
                ctx.output.info("Aborted, nothing written");
                return Ok(());
            }
        }
        ctx.fs.write(&config_path, &serde_yaml::to_string(&config)?)?;
        ctx.output
            .success(&format!("Wrote {}", config_path.display()));

        let secrets_path = project_root
            .join("secrets")
            .join(&environment)
            .join("secrets.dec.yaml");
        if ctx.fs.exists(&secrets_path) {
            ctx.output.dimmed(&format!(
                "keeping existing {}",
                secrets_path.display()
            ));
        } else {
            ctx.fs.write(&secrets_path, SECRETS_SKELETON)?;
            ctx.fs.restrict_permissions(&secrets_path)?;
            ctx.output
                .success(&format!("Wrote {}", secrets_path.display()));
        }

        ctx.output.blank();
        ctx.output.info("Next steps:");
        ctx.output
            .dimmed(&format!("edit {}", secrets_path.display()));
        ctx.output.dimmed("groundwork secrets encrypt");
        ctx.output
            .dimmed(&format!("groundwork synth --environment {}", environment));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MockCommandExecutor, MockFileSystem, MockOutput, MockResponse, MockUserInput};
    use std::sync::Arc;

    fn test_context(
        fs: MockFileSystem,
        responses: Vec<MockResponse>,
    ) -> (Context, Arc<MockFileSystem>) {
        let fs = Arc::new(fs);
        let ctx = Context::test_with(
            Arc::clone(&fs) as Arc<dyn crate::traits::FileSystem>,
            Arc::new(MockUserInput::with_responses(responses)),
            Arc::new(MockOutput::new()),
            Arc::new(MockCommandExecutor::new()),
        );
        (ctx, fs)
    }

    #[test]
    fn test_init_scaffolds_config_and_secrets() {
        let (ctx, fs) = test_context(
            MockFileSystem::new(),
            vec![
                MockResponse::Text("testapp".to_string()),
                MockResponse::Select("dev".to_string()),
                MockResponse::Text(String::new()),
            ],
        );

        InitCommand::execute_in(&ctx, Path::new("/p")).unwrap();

        let config = fs
            .get_file_contents(Path::new("/p/environments/dev.yaml"))
            .unwrap();
        assert!(config.contains("app_name: testapp"));
        assert!(config.contains("enable_https: false"));

        let secrets = fs
            .get_file_contents(Path::new("/p/secrets/dev/secrets.dec.yaml"))
            .unwrap();
        assert!(secrets.contains("secret_key: change-me"));
    }

    #[test]
    fn test_init_with_domain_asks_about_https() {
        let (ctx, fs) = test_context(
            MockFileSystem::new(),
            vec![
                MockResponse::Text("testapp".to_string()),
                MockResponse::Select("production".to_string()),
                MockResponse::Text("app.example.com".to_string()),
                MockResponse::Confirm(true),
            ],
        );

        InitCommand::execute_in(&ctx, Path::new("/p")).unwrap();

        let config = fs
            .get_file_contents(Path::new("/p/environments/production.yaml"))
            .unwrap();
        assert!(config.contains("domain_name: app.example.com"));
        assert!(config.contains("enable_https: true"));
    }

    #[test]
    fn test_init_aborts_instead_of_overwriting() {
        let (ctx, fs) = test_context(
            MockFileSystem::with_files(vec![("/p/environments/dev.yaml", "app_name: old")]),
            vec![
                MockResponse::Text("testapp".to_string()),
                MockResponse::Select("dev".to_string()),
                MockResponse::Text(String::new()),
                MockResponse::Confirm(false),
            ],
        );

        InitCommand::execute_in(&ctx, Path::new("/p")).unwrap();

        assert_eq!(
            fs.get_file_contents(Path::new("/p/environments/dev.yaml"))
                .unwrap(),
            "app_name: old"
        );
        assert!(!fs.has_file(Path::new("/p/secrets/dev/secrets.dec.yaml")));
    }

    #[test]
    fn test_init_rejects_invalid_app_name() {
        let (ctx, _) = test_context(
            MockFileSystem::new(),
            vec![
                MockResponse::Text("Bad Name".to_string()),
                MockResponse::Select("dev".to_string()),
                MockResponse::Text(String::new()),
            ],
        );

        assert!(InitCommand::execute_in(&ctx, Path::new("/p")).is_err());
    }
}
