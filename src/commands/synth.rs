//! `groundwork synth` - turn an environment's configuration and secrets
//! into CloudFormation templates on disk.

use crate::config::DeployConfig;
use crate::context::Context;
use crate::secrets::SecretsLoader;
use crate::stacks;
use anyhow::{Context as AnyhowContext, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Synthesis record written next to the templates
#[derive(Debug, Serialize)]
struct Manifest {
    application: String,
    environment: String,
    run_id: String,
    synthesized_at: DateTime<Utc>,
    synthesized_by: String,
    templates: Vec<String>,
}

pub struct SynthCommand;

impl SynthCommand {
    /// Execute the synth command from the current directory
    pub fn execute(ctx: &Context, environment: &str, output_dir: Option<&str>) -> Result<()> {
        let project_root =
            std::env::current_dir().context("Failed to determine current directory")?;
        Self::execute_in(ctx, &project_root, environment, output_dir)
    }

    pub(crate) fn execute_in(
        ctx: &Context,
        project_root: &Path,
        environment: &str,
        output_dir: Option<&str>,
    ) -> Result<()> {
        ctx.output.section("Synthesize");

        let config_path = project_root
            .join("environments")
            .join(format!("{}.yaml", environment));
        if !ctx.fs.is_file(&config_path) {
            anyhow::bail!(
                "No deploy configuration found at {:?}. Run 'groundwork init' first.",
                config_path
            );
        }

        let config = DeployConfig::from_file(&*ctx.fs, &config_path)?;
        if config.environment != environment {
            anyhow::bail!(
                "Configuration {:?} declares environment '{}', expected '{}'",
                config_path,
                config.environment,
                environment
            );
        }

        ctx.output.key_value("Application", &config.app_name);
        ctx.output.key_value("Environment", &config.environment);

        let mut loader = SecretsLoader::new(ctx, project_root);
        loader.load_with_fallback(environment);
        let secret_env = loader.export_as_env_vars()?;

        let templates = stacks::synthesize_all(&config, &secret_env)?;

        let out_dir = match output_dir {
            Some(dir) => PathBuf::from(dir),
            None => project_root.join("out").join(environment),
        };

        ctx.output.blank();
        for (name, template) in &templates {
            let path = out_dir.join(format!("{}.template.json", name));
            ctx.fs.write(&path, &template.to_pretty_json()?)?;
            ctx.output.dimmed(&format!("wrote {}", path.display()));
        }

        let manifest = Manifest {
            application: config.app_name.clone(),
            environment: config.environment.clone(),
            run_id: uuid::Uuid::new_v4().to_string(),
            synthesized_at: Utc::now(),
            synthesized_by: whoami::username(),
            templates: templates.iter().map(|(name, _)| name.clone()).collect(),
        };
        let manifest_path = out_dir.join("manifest.yaml");
        ctx.fs
            .write(&manifest_path, &serde_yaml::to_string(&manifest)?)?;
        ctx.output.dimmed(&format!("wrote {}", manifest_path.display()));

        ctx.output.blank();
        ctx.output.success(&format!(
            "Synthesized {} templates for {}",
            templates.len(),
            config.prefix()
        ));

        Ok(())
    }
}
