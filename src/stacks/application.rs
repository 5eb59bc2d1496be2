//! Container registry and application secrets.
//!
//! Both resources are stateful, so their deletion policy follows the
//! environment profile: retained in production, deleted elsewhere.

use super::Exports;
use crate::config::{DeployConfig, EnvironmentProfile};
use crate::synth::intrinsics::{get_att, reference};
use crate::synth::tags::standard_tags;
use crate::synth::{Resource, Template, TemplateOutput};
use anyhow::Result;
use serde_json::json;
use std::collections::BTreeMap;

/// Images kept by the ECR lifecycle policy
const ECR_KEEP_IMAGES: u32 = 10;

pub struct ApplicationStack<'a> {
    config: &'a DeployConfig,
    profile: EnvironmentProfile,
    exports: Exports,
    secret_env: &'a BTreeMap<String, String>,
}

impl<'a> ApplicationStack<'a> {
    pub fn new(config: &'a DeployConfig, secret_env: &'a BTreeMap<String, String>) -> Self {
        Self {
            config,
            profile: config.profile(),
            exports: Exports::new(&config.prefix()),
            secret_env,
        }
    }

    pub fn synthesize(&self) -> Result<Template> {
        let prefix = self.config.prefix();
        let app = &self.config.app_name;
        let env = &self.config.environment;
        let mut template = Template::new(&format!("Registry and secrets for {}", prefix));

        let lifecycle_policy = json!({
            "rules": [{
                "rulePriority": 1,
                "description": format!("Keep last {} images", ECR_KEEP_IMAGES),
                "selection": {
                    "tagStatus": "any",
                    "countType": "imageCountMoreThan",
                    "countNumber": ECR_KEEP_IMAGES,
                },
                "action": { "type": "expire" },
            }]
        });

        template.add(
            "Repository",
            Resource::new(
                "AWS::ECR::Repository",
                json!({
                    "RepositoryName": prefix,
                    "ImageTagMutability": "MUTABLE",
                    "ImageScanningConfiguration": { "ScanOnPush": true },
                    "LifecyclePolicy": {
                        "LifecyclePolicyText": serde_json::to_string(&lifecycle_policy)?,
                    },
                    "Tags": standard_tags(app, env),
                }),
            )
            .with_deletion_policy(self.profile.removal_policy()),
        )?;

        template.add(
            "AppSecrets",
            Resource::new(
                "AWS::SecretsManager::Secret",
                json!({
                    "Name": format!("{}/{}/app-secrets", app, env),
                    "Description": format!("Application secrets for {}", prefix),
                    "SecretString": serde_json::to_string(self.secret_env)?,
                    "Tags": standard_tags(app, env),
                }),
            )
            .with_deletion_policy(self.profile.removal_policy()),
        )?;

        template.add_output(
            "RepositoryArn",
            TemplateOutput::new(get_att("Repository", "Arn"), "ECR repository ARN")
                .exported(&self.exports.repository_arn()),
        );
        template.add_output(
            "RepositoryUri",
            TemplateOutput::new(get_att("Repository", "RepositoryUri"), "ECR repository URI")
                .exported(&self.exports.repository_uri()),
        );
        template.add_output(
            "SecretArn",
            TemplateOutput::new(reference("AppSecrets"), "Application secrets ARN")
                .exported(&self.exports.secret_arn()),
        );

        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::test_support::{config_for, secret_env};

    #[test]
    fn test_production_retains_stateful_resources() {
        let env = secret_env();
        let template = ApplicationStack::new(&config_for("production"), &env)
            .synthesize()
            .unwrap();
        let json = template.to_json();

        assert_eq!(json["Resources"]["Repository"]["DeletionPolicy"], "Retain");
        assert_eq!(json["Resources"]["AppSecrets"]["DeletionPolicy"], "Retain");
    }

    #[test]
    fn test_non_production_deletes_stateful_resources() {
        let env = secret_env();
        let template = ApplicationStack::new(&config_for("dev"), &env)
            .synthesize()
            .unwrap();
        let json = template.to_json();

        assert_eq!(json["Resources"]["Repository"]["DeletionPolicy"], "Delete");
        assert_eq!(json["Resources"]["AppSecrets"]["DeletionPolicy"], "Delete");
    }

    #[test]
    fn test_secret_string_carries_flattened_mapping() {
        let env = secret_env();
        let template = ApplicationStack::new(&config_for("dev"), &env)
            .synthesize()
            .unwrap();

        let secret = template.get_resource("AppSecrets").unwrap();
        let secret_string = secret.properties["SecretString"].as_str().unwrap();
        let parsed: BTreeMap<String, String> = serde_json::from_str(secret_string).unwrap();
        assert_eq!(parsed.get("APPLICATION_SECRET_KEY").unwrap(), "abc");
    }

    #[test]
    fn test_repository_scans_on_push_and_keeps_ten_images() {
        let env = secret_env();
        let template = ApplicationStack::new(&config_for("dev"), &env)
            .synthesize()
            .unwrap();

        assert!(template.has_resource_properties(
            "AWS::ECR::Repository",
            &json!({ "ImageScanningConfiguration": { "ScanOnPush": true } })
        ));

        let repo = template.get_resource("Repository").unwrap();
        let policy_text = repo.properties["LifecyclePolicy"]["LifecyclePolicyText"]
            .as_str()
            .unwrap();
        assert!(policy_text.contains("\"countNumber\":10"));
    }
}
