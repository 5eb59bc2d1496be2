use crate::synth::RemovalPolicy;
use crate::traits::FileSystem;
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

lazy_static! {
    /// Lowercase alphanumeric with dashes, 3-32 chars, starting with a letter
    static ref NAME_PATTERN: Regex = Regex::new(r"^[a-z][a-z0-9-]{2,31}$").unwrap();
}

/// Valid Fargate cpu/memory (MiB) combinations, per task size tier
const FARGATE_SIZES: &[(u32, &[u32])] = &[
    (256, &[512, 1024, 2048]),
    (512, &[1024, 2048, 3072, 4096]),
    (1024, &[2048, 3072, 4096, 5120, 6144, 7168, 8192]),
    (2048, &[4096, 8192, 16384]),
    (4096, &[8192, 16384, 30720]),
];

/// Per-environment deployment configuration, read from `environments/<env>.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Application name, used as the prefix for every resource name
    pub app_name: String,

    /// Environment name (e.g. "dev", "staging", "production")
    pub environment: String,

    /// Domain name served by the load balancer
    #[serde(default)]
    pub domain_name: Option<String>,

    /// Whether the load balancer terminates TLS
    #[serde(default)]
    pub enable_https: bool,

    /// Existing ACM certificate to attach to the HTTPS listener
    #[serde(default)]
    pub certificate_arn: Option<String>,

    /// Whether to request a DNS-validated certificate for `domain_name`
    /// when no `certificate_arn` is given
    #[serde(default = "default_true")]
    pub create_certificate: bool,

    /// Container sizing and port
    #[serde(default)]
    pub container: ContainerConfig,

    /// Number of service tasks; defaults to the environment profile minimum
    #[serde(default)]
    pub desired_count: Option<u32>,
}

fn default_true() -> bool {
    true
}

/// Task sizing for the application container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Fargate cpu units (256 = 0.25 vCPU)
    pub cpu: u32,

    /// Task memory in MiB
    pub memory: u32,

    /// Port the application listens on
    pub port: u16,

    /// Image tag to deploy
    #[serde(default = "default_image_tag")]
    pub image_tag: String,
}

fn default_image_tag() -> String {
    "latest".to_string()
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            cpu: 256,
            memory: 512,
            port: 8000,
            image_tag: default_image_tag(),
        }
    }
}

impl DeployConfig {
    /// Load and validate a deployment configuration from a YAML file
    pub fn from_file(fs: &dyn FileSystem, path: &Path) -> Result<Self> {
        let contents = fs
            .read_to_string(path)
            .with_context(|| format!("Failed to read deploy configuration: {:?}", path))?;

        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Invalid deploy configuration: {:?}", path))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate names and container sizing
    pub fn validate(&self) -> Result<()> {
        if !NAME_PATTERN.is_match(&self.app_name) {
            anyhow::bail!(
                "Invalid app name '{}': must be lowercase alphanumeric with dashes, 3-32 characters",
                self.app_name
            );
        }

        if !NAME_PATTERN.is_match(&self.environment) {
            anyhow::bail!(
                "Invalid environment name '{}': must be lowercase alphanumeric with dashes, 3-32 characters",
                self.environment
            );
        }

        let valid_memory = FARGATE_SIZES
            .iter()
            .find(|(cpu, _)| *cpu == self.container.cpu)
            .map(|(_, memory)| memory.contains(&self.container.memory));

        match valid_memory {
            None => anyhow::bail!(
                "Invalid Fargate cpu value {}: expected one of 256, 512, 1024, 2048, 4096",
                self.container.cpu
            ),
            Some(false) => anyhow::bail!(
                "Invalid Fargate memory {} MiB for {} cpu units",
                self.container.memory,
                self.container.cpu
            ),
            Some(true) => {}
        }

        Ok(())
    }

    /// Resource name prefix shared by every stack ("<app>-<env>")
    pub fn prefix(&self) -> String {
        format!("{}-{}", self.app_name, self.environment)
    }

    /// Environment profile derived from the environment name
    pub fn profile(&self) -> EnvironmentProfile {
        EnvironmentProfile::new(&self.environment)
    }
}

/// Centralizes every production/non-production conditional: retention,
/// removal policies, scaling bounds, and WAF thresholds.
#[derive(Debug, Clone)]
pub struct EnvironmentProfile {
    pub name: String,
    pub is_production: bool,
}

impl EnvironmentProfile {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_production: name == "production",
        }
    }

    /// CloudWatch log retention in days
    pub fn log_retention_days(&self) -> u32 {
        if self.is_production { 30 } else { 7 }
    }

    /// Deletion policy for stateful resources (ECR, Secrets Manager, CloudTrail bucket)
    pub fn removal_policy(&self) -> RemovalPolicy {
        if self.is_production {
            RemovalPolicy::Retain
        } else {
            RemovalPolicy::Delete
        }
    }

    /// WAF rate-limit threshold (requests per 5 minutes per IP)
    pub fn waf_rate_limit(&self) -> u64 {
        if self.is_production { 2000 } else { 1000 }
    }

    /// Number of NAT gateways
    pub fn nat_gateways(&self) -> usize {
        if self.is_production { 2 } else { 1 }
    }

    /// Service auto-scaling bounds (min, max)
    pub fn capacity_bounds(&self) -> (u32, u32) {
        if self.is_production { (2, 10) } else { (1, 2) }
    }

    /// Whether the load balancer has deletion protection
    pub fn deletion_protection(&self) -> bool {
        self.is_production
    }

    /// Whether ECS container insights are enabled
    pub fn container_insights(&self) -> bool {
        self.is_production
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockFileSystem;

    fn minimal_config(environment: &str) -> DeployConfig {
        DeployConfig {
            app_name: "testapp".to_string(),
            environment: environment.to_string(),
            domain_name: None,
            enable_https: false,
            certificate_arn: None,
            create_certificate: true,
            container: ContainerConfig::default(),
            desired_count: None,
        }
    }

    #[test]
    fn test_from_file_parses_minimal_yaml() {
        let fs = MockFileSystem::with_files(vec![(
            "/p/environments/dev.yaml",
            "app_name: testapp\nenvironment: dev\ncontainer:\n  cpu: 256\n  memory: 512\n  port: 8000\n",
        )]);

        let config =
            DeployConfig::from_file(&fs, Path::new("/p/environments/dev.yaml")).unwrap();
        assert_eq!(config.prefix(), "testapp-dev");
        assert!(!config.enable_https);
        assert!(config.create_certificate);
        assert_eq!(config.container.image_tag, "latest");
    }

    #[test]
    fn test_invalid_app_name_rejected() {
        let mut config = minimal_config("dev");
        config.app_name = "Test_App".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_fargate_sizing_rejected() {
        let mut config = minimal_config("dev");
        config.container.cpu = 256;
        config.container.memory = 4096;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("memory"));

        config.container.cpu = 300;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_production_profile_values() {
        let profile = EnvironmentProfile::new("production");
        assert!(profile.is_production);
        assert_eq!(profile.log_retention_days(), 30);
        assert_eq!(profile.waf_rate_limit(), 2000);
        assert_eq!(profile.nat_gateways(), 2);
        assert_eq!(profile.capacity_bounds(), (2, 10));
        assert!(profile.deletion_protection());
        assert!(profile.container_insights());
        assert_eq!(profile.removal_policy(), RemovalPolicy::Retain);
    }

    #[test]
    fn test_non_production_profile_values() {
        for name in ["dev", "staging", "qa"] {
            let profile = EnvironmentProfile::new(name);
            assert!(!profile.is_production);
            assert_eq!(profile.log_retention_days(), 7);
            assert_eq!(profile.waf_rate_limit(), 1000);
            assert_eq!(profile.nat_gateways(), 1);
            assert_eq!(profile.capacity_bounds(), (1, 2));
            assert!(!profile.deletion_protection());
            assert_eq!(profile.removal_policy(), RemovalPolicy::Delete);
        }
    }
}
