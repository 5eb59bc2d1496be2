//! Stack definitions.
//!
//! Each stack synthesizes one CloudFormation template; cross-stack wiring
//! goes through exports/imports so the templates can be deployed
//! independently, in the order returned by `synthesize_all`.

pub mod application;
pub mod ingress;
pub mod monitoring;
pub mod network;
pub mod platform;
pub mod security;

use crate::config::DeployConfig;
use crate::synth::Template;
use anyhow::Result;
use std::collections::BTreeMap;

pub use application::ApplicationStack;
pub use ingress::IngressStack;
pub use monitoring::MonitoringStack;
pub use network::NetworkStack;
pub use platform::PlatformStack;
pub use security::SecurityStack;

/// Cross-stack export names, derived from the shared resource prefix
#[derive(Debug, Clone)]
pub struct Exports {
    prefix: String,
}

impl Exports {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    pub fn vpc_id(&self) -> String {
        format!("{}-vpc-id", self.prefix)
    }

    pub fn public_subnet_ids(&self) -> String {
        format!("{}-public-subnet-ids", self.prefix)
    }

    pub fn private_subnet_ids(&self) -> String {
        format!("{}-private-subnet-ids", self.prefix)
    }

    pub fn alb_arn(&self) -> String {
        format!("{}-alb-arn", self.prefix)
    }

    pub fn alb_full_name(&self) -> String {
        format!("{}-alb-full-name", self.prefix)
    }

    pub fn alb_security_group_id(&self) -> String {
        format!("{}-alb-sg-id", self.prefix)
    }

    pub fn target_group_arn(&self) -> String {
        format!("{}-tg-arn", self.prefix)
    }

    pub fn target_group_full_name(&self) -> String {
        format!("{}-tg-full-name", self.prefix)
    }

    pub fn cluster_name(&self) -> String {
        format!("{}-cluster-name", self.prefix)
    }

    pub fn service_name(&self) -> String {
        format!("{}-service-name", self.prefix)
    }

    pub fn repository_arn(&self) -> String {
        format!("{}-ecr-arn", self.prefix)
    }

    pub fn repository_uri(&self) -> String {
        format!("{}-ecr-uri", self.prefix)
    }

    pub fn secret_arn(&self) -> String {
        format!("{}-secret-arn", self.prefix)
    }
}

/// Synthesize every stack for an environment, in deployment order.
///
/// `secret_env` is the flattened secrets mapping: it seeds the Secrets
/// Manager secret value and names the container's injected variables.
pub fn synthesize_all(
    config: &DeployConfig,
    secret_env: &BTreeMap<String, String>,
) -> Result<Vec<(String, Template)>> {
    let prefix = config.prefix();

    let templates = vec![
        (
            format!("{}-network", prefix),
            NetworkStack::new(config).synthesize()?,
        ),
        (
            format!("{}-application", prefix),
            ApplicationStack::new(config, secret_env).synthesize()?,
        ),
        (
            format!("{}-ingress", prefix),
            IngressStack::new(config).synthesize()?,
        ),
        (
            format!("{}-platform", prefix),
            PlatformStack::new(config, secret_env).synthesize()?,
        ),
        (
            format!("{}-monitoring", prefix),
            MonitoringStack::new(config).synthesize()?,
        ),
        (
            format!("{}-security", prefix),
            SecurityStack::new(config).synthesize()?,
        ),
    ];

    Ok(templates)
}


#[cfg(test)]
mod tests {
    use super::*;
    use test_support::{config_for, secret_env};

    #[test]
    fn test_synthesize_all_returns_stacks_in_deploy_order() {
        let templates = synthesize_all(&config_for("dev"), &secret_env()).unwrap();
        let names: Vec<&str> = templates.iter().map(|(name, _)| name.as_str()).collect();

        assert_eq!(
            names,
            vec![
                "testapp-dev-network",
                "testapp-dev-application",
                "testapp-dev-ingress",
                "testapp-dev-platform",
                "testapp-dev-monitoring",
                "testapp-dev-security",
            ]
        );
        assert!(templates.iter().all(|(_, t)| !t.is_empty()));
    }
}
