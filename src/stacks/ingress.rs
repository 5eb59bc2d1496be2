//! Public entry point: application load balancer, target group, listeners,
//! and TLS certificate.

use super::Exports;
use crate::config::{DeployConfig, EnvironmentProfile};
use crate::synth::intrinsics::{get_att, import_value, reference, split};
use crate::synth::tags::standard_tags;
use crate::synth::{Resource, Template, TemplateOutput};
use anyhow::Result;
use serde_json::{Value, json};

const SSL_POLICY: &str = "ELBSecurityPolicy-TLS13-1-2-2021-06";

pub struct IngressStack<'a> {
    config: &'a DeployConfig,
    profile: EnvironmentProfile,
    exports: Exports,
}

impl<'a> IngressStack<'a> {
    pub fn new(config: &'a DeployConfig) -> Self {
        Self {
            config,
            profile: config.profile(),
            exports: Exports::new(&config.prefix()),
        }
    }

    /// The certificate the HTTPS listener uses: an imported ARN wins over a
    /// stack-created certificate.
    fn certificate(&self) -> Option<CertificateSource> {
        if let Some(arn) = &self.config.certificate_arn {
            return Some(CertificateSource::Imported(arn.clone()));
        }
        if self.config.create_certificate {
            if let Some(domain) = &self.config.domain_name {
                return Some(CertificateSource::Created(domain.clone()));
            }
        }
        None
    }

    pub fn synthesize(&self) -> Result<Template> {
        let prefix = self.config.prefix();
        let app = &self.config.app_name;
        let env = &self.config.environment;

        if self.config.enable_https && self.config.domain_name.is_none() {
            anyhow::bail!("HTTPS is enabled for '{}' but no domain name is configured", prefix);
        }

        let certificate = self.certificate();
        if self.config.enable_https && certificate.is_none() {
            anyhow::bail!(
                "HTTPS listener for '{}' requires a certificate: set certificate_arn or create_certificate",
                prefix
            );
        }

        let mut template = Template::new(&format!("Ingress resources for {}", prefix));

        let mut ingress_rules = vec![json!({
            "IpProtocol": "tcp",
            "FromPort": 80,
            "ToPort": 80,
            "CidrIp": "0.0.0.0/0",
            "Description": "HTTP from anywhere",
        })];
        if self.config.enable_https {
            ingress_rules.push(json!({
                "IpProtocol": "tcp",
                "FromPort": 443,
                "ToPort": 443,
                "CidrIp": "0.0.0.0/0",
                "Description": "HTTPS from anywhere",
            }));
        }

        template.add(
            "AlbSecurityGroup",
            Resource::new(
                "AWS::EC2::SecurityGroup",
                json!({
                    "GroupDescription": format!("Load balancer security group for {}", prefix),
                    "VpcId": import_value(&self.exports.vpc_id()),
                    "SecurityGroupIngress": ingress_rules,
                    "Tags": standard_tags(app, env),
                }),
            ),
        )?;

        template.add(
            "LoadBalancer",
            Resource::new(
                "AWS::ElasticLoadBalancingV2::LoadBalancer",
                json!({
                    "Type": "application",
                    "Scheme": "internet-facing",
                    "Subnets": split(",", import_value(&self.exports.public_subnet_ids())),
                    "SecurityGroups": [reference("AlbSecurityGroup")],
                    "LoadBalancerAttributes": [
                        {
                            "Key": "deletion_protection.enabled",
                            "Value": self.profile.deletion_protection().to_string(),
                        },
                        { "Key": "idle_timeout.timeout_seconds", "Value": "60" },
                    ],
                    "Tags": standard_tags(app, env),
                }),
            ),
        )?;

        template.add(
            "TargetGroup",
            Resource::new(
                "AWS::ElasticLoadBalancingV2::TargetGroup",
                json!({
                    "Port": self.config.container.port,
                    "Protocol": "HTTP",
                    "TargetType": "ip",
                    "VpcId": import_value(&self.exports.vpc_id()),
                    "HealthCheckPath": "/health/",
                    "HealthCheckIntervalSeconds": 30,
                    "HealthCheckTimeoutSeconds": 5,
                    "HealthyThresholdCount": 2,
                    "UnhealthyThresholdCount": 3,
                    "Matcher": { "HttpCode": "200" },
                    "TargetGroupAttributes": [
                        { "Key": "deregistration_delay.timeout_seconds", "Value": "30" },
                    ],
                    "Tags": standard_tags(app, env),
                }),
            ),
        )?;

        let certificate_value: Option<Value> = match &certificate {
            Some(CertificateSource::Imported(arn)) => Some(json!(arn)),
            Some(CertificateSource::Created(domain)) => {
                template.add(
                    "Certificate",
                    Resource::new(
                        "AWS::CertificateManager::Certificate",
                        json!({
                            "DomainName": domain,
                            "ValidationMethod": "DNS",
                            "Tags": standard_tags(app, env),
                        }),
                    ),
                )?;
                Some(reference("Certificate"))
            }
            None => None,
        };

        let http_default_action = if self.config.enable_https {
            json!({
                "Type": "redirect",
                "RedirectConfig": {
                    "Protocol": "HTTPS",
                    "Port": "443",
                    "StatusCode": "HTTP_301",
                },
            })
        } else {
            json!({
                "Type": "forward",
                "TargetGroupArn": reference("TargetGroup"),
            })
        };

        template.add(
            "HttpListener",
            Resource::new(
                "AWS::ElasticLoadBalancingV2::Listener",
                json!({
                    "LoadBalancerArn": reference("LoadBalancer"),
                    "Port": 80,
                    "Protocol": "HTTP",
                    "DefaultActions": [http_default_action],
                }),
            ),
        )?;

        if self.config.enable_https {
            if let Some(certificate_arn) = certificate_value {
                template.add(
                    "HttpsListener",
                    Resource::new(
                        "AWS::ElasticLoadBalancingV2::Listener",
                        json!({
                            "LoadBalancerArn": reference("LoadBalancer"),
                            "Port": 443,
                            "Protocol": "HTTPS",
                            "SslPolicy": SSL_POLICY,
                            "Certificates": [{ "CertificateArn": certificate_arn }],
                            "DefaultActions": [{
                                "Type": "forward",
                                "TargetGroupArn": reference("TargetGroup"),
                            }],
                        }),
                    ),
                )?;
            }
        }

        template.add_output(
            "LoadBalancerArn",
            TemplateOutput::new(reference("LoadBalancer"), "Load balancer ARN")
                .exported(&self.exports.alb_arn()),
        );
        template.add_output(
            "LoadBalancerDnsName",
            TemplateOutput::new(get_att("LoadBalancer", "DNSName"), "Load balancer DNS name"),
        );
        template.add_output(
            "LoadBalancerFullName",
            TemplateOutput::new(
                get_att("LoadBalancer", "LoadBalancerFullName"),
                "Load balancer full name for CloudWatch metrics",
            )
            .exported(&self.exports.alb_full_name()),
        );
        template.add_output(
            "AlbSecurityGroupId",
            TemplateOutput::new(get_att("AlbSecurityGroup", "GroupId"), "ALB security group id")
                .exported(&self.exports.alb_security_group_id()),
        );
        template.add_output(
            "TargetGroupArn",
            TemplateOutput::new(reference("TargetGroup"), "Target group ARN")
                .exported(&self.exports.target_group_arn()),
        );
        template.add_output(
            "TargetGroupFullName",
            TemplateOutput::new(
                get_att("TargetGroup", "TargetGroupFullName"),
                "Target group full name for CloudWatch metrics",
            )
            .exported(&self.exports.target_group_full_name()),
        );

        Ok(template)
    }
}

enum CertificateSource {
    Imported(String),
    Created(String),
}
