//! Traffic filtering and compliance recording: WAF web ACL on the load
//! balancer, CloudTrail audit trail, and AWS Config rules.

use super::Exports;
use crate::config::{DeployConfig, EnvironmentProfile};
use crate::synth::intrinsics::{get_att, import_value, reference, sub};
use crate::synth::tags::standard_tags;
use crate::synth::{Resource, Template, TemplateOutput};
use anyhow::Result;
use serde_json::{Value, json};

/// Countries blocked outright at the edge
const BLOCKED_COUNTRIES: [&str; 4] = ["CN", "RU", "KP", "IR"];

pub struct SecurityStack<'a> {
    config: &'a DeployConfig,
    profile: EnvironmentProfile,
    exports: Exports,
}

impl<'a> SecurityStack<'a> {
    pub fn new(config: &'a DeployConfig) -> Self {
        Self {
            config,
            profile: config.profile(),
            exports: Exports::new(&config.prefix()),
        }
    }

    fn visibility_config(metric_name: &str) -> Value {
        json!({
            "SampledRequestsEnabled": true,
            "CloudWatchMetricsEnabled": true,
            "MetricName": metric_name,
        })
    }

    fn managed_rule_group(name: &str, priority: u32, group: &str) -> Value {
        json!({
            "Name": name,
            "Priority": priority,
            "OverrideAction": { "None": {} },
            "Statement": {
                "ManagedRuleGroupStatement": { "VendorName": "AWS", "Name": group },
            },
            "VisibilityConfig": Self::visibility_config(name),
        })
    }

    pub fn synthesize(&self) -> Result<Template> {
        let prefix = self.config.prefix();
        let app = &self.config.app_name;
        let env = &self.config.environment;
        let mut template = Template::new(&format!("Security and compliance for {}", prefix));

        let rules = json!([
            {
                "Name": "rate-limit",
                "Priority": 1,
                "Action": { "Block": {} },
                "Statement": {
                    "RateBasedStatement": {
                        "Limit": self.profile.waf_rate_limit(),
                        "AggregateKeyType": "IP",
                    },
                },
                "VisibilityConfig": Self::visibility_config("rate-limit"),
            },
            Self::managed_rule_group("aws-common", 2, "AWSManagedRulesCommonRuleSet"),
            Self::managed_rule_group("aws-bad-inputs", 3, "AWSManagedRulesKnownBadInputsRuleSet"),
            {
                "Name": "geo-block",
                "Priority": 4,
                "Action": { "Block": {} },
                "Statement": {
                    "GeoMatchStatement": { "CountryCodes": BLOCKED_COUNTRIES },
                },
                "VisibilityConfig": Self::visibility_config("geo-block"),
            },
        ]);

        template.add(
            "WebAcl",
            Resource::new(
                "AWS::WAFv2::WebACL",
                json!({
                    "Name": format!("{}-web-acl", prefix),
                    "Scope": "REGIONAL",
                    "DefaultAction": { "Allow": {} },
                    "VisibilityConfig": Self::visibility_config(&format!("{}-web-acl", prefix)),
                    "Rules": rules,
                    "Tags": standard_tags(app, env),
                }),
            ),
        )?;

        template.add(
            "WebAclAssociation",
            Resource::new(
                "AWS::WAFv2::WebACLAssociation",
                json!({
                    "ResourceArn": import_value(&self.exports.alb_arn()),
                    "WebACLArn": get_att("WebAcl", "Arn"),
                }),
            ),
        )?;

        template.add(
            "AuditBucket",
            Resource::new(
                "AWS::S3::Bucket",
                json!({
                    "BucketEncryption": {
                        "ServerSideEncryptionConfiguration": [{
                            "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" },
                        }],
                    },
                    "PublicAccessBlockConfiguration": {
                        "BlockPublicAcls": true,
                        "BlockPublicPolicy": true,
                        "IgnorePublicAcls": true,
                        "RestrictPublicBuckets": true,
                    },
                    "LifecycleConfiguration": {
                        "Rules": [{
                            "Id": "expire-audit-logs",
                            "Status": "Enabled",
                            "ExpirationInDays": 365,
                        }],
                    },
                    "Tags": standard_tags(app, env),
                }),
            )
            .with_deletion_policy(self.profile.removal_policy()),
        )?;

        template.add(
            "AuditBucketPolicy",
            Resource::new(
                "AWS::S3::BucketPolicy",
                json!({
                    "Bucket": reference("AuditBucket"),
                    "PolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": [
                            {
                                "Sid": "CloudTrailAclCheck",
                                "Effect": "Allow",
                                "Principal": { "Service": "cloudtrail.amazonaws.com" },
                                "Action": "s3:GetBucketAcl",
                                "Resource": get_att("AuditBucket", "Arn"),
                            },
                            {
                                "Sid": "CloudTrailWrite",
                                "Effect": "Allow",
                                "Principal": { "Service": "cloudtrail.amazonaws.com" },
                                "Action": "s3:PutObject",
                                "Resource": sub("${AuditBucket.Arn}/AWSLogs/${AWS::AccountId}/*"),
                                "Condition": {
                                    "StringEquals": { "s3:x-amz-acl": "bucket-owner-full-control" },
                                },
                            },
                            {
                                "Sid": "ConfigAclCheck",
                                "Effect": "Allow",
                                "Principal": { "Service": "config.amazonaws.com" },
                                "Action": "s3:GetBucketAcl",
                                "Resource": get_att("AuditBucket", "Arn"),
                            },
                            {
                                "Sid": "ConfigWrite",
                                "Effect": "Allow",
                                "Principal": { "Service": "config.amazonaws.com" },
                                "Action": "s3:PutObject",
                                "Resource": sub("${AuditBucket.Arn}/config/AWSLogs/${AWS::AccountId}/*"),
                                "Condition": {
                                    "StringEquals": { "s3:x-amz-acl": "bucket-owner-full-control" },
                                },
                            },
                        ],
                    },
                }),
            ),
        )?;

        template.add(
            "Trail",
            Resource::new(
                "AWS::CloudTrail::Trail",
                json!({
                    "TrailName": format!("{}-audit", prefix),
                    "S3BucketName": reference("AuditBucket"),
                    "IsLogging": true,
                    "EnableLogFileValidation": true,
                    "IncludeGlobalServiceEvents": true,
                    "IsMultiRegionTrail": true,
                    "Tags": standard_tags(app, env),
                }),
            )
            .depends_on("AuditBucketPolicy"),
        )?;

        template.add(
            "ConfigRole",
            Resource::new(
                "AWS::IAM::Role",
                json!({
                    "AssumeRolePolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": [{
                            "Effect": "Allow",
                            "Principal": { "Service": "config.amazonaws.com" },
                            "Action": "sts:AssumeRole",
                        }],
                    },
                    "ManagedPolicyArns": [
                        sub("arn:${AWS::Partition}:iam::aws:policy/service-role/AWS_ConfigRole"),
                    ],
                    "Tags": standard_tags(app, env),
                }),
            ),
        )?;

        template.add(
            "ConfigRecorder",
            Resource::new(
                "AWS::Config::ConfigurationRecorder",
                json!({
                    "Name": format!("{}-recorder", prefix),
                    "RoleARN": get_att("ConfigRole", "Arn"),
                    "RecordingGroup": {
                        "AllSupported": true,
                        "IncludeGlobalResourceTypes": true,
                    },
                }),
            ),
        )?;

        template.add(
            "ConfigDeliveryChannel",
            Resource::new(
                "AWS::Config::DeliveryChannel",
                json!({
                    "Name": format!("{}-delivery", prefix),
                    "S3BucketName": reference("AuditBucket"),
                    "S3KeyPrefix": "config",
                }),
            )
            .depends_on("AuditBucketPolicy"),
        )?;

        for (id, rule_name, identifier) in [
            (
                "EncryptedVolumesRule",
                "encrypted-volumes",
                "ENCRYPTED_VOLUMES",
            ),
            (
                "S3PublicReadRule",
                "s3-bucket-public-read-prohibited",
                "S3_BUCKET_PUBLIC_READ_PROHIBITED",
            ),
        ] {
            template.add(
                id,
                Resource::new(
                    "AWS::Config::ConfigRule",
                    json!({
                        "ConfigRuleName": format!("{}-{}", prefix, rule_name),
                        "Source": { "Owner": "AWS", "SourceIdentifier": identifier },
                    }),
                )
                .depends_on("ConfigRecorder"),
            )?;
        }

        template.add_output(
            "WebAclArn",
            TemplateOutput::new(get_att("WebAcl", "Arn"), "WAF web ACL ARN"),
        );
        template.add_output(
            "TrailArn",
            TemplateOutput::new(get_att("Trail", "Arn"), "CloudTrail trail ARN"),
        );
        template.add_output(
            "AuditBucketName",
            TemplateOutput::new(reference("AuditBucket"), "Audit log bucket name"),
        );

        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::test_support::config_for;

    #[test]
    fn test_production_rate_limit_is_2000() {
        let template = SecurityStack::new(&config_for("production"))
            .synthesize()
            .unwrap();

        assert!(template.has_resource_properties(
            "AWS::WAFv2::WebACL",
            &json!({ "Rules": [{
                "Name": "rate-limit",
                "Statement": { "RateBasedStatement": { "Limit": 2000 } }
            }]})
        ));
    }

    #[test]
    fn test_other_environments_rate_limit_is_1000() {
        for name in ["dev", "staging"] {
            let template = SecurityStack::new(&config_for(name)).synthesize().unwrap();
            assert!(template.has_resource_properties(
                "AWS::WAFv2::WebACL",
                &json!({ "Rules": [{
                    "Name": "rate-limit",
                    "Statement": { "RateBasedStatement": { "Limit": 1000 } }
                }]})
            ));
        }
    }

    #[test]
    fn test_web_acl_includes_managed_and_geo_rules() {
        let template = SecurityStack::new(&config_for("dev")).synthesize().unwrap();

        assert!(template.has_resource_properties(
            "AWS::WAFv2::WebACL",
            &json!({ "Rules": [
                { "Statement": { "ManagedRuleGroupStatement": { "Name": "AWSManagedRulesCommonRuleSet" } } },
                { "Statement": { "GeoMatchStatement": { "CountryCodes": ["CN", "RU", "KP", "IR"] } } }
            ]})
        ));
        assert!(template.has_resource_properties(
            "AWS::WAFv2::WebACLAssociation",
            &json!({ "ResourceArn": { "Fn::ImportValue": "testapp-dev-alb-arn" } })
        ));
    }

    #[test]
    fn test_trail_validates_log_files_and_waits_for_bucket_policy() {
        let template = SecurityStack::new(&config_for("dev")).synthesize().unwrap();

        assert!(template.has_resource_properties(
            "AWS::CloudTrail::Trail",
            &json!({ "EnableLogFileValidation": true, "IsMultiRegionTrail": true })
        ));
        let trail = template.get_resource("Trail").unwrap();
        assert_eq!(trail.depends_on, vec!["AuditBucketPolicy".to_string()]);
    }

    #[test]
    fn test_config_rules_depend_on_recorder() {
        let template = SecurityStack::new(&config_for("dev")).synthesize().unwrap();

        assert_eq!(template.resource_count_of("AWS::Config::ConfigRule"), 2);
        for (_, rule) in template.find_resources("AWS::Config::ConfigRule") {
            assert_eq!(rule.depends_on, vec!["ConfigRecorder".to_string()]);
        }
    }

    #[test]
    fn test_audit_bucket_blocks_public_access() {
        let template = SecurityStack::new(&config_for("dev")).synthesize().unwrap();

        assert!(template.has_resource_properties(
            "AWS::S3::Bucket",
            &json!({ "PublicAccessBlockConfiguration": { "BlockPublicAcls": true } })
        ));
    }
}
