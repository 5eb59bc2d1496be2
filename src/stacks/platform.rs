//! ECS Fargate platform: cluster, task definition, service, and
//! auto-scaling.

use super::Exports;
use crate::config::{DeployConfig, EnvironmentProfile};
use crate::synth::intrinsics::{get_att, import_value, join, reference, split, sub};
use crate::synth::tags::standard_tags;
use crate::synth::{Resource, Template, TemplateOutput};
use anyhow::Result;
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// CPU utilization the service scales around
const CPU_TARGET_PERCENT: f64 = 70.0;

pub struct PlatformStack<'a> {
    config: &'a DeployConfig,
    profile: EnvironmentProfile,
    exports: Exports,
    secret_env: &'a BTreeMap<String, String>,
}

impl<'a> PlatformStack<'a> {
    pub fn new(config: &'a DeployConfig, secret_env: &'a BTreeMap<String, String>) -> Self {
        Self {
            config,
            profile: config.profile(),
            exports: Exports::new(&config.prefix()),
            secret_env,
        }
    }

    /// Secrets Manager references injected into the container. The secret
    /// value is the flattened mapping, so each key maps one env var.
    fn container_secrets(&self) -> Vec<Value> {
        self.secret_env
            .keys()
            .map(|key| {
                json!({
                    "Name": key,
                    "ValueFrom": join(
                        "",
                        vec![
                            import_value(&self.exports.secret_arn()),
                            json!(format!(":{}::", key)),
                        ],
                    ),
                })
            })
            .collect()
    }

    pub fn synthesize(&self) -> Result<Template> {
        let prefix = self.config.prefix();
        let app = &self.config.app_name;
        let env = &self.config.environment;
        let container = &self.config.container;
        let (min_capacity, max_capacity) = self.profile.capacity_bounds();
        let desired_count = self.config.desired_count.unwrap_or(min_capacity);

        let mut template = Template::new(&format!("ECS platform for {}", prefix));

        let insights = if self.profile.container_insights() {
            "enabled"
        } else {
            "disabled"
        };
        template.add(
            "Cluster",
            Resource::new(
                "AWS::ECS::Cluster",
                json!({
                    "ClusterName": prefix,
                    "ClusterSettings": [{ "Name": "containerInsights", "Value": insights }],
                    "Tags": standard_tags(app, env),
                }),
            ),
        )?;

        template.add(
            "LogGroup",
            Resource::new(
                "AWS::Logs::LogGroup",
                json!({
                    "LogGroupName": format!("/ecs/{}", prefix),
                    "RetentionInDays": self.profile.log_retention_days(),
                }),
            ),
        )?;

        let ecs_assume_role = json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": "ecs-tasks.amazonaws.com" },
                "Action": "sts:AssumeRole",
            }],
        });

        template.add(
            "ExecutionRole",
            Resource::new(
                "AWS::IAM::Role",
                json!({
                    "AssumeRolePolicyDocument": ecs_assume_role.clone(),
                    "ManagedPolicyArns": [
                        sub("arn:${AWS::Partition}:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy"),
                    ],
                    "Policies": [{
                        "PolicyName": "read-app-secrets",
                        "PolicyDocument": {
                            "Version": "2012-10-17",
                            "Statement": [{
                                "Effect": "Allow",
                                "Action": "secretsmanager:GetSecretValue",
                                "Resource": import_value(&self.exports.secret_arn()),
                            }],
                        },
                    }],
                    "Tags": standard_tags(app, env),
                }),
            ),
        )?;

        template.add(
            "TaskRole",
            Resource::new(
                "AWS::IAM::Role",
                json!({
                    "AssumeRolePolicyDocument": ecs_assume_role,
                    "Tags": standard_tags(app, env),
                }),
            ),
        )?;

        template.add(
            "TaskDefinition",
            Resource::new(
                "AWS::ECS::TaskDefinition",
                json!({
                    "Family": prefix,
                    "Cpu": container.cpu.to_string(),
                    "Memory": container.memory.to_string(),
                    "NetworkMode": "awsvpc",
                    "RequiresCompatibilities": ["FARGATE"],
                    "ExecutionRoleArn": get_att("ExecutionRole", "Arn"),
                    "TaskRoleArn": get_att("TaskRole", "Arn"),
                    "ContainerDefinitions": [{
                        "Name": app,
                        "Image": join(
                            "",
                            vec![
                                import_value(&self.exports.repository_uri()),
                                json!(format!(":{}", container.image_tag)),
                            ],
                        ),
                        "Essential": true,
                        "PortMappings": [{
                            "ContainerPort": container.port,
                            "Protocol": "tcp",
                        }],
                        "Environment": [
                            { "Name": "ENVIRONMENT", "Value": env },
                            { "Name": "PORT", "Value": container.port.to_string() },
                        ],
                        "Secrets": self.container_secrets(),
                        "LogConfiguration": {
                            "LogDriver": "awslogs",
                            "Options": {
                                "awslogs-group": reference("LogGroup"),
                                "awslogs-region": reference("AWS::Region"),
                                "awslogs-stream-prefix": app,
                            },
                        },
                    }],
                    "Tags": standard_tags(app, env),
                }),
            ),
        )?;

        template.add(
            "ServiceSecurityGroup",
            Resource::new(
                "AWS::EC2::SecurityGroup",
                json!({
                    "GroupDescription": format!("Service security group for {}", prefix),
                    "VpcId": import_value(&self.exports.vpc_id()),
                    "SecurityGroupIngress": [{
                        "IpProtocol": "tcp",
                        "FromPort": container.port,
                        "ToPort": container.port,
                        "SourceSecurityGroupId": import_value(&self.exports.alb_security_group_id()),
                        "Description": "Traffic from the load balancer",
                    }],
                    "Tags": standard_tags(app, env),
                }),
            ),
        )?;

        template.add(
            "Service",
            Resource::new(
                "AWS::ECS::Service",
                json!({
                    "ServiceName": prefix,
                    "Cluster": reference("Cluster"),
                    "LaunchType": "FARGATE",
                    "TaskDefinition": reference("TaskDefinition"),
                    "DesiredCount": desired_count,
                    "HealthCheckGracePeriodSeconds": 60,
                    "NetworkConfiguration": {
                        "AwsvpcConfiguration": {
                            "AssignPublicIp": "DISABLED",
                            "SecurityGroups": [reference("ServiceSecurityGroup")],
                            "Subnets": split(",", import_value(&self.exports.private_subnet_ids())),
                        },
                    },
                    "LoadBalancers": [{
                        "ContainerName": app,
                        "ContainerPort": container.port,
                        "TargetGroupArn": import_value(&self.exports.target_group_arn()),
                    }],
                    "Tags": standard_tags(app, env),
                }),
            ),
        )?;

        template.add(
            "ScalableTarget",
            Resource::new(
                "AWS::ApplicationAutoScaling::ScalableTarget",
                json!({
                    "MinCapacity": min_capacity,
                    "MaxCapacity": max_capacity,
                    "ResourceId": format!("service/{}/{}", prefix, prefix),
                    "ScalableDimension": "ecs:service:DesiredCount",
                    "ServiceNamespace": "ecs",
                    "RoleARN": sub(
                        "arn:${AWS::Partition}:iam::${AWS::AccountId}:role/aws-service-role/ecs.application-autoscaling.amazonaws.com/AWSServiceRoleForApplicationAutoScaling_ECSService",
                    ),
                }),
            )
            .depends_on("Service"),
        )?;

        template.add(
            "CpuScalingPolicy",
            Resource::new(
                "AWS::ApplicationAutoScaling::ScalingPolicy",
                json!({
                    "PolicyName": format!("{}-cpu-scaling", prefix),
                    "PolicyType": "TargetTrackingScaling",
                    "ScalingTargetId": reference("ScalableTarget"),
                    "TargetTrackingScalingPolicyConfiguration": {
                        "PredefinedMetricSpecification": {
                            "PredefinedMetricType": "ECSServiceAverageCPUUtilization",
                        },
                        "TargetValue": CPU_TARGET_PERCENT,
                        "ScaleInCooldown": 60,
                        "ScaleOutCooldown": 60,
                    },
                }),
            ),
        )?;

        template.add_output(
            "ClusterName",
            TemplateOutput::new(reference("Cluster"), "ECS cluster name")
                .exported(&self.exports.cluster_name()),
        );
        template.add_output(
            "ServiceName",
            TemplateOutput::new(get_att("Service", "Name"), "ECS service name")
                .exported(&self.exports.service_name()),
        );

        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::test_support::{config_for, secret_env};

    #[test]
    fn test_production_log_retention_is_thirty_days() {
        let env = secret_env();
        let template = PlatformStack::new(&config_for("production"), &env)
            .synthesize()
            .unwrap();

        assert!(template.has_resource_properties(
            "AWS::Logs::LogGroup",
            &json!({ "RetentionInDays": 30 })
        ));
    }

    #[test]
    fn test_other_environments_keep_logs_seven_days() {
        let env = secret_env();
        for name in ["dev", "staging"] {
            let template = PlatformStack::new(&config_for(name), &env)
                .synthesize()
                .unwrap();
            assert!(template.has_resource_properties(
                "AWS::Logs::LogGroup",
                &json!({ "RetentionInDays": 7 })
            ));
        }
    }

    #[test]
    fn test_container_insights_follows_profile() {
        let env = secret_env();
        let production = PlatformStack::new(&config_for("production"), &env)
            .synthesize()
            .unwrap();
        assert!(production.has_resource_properties(
            "AWS::ECS::Cluster",
            &json!({ "ClusterSettings": [{ "Name": "containerInsights", "Value": "enabled" }] })
        ));

        let dev = PlatformStack::new(&config_for("dev"), &env).synthesize().unwrap();
        assert!(dev.has_resource_properties(
            "AWS::ECS::Cluster",
            &json!({ "ClusterSettings": [{ "Name": "containerInsights", "Value": "disabled" }] })
        ));
    }

    #[test]
    fn test_task_definition_injects_each_flattened_secret() {
        let env = secret_env();
        let template = PlatformStack::new(&config_for("dev"), &env).synthesize().unwrap();

        let task_def = template.get_resource("TaskDefinition").unwrap();
        let secrets = task_def.properties["ContainerDefinitions"][0]["Secrets"]
            .as_array()
            .unwrap();
        assert_eq!(secrets.len(), 2);
        assert!(secrets.iter().any(|s| s["Name"] == "APPLICATION_SECRET_KEY"));
    }

    #[test]
    fn test_scaling_bounds_follow_profile() {
        let env = secret_env();
        let production = PlatformStack::new(&config_for("production"), &env)
            .synthesize()
            .unwrap();
        assert!(production.has_resource_properties(
            "AWS::ApplicationAutoScaling::ScalableTarget",
            &json!({ "MinCapacity": 2, "MaxCapacity": 10 })
        ));
        assert!(production.has_resource_properties(
            "AWS::ECS::Service",
            &json!({ "DesiredCount": 2 })
        ));

        let dev = PlatformStack::new(&config_for("dev"), &env).synthesize().unwrap();
        assert!(dev.has_resource_properties(
            "AWS::ApplicationAutoScaling::ScalableTarget",
            &json!({ "MinCapacity": 1, "MaxCapacity": 2 })
        ));
    }

    #[test]
    fn test_service_runs_in_private_subnets_without_public_ip() {
        let env = secret_env();
        let template = PlatformStack::new(&config_for("dev"), &env).synthesize().unwrap();

        assert!(template.has_resource_properties(
            "AWS::ECS::Service",
            &json!({
                "LaunchType": "FARGATE",
                "NetworkConfiguration": {
                    "AwsvpcConfiguration": { "AssignPublicIp": "DISABLED" }
                }
            })
        ));
    }
}
