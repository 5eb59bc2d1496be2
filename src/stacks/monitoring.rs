//! CloudWatch dashboard and alarms, plus the SNS topic alarms notify.
//!
//! The dashboard body is rendered from a Handlebars template; values only
//! known at deploy time (load balancer and target group full names) are
//! spliced in with `Fn::Sub` variables.

use super::Exports;
use crate::config::DeployConfig;
use crate::synth::intrinsics::{import_value, reference, sub_with};
use crate::synth::tags::standard_tags;
use crate::synth::{Resource, Template, TemplateOutput};
use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde_json::{Value, json};

/// Dashboard widget layout. `{{...}}` placeholders are resolved at synth
/// time; `${...}` placeholders are left for CloudFormation's `Fn::Sub`.
const DASHBOARD_TEMPLATE: &str = r#"{
  "widgets": [
    {
      "type": "metric", "x": 0, "y": 0, "width": 12, "height": 6,
      "properties": {
        "title": "Service CPU",
        "metrics": [["AWS/ECS", "CPUUtilization", "ClusterName", "{{cluster_name}}", "ServiceName", "{{service_name}}"]],
        "period": 300, "stat": "Average", "region": "${AWS::Region}"
      }
    },
    {
      "type": "metric", "x": 12, "y": 0, "width": 12, "height": 6,
      "properties": {
        "title": "Service memory",
        "metrics": [["AWS/ECS", "MemoryUtilization", "ClusterName", "{{cluster_name}}", "ServiceName", "{{service_name}}"]],
        "period": 300, "stat": "Average", "region": "${AWS::Region}"
      }
    },
    {
      "type": "metric", "x": 0, "y": 6, "width": 12, "height": 6,
      "properties": {
        "title": "Request count",
        "metrics": [["AWS/ApplicationELB", "RequestCount", "LoadBalancer", "${AlbFullName}", { "stat": "Sum" }]],
        "period": 300, "region": "${AWS::Region}"
      }
    },
    {
      "type": "metric", "x": 12, "y": 6, "width": 12, "height": 6,
      "properties": {
        "title": "Target responses",
        "metrics": [
          ["AWS/ApplicationELB", "HTTPCode_Target_2XX_Count", "LoadBalancer", "${AlbFullName}", { "stat": "Sum" }],
          ["AWS/ApplicationELB", "HTTPCode_Target_5XX_Count", "LoadBalancer", "${AlbFullName}", { "stat": "Sum" }],
          ["AWS/ApplicationELB", "TargetResponseTime", "LoadBalancer", "${AlbFullName}", { "stat": "p95", "yAxis": "right" }]
        ],
        "period": 300, "region": "${AWS::Region}"
      }
    }
  ]
}"#;

pub struct MonitoringStack<'a> {
    config: &'a DeployConfig,
    exports: Exports,
}

impl<'a> MonitoringStack<'a> {
    pub fn new(config: &'a DeployConfig) -> Self {
        Self {
            config,
            exports: Exports::new(&config.prefix()),
        }
    }

    fn render_dashboard_body(&self) -> Result<String> {
        let prefix = self.config.prefix();
        let handlebars = Handlebars::new();
        let body = handlebars
            .render_template(
                DASHBOARD_TEMPLATE,
                &json!({
                    // Cluster and service carry fixed names, so the
                    // dashboard can reference them directly.
                    "cluster_name": prefix,
                    "service_name": prefix,
                }),
            )
            .context("Failed to render dashboard template")?;

        // Catch template drift early instead of at deploy time
        serde_json::from_str::<Value>(&body).context("Dashboard body is not valid JSON")?;
        Ok(body)
    }

    fn alarm(&self, description: &str, properties: Value) -> Resource {
        let mut merged = json!({
            "AlarmDescription": description,
            "AlarmActions": [reference("AlarmTopic")],
            "TreatMissingData": "notBreaching",
        });
        if let (Value::Object(base), Value::Object(extra)) = (&mut merged, properties) {
            base.extend(extra);
        }
        Resource::new("AWS::CloudWatch::Alarm", merged)
    }

    pub fn synthesize(&self) -> Result<Template> {
        let prefix = self.config.prefix();
        let app = &self.config.app_name;
        let env = &self.config.environment;
        let mut template = Template::new(&format!("Monitoring resources for {}", prefix));

        template.add(
            "AlarmTopic",
            Resource::new(
                "AWS::SNS::Topic",
                json!({
                    "TopicName": format!("{}-alarms", prefix),
                    "Tags": standard_tags(app, env),
                }),
            ),
        )?;

        let service_dimensions = json!([
            { "Name": "ClusterName", "Value": prefix },
            { "Name": "ServiceName", "Value": prefix },
        ]);

        template.add(
            "CpuAlarm",
            self.alarm(
                "Service CPU above 80%",
                json!({
                    "Namespace": "AWS/ECS",
                    "MetricName": "CPUUtilization",
                    "Dimensions": service_dimensions.clone(),
                    "Statistic": "Average",
                    "Period": 300,
                    "EvaluationPeriods": 2,
                    "Threshold": 80,
                    "ComparisonOperator": "GreaterThanThreshold",
                }),
            ),
        )?;

        template.add(
            "MemoryAlarm",
            self.alarm(
                "Service memory above 85%",
                json!({
                    "Namespace": "AWS/ECS",
                    "MetricName": "MemoryUtilization",
                    "Dimensions": service_dimensions,
                    "Statistic": "Average",
                    "Period": 300,
                    "EvaluationPeriods": 2,
                    "Threshold": 85,
                    "ComparisonOperator": "GreaterThanThreshold",
                }),
            ),
        )?;

        template.add(
            "Http5xxAlarm",
            self.alarm(
                "More than 10 target 5XX responses in 5 minutes",
                json!({
                    "Namespace": "AWS/ApplicationELB",
                    "MetricName": "HTTPCode_Target_5XX_Count",
                    "Dimensions": [{
                        "Name": "LoadBalancer",
                        "Value": import_value(&self.exports.alb_full_name()),
                    }],
                    "Statistic": "Sum",
                    "Period": 300,
                    "EvaluationPeriods": 1,
                    "Threshold": 10,
                    "ComparisonOperator": "GreaterThanThreshold",
                }),
            ),
        )?;

        template.add(
            "UnhealthyHostAlarm",
            self.alarm(
                "Any unhealthy target",
                json!({
                    "Namespace": "AWS/ApplicationELB",
                    "MetricName": "UnHealthyHostCount",
                    "Dimensions": [
                        {
                            "Name": "TargetGroup",
                            "Value": import_value(&self.exports.target_group_full_name()),
                        },
                        {
                            "Name": "LoadBalancer",
                            "Value": import_value(&self.exports.alb_full_name()),
                        },
                    ],
                    "Statistic": "Maximum",
                    "Period": 300,
                    "EvaluationPeriods": 2,
                    "Threshold": 0,
                    "ComparisonOperator": "GreaterThanThreshold",
                }),
            ),
        )?;

        let body = self.render_dashboard_body()?;
        template.add(
            "Dashboard",
            Resource::new(
                "AWS::CloudWatch::Dashboard",
                json!({
                    "DashboardName": prefix,
                    "DashboardBody": sub_with(
                        &body,
                        json!({
                            "AlbFullName": import_value(&self.exports.alb_full_name()),
                        }),
                    ),
                }),
            ),
        )?;

        template.add_output(
            "AlarmTopicArn",
            TemplateOutput::new(reference("AlarmTopic"), "Alarm topic ARN"),
        );
        template.add_output(
            "DashboardName",
            TemplateOutput::new(reference("Dashboard"), "CloudWatch dashboard name"),
        );

        Ok(template)
    }
}
