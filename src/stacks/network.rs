//! VPC networking: subnets across two availability zones, internet gateway,
//! NAT gateways, and routing.

use super::Exports;
use crate::config::{DeployConfig, EnvironmentProfile};
use crate::synth::intrinsics::{get_att, get_azs, join, reference, select};
use crate::synth::tags::named_tags;
use crate::synth::{Resource, Template, TemplateOutput};
use anyhow::Result;
use serde_json::json;

const VPC_CIDR: &str = "10.0.0.0/16";
const PUBLIC_SUBNET_CIDRS: [&str; 2] = ["10.0.0.0/24", "10.0.1.0/24"];
const PRIVATE_SUBNET_CIDRS: [&str; 2] = ["10.0.2.0/24", "10.0.3.0/24"];

pub struct NetworkStack<'a> {
    config: &'a DeployConfig,
    profile: EnvironmentProfile,
    exports: Exports,
}

impl<'a> NetworkStack<'a> {
    pub fn new(config: &'a DeployConfig) -> Self {
        Self {
            config,
            profile: config.profile(),
            exports: Exports::new(&config.prefix()),
        }
    }

    pub fn synthesize(&self) -> Result<Template> {
        let prefix = self.config.prefix();
        let app = &self.config.app_name;
        let env = &self.config.environment;
        let mut template = Template::new(&format!("Network resources for {}", prefix));

        template.add(
            "Vpc",
            Resource::new(
                "AWS::EC2::VPC",
                json!({
                    "CidrBlock": VPC_CIDR,
                    "EnableDnsSupport": true,
                    "EnableDnsHostnames": true,
                    "Tags": named_tags(app, env, &format!("{}-vpc", prefix)),
                }),
            ),
        )?;

        for (index, cidr) in PUBLIC_SUBNET_CIDRS.iter().enumerate() {
            template.add(
                &format!("PublicSubnet{}", index + 1),
                Resource::new(
                    "AWS::EC2::Subnet",
                    json!({
                        "VpcId": reference("Vpc"),
                        "CidrBlock": cidr,
                        "AvailabilityZone": select(index, get_azs()),
                        "MapPublicIpOnLaunch": true,
                        "Tags": named_tags(app, env, &format!("{}-public-{}", prefix, index + 1)),
                    }),
                ),
            )?;
        }

        for (index, cidr) in PRIVATE_SUBNET_CIDRS.iter().enumerate() {
            template.add(
                &format!("PrivateSubnet{}", index + 1),
                Resource::new(
                    "AWS::EC2::Subnet",
                    json!({
                        "VpcId": reference("Vpc"),
                        "CidrBlock": cidr,
                        "AvailabilityZone": select(index, get_azs()),
                        "MapPublicIpOnLaunch": false,
                        "Tags": named_tags(app, env, &format!("{}-private-{}", prefix, index + 1)),
                    }),
                ),
            )?;
        }

        template.add(
            "InternetGateway",
            Resource::new(
                "AWS::EC2::InternetGateway",
                json!({ "Tags": named_tags(app, env, &format!("{}-igw", prefix)) }),
            ),
        )?;
        template.add(
            "VpcGatewayAttachment",
            Resource::new(
                "AWS::EC2::VPCGatewayAttachment",
                json!({
                    "VpcId": reference("Vpc"),
                    "InternetGatewayId": reference("InternetGateway"),
                }),
            ),
        )?;

        template.add(
            "PublicRouteTable",
            Resource::new(
                "AWS::EC2::RouteTable",
                json!({
                    "VpcId": reference("Vpc"),
                    "Tags": named_tags(app, env, &format!("{}-public-rt", prefix)),
                }),
            ),
        )?;
        template.add(
            "PublicDefaultRoute",
            Resource::new(
                "AWS::EC2::Route",
                json!({
                    "RouteTableId": reference("PublicRouteTable"),
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "GatewayId": reference("InternetGateway"),
                }),
            )
            .depends_on("VpcGatewayAttachment"),
        )?;

        for index in 1..=PUBLIC_SUBNET_CIDRS.len() {
            template.add(
                &format!("PublicSubnet{}RouteTableAssociation", index),
                Resource::new(
                    "AWS::EC2::SubnetRouteTableAssociation",
                    json!({
                        "SubnetId": reference(&format!("PublicSubnet{}", index)),
                        "RouteTableId": reference("PublicRouteTable"),
                    }),
                ),
            )?;
        }

        // One NAT gateway per public subnet in production, a single shared
        // one otherwise.
        let nat_count = self.profile.nat_gateways();
        for index in 1..=nat_count {
            template.add(
                &format!("NatGateway{}Eip", index),
                Resource::new("AWS::EC2::EIP", json!({ "Domain": "vpc" })),
            )?;
            template.add(
                &format!("NatGateway{}", index),
                Resource::new(
                    "AWS::EC2::NatGateway",
                    json!({
                        "AllocationId": get_att(&format!("NatGateway{}Eip", index), "AllocationId"),
                        "SubnetId": reference(&format!("PublicSubnet{}", index)),
                        "Tags": named_tags(app, env, &format!("{}-nat-{}", prefix, index)),
                    }),
                )
                .depends_on("VpcGatewayAttachment"),
            )?;
            template.add(
                &format!("PrivateRouteTable{}", index),
                Resource::new(
                    "AWS::EC2::RouteTable",
                    json!({
                        "VpcId": reference("Vpc"),
                        "Tags": named_tags(app, env, &format!("{}-private-rt-{}", prefix, index)),
                    }),
                ),
            )?;
            template.add(
                &format!("PrivateDefaultRoute{}", index),
                Resource::new(
                    "AWS::EC2::Route",
                    json!({
                        "RouteTableId": reference(&format!("PrivateRouteTable{}", index)),
                        "DestinationCidrBlock": "0.0.0.0/0",
                        "NatGatewayId": reference(&format!("NatGateway{}", index)),
                    }),
                ),
            )?;
        }

        for index in 1..=PRIVATE_SUBNET_CIDRS.len() {
            let route_table = index.min(nat_count);
            template.add(
                &format!("PrivateSubnet{}RouteTableAssociation", index),
                Resource::new(
                    "AWS::EC2::SubnetRouteTableAssociation",
                    json!({
                        "SubnetId": reference(&format!("PrivateSubnet{}", index)),
                        "RouteTableId": reference(&format!("PrivateRouteTable{}", route_table)),
                    }),
                ),
            )?;
        }

        template.add_output(
            "VpcId",
            TemplateOutput::new(reference("Vpc"), "VPC id").exported(&self.exports.vpc_id()),
        );
        template.add_output(
            "PublicSubnetIds",
            TemplateOutput::new(
                join(",", vec![reference("PublicSubnet1"), reference("PublicSubnet2")]),
                "Public subnet ids",
            )
            .exported(&self.exports.public_subnet_ids()),
        );
        template.add_output(
            "PrivateSubnetIds",
            TemplateOutput::new(
                join(",", vec![reference("PrivateSubnet1"), reference("PrivateSubnet2")]),
                "Private subnet ids",
            )
            .exported(&self.exports.private_subnet_ids()),
        );

        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::test_support::config_for;

    #[test]
    fn test_network_has_two_az_subnet_layout() {
        let template = NetworkStack::new(&config_for("dev")).synthesize().unwrap();

        assert_eq!(template.resource_count_of("AWS::EC2::VPC"), 1);
        assert_eq!(template.resource_count_of("AWS::EC2::Subnet"), 4);
        assert!(template.has_resource_properties(
            "AWS::EC2::VPC",
            &json!({ "CidrBlock": "10.0.0.0/16", "EnableDnsHostnames": true })
        ));
    }

    #[test]
    fn test_dev_uses_single_nat_gateway() {
        let template = NetworkStack::new(&config_for("dev")).synthesize().unwrap();

        assert_eq!(template.resource_count_of("AWS::EC2::NatGateway"), 1);
        // Both private subnets share the single private route table
        assert!(template.has_resource_properties(
            "AWS::EC2::SubnetRouteTableAssociation",
            &json!({
                "SubnetId": { "Ref": "PrivateSubnet2" },
                "RouteTableId": { "Ref": "PrivateRouteTable1" }
            })
        ));
    }

    #[test]
    fn test_production_uses_nat_gateway_per_az() {
        let template = NetworkStack::new(&config_for("production"))
            .synthesize()
            .unwrap();

        assert_eq!(template.resource_count_of("AWS::EC2::NatGateway"), 2);
        assert!(template.has_resource_properties(
            "AWS::EC2::SubnetRouteTableAssociation",
            &json!({
                "SubnetId": { "Ref": "PrivateSubnet2" },
                "RouteTableId": { "Ref": "PrivateRouteTable2" }
            })
        ));
    }

    #[test]
    fn test_exports_cover_vpc_and_subnets() {
        let template = NetworkStack::new(&config_for("dev")).synthesize().unwrap();
        let json = template.to_json();

        assert_eq!(
            json["Outputs"]["VpcId"]["Export"]["Name"],
            "testapp-dev-vpc-id"
        );
        assert_eq!(
            json["Outputs"]["PrivateSubnetIds"]["Export"]["Name"],
            "testapp-dev-private-subnet-ids"
        );
    }
}
