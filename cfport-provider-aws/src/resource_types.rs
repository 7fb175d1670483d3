//! CloudFormation to Terraform resource type mapping

/// CloudFormation types with no Terraform resource
pub const UNSUPPORTED_RESOURCES: &[&str] = &[
    "AWS::CDK::Metadata",
    "AWS::CloudFormation::CustomResource",
    "AWS::CloudFormation::WaitCondition",
    "AWS::CloudFormation::WaitConditionHandle",
];

const RESOURCE_TYPES: &[(&str, &str)] = &[
    ("AWS::ApiGateway::Deployment", "aws_api_gateway_deployment"),
    ("AWS::ApiGateway::Method", "aws_api_gateway_method"),
    ("AWS::ApiGateway::Resource", "aws_api_gateway_resource"),
    ("AWS::ApiGateway::RestApi", "aws_api_gateway_rest_api"),
    ("AWS::ApiGateway::Stage", "aws_api_gateway_stage"),
    ("AWS::AutoScaling::AutoScalingGroup", "aws_autoscaling_group"),
    ("AWS::AutoScaling::LaunchConfiguration", "aws_launch_configuration"),
    ("AWS::CloudFormation::Stack", "aws_cloudformation_stack"),
    ("AWS::CloudFront::Distribution", "aws_cloudfront_distribution"),
    ("AWS::CloudWatch::Alarm", "aws_cloudwatch_metric_alarm"),
    ("AWS::DynamoDB::Table", "aws_dynamodb_table"),
    ("AWS::EC2::EIP", "aws_eip"),
    ("AWS::EC2::Instance", "aws_instance"),
    ("AWS::EC2::InternetGateway", "aws_internet_gateway"),
    ("AWS::EC2::LaunchTemplate", "aws_launch_template"),
    ("AWS::EC2::NatGateway", "aws_nat_gateway"),
    ("AWS::EC2::Route", "aws_route"),
    ("AWS::EC2::RouteTable", "aws_route_table"),
    ("AWS::EC2::SecurityGroup", "aws_security_group"),
    ("AWS::EC2::SecurityGroupEgress", "aws_security_group_rule"),
    ("AWS::EC2::SecurityGroupIngress", "aws_security_group_rule"),
    ("AWS::EC2::Subnet", "aws_subnet"),
    ("AWS::EC2::SubnetRouteTableAssociation", "aws_route_table_association"),
    ("AWS::EC2::VPC", "aws_vpc"),
    ("AWS::EC2::VPCEndpoint", "aws_vpc_endpoint"),
    ("AWS::EC2::VPCGatewayAttachment", "aws_internet_gateway_attachment"),
    ("AWS::EC2::Volume", "aws_ebs_volume"),
    ("AWS::ECR::Repository", "aws_ecr_repository"),
    ("AWS::ECS::Cluster", "aws_ecs_cluster"),
    ("AWS::ECS::Service", "aws_ecs_service"),
    ("AWS::ECS::TaskDefinition", "aws_ecs_task_definition"),
    ("AWS::ElasticLoadBalancingV2::Listener", "aws_lb_listener"),
    ("AWS::ElasticLoadBalancingV2::LoadBalancer", "aws_lb"),
    ("AWS::ElasticLoadBalancingV2::TargetGroup", "aws_lb_target_group"),
    ("AWS::Events::Rule", "aws_cloudwatch_event_rule"),
    ("AWS::IAM::InstanceProfile", "aws_iam_instance_profile"),
    ("AWS::IAM::ManagedPolicy", "aws_iam_policy"),
    ("AWS::IAM::Policy", "aws_iam_policy"),
    ("AWS::IAM::Role", "aws_iam_role"),
    ("AWS::IAM::User", "aws_iam_user"),
    ("AWS::KMS::Alias", "aws_kms_alias"),
    ("AWS::KMS::Key", "aws_kms_key"),
    ("AWS::Kinesis::Stream", "aws_kinesis_stream"),
    ("AWS::Lambda::EventSourceMapping", "aws_lambda_event_source_mapping"),
    ("AWS::Lambda::Function", "aws_lambda_function"),
    ("AWS::Lambda::Permission", "aws_lambda_permission"),
    ("AWS::Logs::LogGroup", "aws_cloudwatch_log_group"),
    ("AWS::RDS::DBInstance", "aws_db_instance"),
    ("AWS::RDS::DBSubnetGroup", "aws_db_subnet_group"),
    ("AWS::Route53::HostedZone", "aws_route53_zone"),
    ("AWS::Route53::RecordSet", "aws_route53_record"),
    ("AWS::S3::Bucket", "aws_s3_bucket"),
    ("AWS::S3::BucketPolicy", "aws_s3_bucket_policy"),
    ("AWS::SNS::Subscription", "aws_sns_topic_subscription"),
    ("AWS::SNS::Topic", "aws_sns_topic"),
    ("AWS::SNS::TopicPolicy", "aws_sns_topic_policy"),
    ("AWS::SQS::Queue", "aws_sqs_queue"),
    ("AWS::SQS::QueuePolicy", "aws_sqs_queue_policy"),
    ("AWS::SSM::Parameter", "aws_ssm_parameter"),
    ("AWS::SecretsManager::Secret", "aws_secretsmanager_secret"),
    ("AWS::StepFunctions::StateMachine", "aws_sfn_state_machine"),
];

/// Terraform type for a CloudFormation type, if Terraform has one
pub fn terraform_type(cloudformation_type: &str) -> Option<&'static str> {
    if is_unsupported(cloudformation_type) {
        return None;
    }
    RESOURCE_TYPES
        .iter()
        .find(|(cf, _)| *cf == cloudformation_type)
        .map(|(_, tf)| *tf)
}

/// Custom resources and the types listed in [`UNSUPPORTED_RESOURCES`]
pub fn is_unsupported(cloudformation_type: &str) -> bool {
    cloudformation_type.starts_with("Custom::") || UNSUPPORTED_RESOURCES.contains(&cloudformation_type)
}
