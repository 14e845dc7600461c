//! Template synthesis.
//!
//! Renders a stack graph as a CloudFormation-style JSON template: one entry
//! per resource with `Ref` / `Fn::GetAtt` wherever a declaration holds a
//! handle, explicit `DependsOn`, and the named outputs.

use serde_json::{json, Map, Value};

use stack_types::{
    Attribute, ComparisonOperator, ComputePool, Declaration, Environment, ExecutionRole,
    ExperimentTemplate, LoadBalancerFront, LogicalId, NetworkBoundary, OutputValue, SafetyAlarm,
    Statistic, INSTANCES_TARGET_KEY,
};

use crate::graph::StackGraph;
use crate::policy::{policy_document, trust_document};

/// Template format version emitted.
pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Tag the pool stamps on its instances; selectors use it for membership.
const GROUP_NAME_TAG: &str = "aws:autoscaling:groupName";

/// Render the whole graph.
pub fn synthesize(graph: &StackGraph) -> Value {
    let env = graph.environment();
    let mut resources = Map::new();
    for node in graph.nodes() {
        let mut entry = Map::new();
        entry.insert(
            "Type".into(),
            json!(node.declaration.kind().cloudformation_type()),
        );
        entry.insert("Properties".into(), properties(env, &node.id, &node.declaration));
        if !node.dependencies.is_empty() {
            let depends: Vec<&str> = node.dependencies.iter().map(|d| d.as_str()).collect();
            entry.insert("DependsOn".into(), json!(depends));
        }
        entry.insert(
            "Metadata".into(),
            json!({ "chaos-stack:fingerprint": node.fingerprint }),
        );
        resources.insert(node.id.to_string(), Value::Object(entry));
    }

    let mut outputs = Map::new();
    for (name, value) in graph.outputs() {
        outputs.insert(name.clone(), json!({ "Value": output_value(value) }));
    }

    json!({
        "AWSTemplateFormatVersion": TEMPLATE_FORMAT_VERSION,
        "Description": format!(
            "Chaos engineering test environment ({} / {})",
            env.account, env.region
        ),
        "Resources": resources,
        "Outputs": outputs,
    })
}

fn reference(id: &LogicalId) -> Value {
    json!({ "Ref": id.as_str() })
}

fn get_att(id: &LogicalId, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [id.as_str(), attribute] })
}

fn output_value(value: &OutputValue) -> Value {
    match value.attribute {
        Attribute::Ref => reference(&value.resource.id),
        attribute => get_att(&value.resource.id, attribute.as_str()),
    }
}

fn properties(env: &Environment, id: &LogicalId, declaration: &Declaration) -> Value {
    match declaration {
        Declaration::NetworkBoundary(n) => network(n),
        Declaration::ComputePool(p) => pool(p),
        Declaration::LoadBalancerFront(b) => balancer(b),
        Declaration::SafetyAlarm(a) => alarm(a),
        Declaration::ExecutionRole(r) => role(id, r),
        Declaration::ExperimentTemplate(t) => experiment(env, t),
    }
}

fn network(network: &NetworkBoundary) -> Value {
    let subnets: Vec<Value> = network
        .subnet_layout()
        .unwrap_or_default()
        .into_iter()
        .map(|(zone, spec, cidr)| {
            json!({
                "Name": format!("{}{}", spec.name, zone + 1),
                "AvailabilityZone": { "Fn::Select": [zone, { "Fn::GetAZs": "" }] },
                "CidrBlock": cidr.to_string(),
                "MapPublicIpOnLaunch": true,
            })
        })
        .collect();
    json!({
        "CidrBlock": network.cidr.to_string(),
        "EnableDnsHostnames": true,
        "EnableDnsSupport": true,
        "Subnets": subnets,
    })
}

fn pool(pool: &ComputePool) -> Value {
    let mut props = json!({
        "MinSize": pool.min_size.to_string(),
        "MaxSize": pool.max_size.to_string(),
        "DesiredCapacity": pool.initial_size().to_string(),
        "VPCZoneIdentifier": reference(pool.network.id()),
        "LaunchTemplate": {
            "InstanceType": pool.shape.to_string(),
            "ImageId": format!("{{{{resolve:ssm:{}}}}}", pool.image.ssm_parameter()),
            "UserData": { "Fn::Base64": pool.boot_script.render() },
        },
        "Tags": pool.tags.iter().map(|(k, v)| json!({
            "Key": k,
            "Value": v,
            "PropagateAtLaunch": true,
        })).collect::<Vec<_>>(),
        "ScalingPolicies": pool.scaling_rules.iter().map(|r| json!({
            "PolicyName": r.name,
            "PolicyType": "TargetTrackingScaling",
            "PredefinedMetricType": "ALBRequestCountPerTarget",
            "TargetValue": r.target_requests_per_minute,
        })).collect::<Vec<_>>(),
    });
    if pool.group_metrics {
        props["MetricsCollection"] = json!([{ "Granularity": "1Minute" }]);
    }
    props
}

fn balancer(balancer: &LoadBalancerFront) -> Value {
    let hc = &balancer.health_check;
    json!({
        "Type": "application",
        "Scheme": if balancer.internet_facing { "internet-facing" } else { "internal" },
        "Subnets": reference(balancer.network.id()),
        "Listeners": [{
            "Port": balancer.listener_port,
            "Protocol": "HTTP",
            "DefaultActions": [{
                "Type": "forward",
                "TargetGroup": {
                    "Port": balancer.target_port,
                    "Protocol": "HTTP",
                    "Targets": reference(balancer.target.id()),
                    "HealthCheckPath": hc.path,
                    "HealthCheckIntervalSeconds": hc.interval.as_secs(),
                    "HealthyThresholdCount": hc.healthy_threshold,
                    "UnhealthyThresholdCount": hc.unhealthy_threshold,
                },
            }],
        }],
        "SecurityGroupIngress": balancer.ingress.iter().map(|r| json!({
            "IpProtocol": "tcp",
            "CidrIp": r.cidr,
            "FromPort": r.port,
            "ToPort": r.port,
            "Description": r.description,
        })).collect::<Vec<_>>(),
    })
}

fn statistic_name(statistic: Statistic) -> &'static str {
    match statistic {
        Statistic::Maximum => "Maximum",
        Statistic::Minimum => "Minimum",
        Statistic::Average => "Average",
        Statistic::Sum => "Sum",
    }
}

fn comparison_name(comparison: ComparisonOperator) -> &'static str {
    match comparison {
        ComparisonOperator::GreaterThanOrEqualToThreshold => "GreaterThanOrEqualToThreshold",
        ComparisonOperator::GreaterThanThreshold => "GreaterThanThreshold",
        ComparisonOperator::LessThanThreshold => "LessThanThreshold",
        ComparisonOperator::LessThanOrEqualToThreshold => "LessThanOrEqualToThreshold",
    }
}

fn alarm(alarm: &SafetyAlarm) -> Value {
    json!({
        "Namespace": alarm.metric.namespace,
        "MetricName": alarm.metric.name,
        "Dimensions": [{
            "Name": "AutoScalingGroupName",
            "Value": reference(alarm.metric.pool.id()),
        }],
        "Statistic": statistic_name(alarm.statistic),
        "Period": alarm.period.as_secs(),
        "Threshold": alarm.threshold,
        "ComparisonOperator": comparison_name(alarm.comparison),
        "EvaluationPeriods": alarm.evaluation_periods,
        "DatapointsToAlarm": alarm.datapoints_to_alarm,
        "TreatMissingData": alarm.missing_data.as_str(),
    })
}

fn role(id: &LogicalId, role: &ExecutionRole) -> Value {
    json!({
        "AssumeRolePolicyDocument": trust_document(role),
        "Policies": [{
            "PolicyName": format!("{}Policy", id),
            "PolicyDocument": policy_document(role),
        }],
    })
}

fn experiment(env: &Environment, template: &ExperimentTemplate) -> Value {
    let mut targets = Map::new();
    for (name, target) in &template.targets {
        let mut tags = Map::new();
        for (k, v) in &target.resource_tags {
            tags.insert(k.clone(), json!(v));
        }
        tags.insert(GROUP_NAME_TAG.into(), reference(target.pool.id()));
        let states: Vec<&str> = target.state_filter.iter().map(|s| s.as_str()).collect();
        targets.insert(
            name.clone(),
            json!({
                "ResourceType": target.resource_type.as_str(),
                "SelectionMode": target.selection_mode.to_string(),
                "ResourceTags": tags,
                "Filters": [{ "Path": "State.Name", "Values": states }],
            }),
        );
    }

    let mut actions = Map::new();
    for (name, action) in &template.actions {
        actions.insert(
            name.clone(),
            json!({
                "ActionId": action.action.action_id(),
                "Parameters": action.parameters,
                "Targets": { INSTANCES_TARGET_KEY: action.target_binding },
            }),
        );
    }

    let stop_conditions: Vec<Value> = template
        .stop_conditions
        .iter()
        .map(|c| {
            json!({
                "Source": c.source.as_str(),
                "Value": get_att(c.alarm.id(), "Arn"),
            })
        })
        .collect();

    let mut tags = template.tags.clone();
    tags.entry("Name".into())
        .or_insert_with(|| format!("chaos-{}", env.region));

    json!({
        "Description": template.description,
        "RoleArn": get_att(template.role.id(), "Arn"),
        "StopConditions": stop_conditions,
        "Targets": targets,
        "Actions": actions,
        "Tags": tags,
    })
}
