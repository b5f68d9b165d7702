//! Self-termination of a provisioning instance.
//!
//! Once the main sequence has ended and the completion signal went out, the
//! instance waits for buffered logs to flush and then scales its own scaling
//! group to zero. The permission to do so is scoped by a tag carrying the
//! instance's unique id, so it can never resize any other group.

use crate::deployment::ResourceId;
use crate::iam::{InstanceRole, PolicyStatement};
use crate::logs::LogAgentConfig;
use crate::script::CommandSequence;
use farmstead_shared::errors::FarmsteadResult;
use std::collections::BTreeMap;

pub const TERMINATION_TAG_KEY: &str = "resourceLogicalId";
pub const GROUP_NAME_TAG: &str = "aws:autoscaling:groupName";
pub const UPDATE_GROUP_ACTION: &str = "autoscaling:UpdateAutoScalingGroup";
pub const DESCRIBE_TAGS_ACTION: &str = "ec2:DescribeTags";

const METADATA_ENDPOINT: &str = "http://169.254.169.254/latest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfTerminationGuard {
    tag_value: String,
    region: String,
    grace_minutes: u64,
}

impl SelfTerminationGuard {
    pub fn new(instance: &ResourceId, region: impl Into<String>, logs: &LogAgentConfig) -> Self {
        Self {
            tag_value: instance.unique_id(),
            region: region.into(),
            grace_minutes: logs.grace_period_minutes(),
        }
    }

    pub fn tag(&self) -> (&'static str, &str) {
        (TERMINATION_TAG_KEY, &self.tag_value)
    }

    /// Resize permission bound to the tag, plus the tag lookup it needs.
    pub fn statements(&self) -> [PolicyStatement; 2] {
        [
            PolicyStatement::allow([UPDATE_GROUP_ACTION], ["*"]).with_condition(
                "StringEquals",
                format!("autoscaling:ResourceTag/{}", TERMINATION_TAG_KEY),
                self.tag_value.clone(),
            ),
            PolicyStatement::allow([DESCRIBE_TAGS_ACTION], ["*"]),
        ]
    }

    /// Grace sleep, self-identification, capacity to zero.
    pub fn commands(&self) -> Vec<String> {
        vec![
            format!("sleep {}m", self.grace_minutes),
            format!(
                "TOKEN=$(curl -s -X PUT \"{}/api/token\" -H \"X-aws-ec2-metadata-token-ttl-seconds: 30\")",
                METADATA_ENDPOINT
            ),
            format!(
                "INSTANCE=\"$(curl -s -H \"X-aws-ec2-metadata-token: $TOKEN\" {}/meta-data/instance-id)\"",
                METADATA_ENDPOINT
            ),
            format!(
                "ASG=\"$(aws --region {} ec2 describe-tags --filters \"Name=resource-id,Values=${{INSTANCE}}\" \"Name=key,Values={}\" --query \"Tags[0].Value\" --output text)\"",
                self.region, GROUP_NAME_TAG
            ),
            format!(
                "aws --region {} autoscaling update-auto-scaling-group --auto-scaling-group-name \"${{ASG}}\" --min-size 0 --max-size 0 --desired-capacity 0",
                self.region
            ),
        ]
    }

    /// Tag the group, grant the role, and append the on-exit block.
    pub fn apply(
        &self,
        tags: &mut BTreeMap<String, String>,
        role: &mut InstanceRole,
        sequence: &mut CommandSequence,
    ) -> FarmsteadResult<()> {
        sequence.add_on_exit_commands(self.commands())?;
        let (key, value) = self.tag();
        tags.insert(key.to_string(), value.to_string());
        for statement in self.statements() {
            role.add_to_policy(statement);
        }
        tracing::debug!(
            tag = %self.tag_value,
            grace_minutes = self.grace_minutes,
            "Self-termination armed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::LogOptions;

    fn guard(flush_secs: u64) -> SelfTerminationGuard {
        let logs = LogAgentConfig::for_provisioning(&LogOptions {
            flush_interval_secs: flush_secs,
            ..Default::default()
        });
        let id = crate::deployment::Deployment::new("Farm", "eu-west-1")
            .unwrap()
            .add_resource("Farm/Registration")
            .unwrap();
        SelfTerminationGuard::new(&id, "eu-west-1", &logs)
    }

    #[test]
    fn test_commands_in_order() {
        let commands = guard(15).commands();
        let position = |needle: &str| commands.iter().position(|c| c.contains(needle)).unwrap();

        assert_eq!(commands[0], "sleep 1m");
        assert!(position("sleep") < position("describe-tags"));
        assert!(position("describe-tags") < position("update-auto-scaling-group"));
        assert!(commands[4].contains("--min-size 0 --max-size 0 --desired-capacity 0"));
        assert!(commands[3].contains("--region eu-west-1"));
    }

    #[test]
    fn test_grace_period_follows_flush_interval() {
        assert_eq!(guard(150).commands()[0], "sleep 3m");
    }

    #[test]
    fn test_resize_permission_scoped_by_tag() {
        let guard = guard(15);
        let [resize, describe] = guard.statements();
        let (key, value) = guard.tag();

        assert_eq!(key, "resourceLogicalId");
        assert_eq!(
            resize.conditions["StringEquals"]["autoscaling:ResourceTag/resourceLogicalId"],
            value
        );
        assert!(describe.conditions.is_empty());
        assert!(describe.has_action("ec2:DescribeTags"));
    }

    #[test]
    fn test_apply_after_seal_fails() {
        let guard = guard(15);
        let mut sequence = CommandSequence::new();
        sequence.render().unwrap();
        let mut tags = BTreeMap::new();
        let mut role = InstanceRole::default();

        assert!(guard.apply(&mut tags, &mut role, &mut sequence).is_err());
        assert!(tags.is_empty());
        assert!(role.statements().is_empty());
    }
}
