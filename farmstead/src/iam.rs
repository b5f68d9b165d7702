//! Permission grants attached to a provisioning instance's role.
//!
//! Statement construction for the wider system lives elsewhere; this is the
//! minimal shape the orchestrator needs to express its own grants.

use serde::Serialize;
use std::collections::BTreeMap;

pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// `Condition` block: operator → (key → value).
pub type Conditions = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub effect: Effect,
    #[serde(rename = "Action")]
    pub actions: Vec<String>,
    #[serde(rename = "Resource")]
    pub resources: Vec<String>,
    #[serde(rename = "Condition", skip_serializing_if = "BTreeMap::is_empty")]
    pub conditions: Conditions,
}

impl PolicyStatement {
    pub fn allow<A, R>(actions: A, resources: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            effect: Effect::Allow,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
            conditions: Conditions::new(),
        }
    }

    pub fn with_condition(
        mut self,
        operator: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.conditions
            .entry(operator.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    pub fn has_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: &'static str,
    #[serde(rename = "Statement")]
    pub statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn find_action(&self, action: &str) -> Option<&PolicyStatement> {
        self.statements.iter().find(|s| s.has_action(action))
    }
}

/// Role assumed by the instance. Grants accumulate until render.
#[derive(Debug, Clone, Default)]
pub struct InstanceRole {
    statements: Vec<PolicyStatement>,
}

impl InstanceRole {
    pub fn add_to_policy(&mut self, statement: PolicyStatement) {
        if !self.statements.contains(&statement) {
            self.statements.push(statement);
        }
    }

    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    pub fn document(&self) -> PolicyDocument {
        PolicyDocument {
            version: POLICY_VERSION,
            statements: self.statements.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_json_shape() {
        let statement = PolicyStatement::allow(["autoscaling:UpdateAutoScalingGroup"], ["*"])
            .with_condition("StringEquals", "autoscaling:ResourceTag/resourceLogicalId", "X");
        let json = serde_json::to_value(&statement).unwrap();

        assert_eq!(json["Effect"], "Allow");
        assert_eq!(json["Action"][0], "autoscaling:UpdateAutoScalingGroup");
        assert_eq!(json["Resource"][0], "*");
        assert_eq!(
            json["Condition"]["StringEquals"]["autoscaling:ResourceTag/resourceLogicalId"],
            "X"
        );
    }

    #[test]
    fn test_unconditioned_statement_omits_condition() {
        let json = serde_json::to_value(PolicyStatement::allow(["ec2:DescribeTags"], ["*"])).unwrap();
        assert!(json.get("Condition").is_none());
    }

    #[test]
    fn test_role_skips_identical_grants() {
        let mut role = InstanceRole::default();
        role.add_to_policy(PolicyStatement::allow(["ec2:DescribeTags"], ["*"]));
        role.add_to_policy(PolicyStatement::allow(["ec2:DescribeTags"], ["*"]));
        assert_eq!(role.statements().len(), 1);

        let doc = serde_json::to_value(role.document()).unwrap();
        assert_eq!(doc["Version"], POLICY_VERSION);
        assert_eq!(doc["Statement"].as_array().unwrap().len(), 1);
    }
}
