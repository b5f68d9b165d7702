//! Scaling-group declaration emitted for a provisioning instance.

use crate::options::CapacityBounds;
use farmstead_shared::errors::FarmsteadResult;
use serde::Serialize;
use std::collections::BTreeMap;

/// How the controller waits for the group to come up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreationPolicy {
    pub count: u32,
    /// ISO-8601 duration.
    pub timeout: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScalingGroupSpec {
    pub logical_id: String,
    pub min_size: u32,
    pub max_size: u32,
    pub desired_capacity: u32,
    pub subnets: Vec<String>,
    pub instance_type: String,
    pub machine_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_group: Option<String>,
    pub tags: BTreeMap<String, String>,
    /// Base64 of the rendered boot script.
    pub user_data: String,
    pub creation_policy: CreationPolicy,
}

impl ScalingGroupSpec {
    pub fn capacity(&self) -> CapacityBounds {
        CapacityBounds {
            min: self.min_size,
            max: self.max_size,
            desired: self.desired_capacity,
        }
    }

    pub fn to_json(&self) -> FarmsteadResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
