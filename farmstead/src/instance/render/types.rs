//! Shared state of one render run.

use crate::deployment::{CompletionSignal, ResourceId};
use crate::iam::{InstanceRole, PolicyDocument};
use crate::instance::group::ScalingGroupSpec;
use crate::instance::state::StageTrail;
use crate::logs::LogAgentConfig;
use crate::options::InstanceOptions;
use crate::script::{CommandSequence, ScriptItem};
use std::collections::BTreeMap;

/// Everything the render tasks read, plus the slots they fill.
///
/// Inputs are snapshots of the instance, so a failed render leaves the
/// instance untouched.
pub(crate) struct RenderContext {
    pub instance_id: ResourceId,
    pub group_id: String,
    pub stack_name: String,
    pub region: String,
    pub options: InstanceOptions,
    pub signal: CompletionSignal,
    pub setup: Vec<ScriptItem>,
    /// Extra (name, file path) log streams.
    pub log_streams: Vec<(String, String)>,

    pub sequence: CommandSequence,
    pub role: InstanceRole,
    pub tags: BTreeMap<String, String>,
    pub trail: StageTrail,

    pub log_config: Option<LogAgentConfig>,
    pub script: Option<String>,
    pub policy_output: Option<PolicyDocument>,
    pub group_output: Option<ScalingGroupSpec>,
}

impl RenderContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance_id: ResourceId,
        group_id: String,
        stack_name: String,
        region: String,
        options: InstanceOptions,
        signal: CompletionSignal,
        setup: Vec<ScriptItem>,
        log_streams: Vec<(String, String)>,
        role: InstanceRole,
    ) -> Self {
        let trail = StageTrail::new(options.self_terminate);
        Self {
            instance_id,
            group_id,
            stack_name,
            region,
            options,
            signal,
            setup,
            log_streams,
            sequence: CommandSequence::new(),
            role,
            tags: BTreeMap::new(),
            trail,
            log_config: None,
            script: None,
            policy_output: None,
            group_output: None,
        }
    }
}
