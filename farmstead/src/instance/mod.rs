//! Single-shot provisioning instances.
//!
//! A [`ProvisioningInstance`] is a one-machine scaling group that runs a boot
//! script once, reports the outcome to the controller, and then either scales
//! itself to zero or stays up for inspection. Features contribute setup
//! commands and grants until [`ProvisioningInstance::render`] seals it.

mod group;
mod render;
mod state;
pub mod termination;

pub use group::{CreationPolicy, ScalingGroupSpec};
pub use state::{BootStage, StageTrail};
pub use termination::SelfTerminationGuard;

use crate::deployment::{CompletionSignal, Deployment, ResourceId};
use crate::iam::{InstanceRole, PolicyDocument, PolicyStatement};
use crate::logs::LogAgentConfig;
use crate::options::{CapacityBounds, InstanceOptions};
use crate::pipeline::{PipelineExecutor, PipelineMetrics};
use crate::script::{LazyCommand, ScriptItem};
use farmstead_shared::errors::{FarmsteadError, FarmsteadResult};
use render::types::RenderContext;
use std::sync::Arc;
use tokio::sync::Mutex;

const GROUP_CHILD: &str = "Group";

/// Output of a render: everything needed to deploy the instance.
#[derive(Debug, Clone)]
pub struct RenderedInstance {
    pub instance_id: ResourceId,
    /// Plain-text boot script.
    pub script: String,
    pub scaling_group: ScalingGroupSpec,
    pub policy: PolicyDocument,
    pub log_config: serde_json::Value,
    pub signal: CompletionSignal,
    /// Resources that must be ready before this instance boots.
    pub dependencies: Vec<ResourceId>,
    pub stages: Vec<BootStage>,
    pub metrics: PipelineMetrics,
}

impl RenderedInstance {
    pub fn user_data(&self) -> &str {
        &self.scaling_group.user_data
    }

    pub fn capacity(&self) -> CapacityBounds {
        self.scaling_group.capacity()
    }
}

pub struct ProvisioningInstance {
    id: ResourceId,
    deployment: Deployment,
    options: InstanceOptions,
    signal: CompletionSignal,
    setup: Vec<ScriptItem>,
    log_streams: Vec<(String, String)>,
    role: InstanceRole,
    rendered: bool,
}

impl ProvisioningInstance {
    /// Declare a provisioning instance at `path` in `deployment`.
    pub fn new(deployment: &Deployment, path: &str, options: InstanceOptions) -> FarmsteadResult<Self> {
        options.sanitize()?;
        let signal = CompletionSignal::new(options.execution_timeout())?;
        let id = deployment.add_resource(path)?;

        tracing::debug!(
            instance = %id,
            name = %options.name,
            self_terminate = options.self_terminate,
            timeout = %signal.timeout_iso8601(),
            "Declared provisioning instance"
        );

        Ok(Self {
            id,
            deployment: deployment.clone(),
            options,
            signal,
            setup: Vec::new(),
            log_streams: Vec::new(),
            role: InstanceRole::default(),
            rendered: false,
        })
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn options(&self) -> &InstanceOptions {
        &self.options
    }

    pub fn completion_signal(&self) -> CompletionSignal {
        self.signal
    }

    /// Logical id of the scaling group, the target of the completion signal.
    pub fn group_logical_id(&self) -> String {
        self.id.child(GROUP_CHILD).unique_id()
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered
    }

    fn ensure_open(&self) -> FarmsteadResult<()> {
        if self.rendered {
            return Err(FarmsteadError::InvalidState(format!(
                "instance {} already rendered",
                self.id
            )));
        }
        if self.deployment.is_finalized() {
            return Err(FarmsteadError::InvalidState(format!(
                "deployment {} already finalized; instance {} can no longer change",
                self.deployment.stack_name(),
                self.id
            )));
        }
        Ok(())
    }

    pub fn add_setup_commands<I, S>(&mut self, commands: I) -> FarmsteadResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_open()?;
        self.setup
            .extend(commands.into_iter().map(|c| ScriptItem::Line(c.into())));
        Ok(())
    }

    /// Queue a command whose text is resolved when the script is rendered.
    pub fn add_lazy_setup_command(&mut self, command: Arc<dyn LazyCommand>) -> FarmsteadResult<()> {
        self.ensure_open()?;
        self.setup.push(ScriptItem::Lazy(command));
        Ok(())
    }

    /// Ship an extra file to the instance's log group.
    pub fn add_log_stream(&mut self, name: &str, file_path: &str) -> FarmsteadResult<()> {
        self.ensure_open()?;
        let entry = (name.to_string(), file_path.to_string());
        if !self.log_streams.contains(&entry) {
            self.log_streams.push(entry);
        }
        Ok(())
    }

    /// This instance must not boot before `resource` is ready.
    pub fn add_execution_dependency(&self, resource: &ResourceId) -> FarmsteadResult<()> {
        self.deployment.add_dependency(&self.id, resource)
    }

    pub fn grant(&mut self, statement: PolicyStatement) -> FarmsteadResult<()> {
        self.ensure_open()?;
        self.role.add_to_policy(statement);
        Ok(())
    }

    pub fn role(&self) -> &InstanceRole {
        &self.role
    }

    /// Render the boot script and deployable artifacts, sealing the instance.
    ///
    /// A failed render leaves the instance open and releases its lazy
    /// commands, so the caller can fix the cause and try again.
    pub async fn render(&mut self) -> FarmsteadResult<RenderedInstance> {
        self.ensure_open()?;

        let (rendered, role) = match self.run_render_plan().await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(instance = %self.id, error = %e, "Render failed");
                self.setup.iter().for_each(ScriptItem::release);
                return Err(e);
            }
        };

        self.rendered = true;
        self.role = role;
        tracing::info!(
            instance = %self.id,
            total_us = rendered.metrics.total_duration_us,
            stages = ?rendered.stages,
            "Rendered provisioning instance"
        );
        Ok(rendered)
    }

    async fn run_render_plan(&self) -> FarmsteadResult<(RenderedInstance, InstanceRole)> {
        let ctx = RenderContext::new(
            self.id.clone(),
            self.group_logical_id(),
            self.deployment.stack_name().to_string(),
            self.deployment.region().to_string(),
            self.options.clone(),
            self.signal,
            self.setup.clone(),
            self.log_streams.clone(),
            self.role.clone(),
        );
        let ctx = Arc::new(Mutex::new(ctx));

        let plan = render::get_execution_plan(self.options.self_terminate);
        let metrics = PipelineExecutor::execute(plan, Arc::clone(&ctx)).await?;
        metrics.log_stages();

        let mut ctx = ctx.lock().await;
        let script = ctx
            .script
            .take()
            .ok_or_else(|| FarmsteadError::Internal("seal_script task must run first".into()))?;
        let scaling_group = ctx
            .group_output
            .take()
            .ok_or_else(|| FarmsteadError::Internal("scaling_group task must run first".into()))?;
        let policy = ctx
            .policy_output
            .take()
            .ok_or_else(|| FarmsteadError::Internal("instance_policy task must run first".into()))?;
        let log_config = ctx
            .log_config
            .as_ref()
            .map(LogAgentConfig::to_json)
            .ok_or_else(|| {
                FarmsteadError::Internal("configure_logging task must run first".into())
            })?;
        let stages = ctx.trail.clone().into_stages();

        let rendered = RenderedInstance {
            instance_id: self.id.clone(),
            script,
            scaling_group,
            policy,
            log_config,
            signal: self.signal,
            dependencies: self.deployment.dependencies_of(&self.id),
            stages,
            metrics,
        };
        Ok((rendered, ctx.role.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::termination::UPDATE_GROUP_ACTION;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn instance(self_terminate: bool) -> ProvisioningInstance {
        let deployment = Deployment::new("FarmStack", "us-west-2").unwrap();
        let options = InstanceOptions::new("registration", vec!["subnet-a".into()])
            .with_self_terminate(self_terminate);
        ProvisioningInstance::new(&deployment, "FarmStack/Registration", options).unwrap()
    }

    fn position(script: &str, needle: &str) -> usize {
        script
            .find(needle)
            .unwrap_or_else(|| panic!("{needle} missing from script:\n{script}"))
    }

    #[tokio::test]
    async fn test_script_order_logging_setup_signal_termination() {
        let mut instance = instance(true);
        instance.add_setup_commands(["echo cmd1", "echo cmd2"]).unwrap();

        let rendered = instance.render().await.unwrap();
        let script = &rendered.script;

        let logging = position(script, "amazon-cloudwatch-agent-ctl");
        let cmd1 = position(script, "echo cmd1");
        let cmd2 = position(script, "echo cmd2");
        let signal = position(script, "cfn-signal");
        let termination = position(script, "update-auto-scaling-group");
        assert!(logging < cmd1);
        assert!(cmd1 < cmd2);
        assert!(cmd2 < signal);
        assert!(signal < termination);

        assert_eq!(rendered.stages, BootStage::sequence(true));
        assert_eq!(rendered.capacity(), CapacityBounds::SINGLE);
        assert_eq!(
            rendered.scaling_group.tags.get("resourceLogicalId"),
            Some(&instance.id().unique_id())
        );
    }

    #[tokio::test]
    async fn test_signal_targets_group_and_carries_timeout() {
        let mut instance = instance(true);
        let group = instance.group_logical_id();
        let rendered = instance.render().await.unwrap();

        assert!(rendered.script.contains(&format!("--resource {}", group)));
        assert!(rendered.script.contains("-e $exitCode"));
        assert_eq!(rendered.scaling_group.creation_policy.timeout, "PT15M");
        assert_eq!(rendered.scaling_group.creation_policy.count, 1);
    }

    #[tokio::test]
    async fn test_without_self_termination() {
        let mut instance = instance(false);
        instance.add_setup_commands(["echo hi"]).unwrap();
        let rendered = instance.render().await.unwrap();

        assert!(!rendered.script.contains("update-auto-scaling-group"));
        assert!(!rendered.script.contains("sleep "));
        assert!(rendered.policy.find_action(UPDATE_GROUP_ACTION).is_none());
        assert!(rendered.scaling_group.tags.is_empty());
        assert_eq!(rendered.stages.last(), Some(&BootStage::Idle));
        assert_eq!(rendered.metrics.stage_labels()[3], "idle");
    }

    #[tokio::test]
    async fn test_user_data_is_encoded_script() {
        use base64::Engine;
        let mut instance = instance(true);
        let rendered = instance.render().await.unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(rendered.user_data())
            .unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), rendered.script);
    }

    #[tokio::test]
    async fn test_render_seals_instance() {
        let mut instance = instance(true);
        instance.render().await.unwrap();

        assert!(instance.is_rendered());
        assert!(matches!(
            instance.render().await,
            Err(FarmsteadError::InvalidState(_))
        ));
        assert!(matches!(
            instance.add_setup_commands(["late"]),
            Err(FarmsteadError::InvalidState(_))
        ));
        assert!(instance.grant(PolicyStatement::allow(["s3:GetObject"], ["*"])).is_err());
    }

    struct Counter(Arc<AtomicUsize>);

    impl LazyCommand for Counter {
        fn render(&self) -> FarmsteadResult<String> {
            Ok(format!("echo count={}", self.0.load(Ordering::SeqCst)))
        }
    }

    #[tokio::test]
    async fn test_lazy_command_sees_state_at_render_time() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut instance = instance(true);
        instance
            .add_lazy_setup_command(Arc::new(Counter(Arc::clone(&count))))
            .unwrap();
        count.store(3, Ordering::SeqCst);

        let rendered = instance.render().await.unwrap();
        assert!(rendered.script.contains("echo count=3"));
    }

    struct Broken;

    impl LazyCommand for Broken {
        fn render(&self) -> FarmsteadResult<String> {
            Err(FarmsteadError::Config("missing input".into()))
        }
    }

    #[tokio::test]
    async fn test_failed_render_leaves_instance_open() {
        let mut instance = instance(true);
        instance.add_lazy_setup_command(Arc::new(Broken)).unwrap();

        assert!(instance.render().await.is_err());
        assert!(!instance.is_rendered());
        instance.add_setup_commands(["echo still open"]).unwrap();
    }

    #[tokio::test]
    async fn test_finalized_deployment_freezes_instance() {
        let mut instance = instance(true);
        instance.deployment().finalize().unwrap();

        assert!(matches!(
            instance.add_setup_commands(["late-cmd"]),
            Err(FarmsteadError::InvalidState(_))
        ));
        assert!(
            instance
                .add_lazy_setup_command(Arc::new(Counter(Arc::new(AtomicUsize::new(0)))))
                .is_err()
        );
        assert!(instance.grant(PolicyStatement::allow(["s3:GetObject"], ["*"])).is_err());
        assert!(instance.add_log_stream("late", "/var/log/late.log").is_err());
        assert!(matches!(
            instance.render().await,
            Err(FarmsteadError::InvalidState(_))
        ));
        assert!(!instance.is_rendered());
    }

    #[tokio::test]
    async fn test_extra_log_stream_and_dependencies() {
        let mut instance = instance(true);
        let directory = instance
            .deployment()
            .add_resource("FarmStack/Directory")
            .unwrap();
        instance.add_execution_dependency(&directory).unwrap();
        instance.add_log_stream("installer", "/var/log/installer.log").unwrap();

        let rendered = instance.render().await.unwrap();
        assert_eq!(rendered.dependencies, vec![directory]);
        let streams = rendered.log_config["logs"]["logs_collected"]["files"]["collect_list"]
            .as_array()
            .unwrap()
            .len();
        assert_eq!(streams, 2);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let deployment = Deployment::new("FarmStack", "us-west-2").unwrap();
        let mut options = InstanceOptions::new("registration", vec!["subnet-a".into()]);
        options.capacity.max = 2;
        assert!(ProvisioningInstance::new(&deployment, "FarmStack/Registration", options).is_err());
    }
}
