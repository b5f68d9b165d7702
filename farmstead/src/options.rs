//! Options for provisioning instances.
//!
//! Options are plain data, loadable from TOML, and checked by `sanitize()`
//! before anything is built from them.

use crate::deployment::{DEFAULT_EXECUTION_TIMEOUT, MAX_EXECUTION_TIMEOUT};
use farmstead_shared::errors::{FarmsteadError, FarmsteadResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_INSTANCE_TYPE: &str = "t3.small";
pub const DEFAULT_MACHINE_IMAGE: &str =
    "resolve:ssm:/aws/service/ami-amazon-linux-latest/amzn2-ami-hvm-x86_64-gp2";
pub const DEFAULT_LOG_GROUP: &str = "farmstead-provisioning";
pub const DEFAULT_LOG_FLUSH_INTERVAL_SECS: u64 = 15;

/// Scaling-group capacity. Provisioning instances only accept 1/1/1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityBounds {
    pub min: u32,
    pub max: u32,
    pub desired: u32,
}

impl Default for CapacityBounds {
    fn default() -> Self {
        Self::SINGLE
    }
}

impl CapacityBounds {
    pub const SINGLE: CapacityBounds = CapacityBounds {
        min: 1,
        max: 1,
        desired: 1,
    };

    pub fn validate(&self) -> FarmsteadResult<()> {
        if *self != Self::SINGLE {
            return Err(FarmsteadError::Config(format!(
                "provisioning instance capacity must be min=max=desired=1, got min={} max={} desired={}",
                self.min, self.max, self.desired
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    pub group_name: String,
    /// Prepended to every stream name, e.g. `registration-`.
    pub stream_prefix: String,
    pub retention_days: Option<u32>,
    pub flush_interval_secs: u64,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            group_name: DEFAULT_LOG_GROUP.to_string(),
            stream_prefix: String::new(),
            retention_days: None,
            flush_interval_secs: DEFAULT_LOG_FLUSH_INTERVAL_SECS,
        }
    }
}

impl LogOptions {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceOptions {
    pub name: String,
    /// Subnets the scaling group may place the instance in.
    pub subnets: Vec<String>,
    #[serde(default)]
    pub security_group: Option<String>,
    #[serde(default = "default_machine_image")]
    pub machine_image: String,
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    #[serde(default)]
    pub key_name: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub execution_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub self_terminate: bool,
    #[serde(default)]
    pub capacity: CapacityBounds,
    #[serde(default)]
    pub logs: LogOptions,
}

fn default_machine_image() -> String {
    DEFAULT_MACHINE_IMAGE.to_string()
}

fn default_instance_type() -> String {
    DEFAULT_INSTANCE_TYPE.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_EXECUTION_TIMEOUT.as_secs()
}

fn default_true() -> bool {
    true
}

impl InstanceOptions {
    pub fn new(name: impl Into<String>, subnets: Vec<String>) -> Self {
        Self {
            name: name.into(),
            subnets,
            security_group: None,
            machine_image: default_machine_image(),
            instance_type: default_instance_type(),
            key_name: None,
            execution_timeout_secs: default_timeout_secs(),
            self_terminate: true,
            capacity: CapacityBounds::default(),
            logs: LogOptions::default(),
        }
    }

    pub fn from_toml_str(source: &str) -> FarmsteadResult<Self> {
        let options: Self = toml::from_str(source)?;
        options.sanitize()?;
        Ok(options)
    }

    pub fn load(path: &Path) -> FarmsteadResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            FarmsteadError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    pub fn with_self_terminate(mut self, self_terminate: bool) -> Self {
        self.self_terminate = self_terminate;
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout_secs = timeout.as_secs();
        self
    }

    pub fn sanitize(&self) -> FarmsteadResult<()> {
        if self.name.trim().is_empty() {
            return Err(FarmsteadError::Config("instance name must not be empty".into()));
        }
        if self.subnets.is_empty() {
            return Err(FarmsteadError::Config(format!(
                "instance {} needs at least one subnet",
                self.name
            )));
        }
        if self.instance_type.is_empty() || self.machine_image.is_empty() {
            return Err(FarmsteadError::Config(format!(
                "instance {} needs an instance type and a machine image",
                self.name
            )));
        }
        self.capacity.validate()?;

        let timeout = self.execution_timeout();
        if timeout.is_zero() || timeout > MAX_EXECUTION_TIMEOUT {
            return Err(FarmsteadError::Config(format!(
                "execution timeout must be between 1s and {}s, got {}s",
                MAX_EXECUTION_TIMEOUT.as_secs(),
                self.execution_timeout_secs
            )));
        }
        if self.logs.group_name.is_empty() {
            return Err(FarmsteadError::Config("log group name must not be empty".into()));
        }
        if self.logs.flush_interval_secs == 0 {
            return Err(FarmsteadError::Config(
                "log flush interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
