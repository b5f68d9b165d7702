//! Identity registration: a provisioning instance that applies registration
//! settings for every segment callers register before deployment.

use super::command::RegistrationCommand;
use super::store::RegistrationSettingsStore;
use crate::deployment::{Deployment, ResourceId};
use crate::iam::PolicyStatement;
use crate::instance::{ProvisioningInstance, RenderedInstance};
use crate::options::InstanceOptions;
use crate::script::{SensitiveBlock, shell_quote};
use farmstead_shared::errors::{FarmsteadError, FarmsteadResult};
use farmstead_shared::{RegistrationStatus, Role, SecretReference, validate_subnet_id};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

pub const DEFAULT_OS_USER: &str = "ec2-user";
pub const STAGED_SCRIPT_PATH: &str = "/opt/farmstead/configure_identity_registration_settings.py";
pub const DEFAULT_CONNECTION_COMMAND: &str = "python3 /opt/farmstead/client-rq-connection.py";
const CA_CERT_VAR: &str = "FARMSTEAD_CA_CERT";
const LOG_STREAM_PREFIX: &str = "identity-registration-";

fn default_os_user() -> String {
    DEFAULT_OS_USER.to_string()
}

fn default_configure_command() -> String {
    format!("python3 {}", STAGED_SCRIPT_PATH)
}

fn default_connection_command() -> String {
    DEFAULT_CONNECTION_COMMAND.to_string()
}

/// Connects the instance's client to the request-routing tier before the
/// settings are applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConnectionOptions {
    pub render_queue_uri: String,
    /// CA certificate used to verify the routing tier over TLS.
    #[serde(default)]
    pub ca_certificate: Option<SecretReference>,
    #[serde(default = "default_connection_command")]
    pub command: String,
}

impl ClientConnectionOptions {
    fn sanitize(&self) -> FarmsteadResult<()> {
        let scheme_ok = self.render_queue_uri.starts_with("http://")
            || self.render_queue_uri.starts_with("https://");
        if !scheme_ok {
            return Err(FarmsteadError::Config(format!(
                "render queue uri \"{}\" must use http or https",
                self.render_queue_uri
            )));
        }
        if self.render_queue_uri.starts_with("https://") && self.ca_certificate.is_none() {
            return Err(FarmsteadError::Config(
                "an https render queue needs a CA certificate".into(),
            ));
        }
        Ok(())
    }

    fn commands(&self, os_user: &str) -> Vec<String> {
        let invocation = format!(
            "sudo -u {} {} --render-queue {}",
            os_user,
            self.command,
            shell_quote(&self.render_queue_uri)
        );
        match &self.ca_certificate {
            Some(ca) => SensitiveBlock::new(ca.clone(), CA_CERT_VAR)
                .with_commands([format!(
                    "printf '%s' \"${}\" | {} --tls-ca-stdin",
                    CA_CERT_VAR, invocation
                )])
                .render(),
            None => vec![invocation],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRegistrationOptions {
    pub region: String,
    pub admin_credentials: SecretReference,
    /// Front-door segments the routing tier accepts connections on.
    pub connection_subnets: Vec<String>,
    #[serde(default = "default_os_user")]
    pub os_user: String,
    #[serde(default = "default_configure_command")]
    pub configure_command: String,
    /// `s3://bucket/key` of the configure script, staged before it runs.
    #[serde(default)]
    pub script_source: Option<String>,
    #[serde(default)]
    pub client_connection: Option<ClientConnectionOptions>,
    pub instance: InstanceOptions,
}

impl IdentityRegistrationOptions {
    pub fn new(
        region: impl Into<String>,
        admin_credentials: SecretReference,
        connection_subnets: Vec<String>,
        instance: InstanceOptions,
    ) -> Self {
        Self {
            region: region.into(),
            admin_credentials,
            connection_subnets,
            os_user: default_os_user(),
            configure_command: default_configure_command(),
            script_source: None,
            client_connection: None,
            instance,
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

    pub fn sanitize(&self) -> FarmsteadResult<()> {
        if self.region.is_empty() {
            return Err(FarmsteadError::Config("registration region must not be empty".into()));
        }
        if self.connection_subnets.is_empty() {
            return Err(FarmsteadError::Config(
                "registration needs at least one connection subnet".into(),
            ));
        }
        for subnet in &self.connection_subnets {
            validate_subnet_id(subnet)?;
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self
            .connection_subnets
            .iter()
            .find(|subnet| !seen.insert(subnet.as_str()))
        {
            return Err(FarmsteadError::Config(format!(
                "connection subnet {} listed more than once",
                dup
            )));
        }
        if self.os_user.is_empty() || self.configure_command.is_empty() {
            return Err(FarmsteadError::Config(
                "registration needs an OS user and a configure command".into(),
            ));
        }
        if let Some(source) = &self.script_source {
            s3_object_arn(source)?;
        }
        if let Some(connection) = &self.client_connection {
            connection.sanitize()?;
        }
        self.instance.sanitize()
    }
}

/// `s3://bucket/key` → `arn:aws:s3:::bucket/key`.
fn s3_object_arn(uri: &str) -> FarmsteadResult<String> {
    let path = uri
        .strip_prefix("s3://")
        .filter(|path| matches!(path.split_once('/'), Some((bucket, key)) if !bucket.is_empty() && !key.is_empty()))
        .ok_or_else(|| {
            FarmsteadError::Config(format!("\"{}\" is not an s3://bucket/key uri", uri))
        })?;
    Ok(format!("arn:aws:s3:::{}", path))
}

pub struct IdentityRegistration {
    instance: ProvisioningInstance,
    store: RegistrationSettingsStore,
}

impl IdentityRegistration {
    pub fn new(
        deployment: &Deployment,
        path: &str,
        options: IdentityRegistrationOptions,
    ) -> FarmsteadResult<Self> {
        options.sanitize()?;

        let mut instance_options = options.instance.clone();
        if instance_options.logs.stream_prefix.is_empty() {
            instance_options.logs.stream_prefix = LOG_STREAM_PREFIX.to_string();
        }
        let mut instance = ProvisioningInstance::new(deployment, path, instance_options)?;

        instance.grant(PolicyStatement::allow(
            ["secretsmanager:GetSecretValue", "secretsmanager:DescribeSecret"],
            [options.admin_credentials.arn()],
        ))?;
        instance.grant(PolicyStatement::allow(["ec2:DescribeSubnets"], ["*"]))?;

        if let Some(source) = &options.script_source {
            instance.grant(PolicyStatement::allow(["s3:GetObject"], [s3_object_arn(source)?]))?;
            instance.add_setup_commands([
                format!("mkdir -p \"$(dirname {})\"", STAGED_SCRIPT_PATH),
                format!("aws s3 cp {} {}", shell_quote(source), STAGED_SCRIPT_PATH),
                format!("chmod 755 {}", STAGED_SCRIPT_PATH),
            ])?;
        }

        if let Some(connection) = &options.client_connection {
            if let Some(ca) = &connection.ca_certificate {
                instance.grant(PolicyStatement::allow(
                    ["secretsmanager:GetSecretValue"],
                    [ca.arn()],
                ))?;
            }
            instance.add_setup_commands(connection.commands(&options.os_user))?;
        }

        let store = RegistrationSettingsStore::new(
            deployment.clone(),
            instance.id().clone(),
            options.connection_subnets.iter().cloned(),
        );
        instance.add_lazy_setup_command(Arc::new(RegistrationCommand::new(
            store.clone(),
            options.region.clone(),
            options.admin_credentials.clone(),
            options.connection_subnets.clone(),
            options.os_user.clone(),
            options.configure_command.clone(),
        )))?;

        tracing::info!(
            instance = %instance.id(),
            connection_subnets = options.connection_subnets.len(),
            "Identity registration declared"
        );
        Ok(Self { instance, store })
    }

    /// See [`RegistrationSettingsStore::register`].
    pub fn register(
        &self,
        segment: &str,
        role: Role,
        status: RegistrationStatus,
        dependent: &ResourceId,
    ) -> FarmsteadResult<()> {
        self.store.register(segment, role, status, dependent)
    }

    /// Shared handle for callers that register independently.
    pub fn store(&self) -> RegistrationSettingsStore {
        self.store.clone()
    }

    pub fn instance(&self) -> &ProvisioningInstance {
        &self.instance
    }

    pub fn instance_mut(&mut self) -> &mut ProvisioningInstance {
        &mut self.instance
    }

    pub async fn render(&mut self) -> FarmsteadResult<RenderedInstance> {
        self.instance.render().await
    }
}
