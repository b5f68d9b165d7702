//! Farmstead: single-shot provisioning instances for render farms.
//!
//! A [`ProvisioningInstance`] boots once, configures log shipping, runs the
//! setup commands features gave it, reports the outcome to the deployment
//! controller, and scales itself to zero. [`IdentityRegistration`] builds on
//! it to apply client registration settings collected from independent
//! callers across the deployment.

pub mod configure;
pub mod deployment;
pub mod iam;
pub mod instance;
mod logging;
pub mod logs;
pub mod options;
pub mod pipeline;
pub mod registration;
pub mod script;

pub use deployment::{CompletionReport, CompletionSignal, Deployment, ResourceId, completion_channel};
pub use instance::{BootStage, ProvisioningInstance, RenderedInstance, SelfTerminationGuard};
pub use logging::init_logging_for;
pub use options::{CapacityBounds, InstanceOptions, LogOptions};
pub use registration::{
    IdentityRegistration, IdentityRegistrationOptions, RegistrationCommand,
    RegistrationSettingsStore,
};
pub use script::{CommandSequence, LazyCommand, SensitiveBlock};

pub use farmstead_shared::{
    FarmsteadError, FarmsteadResult, RegistrationStatus, Role, SecretReference, SourceSubnet,
};
