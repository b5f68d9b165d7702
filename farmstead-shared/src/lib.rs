//! Types shared between the farmstead orchestrator and the commands it runs
//! on provisioning instances.

pub mod errors;
pub mod reconcile;
pub mod registration;
pub mod secret;

pub use errors::{FarmsteadError, FarmsteadResult};
pub use registration::{RegistrationStatus, Role, SourceSubnet, validate_subnet_id};
pub use secret::SecretReference;
