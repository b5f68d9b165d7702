//! Identity registration settings.
//!
//! Independent callers register the segments their clients connect from.
//! The provisioning instance applies the accumulated settings once, through a
//! command rendered when the instance is sealed.

mod command;
mod feature;
mod store;

pub use command::RegistrationCommand;
pub use feature::{
    ClientConnectionOptions, DEFAULT_CONNECTION_COMMAND, DEFAULT_OS_USER, IdentityRegistration,
    IdentityRegistrationOptions, STAGED_SCRIPT_PATH,
};
pub use store::RegistrationSettingsStore;
