//! The registration command, rendered from the store at seal time.

use super::store::RegistrationSettingsStore;
use crate::script::LazyCommand;
use farmstead_shared::{SecretReference, SourceSubnet, validate_subnet_id};
use farmstead_shared::errors::{FarmsteadError, FarmsteadResult};

/// Invokes the configure script on the instance with every registered source
/// segment, as the OS user holding the cached database credentials.
pub struct RegistrationCommand {
    store: RegistrationSettingsStore,
    region: String,
    credentials: SecretReference,
    connection_subnets: Vec<String>,
    os_user: String,
    configure_command: String,
}

impl RegistrationCommand {
    pub fn new(
        store: RegistrationSettingsStore,
        region: impl Into<String>,
        credentials: SecretReference,
        connection_subnets: Vec<String>,
        os_user: impl Into<String>,
        configure_command: impl Into<String>,
    ) -> Self {
        Self {
            store,
            region: region.into(),
            credentials,
            connection_subnets,
            os_user: os_user.into(),
            configure_command: configure_command.into(),
        }
    }

    /// Argument string for the configure script.
    ///
    /// Sources are emitted sorted by segment id, so the output never depends
    /// on the order callers registered in.
    pub fn arguments(&self) -> String {
        self.tokens(&self.store.entries()).join(" ")
    }

    fn tokens(&self, sources: &[SourceSubnet]) -> Vec<String> {
        let mut tokens = vec![
            format!("--region {}", self.region),
            format!("--credentials \"{}\"", self.credentials),
        ];
        tokens.extend(
            self.connection_subnets
                .iter()
                .map(|subnet| format!("--connection-subnet \"{}\"", subnet)),
        );
        tokens.extend(
            sources
                .iter()
                .map(|source| format!("--source-subnet \"{}\"", source)),
        );
        tokens
    }
}

impl LazyCommand for RegistrationCommand {
    fn render(&self) -> FarmsteadResult<String> {
        if self.connection_subnets.is_empty() {
            return Err(FarmsteadError::Config(
                "registration needs at least one connection subnet".into(),
            ));
        }
        for subnet in &self.connection_subnets {
            validate_subnet_id(subnet)?;
        }

        let sources = self.store.seal();
        tracing::info!(
            instance = %self.store.instance(),
            connection_subnets = self.connection_subnets.len(),
            source_subnets = sources.len(),
            "Rendering registration command"
        );
        Ok(format!(
            "sudo -u {} {} {}",
            self.os_user,
            self.configure_command,
            self.tokens(&sources).join(" ")
        ))
    }

    fn release(&self) {
        self.store.unseal();
    }
}
