//! Planning side of the on-instance configure step.
//!
//! `farmstead-configure` accepts the arguments [`RegistrationCommand`] renders,
//! plus the CIDR block of every subnet involved and the settings currently
//! stored, and prints the create/update/delete actions as JSON.
//!
//! [`RegistrationCommand`]: crate::RegistrationCommand

use clap::Parser;
use farmstead_shared::errors::{FarmsteadError, FarmsteadResult};
use farmstead_shared::reconcile::{self, DesiredSettings, RegistrationSetting, SettingAction};
use farmstead_shared::{SecretReference, SourceSubnet, validate_subnet_id};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(
    name = "farmstead-configure",
    about = "Plan identity registration settings for a provisioning instance"
)]
pub struct ConfigureArgs {
    #[arg(long)]
    pub region: String,

    /// Secret holding the repository administrator credentials.
    #[arg(long, value_parser = SecretReference::parse)]
    pub credentials: SecretReference,

    #[arg(long = "connection-subnet", required = true, value_parser = parse_subnet_id)]
    pub connection_subnets: Vec<String>,

    /// `<subnet id>,<Role>,<Status>`
    #[arg(long = "source-subnet", value_parser = parse_source_subnet)]
    pub source_subnets: Vec<SourceSubnet>,

    /// `<subnet id>=<IPv4 CIDR>` for every subnet named above.
    #[arg(long = "subnet-cidr", value_parser = parse_subnet_cidr)]
    pub subnet_cidrs: Vec<(String, String)>,

    /// JSON array of the settings currently stored in the repository.
    #[arg(long)]
    pub existing: Option<PathBuf>,
}

fn parse_subnet_id(value: &str) -> FarmsteadResult<String> {
    validate_subnet_id(value)?;
    Ok(value.to_string())
}

fn parse_source_subnet(value: &str) -> FarmsteadResult<SourceSubnet> {
    value.parse()
}

fn parse_subnet_cidr(value: &str) -> FarmsteadResult<(String, String)> {
    let (subnet, cidr) = value.split_once('=').ok_or_else(|| {
        FarmsteadError::Config(format!("\"{}\" is not <subnet id>=<cidr>", value))
    })?;
    validate_subnet_id(subnet)?;
    reconcile::cidr_to_ipv4_match(cidr)?;
    Ok((subnet.to_string(), cidr.to_string()))
}

/// Settings previously exported from the repository.
pub fn load_existing(path: &Path) -> FarmsteadResult<Vec<RegistrationSetting>> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        FarmsteadError::Config(format!("failed to read {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_str(&source)?)
}

impl ConfigureArgs {
    pub fn desired(&self) -> DesiredSettings {
        DesiredSettings {
            connection_subnets: self.connection_subnets.clone(),
            source_subnets: self.source_subnets.clone(),
            subnet_cidrs: self.subnet_cidrs.iter().cloned().collect(),
        }
    }

    pub fn plan(&self) -> FarmsteadResult<Vec<SettingAction>> {
        if self.credentials.region() != self.region {
            tracing::warn!(
                region = %self.region,
                credentials_region = %self.credentials.region(),
                "Credentials live in a different region than the repository"
            );
        }

        let existing = match &self.existing {
            Some(path) => load_existing(path)?,
            None => Vec::new(),
        };
        let actions = reconcile::plan(&existing, &self.desired())?;
        tracing::info!(
            region = %self.region,
            existing = existing.len(),
            actions = actions.len(),
            "Planned registration settings"
        );
        Ok(actions)
    }
}
