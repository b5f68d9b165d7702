//! Reconciliation of load-balancer identity registration settings.
//!
//! Runs on the provisioning instance. Given the settings already stored in
//! the repository and the desired `(connection subnet, source subnet)` matrix,
//! produces the minimal list of create/update/delete actions. Settings created
//! by anything other than farmstead are recognised by name and left alone.

use crate::errors::{FarmsteadError, FarmsteadResult};
use crate::registration::{RegistrationStatus, Role, SourceSubnet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::net::Ipv4Addr;

pub const SETTING_NAME_PREFIX: &str = "FarmsteadSubnet";
pub const SETTING_NAME_SEP: char = '|';
pub const IPV4_MATCH_FILTER: &str = "IPv4Match";

/// Name of the managed setting for a connection/source subnet pair.
pub fn setting_name(connection_subnet_id: &str, source_subnet_id: &str) -> String {
    format!(
        "{prefix}{sep}{conn}{sep}{src}",
        prefix = SETTING_NAME_PREFIX,
        sep = SETTING_NAME_SEP,
        conn = connection_subnet_id,
        src = source_subnet_id
    )
}

/// Split a managed setting name into `(connection, source)` subnet ids.
///
/// Returns `None` for settings not created by farmstead.
pub fn parse_setting_name(name: &str) -> Option<(&str, &str)> {
    let mut parts = name.split(SETTING_NAME_SEP);
    let prefix = parts.next()?;
    let connection = parts.next()?;
    let source = parts.next()?;
    if prefix != SETTING_NAME_PREFIX
        || connection.is_empty()
        || source.is_empty()
        || parts.next().is_some()
    {
        return None;
    }
    Some((connection, source))
}

/// Convert an IPv4 CIDR block into the repository's wildcard match syntax.
///
/// Fully masked octets are kept, free octets become `*`, and partially masked
/// octets become an inclusive `min-max` range:
/// `10.0.0.0/16` → `10.0.*.*`, `10.0.4.0/22` → `10.0.4-7.*`.
pub fn cidr_to_ipv4_match(cidr: &str) -> FarmsteadResult<String> {
    let (addr, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| FarmsteadError::Config(format!("\"{}\" is not a CIDR block", cidr)))?;

    let addr: Ipv4Addr = addr
        .parse()
        .map_err(|_| FarmsteadError::Config(format!("\"{}\" is not an IPv4 network", cidr)))?;
    let prefix: u32 = prefix
        .parse()
        .ok()
        .filter(|p| *p <= 32)
        .ok_or_else(|| FarmsteadError::Config(format!("\"{}\" has an invalid prefix", cidr)))?;

    let netmask: u32 = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    let hostmask = !netmask;
    let address = u32::from(addr);
    if address & hostmask != 0 {
        return Err(FarmsteadError::Config(format!(
            "\"{}\" has host bits set",
            cidr
        )));
    }

    let octets: Vec<String> = netmask
        .to_be_bytes()
        .iter()
        .zip(hostmask.to_be_bytes())
        .zip(address.to_be_bytes())
        .map(|((mask, host), network)| match *mask {
            0xFF => network.to_string(),
            0 => "*".to_string(),
            mask => {
                let min = mask & network;
                format!("{}-{}", min, min + host)
            }
        })
        .collect();

    Ok(octets.join("."))
}

/// A load-balancer identity registration setting as stored by the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegistrationSetting {
    pub settings_id: String,
    pub settings_name: String,
    pub connection_ip_filter_type: String,
    pub connection_ip_filter_value: String,
    pub source_ip_filter_type: String,
    pub source_ip_filter_value: String,
    pub is_enabled: bool,
    pub default_role: Role,
    pub default_status: RegistrationStatus,
}

impl RegistrationSetting {
    pub fn is_managed(&self) -> bool {
        parse_setting_name(&self.settings_name).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "Action", content = "Setting")]
pub enum SettingAction {
    Create(RegistrationSetting),
    Update(RegistrationSetting),
    Delete(RegistrationSetting),
}

/// Desired-state inputs for one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct DesiredSettings {
    pub connection_subnets: Vec<String>,
    pub source_subnets: Vec<SourceSubnet>,
    /// CIDR block of every subnet named above.
    pub subnet_cidrs: HashMap<String, String>,
}

impl DesiredSettings {
    pub fn validate(&self) -> FarmsteadResult<()> {
        if self.connection_subnets.is_empty() {
            return Err(FarmsteadError::Config(
                "no connection subnet specified".into(),
            ));
        }

        let mut seen = BTreeSet::new();
        for source in &self.source_subnets {
            if !seen.insert(source.subnet_id.as_str()) {
                return Err(FarmsteadError::Config(format!(
                    "subnet \"{}\" is not unique",
                    source.subnet_id
                )));
            }
        }
        Ok(())
    }

    fn cidr_of(&self, subnet_id: &str) -> FarmsteadResult<&str> {
        self.subnet_cidrs
            .get(subnet_id)
            .map(String::as_str)
            .ok_or_else(|| {
                FarmsteadError::Config(format!("no CIDR block known for subnet \"{}\"", subnet_id))
            })
    }

    fn desired_setting(
        &self,
        connection_subnet_id: &str,
        source: &SourceSubnet,
    ) -> FarmsteadResult<RegistrationSetting> {
        Ok(RegistrationSetting {
            settings_id: String::new(),
            settings_name: setting_name(connection_subnet_id, &source.subnet_id),
            connection_ip_filter_type: IPV4_MATCH_FILTER.to_string(),
            connection_ip_filter_value: cidr_to_ipv4_match(self.cidr_of(connection_subnet_id)?)?,
            source_ip_filter_type: IPV4_MATCH_FILTER.to_string(),
            source_ip_filter_value: cidr_to_ipv4_match(self.cidr_of(&source.subnet_id)?)?,
            is_enabled: true,
            default_role: source.role,
            default_status: source.status,
        })
    }
}

/// Compute the actions that bring `prior` to the desired state.
///
/// Deletions come first, then creations and updates in connection × source
/// order. An update keeps the settings id of the setting it replaces.
pub fn plan(
    prior: &[RegistrationSetting],
    desired: &DesiredSettings,
) -> FarmsteadResult<Vec<SettingAction>> {
    desired.validate()?;

    let managed: Vec<&RegistrationSetting> = prior.iter().filter(|s| s.is_managed()).collect();
    let desired_sources: BTreeSet<&str> = desired
        .source_subnets
        .iter()
        .map(|s| s.subnet_id.as_str())
        .collect();
    let desired_connections: BTreeSet<&str> = desired
        .connection_subnets
        .iter()
        .map(String::as_str)
        .collect();

    let mut actions = Vec::new();

    for setting in &managed {
        let Some((connection, source)) = parse_setting_name(&setting.settings_name) else {
            continue;
        };
        if !desired_sources.contains(source) || !desired_connections.contains(connection) {
            tracing::info!(setting = %setting.settings_name, "Setting no longer desired, deleting");
            actions.push(SettingAction::Delete((*setting).clone()));
        }
    }

    let prior_by_name: HashMap<&str, &RegistrationSetting> = managed
        .iter()
        .map(|s| (s.settings_name.as_str(), *s))
        .collect();

    for connection in &desired.connection_subnets {
        for source in &desired.source_subnets {
            let mut wanted = desired.desired_setting(connection, source)?;
            match prior_by_name.get(wanted.settings_name.as_str()) {
                Some(existing) => {
                    wanted.settings_id = existing.settings_id.clone();
                    if **existing != wanted {
                        actions.push(SettingAction::Update(wanted));
                    } else {
                        tracing::debug!(setting = %wanted.settings_name, "Setting up-to-date, skipping");
                    }
                }
                None => actions.push(SettingAction::Create(wanted)),
            }
        }
    }

    Ok(actions)
}
