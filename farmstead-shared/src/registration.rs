//! Identity registration vocabulary.
//!
//! These types travel from the deploying side to the provisioning instance as
//! `--source-subnet "<id>,<Role>,<Status>"` arguments, so `Display` and
//! `FromStr` must stay exact inverses of each other.

use crate::errors::{FarmsteadError, FarmsteadResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Role a client connecting from a segment is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Server,
    Client,
    /// Provisioned out-of-band; rejected by bulk registration.
    Administrator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Server => "Server",
            Role::Client => "Client",
            Role::Administrator => "Administrator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = FarmsteadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Server" => Ok(Role::Server),
            "Client" => Ok(Role::Client),
            "Administrator" => Ok(Role::Administrator),
            other => Err(FarmsteadError::Config(format!("unknown role \"{}\"", other))),
        }
    }
}

/// Registration status applied to clients connecting from a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Pending,
    Registered,
    Revoked,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "Pending",
            RegistrationStatus::Registered => "Registered",
            RegistrationStatus::Revoked => "Revoked",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = FarmsteadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(RegistrationStatus::Pending),
            "Registered" => Ok(RegistrationStatus::Registered),
            "Revoked" => Ok(RegistrationStatus::Revoked),
            other => Err(FarmsteadError::Config(format!(
                "unknown registration status \"{}\"",
                other
            ))),
        }
    }
}

/// A source segment with the role and status its clients receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSubnet {
    pub subnet_id: String,
    pub role: Role,
    pub status: RegistrationStatus,
}

impl SourceSubnet {
    pub fn new(subnet_id: impl Into<String>, role: Role, status: RegistrationStatus) -> Self {
        Self {
            subnet_id: subnet_id.into(),
            role,
            status,
        }
    }
}

const SUBNET_ID_PATTERN: &str = r"[A-Za-z0-9][A-Za-z0-9._-]*";

fn subnet_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!("^{}$", SUBNET_ID_PATTERN)).expect("subnet id pattern is valid")
    })
}

fn source_subnet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            "^(?P<subnet>{}),(?P<role>Server|Client),(?P<status>Pending|Registered|Revoked)$",
            SUBNET_ID_PATTERN
        ))
        .expect("source subnet pattern is valid")
    })
}

/// Check that `subnet_id` can be written into a boot script argument as is.
///
/// Ids are letters, digits, `.`, `_` and `-`, starting with a letter or digit.
pub fn validate_subnet_id(subnet_id: &str) -> FarmsteadResult<()> {
    if subnet_id.is_empty() {
        return Err(FarmsteadError::Config("segment id must not be empty".into()));
    }
    if !subnet_id_re().is_match(subnet_id) {
        return Err(FarmsteadError::Config(format!(
            "segment id {:?} may only contain letters, digits, '.', '_' and '-'",
            subnet_id
        )));
    }
    Ok(())
}

impl fmt::Display for SourceSubnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.subnet_id, self.role, self.status)
    }
}

impl FromStr for SourceSubnet {
    type Err = FarmsteadError;

    /// Administrator is not accepted here: the grammar only admits Server and Client.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = source_subnet_re().captures(s).ok_or_else(|| {
            FarmsteadError::Config(format!("\"{}\" is not a valid source subnet", s))
        })?;

        Ok(SourceSubnet {
            subnet_id: caps["subnet"].to_string(),
            role: caps["role"].parse()?,
            status: caps["status"].parse()?,
        })
    }
}
