//! References to secrets held in the credential store.
//!
//! Only the identifier is ever embedded in generated commands. The value is
//! fetched on the instance at runtime.

use crate::errors::{FarmsteadError, FarmsteadResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

fn secret_arn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^arn:(aws[a-zA-Z-]*)?:secretsmanager:(?P<region>[a-z]{2}((-gov)|(-iso(b?)))?-[a-z]+-\d{1}):\d{12}:secret:[a-zA-Z0-9_/+=.@-]+$",
        )
        .expect("secret ARN pattern is valid")
    })
}

/// A validated Secrets Manager ARN.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecretReference {
    arn: String,
    region: String,
}

impl SecretReference {
    pub fn parse(arn: &str) -> FarmsteadResult<Self> {
        let caps = secret_arn_re().captures(arn).ok_or_else(|| {
            FarmsteadError::Config(format!("\"{}\" is not a valid secret ARN", arn))
        })?;

        Ok(Self {
            arn: arn.to_string(),
            region: caps["region"].to_string(),
        })
    }

    pub fn arn(&self) -> &str {
        &self.arn
    }

    /// Region the secret lives in, taken from the ARN.
    pub fn region(&self) -> &str {
        &self.region
    }
}

impl fmt::Display for SecretReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.arn)
    }
}

impl TryFrom<String> for SecretReference {
    type Error = FarmsteadError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SecretReference::parse(&value)
    }
}

impl From<SecretReference> for String {
    fn from(value: SecretReference) -> Self {
        value.arn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commercial_arn() {
        let secret = SecretReference::parse(
            "arn:aws:secretsmanager:us-west-2:123456789012:secret:farm/admin-AbCdEf",
        )
        .unwrap();
        assert_eq!(secret.region(), "us-west-2");
        assert!(secret.arn().ends_with("admin-AbCdEf"));
    }

    #[test]
    fn test_parse_govcloud_arn() {
        let secret = SecretReference::parse(
            "arn:aws-us-gov:secretsmanager:us-gov-west-1:123456789012:secret:admin",
        )
        .unwrap();
        assert_eq!(secret.region(), "us-gov-west-1");
    }

    #[test]
    fn test_reject_non_secret_arn() {
        let result = SecretReference::parse("arn:aws:s3:::my-bucket");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not a valid secret ARN"));
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Result<SecretReference, _> = serde_json::from_str(
            "\"arn:aws:secretsmanager:eu-central-1:123456789012:secret:x\"",
        );
        assert_eq!(ok.unwrap().region(), "eu-central-1");

        let bad: Result<SecretReference, _> = serde_json::from_str("\"not-an-arn\"");
        assert!(bad.is_err());
    }
}
