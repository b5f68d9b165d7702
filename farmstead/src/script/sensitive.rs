//! Commands that handle secret values.
//!
//! Secrets are fetched from the credential store on the instance, held in a
//! shell variable for the duration of the block, then unset. Shell tracing is
//! suspended while the variable is live and restored to its prior setting
//! afterwards, so neither the generated text nor the boot log carries the
//! secret value.

use super::shell_quote;
use farmstead_shared::SecretReference;

const XTRACE_FLAG_VAR: &str = "FARMSTEAD_XTRACE_WAS_SET";

#[derive(Debug, Clone)]
pub struct SensitiveBlock {
    secret: SecretReference,
    variable: String,
    commands: Vec<String>,
}

impl SensitiveBlock {
    /// Fetch `secret` into `$variable` for the duration of the block.
    pub fn new(secret: SecretReference, variable: impl Into<String>) -> Self {
        Self {
            secret,
            variable: variable.into(),
            commands: Vec::new(),
        }
    }

    /// Commands that consume `$variable`. Pass the value on stdin or in an
    /// environment variable rather than as a process argument.
    pub fn with_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands.extend(commands.into_iter().map(Into::into));
        self
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn render(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.commands.len() + 4);
        lines.push(format!(
            "if [[ $- = *x* ]]; then {flag}=1; set +x; else {flag}=; fi",
            flag = XTRACE_FLAG_VAR
        ));
        lines.push(format!(
            "{var}=$(aws --region {region} secretsmanager get-secret-value --secret-id {arn} --query SecretString --output text)",
            var = self.variable,
            region = self.secret.region(),
            arn = shell_quote(self.secret.arn()),
        ));
        lines.extend(self.commands.iter().cloned());
        lines.push(format!("unset {}", self.variable));
        lines.push(format!(
            "if [[ -n \"${{{flag}}}\" ]]; then set -x; fi",
            flag = XTRACE_FLAG_VAR
        ));
        lines
    }
}
