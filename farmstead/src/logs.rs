//! Log-shipping agent configuration.
//!
//! The orchestrator only declares which files to ship and how often to flush.
//! The agent itself is preinstalled on the machine image and manages its own
//! lifecycle once started.

use crate::options::LogOptions;
use farmstead_shared::errors::FarmsteadResult;
use serde_json::json;
use std::time::Duration;

pub const AGENT_CONFIG_PATH: &str = "/opt/aws/amazon-cloudwatch-agent/etc/farmstead.json";
pub const AGENT_CTL: &str = "/opt/aws/amazon-cloudwatch-agent/bin/amazon-cloudwatch-agent-ctl";
/// Placeholder the agent replaces with the running instance's id.
pub const INSTANCE_ID_PLACEHOLDER: &str = "{instance_id}";
const HEREDOC_MARKER: &str = "FARMSTEAD_LOG_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStream {
    pub stream_name: String,
    pub file_path: String,
}

#[derive(Debug, Clone)]
pub struct LogAgentConfig {
    group_name: String,
    stream_prefix: String,
    flush_interval: Duration,
    streams: Vec<LogStream>,
}

impl LogAgentConfig {
    /// Config shipping the boot log of the instance.
    pub fn for_provisioning(options: &LogOptions) -> Self {
        let mut config = Self {
            group_name: options.group_name.clone(),
            stream_prefix: options.stream_prefix.clone(),
            flush_interval: options.flush_interval(),
            streams: Vec::new(),
        };
        config.add_stream("cloud-init-output", "/var/log/cloud-init-output.log");
        config
    }

    /// Ship `file_path` to `<prefix><name>-<instance id>`.
    pub fn add_stream(&mut self, name: &str, file_path: &str) {
        let stream = LogStream {
            stream_name: format!("{}{}-{}", self.stream_prefix, name, INSTANCE_ID_PLACEHOLDER),
            file_path: file_path.to_string(),
        };
        if !self.streams.contains(&stream) {
            self.streams.push(stream);
        }
    }

    pub fn streams(&self) -> &[LogStream] {
        &self.streams
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Whole minutes to wait so buffered lines reach the log group.
    pub fn grace_period_minutes(&self) -> u64 {
        self.flush_interval.as_secs().div_ceil(60).max(1)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let collect_list: Vec<serde_json::Value> = self
            .streams
            .iter()
            .map(|stream| {
                json!({
                    "file_path": stream.file_path,
                    "log_group_name": self.group_name,
                    "log_stream_name": stream.stream_name,
                    "timezone": "Local",
                })
            })
            .collect();

        json!({
            "logs": {
                "logs_collected": { "files": { "collect_list": collect_list } },
                "log_stream_name": format!("{}default-{}", self.stream_prefix, INSTANCE_ID_PLACEHOLDER),
                "force_flush_interval": self.flush_interval.as_secs(),
            }
        })
    }

    /// Commands writing the config and (re)starting the agent with it.
    pub fn configure_commands(&self) -> FarmsteadResult<Vec<String>> {
        let body = serde_json::to_string_pretty(&self.to_json())?;
        Ok(vec![
            format!("mkdir -p \"$(dirname {})\"", AGENT_CONFIG_PATH),
            format!(
                "cat > {path} <<'{marker}'\n{body}\n{marker}",
                path = AGENT_CONFIG_PATH,
                marker = HEREDOC_MARKER,
                body = body
            ),
            format!(
                "{} -a fetch-config -m ec2 -s -c file:{}",
                AGENT_CTL, AGENT_CONFIG_PATH
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(flush_secs: u64) -> LogOptions {
        LogOptions {
            stream_prefix: "reg-".into(),
            flush_interval_secs: flush_secs,
            ..Default::default()
        }
    }

    #[test]
    fn test_grace_period_rounds_up_to_minutes() {
        assert_eq!(LogAgentConfig::for_provisioning(&options(15)).grace_period_minutes(), 1);
        assert_eq!(LogAgentConfig::for_provisioning(&options(60)).grace_period_minutes(), 1);
        assert_eq!(LogAgentConfig::for_provisioning(&options(61)).grace_period_minutes(), 2);
    }

    #[test]
    fn test_json_lists_streams_and_flush_interval() {
        let mut config = LogAgentConfig::for_provisioning(&options(15));
        config.add_stream("installer", "/var/log/installer.log");
        config.add_stream("installer", "/var/log/installer.log");
        let json = config.to_json();

        let list = json["logs"]["logs_collected"]["files"]["collect_list"]
            .as_array()
            .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["file_path"], "/var/log/cloud-init-output.log");
        assert_eq!(list[0]["log_stream_name"], "reg-cloud-init-output-{instance_id}");
        assert_eq!(list[1]["log_group_name"], crate::options::DEFAULT_LOG_GROUP);
        assert_eq!(json["logs"]["force_flush_interval"], 15);
    }

    #[test]
    fn test_configure_commands_start_agent() {
        let commands = LogAgentConfig::for_provisioning(&options(15))
            .configure_commands()
            .unwrap();
        assert_eq!(commands.len(), 3);
        assert!(commands[1].contains("\"force_flush_interval\": 15"));
        assert!(commands[2].contains("fetch-config"));
    }
}
