//! TOML configuration for the forwarding server.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::forward::ForwardOptions;
use crate::rules::{RuleError, RuleSet};
use crate::server::ServerOptions;
use crate::transport::{SMTP_PORT, SecurityMode, TransportOptions};

/// Default message size limit: 25 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 25 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {source}")]
    Parse {
        #[source]
        source: toml::de::Error,
    },
    #[error("no rules have been set in the configuration")]
    NoRules,
    #[error("no listen address configured")]
    NoListeners,
    #[error(transparent)]
    Rule(#[from] RuleError),
}

impl ConfigError {
    pub(crate) fn read(path: &Path, source: std::io::Error) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One `[[rules]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub alias: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeliveryConfig {
    pub port: u16,
    pub security: SecurityMode,
    /// Defaults to the server name when absent.
    pub helo_domain: Option<String>,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub message_timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            port: SMTP_PORT,
            security: SecurityMode::Auto,
            helo_domain: None,
            connect_timeout_secs: 30,
            command_timeout_secs: 60,
            message_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server_name: String,
    pub listen: Vec<String>,
    pub max_message_size: usize,
    pub delivery: DeliveryConfig,
    pub rules: Vec<RuleConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_name: "localhost".to_string(),
            listen: vec!["0.0.0.0:25".to_string(), "0.0.0.0:587".to_string()],
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            delivery: DeliveryConfig::default(),
            rules: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::read(path, source))?;
        Self::from_toml(&content)
    }

    /// Parses and checks a configuration document. Rules are compiled here
    /// so a bad pattern fails before anything listens.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|source| ConfigError::Parse { source })?;
        if config.rules.is_empty() {
            return Err(ConfigError::NoRules);
        }
        if config.listen.is_empty() {
            return Err(ConfigError::NoListeners);
        }
        config.rule_set()?;
        Ok(config)
    }

    pub fn rule_set(&self) -> Result<RuleSet, ConfigError> {
        let rules = RuleSet::from_pairs(
            self.rules
                .iter()
                .map(|rule| (rule.alias.as_str(), rule.address.as_str())),
        )?;
        Ok(rules)
    }

    /// Compiles the rules and logs each registration.
    pub fn register_rules(&self) -> Result<RuleSet, ConfigError> {
        let rules = self.rule_set()?;
        for rule in &rules {
            info!(pattern = rule.pattern(), forward = %rule.destination(), "registered rule");
        }
        info!(count = rules.len(), "alias rules loaded");
        Ok(rules)
    }

    pub fn forward_options(&self) -> ForwardOptions {
        ForwardOptions {
            port: self.delivery.port,
            security: self.delivery.security,
            message_timeout: Duration::from_secs(self.delivery.message_timeout_secs),
        }
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            server_name: self.server_name.clone(),
            max_message_size: self.max_message_size,
        }
    }

    pub fn transport_options(&self) -> TransportOptions {
        let helo_domain = self
            .delivery
            .helo_domain
            .clone()
            .unwrap_or_else(|| self.server_name.clone());
        TransportOptions {
            helo_domain,
            connect_timeout: Duration::from_secs(self.delivery.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.delivery.command_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
server_name = "mx.alias-domain.com"
listen = ["127.0.0.1:2525"]

[delivery]
security = "starttls"
message_timeout_secs = 60

[[rules]]
alias = "someone.*@alias-domain.com"
address = "target@target-domain.com"

[[rules]]
alias = "*@alias-domain.com"
address = "catchall@target-domain.com"
"#;

    #[test]
    fn parses_full_document() {
        let config = Config::from_toml(SAMPLE).expect("valid config");
        assert_eq!(config.server_name, "mx.alias-domain.com");
        assert_eq!(config.listen, ["127.0.0.1:2525"]);
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert_eq!(config.delivery.security, SecurityMode::StartTls);
        assert_eq!(config.delivery.port, 25);
        assert_eq!(config.rules.len(), 2);

        let options = config.forward_options();
        assert_eq!(options.message_timeout, Duration::from_secs(60));
        assert_eq!(options.security, SecurityMode::StartTls);
    }

    #[test]
    fn rule_order_is_preserved() {
        let rules = Config::from_toml(SAMPLE).unwrap().rule_set().unwrap();
        let hit = rules.find("someone.else@alias-domain.com").unwrap();
        assert_eq!(hit.destination().address(), "target@target-domain.com");
    }

    #[test]
    fn helo_defaults_to_server_name() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.transport_options().helo_domain, "mx.alias-domain.com");
    }

    #[test]
    fn missing_rules_is_an_error() {
        let err = Config::from_toml("server_name = \"x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::NoRules));
        assert_eq!(err.to_string(), "no rules have been set in the configuration");
    }

    #[test]
    fn bad_rule_fails_load() {
        let doc = "[[rules]]\nalias = \"*@a.com\"\naddress = \"nope\"\n";
        let err = Config::from_toml(doc).unwrap_err();
        assert!(matches!(err, ConfigError::Rule(RuleError::InRuleSet { index: 0, .. })));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let doc = "colour = \"blue\"\n[[rules]]\nalias = \"*\"\naddress = \"a@b.com\"\n";
        assert!(matches!(
            Config::from_toml(doc),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn defaults_listen_on_both_ports() {
        let doc = "[[rules]]\nalias = \"*\"\naddress = \"a@b.com\"\n";
        let config = Config::from_toml(doc).unwrap();
        assert_eq!(config.listen, ["0.0.0.0:25", "0.0.0.0:587"]);
        assert_eq!(config.server_name, "localhost");
    }
}
