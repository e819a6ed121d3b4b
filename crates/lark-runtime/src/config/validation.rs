//! Configuration validation.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LarkConfig, LogOutput};

/// Validates the entire configuration.
pub fn validate_config(config: &LarkConfig) -> ConfigResult<()> {
    validate_irc(config)?;
    validate_commands(config)?;
    validate_limits(config)?;
    validate_logging(config)?;
    validate_plugins(config)?;
    Ok(())
}

fn validate_irc(config: &LarkConfig) -> ConfigResult<()> {
    let nickname = &config.irc.nickname;
    if nickname.is_empty() {
        return Err(ConfigError::missing_field("irc.nickname"));
    }
    if nickname.chars().any(char::is_whitespace) {
        return Err(ConfigError::validation("Nickname cannot contain whitespace"));
    }
    Ok(())
}

fn validate_commands(config: &LarkConfig) -> ConfigResult<()> {
    let prefix = config.commands.prefix;
    if prefix.is_whitespace() || prefix.is_control() {
        return Err(ConfigError::validation(format!(
            "Command prefix must be a visible character, got {prefix:?}"
        )));
    }
    Ok(())
}

fn validate_limits(config: &LarkConfig) -> ConfigResult<()> {
    if config.network.timeout_secs == 0 {
        return Err(ConfigError::validation("Timeout must be greater than 0"));
    }
    Ok(())
}

fn validate_logging(config: &LarkConfig) -> ConfigResult<()> {
    if config.logging.output == LogOutput::File && config.logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

fn validate_plugins(config: &LarkConfig) -> ConfigResult<()> {
    for (name, section) in &config.plugins {
        if !(section.is_object() || section.is_null()) {
            return Err(ConfigError::validation(format!(
                "plugins.{name} must be a table"
            )));
        }
    }
    Ok(())
}
