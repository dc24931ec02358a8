use std::collections::HashSet;

use super::{
    types::{Config, ProviderKind},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Database path is not empty
/// - Orchestrator queue cap and error threshold are positive
/// - Recheck ratio is within (0, 1]
/// - Provider names are unique and torznab providers have an API key
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

    if config.server.port == 0 {
        return invalid("server.port cannot be 0");
    }
    if config.database.path.as_os_str().is_empty() {
        return invalid("database.path cannot be empty");
    }
    if config.orchestrator.queue_cap == 0 {
        return invalid("orchestrator.queue_cap must be at least 1");
    }
    if config.orchestrator.transient_error_threshold == 0 {
        return invalid("orchestrator.transient_error_threshold must be at least 1");
    }
    let ratio = config.recheck.min_ratio;
    if !(ratio > 0.0 && ratio <= 1.0) {
        return invalid("recheck.min_ratio must be in (0, 1]");
    }

    let mut names = HashSet::new();
    for provider in &config.providers {
        if !names.insert(provider.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate provider name: {}",
                provider.name
            )));
        }
        if provider.kind == ProviderKind::Torznab
            && provider.api_key.as_deref().unwrap_or_default().is_empty()
        {
            return Err(ConfigError::ValidationError(format!(
                "provider {} requires an api_key",
                provider.name
            )));
        }
    }

    Ok(())
}
