use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - At least one enabled range, each with start <= end
/// - Threshold in (0, 1]
/// - Non-zero chunk size, concurrency and attempt budget
/// - Endpoint URL and credentials present
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if !config.ranges.iter().any(|r| r.enabled) {
        return Err(ConfigError::ValidationError(
            "at least one enabled range is required".to_string(),
        ));
    }

    for range in &config.ranges {
        if range.start > range.end {
            return Err(ConfigError::ValidationError(format!(
                "range '{}' has start {} greater than end {}",
                range.name, range.start, range.end
            )));
        }
    }

    let threshold = config.policy.success_threshold;
    if !(threshold > 0.0 && threshold <= 1.0) {
        return Err(ConfigError::ValidationError(format!(
            "policy.success_threshold must be in (0, 1], got {threshold}"
        )));
    }

    if config.dispatch.chunk_size == 0 {
        return Err(ConfigError::ValidationError(
            "dispatch.chunk_size cannot be 0".to_string(),
        ));
    }
    if config.dispatch.concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "dispatch.concurrency cannot be 0".to_string(),
        ));
    }
    if config.dispatch.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "dispatch.max_attempts cannot be 0".to_string(),
        ));
    }
    if config.dispatch.requests_per_minute == Some(0) {
        return Err(ConfigError::ValidationError(
            "dispatch.requests_per_minute cannot be 0".to_string(),
        ));
    }

    if config.endpoint.base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "endpoint.base_url is required".to_string(),
        ));
    }
    if config.endpoint.access_key.is_empty() || config.endpoint.secret_key.is_empty() {
        return Err(ConfigError::ValidationError(
            "endpoint credentials are required".to_string(),
        ));
    }

    if config.audit.max_write_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "audit.max_write_attempts cannot be 0".to_string(),
        ));
    }

    Ok(())
}
