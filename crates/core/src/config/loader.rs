use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use sha2::{Digest, Sha256};
use std::path::Path;

use super::{
    types::{Config, SanitizedConfig},
    ConfigError,
};

/// Load configuration from file with environment variable overrides.
///
/// Overrides use the `DEACTIVATOR_` prefix with `__` between sections,
/// e.g. `DEACTIVATOR_ENDPOINT__SECRET_KEY`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("DEACTIVATOR_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// SHA-256 of the sanitized config, recorded with every run.
pub fn config_hash(config: &Config) -> String {
    let sanitized = SanitizedConfig::from(config);
    let json = serde_json::to_string(&sanitized).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID: &str = r#"
[endpoint]
base_url = "https://rsp.example.com"
access_key = "ak"
secret_key = "sk"

[dispatch]
chunk_size = 25
"#;

    #[test]
    fn test_load_config_from_str_valid() {
        let config = load_config_from_str(VALID).unwrap();
        assert_eq!(config.dispatch.chunk_size, 25);
    }

    #[test]
    fn test_load_config_from_str_missing_endpoint() {
        let toml = r#"
[dispatch]
chunk_size = 10
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"{VALID}
[[ranges]]
name = "esim"
start = "89238010000101000000"
end = "89238010000101999999"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.dispatch.chunk_size, 25);
        assert_eq!(config.ranges.len(), 1);
        assert_eq!(config.endpoint.base_url, "https://rsp.example.com");
    }

    #[test]
    fn test_config_hash_ignores_secret_values() {
        let a = load_config_from_str(VALID).unwrap();
        let mut b = a.clone();
        b.endpoint.secret_key = "rotated".to_string();
        assert_eq!(config_hash(&a), config_hash(&b));

        b.dispatch.chunk_size = 5;
        assert_ne!(config_hash(&a), config_hash(&b));
    }
}
