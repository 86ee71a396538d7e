use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so that a batch can be traced back to the exact
/// configuration that drove it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID: &str = r#"
[auditor]
batch-size = 25
batch-time-budget = 240
request-delay = 500

[user-agent]
crawler-name = "TestAuditor"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[output]
database-path = "./audit.db"
"#;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.auditor.batch_size, 25);
        assert_eq!(config.auditor.batch_time_budget, 240);
        assert_eq!(config.auditor.request_timeout, 30);
        assert_eq!(config.auditor.aux_timeout, 5);
        assert_eq!(config.auditor.max_pages, None);
        assert_eq!(config.user_agent.crawler_name, "TestAuditor");
        assert!(config.summary.is_none());
    }

    #[test]
    fn test_summary_section() {
        let content = format!(
            "{}\n[summary]\nendpoint = \"https://llm.example.com/summarize\"\n",
            VALID
        );
        let config = parse_config(&content).unwrap();
        let summary = config.summary.unwrap();
        assert_eq!(summary.endpoint, "https://llm.example.com/summarize");
        assert_eq!(summary.timeout, 20);
    }

    #[test]
    fn test_user_agent_header_value() {
        let config = parse_config(VALID).unwrap();
        assert_eq!(
            config.user_agent.header_value(),
            "TestAuditor/1.0 (+https://example.com/about; admin@example.com)"
        );
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        assert!(load_config(Path::new("/nonexistent/config.toml")).is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        assert!(matches!(
            load_config(file.path()).unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = VALID.replace("batch-size = 25", "batch-size = 0");
        let result = parse_config(&content);
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }
}
