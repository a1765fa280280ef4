//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::SyncConfig;
use super::secret_string;
use crate::domain::errors::SyncError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (`${VAR}` syntax)
/// 3. Parses the TOML into [`SyncConfig`]
/// 4. Applies environment variable overrides (`OUTCOME_SYNC_*` prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns [`SyncError::Configuration`] if the file is missing or unreadable,
/// a referenced variable is unset, parsing fails, or validation fails.
///
/// # Examples
///
/// ```no_run
/// use outcome_sync::config::load_config;
///
/// let config = load_config("outcome-sync.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<SyncConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(SyncError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        SyncError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let mut config = parse_config(&contents)?;

    apply_env_overrides(&mut config);

    config.validate().map_err(|e| {
        SyncError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Parse configuration text after `${VAR}` substitution, without validating
pub fn parse_config(contents: &str) -> Result<SyncConfig> {
    let contents = substitute_env_vars(contents)?;
    toml::from_str(&contents)
        .map_err(|e| SyncError::Configuration(format!("Failed to parse TOML: {}", e)))
}

/// Substitutes environment variables in the format `${VAR_NAME}`
///
/// Comment lines are copied untouched so documented placeholders don't need
/// to be set.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| SyncError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    processed_line = processed_line.replace(&format!("${{{var_name}}}"), &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(SyncError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Applies environment variable overrides using the `OUTCOME_SYNC_*` prefix
///
/// Variables follow the pattern `OUTCOME_SYNC_<SECTION>_<KEY>`, for example
/// `OUTCOME_SYNC_LMS_BASE_URL` or `OUTCOME_SYNC_SUBMISSION_BATCH_THRESHOLD`.
/// Values that fail to parse are ignored.
fn apply_env_overrides(config: &mut SyncConfig) {
    if let Ok(val) = std::env::var("OUTCOME_SYNC_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = env_parse("OUTCOME_SYNC_APPLICATION_DRY_RUN") {
        config.application.dry_run = val;
    }

    if let Ok(val) = std::env::var("OUTCOME_SYNC_LMS_BASE_URL") {
        config.lms.base_url = val;
    }
    if let Ok(val) = std::env::var("OUTCOME_SYNC_LMS_API_TOKEN") {
        config.lms.api_token = secret_string(val);
    }
    if let Some(val) = env_parse("OUTCOME_SYNC_LMS_TIMEOUT_SECONDS") {
        config.lms.timeout_seconds = val;
    }

    if let Some(val) = env_parse("OUTCOME_SYNC_SETUP_AUTO_CREATE") {
        config.setup.auto_create = val;
    }

    if let Some(val) = env_parse("OUTCOME_SYNC_SUBMISSION_BATCH_THRESHOLD") {
        config.submission.batch_threshold = val;
    }
    if let Some(val) = env_parse("OUTCOME_SYNC_SUBMISSION_MAX_ATTEMPTS") {
        config.submission.max_attempts = val;
    }
    if let Some(val) = env_parse("OUTCOME_SYNC_SUBMISSION_POLL_TIMEOUT_SECONDS") {
        config.submission.poll_timeout_seconds = val;
    }

    if let Some(val) = env_parse("OUTCOME_SYNC_VERIFICATION_MAX_ATTEMPTS") {
        config.verification.max_attempts = val;
    }
    if let Some(val) = env_parse("OUTCOME_SYNC_VERIFICATION_WAIT_MS") {
        config.verification.wait_ms = val;
    }

    if let Some(val) = env_parse("OUTCOME_SYNC_OVERRIDES_ENABLED") {
        config.overrides.enabled = val;
    }
    if let Some(val) = env_parse("OUTCOME_SYNC_OVERRIDES_SCALE_FACTOR") {
        config.overrides.scale_factor = val;
    }

    if let Ok(val) = std::env::var("OUTCOME_SYNC_STATE_DIRECTORY") {
        config.state.directory = val;
    }

    if let Some(val) = env_parse("OUTCOME_SYNC_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val;
    }
    if let Ok(val) = std::env::var("OUTCOME_SYNC_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[lms]
base_url = "https://lms.example.edu"
api_token = "secret-token"

[setup]
outcome_title = "Course Mastery"
container_title = "Mastery Score"
"#;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("OUTCOME_SYNC_TEST_TOKEN", "abc123");
        let input = "api_token = \"${OUTCOME_SYNC_TEST_TOKEN}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "api_token = \"abc123\"\n");
        std::env::remove_var("OUTCOME_SYNC_TEST_TOKEN");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        std::env::remove_var("OUTCOME_SYNC_MISSING_VAR");
        let input = "api_token = \"${OUTCOME_SYNC_MISSING_VAR}\"";
        let err = substitute_env_vars(input).unwrap_err();
        assert!(err.to_string().contains("OUTCOME_SYNC_MISSING_VAR"));
    }

    #[test]
    fn test_substitute_skips_comments() {
        let input = "# api_token = \"${NOT_SET_ANYWHERE_12345}\"";
        assert!(substitute_env_vars(input).is_ok());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent-outcome-sync.toml");
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }

    #[test]
    fn test_load_config_minimal_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.lms.base_url, "https://lms.example.edu");
        assert_eq!(config.setup.outcome_title, "Course Mastery");
        assert_eq!(config.submission.batch_threshold, 25);
        assert_eq!(config.overrides.scale_factor, 25.0);
        assert!(!config.application.dry_run);
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let contents = format!("{MINIMAL}\n[verification]\nmax_attempts = 0\n");
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let err = load_config(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("verification.max_attempts"));
    }
}
