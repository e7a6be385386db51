use std::env;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    pub gemini_image_model: String,
    pub gemini_classifier_model: String,
    pub gemini_request_timeout_seconds: u64,
    pub gemini_max_retry_attempts: usize,
    pub gemini_safety_settings: String,
    pub output_dir: PathBuf,
    pub export_dir: PathBuf,
    pub keep_result_on_failed_refinement: bool,
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::load);

/// Raised when the Gemini credential is missing or malformed. Cloned into
/// every generation attempt while the client is unavailable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY is not set. Add it to your environment or .env file to enable image generation.")]
    MissingApiKey,
    #[error("GEMINI_API_KEY is invalid: {0}. Check the key in your environment or .env file.")]
    InvalidApiKey(String),
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn normalize_gemini_safety_settings(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "standard".to_string();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "permissive" | "off" | "none" => "permissive".to_string(),
        "standard" => "standard".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to standard.",
                value
            );
            "standard".to_string()
        }
    }
}

fn normalize_api_base(value: String) -> String {
    value.trim().trim_end_matches('/').to_string()
}

/// Checks the shape of a Gemini API key without contacting the service.
pub fn validate_api_key(raw: &str) -> Result<String, ConfigError> {
    let key = raw.trim();
    if key.is_empty() {
        return Err(ConfigError::MissingApiKey);
    }
    if key.len() < 20 {
        return Err(ConfigError::InvalidApiKey("the value is too short".to_string()));
    }
    if !key
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(ConfigError::InvalidApiKey(
            "the value contains unexpected characters".to_string(),
        ));
    }
    Ok(key.to_string())
}

impl Config {
    pub fn load() -> Self {
        Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            gemini_api_key: env_string("GEMINI_API_KEY", ""),
            gemini_api_base: normalize_api_base(env_string(
                "GEMINI_API_BASE",
                "https://generativelanguage.googleapis.com/v1beta",
            )),
            gemini_image_model: env_string("GEMINI_IMAGE_MODEL", "gemini-2.5-flash-image-preview"),
            gemini_classifier_model: env_string("GEMINI_CLASSIFIER_MODEL", "gemini-2.5-flash"),
            gemini_request_timeout_seconds: env_u64("GEMINI_REQUEST_TIMEOUT_SECONDS", 90),
            gemini_max_retry_attempts: env_usize("GEMINI_MAX_RETRY_ATTEMPTS", 2).max(1),
            gemini_safety_settings: normalize_gemini_safety_settings(env_string(
                "GEMINI_SAFETY_SETTINGS",
                "standard",
            )),
            output_dir: PathBuf::from(env_string("OUTPUT_DIR", "outputs")),
            export_dir: PathBuf::from(env_string("EXPORT_DIR", "exports")),
            keep_result_on_failed_refinement: env_bool("KEEP_RESULT_ON_FAILED_REFINEMENT", false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_key() {
        assert_eq!(validate_api_key("   "), Err(ConfigError::MissingApiKey));
    }

    #[test]
    fn rejects_malformed_key() {
        assert!(matches!(
            validate_api_key("short"),
            Err(ConfigError::InvalidApiKey(_))
        ));
        assert!(matches!(
            validate_api_key("AIzaSy this key has spaces in it"),
            Err(ConfigError::InvalidApiKey(_))
        ));
    }

    #[test]
    fn accepts_well_formed_key() {
        let key = validate_api_key(" AIzaSyA1b2C3d4E5f6G7h8I9j0K_lmnop-qrs ").unwrap();
        assert_eq!(key, "AIzaSyA1b2C3d4E5f6G7h8I9j0K_lmnop-qrs");
    }

    #[test]
    fn unknown_safety_profile_falls_back_to_standard() {
        assert_eq!(
            normalize_gemini_safety_settings("loose".to_string()),
            "standard"
        );
        assert_eq!(
            normalize_gemini_safety_settings("OFF".to_string()),
            "permissive"
        );
    }
}
