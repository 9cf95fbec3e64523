//! Configuration loading.
//!
//! Loads typed configuration from YAML, JSON or TOML files.
//!
//! ## Features
//!
//! - Auto-detection of format from file extension
//! - Environment variable substitution (`${VAR}` and `$VAR` syntax)
//! - Keys are passed to `serde` untouched, so camelCase section names such
//!   as `basicAuth` survive loading

use regex::Regex;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::LazyLock;


/// Configuration loading error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
    Toml,
}

static BRACED_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("braced env var pattern is valid")
});

static SIMPLE_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("simple env var pattern is valid")
});

/// Detect configuration format from file extension
///
/// # Supported Extensions
///
/// - YAML: `.yaml`, `.yml`
/// - JSON: `.json`
/// - TOML: `.toml`
pub fn detect_format(path: impl AsRef<Path>) -> ConfigResult<FileFormat> {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "json" => Ok(FileFormat::Json),
        "toml" => Ok(FileFormat::Toml),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Substitute environment variables in a string
///
/// Supports both `${VAR_NAME}` and `$VAR_NAME` syntax.  References to unset
/// variables are left as they are.
///
/// # Example
///
/// ```rust,ignore
/// use vigil_kernel::config::substitute_env_vars;
///
/// let result = substitute_env_vars("secret: ${JWT_SECRET}");
/// ```
pub fn substitute_env_vars(content: &str) -> String {
    // Braced syntax first so `${A}` is never read as `$` + `{A}`.
    let result = BRACED_VAR.replace_all(content, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    SIMPLE_VAR
        .replace_all(&result, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Load configuration from a file
///
/// Automatically detects the format from the file extension and performs
/// environment variable substitution on the loaded content.
///
/// # Example
///
/// ```rust,ignore
/// use vigil_kernel::config::load_config;
///
/// let spec: ValidatorSpec = load_config("validator.yaml")?;
/// ```
pub fn load_config<T>(path: impl AsRef<Path>) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    tracing::debug!(path = %path.display(), ?format, "loading configuration file");
    from_str(&content, format)
}

/// Load configuration from a string with explicit format
///
/// # Example
///
/// ```rust,ignore
/// use vigil_kernel::config::{from_str, FileFormat};
///
/// let spec: ValidatorSpec = from_str("headers: {}", FileFormat::Yaml)?;
/// ```
pub fn from_str<T>(content: &str, format: FileFormat) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let substituted = substitute_env_vars(content);

    match format {
        FileFormat::Yaml => {
            serde_yaml::from_str(&substituted).map_err(|e| ConfigError::Parse(e.to_string()))
        }
        FileFormat::Json => {
            serde_json::from_str(&substituted).map_err(|e| ConfigError::Parse(e.to_string()))
        }
        FileFormat::Toml => {
            toml::from_str(&substituted).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }
}
