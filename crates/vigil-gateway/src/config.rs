//! Server settings read from the environment.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `VIGIL_PORT` | `3000` | TCP port to listen on. |
//! | `VIGIL_SPEC` | `vigil.yaml` | Validator spec file (YAML, JSON or TOML). |
//! | `VIGIL_WATCH_SPEC` | `true` | Reconfigure the gate when the spec file changes. |
//! | `VIGIL_EVAL_TIMEOUT_MS` | *(none)* | Per-request evaluation budget. |

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ServerError, ServerResult};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SPEC_PATH: &str = "vigil.yaml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub spec_path: PathBuf,
    pub watch_spec: bool,
    pub eval_budget: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            spec_path: PathBuf::from(DEFAULT_SPEC_PATH),
            watch_spec: true,
            eval_budget: None,
        }
    }
}

impl ServerConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> ServerResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`; unset or blank variables keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ServerResult<Self> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(port) = get("VIGIL_PORT") {
            config.port = port.parse().map_err(|e| ServerError::InvalidSetting {
                name: "VIGIL_PORT",
                reason: format!("{e}"),
            })?;
        }
        if let Some(path) = get("VIGIL_SPEC") {
            config.spec_path = PathBuf::from(path);
        }
        if let Some(watch) = get("VIGIL_WATCH_SPEC") {
            config.watch_spec = match watch.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(ServerError::InvalidSetting {
                        name: "VIGIL_WATCH_SPEC",
                        reason: format!("expected a boolean, got '{other}'"),
                    });
                }
            };
        }
        if let Some(ms) = get("VIGIL_EVAL_TIMEOUT_MS") {
            let ms: u64 = ms.parse().map_err(|e| ServerError::InvalidSetting {
                name: "VIGIL_EVAL_TIMEOUT_MS",
                reason: format!("{e}"),
            })?;
            config.eval_budget = (ms > 0).then(|| Duration::from_millis(ms));
        }

        Ok(config)
    }
}
