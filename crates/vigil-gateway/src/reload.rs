//! Spec-file hot reload.
//!
//! Each change to the spec file is loaded and handed to
//! [`Gate::reconfigure_spec`].  A file that fails to load or build leaves the
//! live generation serving.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use vigil_validator::{FileWatcher, Gate, GateError, ValidatorSpec};

use crate::error::ServerResult;

const SPEC_DEBOUNCE: Duration = Duration::from_millis(250);

/// Reload the spec at `path` into `gate` once.
pub fn apply_spec_file(gate: &Gate, path: &Path) -> Result<u64, GateError> {
    let spec = ValidatorSpec::load(path)?;
    gate.reconfigure_spec(spec)
}

/// Keeps the gate in sync with its spec file until dropped.
pub struct SpecReloader {
    watcher: FileWatcher,
}

impl SpecReloader {
    pub fn spawn(gate: Arc<Gate>, path: impl AsRef<Path>) -> ServerResult<Self> {
        let watcher = FileWatcher::spawn(path, SPEC_DEBOUNCE, move |path| {
            match apply_spec_file(&gate, path) {
                Ok(generation) => {
                    info!(path = %path.display(), generation, "Validator spec reloaded")
                }
                Err(GateError::Released) => {}
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    live_generation = ?gate.generation(),
                    "Validator spec rejected; keeping live generation"
                ),
            }
        })?;
        Ok(Self { watcher })
    }

    pub fn stop(&self) {
        self.watcher.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_validator::GateState;

    const HEADERS_ONLY: &str = "headers:\n  X-Api-Key:\n    values: [\"k1\"]\n";

    #[test]
    fn apply_spec_file_swaps_generation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vigil.yaml");
        std::fs::write(&path, HEADERS_ONLY).unwrap();

        let gate = Gate::from_spec(ValidatorSpec::load(&path).unwrap()).unwrap();
        assert_eq!(apply_spec_file(&gate, &path).unwrap(), 2);

        std::fs::write(&path, "{}\n").unwrap();
        assert!(matches!(
            apply_spec_file(&gate, &path),
            Err(GateError::Config(vigil_validator::ConfigError::Empty))
        ));
        assert_eq!(gate.state(), GateState::Live { generation: 2 });
    }

    #[tokio::test]
    async fn watcher_reconfigures_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vigil.yaml");
        std::fs::write(&path, HEADERS_ONLY).unwrap();

        let gate = Arc::new(Gate::from_spec(ValidatorSpec::load(&path).unwrap()).unwrap());
        let reloader = SpecReloader::spawn(Arc::clone(&gate), &path).unwrap();

        std::fs::write(&path, "headers:\n  X-Tenant:\n    regexp: \".+\"\n").unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while gate.generation() == Some(1) && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gate.generation() >= Some(2));
        reloader.stop();
    }
}
