use std::path::PathBuf;

/// Fatal precondition failures. Everything else is tallied per file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{what} not found: {}", path.display())]
    MissingRoot { what: &'static str, path: PathBuf },
    #[error("manifest not found: {}", .0.display())]
    MissingManifest(PathBuf),
}

impl ConfigError {
    /// Fail with `MissingRoot` unless `path` is an existing directory.
    pub fn require_dir(what: &'static str, path: &std::path::Path) -> Result<(), ConfigError> {
        if path.is_dir() {
            Ok(())
        } else {
            Err(ConfigError::MissingRoot {
                what,
                path: path.to_path_buf(),
            })
        }
    }
}

/// A run stopped early because cancellation was requested.
#[derive(Debug, thiserror::Error)]
#[error("operation cancelled")]
pub struct CancelledError;
