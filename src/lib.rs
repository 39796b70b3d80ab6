//! Core implementation of the chore task runner
//!
//! Chore runs named, parameterized tasks organized into nested collections. A collection's
//! tasks are exposed on the command line through a small parser that binds flags and
//! positional values, and an executor that runs the requested tasks together with their
//! pre and post tasks under layered configuration.

use std::path::PathBuf;

use log::{debug, warn};

use crate::collection::Collection;
use crate::config_file::{ConfigError, TaskFile};

pub mod collection;
pub mod config;
pub mod config_file;
pub mod context;
pub mod executor;
pub mod help;
pub mod logger;
pub mod parser;
pub mod tasks;

/// Load a task file (or auto-detect one), returning the root `Collection`, cwd, and file path.
///
/// # Errors
///
/// Returns `ConfigError` if the task file is not found, cannot be parsed, or declares
/// invalid tasks or collections.
pub fn load_collection(
    task_file: Option<&str>,
) -> Result<(Collection, PathBuf, PathBuf), ConfigError> {
    let path = match task_file {
        Some(file) => {
            let path = PathBuf::from(file);
            if !path.exists() {
                return Err(ConfigError::ConfigNotFound(path));
            }
            path
        }
        None => TaskFile::find_config()?,
    };
    let cwd = match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
        Some(parent) => parent.to_path_buf(),
        None => return Err(ConfigError::ConfigNotFound(path)),
    };
    debug!(
        "Loading tasks from {} (cwd: {})",
        path.display(),
        cwd.display()
    );
    let parsed = TaskFile::from_file(&path)?;
    validate_version(&parsed.chore_version);
    let collection = parsed.build(&cwd)?.with_loaded_from(path.clone());
    Ok((collection, cwd, path))
}

/// Warn if the file's `chore_version` doesn't match the binary version
fn validate_version(file_version: &str) {
    let binary_version = env!("CARGO_PKG_VERSION");
    if file_version != binary_version {
        warn!(
            "Task file chore_version '{file_version}' differs from binary version '{binary_version}'"
        );
    }
}
