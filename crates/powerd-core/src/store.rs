//! The persisted daemon state record.
//!
//! A single TOML document holding the last `User`/`Internal` activation:
//! the names of the drivers that were active and the profile that was
//! applied. Read once at startup; the driver names guard against
//! restoring a profile chosen under different hardware support.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::profile::Profile;

/// The persisted record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Name of the CPU driver that was active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_driver: Option<String>,
    /// Name of the platform driver that was active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_driver: Option<String>,
    /// The profile that was applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

/// Errors writing the state file.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The record could not be serialized.
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Handle to the on-disk state file.
///
/// A missing or unreadable file loads as an empty record; startup then
/// falls back to the default profile. Writes go through a temporary file
/// and a rename so a crash never leaves a half-written record.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: PersistedState,
}

impl StateStore {
    /// Load the state file at `path`, or start empty.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(state) => state,
                Err(err) => {
                    warn!("ignoring corrupt state file '{}': {err}", path.display());
                    PersistedState::default()
                },
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("no state file at '{}'", path.display());
                PersistedState::default()
            },
            Err(err) => {
                warn!("could not read state file '{}': {err}", path.display());
                PersistedState::default()
            },
        };
        Self { path, state }
    }

    /// The record as loaded or last saved.
    #[must_use]
    pub const fn state(&self) -> &PersistedState {
        &self.state
    }

    /// The backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the record and write it out atomically.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the file cannot be written; the
    /// in-memory record is updated regardless.
    pub fn save(&mut self, state: PersistedState) -> Result<(), StoreError> {
        self.state = state;
        let content = toml::to_string_pretty(&self.state)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

/// Default state file location.
#[must_use]
pub fn default_state_path() -> PathBuf {
    PathBuf::from("/var/lib/powerd/state.toml")
}
