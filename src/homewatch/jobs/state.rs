// Homewatch - Home monitoring telemetry pipeline
//
// Copyright 2026 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use serde_json::{Map, Value};
use std::io;
use std::path::{Path, PathBuf};

const BACKUP_SUFFIX: &str = ".backup-of-previous";

/// Last state of each job, by job name.
pub type JobStates = Map<String, Value>;

/// Error loading or saving job state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("job state io error: {0}")]
    Io(#[from] io::Error),
    #[error("job state is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("job state file {} does not contain a json object", .0.display())]
    NotAnObject(PathBuf),
}

/// JSON file holding the state of every job, with a copy of the previous version
/// kept next to it each time it's overwritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        StateStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(BACKUP_SUFFIX);
        PathBuf::from(name)
    }

    /// Load the state of all jobs, creating the directory the state file lives in
    /// if needed. No state file yet means no job has any state.
    pub async fn load(&self) -> Result<JobStates, StateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(JobStates::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Value>(&bytes)? {
            Value::Object(m) => Ok(m),
            _ => Err(StateError::NotAnObject(self.path.clone())),
        }
    }

    /// Replace the state file with `states`, first copying the current file (if
    /// any) to the backup location.
    pub async fn save(&self, states: &JobStates) -> Result<(), StateError> {
        match tokio::fs::copy(&self.path, self.backup_path()).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let bytes = serde_json::to_vec(states)?;
        tokio::fs::write(&self.path, bytes).await?;

        tracing::debug!(message = "saved job states", path = %self.path.display(), jobs = states.len());
        Ok(())
    }
}
