//! Per-session JSON dumps of requests, replies and debug markers.
//!
//! Each session writes to `{root}/{session_id}/` as
//! `NNNN-{kind}.json`, numbered in write order.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{DialogError, Result};

/// Writes numbered JSON files into one session directory.
#[derive(Debug)]
pub struct DebugDump {
    dir: PathBuf,
    counter: usize,
}

impl DebugDump {
    /// Create the session directory under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`DialogError::Io`] if the directory cannot be created.
    pub fn create(root: &Path, session_id: &str) -> Result<Self> {
        let dir = root.join(session_id);
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, counter: 0 })
    }

    /// The session directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `value` as the next numbered `kind` file and return its path.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write<T: Serialize>(&mut self, kind: &str, value: &T) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| DialogError::Config(format!("failed to serialize {kind} dump: {e}")))?;
        self.counter += 1;
        let path = self.dir.join(format!("{:04}-{kind}.json", self.counter));
        std::fs::write(&path, json)?;
        Ok(path)
    }
}
