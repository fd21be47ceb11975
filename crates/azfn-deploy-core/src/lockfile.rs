//! Local record of the previous run's parameters, offered for reuse on the next
//! interactive run

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

pub const LOCK_FILE_NAME: &str = ".azfn-deploy.lock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLock {
    pub project_name: String,
    pub resource_group: String,
    pub location: String,
    pub timestamp: DateTime<Utc>,
}

impl RunLock {
    /// Read the lock file; a missing or unreadable file counts as no previous run
    pub fn load(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(lock) => Some(lock),
            Err(e) => {
                warn!("Ignoring unreadable lock file {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write lock file {}", path.display()))
    }
}
