//! Registry export for auditors
//!
//! An export bundles the security snapshot with the full event log. The log
//! is authoritative; [`RegistryExport::verify`] replays it and checks that the
//! snapshot describes the state the log produces.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use vigil_core::{
    error::{Error, Result},
    events::{EventRecord, RegistryEvent},
    ReplayedRegistry,
};

use crate::registry::{Registry, SecuritySnapshot};

/// Format version written into every export
pub const EXPORT_VERSION: u32 = 1;

/// Serialized registry state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryExport {
    pub format_version: u32,
    /// Clock seconds at export time
    pub exported_at: u64,
    pub snapshot: SecuritySnapshot,
    pub events: Vec<EventRecord<RegistryEvent>>,
}

impl RegistryExport {
    pub fn from_registry(registry: &Registry, exported_at: u64) -> Self {
        Self {
            format_version: EXPORT_VERSION,
            exported_at,
            snapshot: registry.security_snapshot(),
            events: registry.events().records().to_vec(),
        }
    }

    /// Replay the event log and compare it with the snapshot
    pub fn verify(&self) -> Result<ReplayedRegistry> {
        if self.format_version != EXPORT_VERSION {
            return Err(Error::Serialization(format!(
                "unsupported export format {}",
                self.format_version
            )));
        }

        let replayed = ReplayedRegistry::replay(&self.events)?;
        let end = self.events.len() as u64;
        let snapshot = &self.snapshot;

        if replayed.version() != Some(snapshot.version) {
            return Err(mismatch(end, "snapshot version differs from the log"));
        }
        if replayed.hash() != Some(snapshot.current_hash) {
            return Err(mismatch(end, "snapshot hash differs from the log"));
        }
        if replayed.paused != snapshot.paused {
            return Err(mismatch(end, "snapshot pause flag differs from the log"));
        }
        if replayed.authorized_group != Some(snapshot.authorized_group) {
            return Err(mismatch(end, "snapshot group differs from the log"));
        }
        let (active, revoked) = replayed.devices.count_by_status();
        if active != snapshot.active_devices || revoked != snapshot.revoked_devices {
            return Err(mismatch(end, "snapshot device counts differ from the log"));
        }

        Ok(replayed)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write to a temp file first, then rename over `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        info!(
            "Exported {} events (version {}) to {:?}",
            self.events.len(),
            self.snapshot.version,
            path
        );
        Ok(())
    }
}

fn mismatch(sequence: u64, reason: &str) -> Error {
    Error::ReplayMismatch {
        sequence,
        reason: reason.to_string(),
    }
}
