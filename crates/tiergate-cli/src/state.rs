//! Host-side persistence: the account tier rows and the audit trail.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tiergate_core::{AccountTierRecord, GateError, GateEvent};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info, warn};

const STATE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    accounts: Vec<AccountTierRecord>,
}

/// JSON file holding one `AccountTierRecord` per account.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every row. A missing file means no account has been seen yet.
    pub fn load(&self) -> tiergate_core::Result<Vec<AccountTierRecord>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no state file yet");
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let file: StateFile = serde_json::from_str(&raw).map_err(|e| {
            GateError::State(format!("cannot parse {}: {}", self.path.display(), e))
        })?;
        if file.version != STATE_VERSION {
            return Err(GateError::State(format!(
                "{} has state version {}, expected {}",
                self.path.display(),
                file.version,
                STATE_VERSION
            )));
        }
        info!(path = %self.path.display(), accounts = file.accounts.len(), "loaded tier state");
        Ok(file.accounts)
    }

    /// Replace the file with `records`. Writes a sibling temp file and renames
    /// it so a crash never leaves a half-written state file.
    pub fn save(&self, records: &[AccountTierRecord]) -> tiergate_core::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = StateFile {
            version: STATE_VERSION,
            accounts: records.to_vec(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), accounts = records.len(), "saved tier state");
        Ok(())
    }
}

/// Append-only JSON-lines file of gate events.
pub struct AuditLog {
    file: File,
}

impl AuditLog {
    pub fn open(path: &Path) -> tiergate_core::Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }

    pub fn append(&mut self, event: &GateEvent) -> tiergate_core::Result<()> {
        let line = serde_json::to_string(event)?;
        writeln!(self.file, "{line}")?;
        Ok(())
    }

    /// Write every event already queued on `rx` without waiting for more.
    pub fn drain(&mut self, rx: &mut broadcast::Receiver<GateEvent>) -> tiergate_core::Result<usize> {
        let mut written = 0;
        loop {
            match rx.try_recv() {
                Ok(event) => {
                    self.append(&event)?;
                    written += 1;
                }
                Err(TryRecvError::Lagged(n)) => warn!(skipped = n, "audit log fell behind"),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        self.file.flush()?;
        Ok(written)
    }

    /// Follow `rx` until the bus closes.
    pub async fn follow(mut self, mut rx: broadcast::Receiver<GateEvent>) {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.append(&event).and_then(|_| Ok(self.file.flush()?)) {
                        warn!(error = %e, "failed to write audit event");
                    }
                }
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "audit log fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    }
}
