//! Compares a fresh snapshot with the one persisted by the previous cycle

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::types::{Field, RegionRecord, Snapshot};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read snapshot {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write snapshot {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize snapshot for {path}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One line item of the change summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEntry {
    NewRegion {
        name: String,
        record: RegionRecord,
    },
    Changed {
        name: String,
        deltas: Vec<(Field, i128)>,
        record: RegionRecord,
    },
    Total(RegionRecord),
}

impl fmt::Display for ChangeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeEntry::NewRegion { name, record } => write!(f, "NEW REGION\n{}: {}", name, record),
            ChangeEntry::Changed {
                name,
                deltas,
                record,
            } => {
                writeln!(f, "{}", name)?;
                for (field, delta) in deltas {
                    writeln!(f, "{}: {:+}", field.label(), delta)?;
                }
                write!(f, "{}", record)
            }
            ChangeEntry::Total(record) => write!(f, "Total: {}", record),
        }
    }
}

/// Per-region changes from `old` to `new`, without the trailing total.
///
/// Regions that disappeared from `new` are not reported.
pub fn diff_snapshots(old: &Snapshot, new: &Snapshot) -> Vec<ChangeEntry> {
    let mut entries = Vec::new();
    for region in new.regions() {
        match old.get(&region.name) {
            None => {
                debug!(region = %region.name, record = %region.record, "New region");
                entries.push(ChangeEntry::NewRegion {
                    name: region.name.clone(),
                    record: region.record,
                });
            }
            Some(previous) => {
                let deltas = region.record.deltas_from(previous);
                if !deltas.is_empty() {
                    debug!(region = %region.name, ?deltas, "Region changed");
                    entries.push(ChangeEntry::Changed {
                        name: region.name.clone(),
                        deltas,
                        record: region.record,
                    });
                }
            }
        }
    }
    entries
}

/// Load the previous snapshot; `None` when there is nothing usable on disk
#[instrument(skip_all)]
pub fn load_snapshot(path: &Path) -> Result<Option<Snapshot>, StateError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No snapshot file found");
            return Ok(None);
        }
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            info!(path = %path.display(), "Snapshot file is not UTF-8");
            return Ok(None);
        }
        Err(source) => {
            return Err(StateError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if content.trim().is_empty() {
        info!(path = %path.display(), "Snapshot file present but empty");
        return Ok(None);
    }

    match serde_json::from_str(&content) {
        Ok(snapshot) => {
            info!(path = %path.display(), "Old data loaded");
            Ok(Some(snapshot))
        }
        Err(e) => {
            info!(path = %path.display(), error = %e, "Snapshot file could not be parsed");
            Ok(None)
        }
    }
}

/// Overwrite the snapshot file with `snapshot`
#[instrument(skip_all)]
pub fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), StateError> {
    let json = serde_json::to_string(snapshot).map_err(|source| StateError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|source| StateError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "New data dumped");
    Ok(())
}

/// Diff `new` against the snapshot stored at `path`.
///
/// With no usable previous snapshot the new one is stored and nothing is
/// reported. Otherwise the file is rewritten only when something changed,
/// and the summary ends with the new total.
#[instrument(skip_all)]
pub fn check_difference(path: &Path, new: &Snapshot) -> Result<Vec<ChangeEntry>, StateError> {
    let Some(old) = load_snapshot(path)? else {
        info!("No previous data, storing latest snapshot");
        save_snapshot(path, new)?;
        return Ok(Vec::new());
    };

    let mut entries = diff_snapshots(&old, new);
    if entries.is_empty() {
        info!("No changes in values");
        return Ok(entries);
    }

    info!(changes = entries.len(), "Changes in the values");
    entries.push(ChangeEntry::Total(new.total));
    save_snapshot(path, new)?;
    Ok(entries)
}
