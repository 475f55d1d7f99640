//! Step journal for a run.
//!
//! The [`StepJournal`] keeps the most recent [`StepLog`] entries in a ring
//! buffer and, when created with a directory, appends every entry to a JSON
//! Lines file named `{run_name}_{timestamp}.jsonl`.

use std::collections::VecDeque;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use crate::step::StepLog;

/// Maximum number of entries kept in memory.
const MAX_JOURNAL_SIZE: usize = 1000;

/// Records executed steps for a run.
pub struct StepJournal {
    entries: RwLock<VecDeque<StepLog>>,
    writer: Mutex<Option<BufWriter<std::fs::File>>>,
    path: Option<PathBuf>,
}

impl StepJournal {
    /// A journal that only keeps entries in memory.
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            writer: Mutex::new(None),
            path: None,
        }
    }

    /// A journal that also persists to `dir/{run_name}_{timestamp}.jsonl`.
    ///
    /// Falls back to memory-only if the file cannot be created.
    pub fn with_log_dir(dir: &Path, run_name: &str) -> Self {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{}_{}.jsonl", run_name, timestamp));
        let writer = std::fs::create_dir_all(dir)
            .and_then(|_| std::fs::File::create(&path))
            .map(BufWriter::new);
        match writer {
            Ok(writer) => Self {
                entries: RwLock::new(VecDeque::new()),
                writer: Mutex::new(Some(writer)),
                path: Some(path),
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot create step journal file");
                Self::in_memory()
            }
        }
    }

    /// Path of the JSON Lines file, if persisting.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends an entry.
    pub async fn record(&self, entry: StepLog) {
        {
            let mut writer_guard = self.writer.lock().await;
            if let Some(ref mut writer) = *writer_guard {
                match serde_json::to_string(&entry) {
                    Ok(json) => {
                        if let Err(e) = writeln!(writer, "{}", json).and_then(|_| writer.flush()) {
                            warn!(error = %e, "cannot write step journal entry");
                        }
                    }
                    Err(e) => warn!(error = %e, "cannot serialize step journal entry"),
                }
            }
        }

        let mut entries = self.entries.write().await;
        if entries.len() >= MAX_JOURNAL_SIZE {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Returns all in-memory entries in chronological order.
    pub async fn entries(&self) -> Vec<StepLog> {
        self.entries.read().await.iter().cloned().collect()
    }
}

impl std::fmt::Debug for StepJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepJournal")
            .field("entries", &"<RwLock<VecDeque<StepLog>>>")
            .field("writer", &"<Mutex<Option<BufWriter<File>>>>")
            .field("path", &self.path)
            .finish()
    }
}
