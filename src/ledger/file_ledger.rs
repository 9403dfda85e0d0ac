use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use crate::error_handling::types::LedgerError;
use crate::ledger::ledger_trait::Ledger;
use crate::ledger::types::LedgerEntry;

/// Append-only JSON lines ledger.
///
/// Every recorded entry is one line. The file is replayed on open, so
/// decisions survive restarts. Pruning rewrites the file through a temporary
/// sibling and an atomic rename.
pub struct FileLedger {
    path: PathBuf,
    index: Mutex<HashMap<String, LedgerEntry>>,
}

impl FileLedger {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                error!("Failed to create ledger dir {}: {}", parent.display(), e);
                LedgerError::WriteFailed
            })?;
        }

        let mut index = HashMap::new();
        if path.exists() {
            let file = File::open(&path).map_err(|e| {
                error!("Failed to open ledger {}: {}", path.display(), e);
                LedgerError::ReadFailed
            })?;
            for (number, line) in BufReader::new(file).lines().enumerate() {
                let line = line.map_err(|e| {
                    error!("Failed to read ledger {}: {}", path.display(), e);
                    LedgerError::ReadFailed
                })?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LedgerEntry>(&line) {
                    // first decision sticks, later duplicates are ignored
                    Ok(entry) => {
                        index.entry(entry.session_id.clone()).or_insert(entry);
                    }
                    Err(e) => warn!(
                        "Skipping corrupt ledger line {} in {}: {}",
                        number + 1,
                        path.display(),
                        e
                    ),
                }
            }
        }
        info!("File ledger opened at {} with {} entries", path.display(), index.len());

        Ok(Self {
            path,
            index: Mutex::new(index),
        })
    }

    fn append_line(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let line = serde_json::to_string(entry).map_err(|e| {
            error!("Failed to serialize ledger entry {}: {}", entry.session_id, e);
            LedgerError::WriteFailed
        })?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                error!("Open append failed {}: {}", self.path.display(), e);
                LedgerError::WriteFailed
            })?;
        writeln!(f, "{}", line)
            .and_then(|_| f.sync_data())
            .map_err(|e| {
                error!("Write failed {}: {}", self.path.display(), e);
                LedgerError::WriteFailed
            })?;
        Ok(())
    }

    fn rewrite(&self, entries: &HashMap<String, LedgerEntry>) -> Result<(), LedgerError> {
        let tmp = self.path.with_extension("tmp");
        let mut sorted: Vec<&LedgerEntry> = entries.values().collect();
        sorted.sort_by_key(|e| e.recorded_at);

        let mut f = File::create(&tmp).map_err(|e| {
            error!("Failed to create {}: {}", tmp.display(), e);
            LedgerError::WriteFailed
        })?;
        for entry in sorted {
            let line = serde_json::to_string(entry).map_err(|_| LedgerError::WriteFailed)?;
            writeln!(f, "{}", line).map_err(|e| {
                error!("Write failed {}: {}", tmp.display(), e);
                LedgerError::WriteFailed
            })?;
        }
        f.sync_all().map_err(|_| LedgerError::WriteFailed)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            error!("Failed to replace {}: {}", self.path.display(), e);
            LedgerError::WriteFailed
        })
    }
}

#[async_trait]
impl Ledger for FileLedger {
    async fn has_been_processed(&self, session_id: &str) -> Result<bool, LedgerError> {
        let index = self.index.lock().map_err(|_| LedgerError::ReadFailed)?;
        Ok(index.contains_key(session_id))
    }

    async fn record(&self, entry: LedgerEntry) -> Result<bool, LedgerError> {
        let mut index = self.index.lock().map_err(|_| LedgerError::WriteFailed)?;
        if index.contains_key(&entry.session_id) {
            debug!("Session {} already recorded, keeping first decision", entry.session_id);
            return Ok(false);
        }
        // disk first: an entry only counts once it is durable
        self.append_line(&entry)?;
        index.insert(entry.session_id.clone(), entry);
        Ok(true)
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let index = self.index.lock().map_err(|_| LedgerError::ReadFailed)?;
        let mut list: Vec<LedgerEntry> = index.values().cloned().collect();
        list.sort_by_key(|e| e.recorded_at);
        Ok(list)
    }

    async fn prune(
        &self,
        older_than: DateTime<Utc>,
        active: &HashSet<String>,
    ) -> Result<usize, LedgerError> {
        let mut index = self.index.lock().map_err(|_| LedgerError::WriteFailed)?;
        let mut kept = index.clone();
        kept.retain(|id, e| e.recorded_at >= older_than || active.contains(id));
        let removed = index.len() - kept.len();
        if removed > 0 {
            self.rewrite(&kept)?;
            *index = kept;
            info!(
                "Pruned {} ledger entr{} (cutoff: {})",
                removed,
                if removed == 1 { "y" } else { "ies" },
                older_than.to_rfc3339()
            );
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::types::Category;
    use crate::ledger::types::Decision;
    use chrono::Duration;
    use tempfile::tempdir;

    fn entry(id: &str, decision: Decision) -> LedgerEntry {
        LedgerEntry::new(id, decision, "203.0.113.5".parse().unwrap(), "alice", Category::Vpn)
    }

    #[tokio::test]
    async fn decisions_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger").join("decisions.jsonl");

        {
            let ledger = FileLedger::open(&path).unwrap();
            assert!(ledger.record(entry("s1", Decision::Blocked)).await.unwrap());
            assert!(ledger.record(entry("s2", Decision::Allowed)).await.unwrap());
            assert!(!ledger.record(entry("s1", Decision::Allowed)).await.unwrap());
        }

        let reopened = FileLedger::open(&path).unwrap();
        assert!(reopened.has_been_processed("s1").await.unwrap());
        assert!(reopened.has_been_processed("s2").await.unwrap());
        assert!(!reopened.has_been_processed("s3").await.unwrap());

        let entries = reopened.entries().await.unwrap();
        let s1 = entries.iter().find(|e| e.session_id == "s1").unwrap();
        assert_eq!(s1.decision, Decision::Blocked);
    }

    #[tokio::test]
    async fn corrupt_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");
        let good = serde_json::to_string(&entry("s1", Decision::Blocked)).unwrap();
        fs::write(&path, format!("{}\nnot json\n\n", good)).unwrap();

        let ledger = FileLedger::open(&path).unwrap();
        assert_eq!(ledger.entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn prune_rewrites_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");
        let ledger = FileLedger::open(&path).unwrap();

        let mut old = entry("old", Decision::Allowed);
        old.recorded_at = Utc::now() - Duration::days(10);
        ledger.record(old).await.unwrap();
        ledger.record(entry("new", Decision::Blocked)).await.unwrap();

        assert_eq!(ledger.prune(Utc::now() - Duration::days(7), &HashSet::new()).await.unwrap(), 1);
        assert_eq!(ledger.prune(Utc::now() - Duration::days(7), &HashSet::new()).await.unwrap(), 0);

        let reopened = FileLedger::open(&path).unwrap();
        assert!(!reopened.has_been_processed("old").await.unwrap());
        assert!(reopened.has_been_processed("new").await.unwrap());
    }
}
