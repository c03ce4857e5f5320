//! # Durable Relation Store
//!
//! Keeps the membership relation in `<data_dir>/grants/memberships.log`.
//!
//! ## Format
//!
//! One mutation per line:
//!
//! ```text
//! <crc32 as 8 hex digits> <json entry>
//! ```
//!
//! where the entry is `{"op":"put","record":{...}}` or
//! `{"op":"delete","id":"..."}`. The checksum covers the JSON bytes.
//!
//! ## Invariants
//! - A batch is appended with one write and synced before the in-memory
//!   view changes, so a batch is visible entirely or not at all
//! - A failed append is truncated back to the last acknowledged batch; if
//!   that truncation fails the store refuses every later write
//! - Any checksum or parse failure during replay aborts the open

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};

use super::errors::{MembershipError, MembershipResult};
use super::names::Actor;
use super::record::{EntityKey, Field, MembershipDraft, MembershipRecord, RecordId};
use super::relation::{RelationDescriptor, RelationHandle};
use super::store::{distinct_values, QuerySpec, RelationStore};
use crate::observability::{log_event_with_fields, Event};

const GRANTS_DIR: &str = "grants";
const LOG_FILE: &str = "memberships.log";

/// One line of the relation log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntry {
    Put { record: MembershipRecord },
    Delete { id: RecordId },
}

/// CRC32 (IEEE) over `data`
fn checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

fn encode_line(entry: &LogEntry) -> MembershipResult<String> {
    let json = serde_json::to_string(entry)
        .map_err(|e| MembershipError::store(format!("Failed to encode log entry: {}", e)))?;
    Ok(format!("{:08x} {}\n", checksum(json.as_bytes()), json))
}

fn decode_line(line: &str, line_no: usize) -> MembershipResult<LogEntry> {
    let (crc_hex, json) = line.split_once(' ').ok_or_else(|| {
        MembershipError::Corruption(format!("line {}: missing checksum separator", line_no))
    })?;
    let expected = u32::from_str_radix(crc_hex, 16).map_err(|_| {
        MembershipError::Corruption(format!("line {}: malformed checksum", line_no))
    })?;
    if checksum(json.as_bytes()) != expected {
        return Err(MembershipError::Corruption(format!(
            "line {}: checksum mismatch",
            line_no
        )));
    }
    serde_json::from_str(json)
        .map_err(|e| MembershipError::Corruption(format!("line {}: {}", line_no, e)))
}

/// Append handle of the relation log
struct LogWriter {
    file: File,
    /// Set when a torn append could not be rolled back
    failed: bool,
}

/// Injected write faults
#[cfg(test)]
#[derive(Debug, Default)]
struct WriteFaults {
    /// Write only this many bytes of the next batch, then fail
    torn_next: Option<usize>,
    /// Fail the truncation that undoes a torn write
    fail_rollback: bool,
}

/// File-backed relation store
pub struct FileRelationStore {
    log_path: PathBuf,
    schema_name: String,
    writer: Mutex<LogWriter>,
    tables: RwLock<HashSet<String>>,
    records: RwLock<BTreeMap<RecordId, MembershipRecord>>,
    #[cfg(test)]
    faults: Mutex<WriteFaults>,
}

impl FileRelationStore {
    /// Open or create the store under `data_dir`, replaying the log.
    pub fn open(data_dir: &Path) -> MembershipResult<Self> {
        let grants_dir = data_dir.join(GRANTS_DIR);
        fs::create_dir_all(&grants_dir).map_err(|e| {
            MembershipError::store(format!(
                "Failed to create grants directory {}: {}",
                grants_dir.display(),
                e
            ))
        })?;

        let log_path = grants_dir.join(LOG_FILE);
        let records = Self::replay(&log_path).map_err(|e| {
            if let MembershipError::Corruption(reason) = &e {
                let path = log_path.display().to_string();
                log_event_with_fields(
                    Event::StoreCorruption,
                    &[("path", path.as_str()), ("reason", reason.as_str())],
                );
            }
            e
        })?;

        let writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| {
                MembershipError::store(format!(
                    "Failed to open relation log {}: {}",
                    log_path.display(),
                    e
                ))
            })?;

        let path = log_path.display().to_string();
        let count = records.len().to_string();
        log_event_with_fields(
            Event::StoreOpened,
            &[("path", path.as_str()), ("records", count.as_str())],
        );

        Ok(Self {
            log_path,
            schema_name: "aerodb".to_string(),
            writer: Mutex::new(LogWriter {
                file: writer,
                failed: false,
            }),
            tables: RwLock::new(HashSet::new()),
            records: RwLock::new(records),
            #[cfg(test)]
            faults: Mutex::new(WriteFaults::default()),
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn replay(path: &Path) -> MembershipResult<BTreeMap<RecordId, MembershipRecord>> {
        let mut records = BTreeMap::new();
        if !path.exists() {
            return Ok(records);
        }

        let file = File::open(path).map_err(|e| {
            MembershipError::store(format!("Failed to read relation log: {}", e))
        })?;

        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| {
                MembershipError::store(format!("Failed to read relation log: {}", e))
            })?;
            if line.is_empty() {
                continue;
            }
            match decode_line(&line, idx + 1)? {
                LogEntry::Put { record } => {
                    records.insert(record.id(), record);
                }
                LogEntry::Delete { id } => {
                    records.remove(&id);
                }
            }
        }

        Ok(records)
    }

    fn append(&self, entries: &[LogEntry]) -> MembershipResult<()> {
        let mut batch = String::new();
        for entry in entries {
            batch.push_str(&encode_line(entry)?);
        }

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| MembershipError::store("Lock poisoned"))?;
        if writer.failed {
            return Err(MembershipError::store(
                "Relation log has an unrecovered partial write; reopen the store",
            ));
        }

        let prev_len = writer
            .file
            .metadata()
            .map_err(|e| MembershipError::store(format!("Failed to stat relation log: {}", e)))?
            .len();

        let written = self
            .write_batch(&mut writer.file, batch.as_bytes())
            .and_then(|_| writer.file.sync_all());
        if let Err(e) = written {
            if let Err(rollback) = self.truncate(&writer.file, prev_len) {
                writer.failed = true;
                let path = self.log_path.display().to_string();
                let reason = format!("rollback to {} bytes failed: {}", prev_len, rollback);
                log_event_with_fields(
                    Event::StoreCorruption,
                    &[("path", path.as_str()), ("reason", reason.as_str())],
                );
            }
            return Err(MembershipError::store(format!(
                "Failed to append relation log: {}",
                e
            )));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn write_batch(&self, file: &mut File, bytes: &[u8]) -> io::Result<()> {
        file.write_all(bytes)
    }

    #[cfg(test)]
    fn write_batch(&self, file: &mut File, bytes: &[u8]) -> io::Result<()> {
        let torn = self.faults.lock().ok().and_then(|mut f| f.torn_next.take());
        match torn {
            Some(limit) => {
                file.write_all(&bytes[..limit.min(bytes.len())])?;
                Err(io::Error::new(io::ErrorKind::Other, "injected torn write"))
            }
            None => file.write_all(bytes),
        }
    }

    /// Cut the log back to `len` bytes and make the cut durable
    fn truncate(&self, file: &File, len: u64) -> io::Result<()> {
        #[cfg(test)]
        {
            if self.faults.lock().map(|f| f.fail_rollback).unwrap_or(false) {
                return Err(io::Error::new(io::ErrorKind::Other, "injected rollback failure"));
            }
        }
        file.set_len(len)?;
        file.sync_all()
    }

    fn require_table(&self, table: &str) -> MembershipResult<()> {
        let tables = self
            .tables
            .read()
            .map_err(|_| MembershipError::store("Lock poisoned"))?;
        if tables.contains(table) {
            Ok(())
        } else {
            Err(MembershipError::store(format!("relation {} does not exist", table)))
        }
    }
}

impl RelationStore for FileRelationStore {
    fn default_schema_name(&self) -> &str {
        &self.schema_name
    }

    fn assert_relation(&self, relation: &RelationDescriptor, _actor: &Actor) -> MembershipResult<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| MembershipError::store("Lock poisoned"))?;
        tables.insert(relation.table_name.clone());
        Ok(())
    }

    fn run_query(&self, spec: &QuerySpec, _actor: &Actor) -> MembershipResult<Vec<MembershipRecord>> {
        self.require_table(&spec.table)?;
        let records = self
            .records
            .read()
            .map_err(|_| MembershipError::store("Lock poisoned"))?;
        Ok(records.values().filter(|r| spec.matches(r)).cloned().collect())
    }

    fn run_distinct(
        &self,
        spec: &QuerySpec,
        field: Field,
        _actor: &Actor,
    ) -> MembershipResult<Vec<String>> {
        self.require_table(&spec.table)?;
        let records = self
            .records
            .read()
            .map_err(|_| MembershipError::store("Lock poisoned"))?;
        Ok(distinct_values(records.values().filter(|r| spec.matches(r)), field))
    }

    fn create_entity(&self, relation: &RelationHandle, actor: &Actor) -> MembershipResult<MembershipDraft> {
        Ok(MembershipDraft::new(
            RecordId::generate(),
            relation.table_name(),
            relation.bounds(),
            actor.id(),
        ))
    }

    fn put_entities(&self, records: &[MembershipRecord], _actor: &Actor) -> MembershipResult<()> {
        for record in records {
            self.require_table(record.table())?;
        }
        let entries: Vec<LogEntry> = records
            .iter()
            .map(|r| LogEntry::Put { record: r.clone() })
            .collect();
        self.append(&entries)?;

        let mut stored = self
            .records
            .write()
            .map_err(|_| MembershipError::store("Lock poisoned"))?;
        for record in records {
            stored.insert(record.id(), record.clone());
        }
        Ok(())
    }

    fn delete_entities(&self, keys: &[EntityKey], _actor: &Actor) -> MembershipResult<()> {
        let mut stored = self
            .records
            .write()
            .map_err(|_| MembershipError::store("Lock poisoned"))?;

        let live: Vec<RecordId> = keys
            .iter()
            .filter(|k| stored.get(&k.id).map(|r| r.table() == k.table).unwrap_or(false))
            .map(|k| k.id)
            .collect();
        if live.is_empty() {
            return Ok(());
        }

        let entries: Vec<LogEntry> = live.iter().map(|id| LogEntry::Delete { id: *id }).collect();
        self.append(&entries)?;

        for id in &live {
            stored.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::record::FieldBounds;
    use crate::membership::relation::RelationRegistry;
    use crate::observability::MetricsRegistry;
    use std::sync::Arc;

    #[test]
    fn test_line_roundtrip_detects_tamper() {
        let entry = LogEntry::Delete { id: RecordId::generate() };
        let line = encode_line(&entry).unwrap();
        let line = line.trim_end();
        assert!(decode_line(line, 1).is_ok());

        let tampered = line.replacen("delete", "deletf", 1);
        assert!(matches!(
            decode_line(&tampered, 1),
            Err(MembershipError::Corruption(_))
        ));
    }

    #[test]
    fn test_missing_separator_is_corruption() {
        assert!(matches!(
            decode_line("deadbeef", 3),
            Err(MembershipError::Corruption(msg)) if msg.contains("line 3")
        ));
    }

    fn seeded_store(dir: &Path) -> (FileRelationStore, Arc<RelationHandle>, Actor) {
        let store = FileRelationStore::open(dir).unwrap();
        let actor = Actor::system();
        let handle = RelationRegistry::new(FieldBounds::default())
            .assert_relation(&store, &actor, &MetricsRegistry::new())
            .unwrap();
        (store, handle, actor)
    }

    fn grant(
        store: &FileRelationStore,
        handle: &RelationHandle,
        actor: &Actor,
        principal: &str,
    ) -> MembershipRecord {
        let mut draft = store.create_entity(handle, actor).unwrap();
        draft.set_principal(principal).unwrap();
        draft.set_authority("ROLE_USER").unwrap();
        draft.build().unwrap()
    }

    #[test]
    fn test_torn_append_is_rolled_back() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let (store, handle, actor) = seeded_store(temp_dir.path());

        let alice = grant(&store, &handle, &actor, "uid:alice");
        store.put_entities(&[alice.clone()], &actor).unwrap();
        let acknowledged_len = fs::metadata(store.log_path()).unwrap().len();

        store.faults.lock().unwrap().torn_next = Some(40);
        let bob = grant(&store, &handle, &actor, "uid:bob");
        let err = store.put_entities(&[bob.clone()], &actor).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(fs::metadata(store.log_path()).unwrap().len(), acknowledged_len);
        assert_eq!(store.len(), 1);

        let carol = grant(&store, &handle, &actor, "uid:carol");
        store.put_entities(&[carol.clone()], &actor).unwrap();
        drop(store);

        let reopened = FileRelationStore::open(temp_dir.path()).unwrap();
        let ids: Vec<RecordId> = reopened.records.read().unwrap().keys().copied().collect();
        assert_eq!(reopened.len(), 2);
        assert!(ids.contains(&alice.id()));
        assert!(ids.contains(&carol.id()));
        assert!(!ids.contains(&bob.id()));
    }

    #[test]
    fn test_failed_rollback_fences_writes() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let (store, handle, actor) = seeded_store(temp_dir.path());

        {
            let mut faults = store.faults.lock().unwrap();
            faults.torn_next = Some(10);
            faults.fail_rollback = true;
        }
        let bob = grant(&store, &handle, &actor, "uid:bob");
        assert!(store.put_entities(&[bob], &actor).is_err());

        store.faults.lock().unwrap().fail_rollback = false;
        let carol = grant(&store, &handle, &actor, "uid:carol");
        let err = store.put_entities(&[carol], &actor).unwrap_err();
        assert!(matches!(err, MembershipError::StoreUnavailable(ref msg) if msg.contains("reopen")));
        assert!(store.is_empty());
    }

    #[test]
    fn test_checksum_deterministic() {
        assert_eq!(checksum(b"membership"), checksum(b"membership"));
        assert_ne!(checksum(b"membership"), checksum(b"membershiq"));
    }
}
