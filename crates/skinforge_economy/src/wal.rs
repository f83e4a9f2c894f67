//! # Write-Ahead Log (WAL)
//!
//! **Crash-Safe Commit Log**
//!
//! Every committed transaction is appended as a BEGIN record, one OPERATION
//! record per [`Mutation`], and a COMMIT record, written with a single
//! `write_all` and synced before the transaction is reported as committed.
//!
//! ## Recovery
//!
//! 1. Committed transactions are replayed in order.
//! 2. A transaction without its COMMIT (crash mid-write) is discarded.
//! 3. A torn or CRC-corrupt tail is discarded and the file is truncated to
//!    the last complete commit, so new appends never follow garbage.
//!
//! ## Format
//!
//! ```text
//! [4 bytes: magic "SFWL"]
//! [4 bytes: version]
//!
//! Entry format:
//! [8 bytes: LSN (Log Sequence Number)]
//! [1 byte: record type (BEGIN/OP/COMMIT)]
//! [4 bytes: payload length]
//! [N bytes: payload (JSON-encoded mutation)]
//! [4 bytes: CRC32 of above]
//! ```

use crate::error::{EconomyError, EconomyResult};
use crate::store::Mutation;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Magic bytes identifying a log file.
const WAL_MAGIC: &[u8; 4] = b"SFWL";

/// Current format version.
const WAL_VERSION: u32 = 1;

/// Header length in bytes.
const HEADER_LEN: usize = 8;

/// LSN + type + length.
const FRAME_PREFIX_LEN: usize = 8 + 1 + 4;

/// Record types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Start of a transaction.
    Begin = 1,
    /// One mutation within a transaction.
    Operation = 2,
    /// End of a transaction. Everything since BEGIN is durable.
    Commit = 3,
}

impl RecordType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Begin),
            2 => Some(Self::Operation),
            3 => Some(Self::Commit),
            _ => None,
        }
    }
}

/// A decoded frame.
#[derive(Clone, Debug)]
struct Frame<'a> {
    lsn: u64,
    record_type: RecordType,
    payload: &'a [u8],
}

/// What [`WriteAheadLog::open`] found on disk.
#[derive(Debug, Default)]
pub struct Recovery {
    /// Mutations of every committed transaction, in commit order.
    pub mutations: Vec<Mutation>,
    /// Number of committed transactions.
    pub committed_transactions: u64,
    /// Transactions started but never committed.
    pub discarded_transactions: u64,
    /// Bytes cut from the end of the file.
    pub truncated_bytes: u64,
}

struct WalFile {
    file: File,
    len: u64,
    next_lsn: u64,
}

/// Append-only commit log.
pub struct WriteAheadLog {
    path: PathBuf,
    sync_on_commit: bool,
    inner: Mutex<WalFile>,
}

fn io_error(context: &str, e: &std::io::Error) -> EconomyError {
    EconomyError::Storage(format!("{context}: {e}"))
}

fn encode_frame(buf: &mut Vec<u8>, lsn: u64, record_type: RecordType, payload: &[u8]) -> EconomyResult<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| EconomyError::Storage("WAL record too large".to_string()))?;
    let start = buf.len();
    buf.extend_from_slice(&lsn.to_le_bytes());
    buf.push(record_type as u8);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    let crc = crc32fast::hash(&buf[start..]);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(())
}

/// Decodes one frame at `offset`. `None` on a short or corrupt frame.
fn decode_frame(data: &[u8], offset: usize) -> Option<(Frame<'_>, usize)> {
    let prefix = data.get(offset..offset + FRAME_PREFIX_LEN)?;
    let lsn = u64::from_le_bytes(prefix[0..8].try_into().ok()?);
    let record_type = RecordType::from_u8(prefix[8])?;
    let len = u32::from_le_bytes(prefix[9..13].try_into().ok()?) as usize;

    let body_end = offset + FRAME_PREFIX_LEN + len;
    let payload = data.get(offset + FRAME_PREFIX_LEN..body_end)?;
    let stored = u32::from_le_bytes(data.get(body_end..body_end + 4)?.try_into().ok()?);
    if crc32fast::hash(&data[offset..body_end]) != stored {
        return None;
    }

    Some((
        Frame {
            lsn,
            record_type,
            payload,
        },
        body_end + 4,
    ))
}

fn header() -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN);
    buf.extend_from_slice(WAL_MAGIC);
    buf.extend_from_slice(&WAL_VERSION.to_le_bytes());
    buf
}

impl WriteAheadLog {
    /// Opens or creates a log file and recovers its committed contents.
    ///
    /// # Errors
    ///
    /// `Storage` on I/O failure, `Corrupted` on a foreign header or a
    /// checksummed record that does not decode.
    pub fn open(path: impl AsRef<Path>, sync_on_commit: bool) -> EconomyResult<(Self, Recovery)> {
        let path = path.as_ref().to_path_buf();

        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(io_error("failed to read WAL", &e)),
        };

        let (recovery, good_len, next_lsn) = if data.is_empty() {
            fs::write(&path, header()).map_err(|e| io_error("failed to create WAL", &e))?;
            (Recovery::default(), HEADER_LEN as u64, 0)
        } else {
            Self::scan(&data)?
        };

        if recovery.truncated_bytes > 0 {
            warn!(
                path = %path.display(),
                truncated_bytes = recovery.truncated_bytes,
                discarded_transactions = recovery.discarded_transactions,
                "WAL tail discarded during recovery"
            );
        }

        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| io_error("failed to open WAL", &e))?;
        file.set_len(good_len)
            .map_err(|e| io_error("failed to truncate WAL", &e))?;

        let wal = Self {
            path,
            sync_on_commit,
            inner: Mutex::new(WalFile {
                file,
                len: good_len,
                next_lsn,
            }),
        };
        Ok((wal, recovery))
    }

    /// Walks every frame, returning the recovery, the byte length of the
    /// committed prefix and the next LSN.
    fn scan(data: &[u8]) -> EconomyResult<(Recovery, u64, u64)> {
        if data.len() < HEADER_LEN || &data[0..4] != WAL_MAGIC {
            return Err(EconomyError::Corrupted("invalid WAL magic".to_string()));
        }
        let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        if version != WAL_VERSION {
            return Err(EconomyError::Corrupted(format!(
                "unsupported WAL version: {version}"
            )));
        }

        let mut recovery = Recovery::default();
        let mut pending: Option<Vec<Mutation>> = None;
        let mut offset = HEADER_LEN;
        let mut good_len = HEADER_LEN;
        let mut next_lsn = 0u64;

        while let Some((frame, end)) = decode_frame(data, offset) {
            next_lsn = next_lsn.max(frame.lsn + 1);
            match frame.record_type {
                RecordType::Begin => {
                    if pending.replace(Vec::new()).is_some() {
                        recovery.discarded_transactions += 1;
                    }
                }
                RecordType::Operation => {
                    let Some(ops) = pending.as_mut() else {
                        break;
                    };
                    let mutation: Mutation = serde_json::from_slice(frame.payload).map_err(|e| {
                        EconomyError::Corrupted(format!("undecodable WAL record {}: {e}", frame.lsn))
                    })?;
                    ops.push(mutation);
                }
                RecordType::Commit => {
                    let Some(ops) = pending.take() else {
                        break;
                    };
                    recovery.mutations.extend(ops);
                    recovery.committed_transactions += 1;
                    good_len = end;
                }
            }
            offset = end;
        }

        if pending.is_some() {
            recovery.discarded_transactions += 1;
        }
        recovery.truncated_bytes = (data.len() - good_len) as u64;
        Ok((recovery, good_len as u64, next_lsn))
    }

    /// Appends one committed transaction.
    ///
    /// Returns the LSN of its BEGIN record. On failure the file is cut back
    /// to its previous length.
    ///
    /// # Errors
    ///
    /// `Storage` if encoding, writing or syncing fails.
    pub fn append_transaction(&self, mutations: &[Mutation]) -> EconomyResult<u64> {
        let mut inner = self.inner.lock();
        let begin_lsn = inner.next_lsn;
        let buf = Self::encode_transaction(begin_lsn, mutations)?;

        let write = inner.file.write_all(&buf).and_then(|()| {
            if self.sync_on_commit {
                inner.file.sync_data()
            } else {
                Ok(())
            }
        });
        if let Err(e) = write {
            let len = inner.len;
            if let Err(trunc) = inner.file.set_len(len) {
                warn!(error = %trunc, "failed to cut back WAL after write error");
            }
            return Err(io_error("WAL append failed", &e));
        }

        inner.len += buf.len() as u64;
        inner.next_lsn = begin_lsn + mutations.len() as u64 + 2;
        Ok(begin_lsn)
    }

    fn encode_transaction(begin_lsn: u64, mutations: &[Mutation]) -> EconomyResult<Vec<u8>> {
        let mut buf = Vec::new();
        let mut lsn = begin_lsn;
        encode_frame(&mut buf, lsn, RecordType::Begin, &[])?;
        for mutation in mutations {
            lsn += 1;
            let payload = serde_json::to_vec(mutation)
                .map_err(|e| EconomyError::Storage(format!("WAL encode failed: {e}")))?;
            encode_frame(&mut buf, lsn, RecordType::Operation, &payload)?;
        }
        encode_frame(&mut buf, lsn + 1, RecordType::Commit, &[])?;
        Ok(buf)
    }

    /// Replaces the whole log with one transaction holding `snapshot`.
    ///
    /// Written to a sibling file first and renamed over the log.
    ///
    /// # Errors
    ///
    /// `Storage` on any I/O failure. The old log stays in place.
    pub fn rewrite(&self, snapshot: &[Mutation]) -> EconomyResult<()> {
        let mut inner = self.inner.lock();

        let mut buf = header();
        buf.extend(Self::encode_transaction(0, snapshot)?);

        let tmp = self.path.with_extension("compact");
        {
            let mut file = File::create(&tmp).map_err(|e| io_error("failed to create compacted WAL", &e))?;
            file.write_all(&buf)
                .and_then(|()| file.sync_all())
                .map_err(|e| io_error("failed to write compacted WAL", &e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| io_error("failed to install compacted WAL", &e))?;

        inner.file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| io_error("failed to reopen WAL", &e))?;
        inner.len = buf.len() as u64;
        inner.next_lsn = snapshot.len() as u64 + 2;
        Ok(())
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file length in bytes.
    #[must_use]
    pub fn len_bytes(&self) -> u64 {
        self.inner.lock().len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::IdCounters;

    fn temp_wal_path(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("skinforge_wal_{tag}_{nanos}.wal"))
    }

    fn marker() -> Mutation {
        Mutation::ReserveIds(IdCounters::default())
    }

    #[test]
    fn test_fresh_log_is_empty() {
        let path = temp_wal_path("fresh");
        let (wal, recovery) = WriteAheadLog::open(&path, false).unwrap();
        assert!(recovery.mutations.is_empty());
        assert_eq!(wal.len_bytes(), HEADER_LEN as u64);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_append_and_recover() {
        let path = temp_wal_path("roundtrip");
        {
            let (wal, _) = WriteAheadLog::open(&path, true).unwrap();
            wal.append_transaction(&[marker(), Mutation::RemoveRecord(9)]).unwrap();
            wal.append_transaction(&[Mutation::RemoveRecord(10)]).unwrap();
        }

        let (_, recovery) = WriteAheadLog::open(&path, true).unwrap();
        assert_eq!(recovery.committed_transactions, 2);
        assert_eq!(
            recovery.mutations,
            vec![marker(), Mutation::RemoveRecord(9), Mutation::RemoveRecord(10)]
        );
        assert_eq!(recovery.truncated_bytes, 0);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_torn_tail_is_discarded_and_truncated() {
        let path = temp_wal_path("torn");
        let committed_len = {
            let (wal, _) = WriteAheadLog::open(&path, false).unwrap();
            wal.append_transaction(&[Mutation::RemoveRecord(1)]).unwrap();
            wal.len_bytes()
        };

        // Simulate a crash halfway through the next transaction.
        let partial = WriteAheadLog::encode_transaction(3, &[Mutation::RemoveRecord(2)]).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&partial[..partial.len() - 7]).unwrap();
        drop(file);

        let (wal, recovery) = WriteAheadLog::open(&path, false).unwrap();
        assert_eq!(recovery.mutations, vec![Mutation::RemoveRecord(1)]);
        assert_eq!(recovery.discarded_transactions, 1);
        assert!(recovery.truncated_bytes > 0);
        assert_eq!(wal.len_bytes(), committed_len);
        assert_eq!(fs::metadata(&path).unwrap().len(), committed_len);

        // Appends after recovery land right after the last commit.
        wal.append_transaction(&[Mutation::RemoveRecord(3)]).unwrap();
        drop(wal);
        let (_, recovery) = WriteAheadLog::open(&path, false).unwrap();
        assert_eq!(
            recovery.mutations,
            vec![Mutation::RemoveRecord(1), Mutation::RemoveRecord(3)]
        );
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_rejects_foreign_file() {
        let path = temp_wal_path("foreign");
        fs::write(&path, b"OWAL\x01\x00\x00\x00").unwrap();
        assert!(matches!(
            WriteAheadLog::open(&path, false),
            Err(EconomyError::Corrupted(_))
        ));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_rewrite_replaces_history() {
        let path = temp_wal_path("rewrite");
        let (wal, _) = WriteAheadLog::open(&path, false).unwrap();
        for id in 0..20 {
            wal.append_transaction(&[Mutation::RemoveRecord(id)]).unwrap();
        }
        let before = wal.len_bytes();
        wal.rewrite(&[marker()]).unwrap();
        assert!(wal.len_bytes() < before);
        wal.append_transaction(&[Mutation::RemoveRecord(99)]).unwrap();
        drop(wal);

        let (_, recovery) = WriteAheadLog::open(&path, false).unwrap();
        assert_eq!(recovery.mutations, vec![marker(), Mutation::RemoveRecord(99)]);
        let _ = fs::remove_file(path);
    }
}
