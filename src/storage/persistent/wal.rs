//! Write-ahead log for the concept store.
//!
//! Every mutation is appended (and optionally fsynced) before it is applied
//! to the in-memory table. On open the log is replayed on top of the newest
//! snapshot.
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [ENTRY 1: codec frame][ENTRY 2: codec frame]...
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Result as IoResult, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::Family;

use super::codec;

fn poisoned(context: &str) -> std::io::Error {
    std::io::Error::new(ErrorKind::Other, format!("poisoned lock: {context}"))
}

/// A single entry in the write-ahead log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotonically increasing sequence number.
    pub sequence: u64,
    /// When this entry was written.
    pub timestamp: DateTime<Utc>,
    /// The logged mutation.
    pub kind: WalEntryKind,
}

/// Logged mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntryKind {
    /// Columns written to one family of a row (also used for successful swaps).
    Put {
        /// Row key.
        guid: String,
        /// Target family.
        family: Family,
        /// Column/value pairs in write order.
        cells: Vec<(String, String)>,
    },
    /// Whole row removed.
    Delete {
        /// Row key.
        guid: String,
    },
    /// One family removed from every row.
    DeleteFamily {
        /// Family cleared.
        family: Family,
    },
    /// Everything up to this sequence is in a snapshot.
    Checkpoint {
        /// Last sequence covered by the snapshot.
        up_to_sequence: u64,
    },
}

struct WalWriter {
    out: BufWriter<File>,
    sequence: u64,
}

/// Append-only log. Thread-safe via an internal mutex.
pub struct WriteAheadLog {
    path: PathBuf,
    writer: Mutex<WalWriter>,
    sync_on_write: bool,
}

impl WriteAheadLog {
    /// Opens or creates a log file, recovering the last valid sequence.
    pub fn open(path: &Path, sync_on_write: bool) -> IoResult<Self> {
        let exists = path.exists() && std::fs::metadata(path)?.len() >= 5;

        let sequence = if exists {
            Self::find_last_sequence(path)?
        } else {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            codec::write_header(&mut file)?;
            if sync_on_write {
                file.sync_all()?;
            }
            0
        };

        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(WalWriter {
                out: BufWriter::new(file),
                sequence,
            }),
            sync_on_write,
        })
    }

    /// Appends an entry, returning its sequence number.
    pub fn append(&self, kind: WalEntryKind) -> IoResult<u64> {
        let mut writer = self.writer.lock().map_err(|_| poisoned("wal.append"))?;
        let candidate = writer.sequence + 1;
        let entry = WalEntry {
            sequence: candidate,
            timestamp: Utc::now(),
            kind,
        };
        let encoded = codec::encode(&entry)?;
        writer.out.write_all(&encoded)?;
        writer.out.flush()?;
        if self.sync_on_write {
            writer.out.get_ref().sync_all()?;
        }
        writer.sequence = candidate;
        Ok(candidate)
    }

    /// Iterates every entry, in order, for replay.
    pub fn iter(&self) -> IoResult<WalIterator> {
        WalIterator::new(&self.path)
    }

    /// Sequence number of the last appended entry.
    pub fn current_sequence(&self) -> IoResult<u64> {
        Ok(self.writer.lock().map_err(|_| poisoned("wal.sequence"))?.sequence)
    }

    /// Log size in bytes.
    pub fn size_bytes(&self) -> IoResult<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Empties the log after its contents were captured in a snapshot.
    pub fn truncate(&self) -> IoResult<()> {
        let mut writer = self.writer.lock().map_err(|_| poisoned("wal.truncate"))?;
        writer.out.flush()?;

        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        codec::write_header(&mut file)?;
        if self.sync_on_write {
            file.sync_all()?;
        }
        drop(file);

        let file = OpenOptions::new().append(true).open(&self.path)?;
        writer.out = BufWriter::new(file);
        writer.sequence = 0;
        Ok(())
    }

    /// Finds the last valid sequence and cuts off any torn or corrupt tail so
    /// that new frames are never appended after garbage.
    fn find_last_sequence(path: &Path) -> IoResult<u64> {
        let mut iter = WalIterator::new(path)?;
        let mut last = 0;
        let mut valid_len = iter.reader.stream_position()?;
        loop {
            match iter.next() {
                Some(Ok(entry)) => {
                    last = entry.sequence;
                    valid_len = iter.reader.stream_position()?;
                }
                Some(Err(e)) => {
                    warn!(sequence = last + 1, error = %e, "WAL corruption detected, truncating replay");
                    break;
                }
                None => break,
            }
        }
        if valid_len < iter.file_size {
            warn!(
                valid_len,
                file_size = iter.file_size,
                "discarding incomplete WAL tail"
            );
            OpenOptions::new().write(true).open(path)?.set_len(valid_len)?;
        }
        Ok(last)
    }
}

/// Iterator over log entries.
pub struct WalIterator {
    reader: BufReader<File>,
    file_size: u64,
}

impl WalIterator {
    fn new(path: &Path) -> IoResult<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        codec::read_header(&mut reader)?;
        Ok(Self { reader, file_size })
    }
}

impl Iterator for WalIterator {
    type Item = IoResult<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.stream_position() {
            Ok(pos) if pos >= self.file_size => return None,
            Ok(_) => {}
            Err(e) => return Some(Err(e)),
        }
        match codec::decode(&mut self.reader) {
            Ok(entry) => Some(Ok(entry)),
            // Torn final frame from a crash mid-append.
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => None,
            Err(e) => Some(Err(e)),
        }
    }
}
