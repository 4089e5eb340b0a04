//! Snapshot segments.
//!
//! A segment is an immutable file holding a full snapshot of the row table
//! as of some log sequence. Segments are numbered (`segment_00001.seg`, ...)
//! and written to a temp file that is renamed into place, so a crash never
//! leaves a half-written segment behind. Only the newest segment is needed
//! to recover; older ones are pruned after each compaction.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Result as IoResult, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::storage::table::Table;

use super::codec;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SegmentHeader {
    rows: usize,
    revision: u64,
    created_at: DateTime<Utc>,
}

/// One snapshot file on disk.
#[derive(Debug)]
pub struct Segment {
    id: u32,
    path: PathBuf,
}

impl Segment {
    /// Segment number.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Path of the segment file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn read_table(&self) -> IoResult<Table> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        codec::read_header(&mut reader)?;
        let _header: SegmentHeader = codec::decode(&mut reader)?;
        codec::decode(&mut reader)
    }
}

fn parse_segment_id(path: &Path) -> Option<u32> {
    if path.extension().map_or(true, |e| e != "seg") {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix("segment_"))
        .and_then(|s| s.parse().ok())
}

/// Tracks the segment files of one store directory.
#[derive(Debug)]
pub struct SegmentManager {
    dir: PathBuf,
    segments: Vec<Segment>,
    next_id: u32,
}

impl SegmentManager {
    /// Opens the segment directory, removing leftover temp files.
    pub fn open(dir: &Path) -> IoResult<Self> {
        fs::create_dir_all(dir)?;
        let mut segments = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "tmp") {
                let _ = fs::remove_file(&path);
                continue;
            }
            if let Some(id) = parse_segment_id(&path) {
                segments.push(Segment { id, path });
            }
        }
        segments.sort_by_key(Segment::id);
        let next_id = segments.last().map_or(1, |s| s.id + 1);
        Ok(Self {
            dir: dir.to_path_buf(),
            segments,
            next_id,
        })
    }

    /// Segments ordered oldest first.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Loads the newest readable snapshot, if any.
    pub(crate) fn load_latest(&self) -> IoResult<Option<Table>> {
        for segment in self.segments.iter().rev() {
            match segment.read_table() {
                Ok(table) => return Ok(Some(table)),
                Err(e) => warn!(path = %segment.path.display(), error = %e, "skipping unreadable segment"),
            }
        }
        Ok(None)
    }

    /// Writes a new snapshot atomically and prunes the older ones.
    pub(crate) fn write_snapshot(&mut self, table: &Table) -> IoResult<&Segment> {
        let id = self.next_id;
        let final_path = self.dir.join(format!("segment_{id:05}.seg"));
        let temp_path = self.dir.join(format!("segment_{id:05}.{}.tmp", Uuid::new_v4()));

        let result = (|| {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            let mut writer = BufWriter::new(file);
            codec::write_header(&mut writer)?;
            let header = SegmentHeader {
                rows: table.len(),
                revision: table.revision(),
                created_at: Utc::now(),
            };
            writer.write_all(&codec::encode(&header)?)?;
            writer.write_all(&codec::encode(table)?)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            fs::rename(&temp_path, &final_path)
        })();
        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        self.next_id += 1;
        for old in self.segments.drain(..) {
            if let Err(e) = fs::remove_file(&old.path) {
                warn!(path = %old.path.display(), error = %e, "failed to prune old segment");
            }
        }
        self.segments.push(Segment {
            id,
            path: final_path,
        });
        Ok(&self.segments[0])
    }
}
