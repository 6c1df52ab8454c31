//! Log writer implementation

use super::record::{LifecycleRecord, RecordKind};
use super::segment::{encode_header, segment_path, SEAL_MARKER, SEGMENT_HEADER_LEN};
use super::MetalogConfig;
use crate::{MetalogError, Result};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Where the writer picks up after recovery
#[derive(Debug, Clone, Copy)]
pub struct WriterStart {
    /// Segment to open
    pub segment_id: u64,
    /// Continue appending to an existing unsealed segment instead of
    /// creating a fresh one
    pub append_existing: bool,
    /// First sequence number to assign
    pub next_sequence: u64,
}

impl WriterStart {
    /// Start state for an empty log directory
    pub fn fresh() -> Self {
        Self {
            segment_id: 1,
            append_existing: false,
            next_sequence: 1,
        }
    }
}

/// Appends lifecycle records to the active segment.
///
/// Owns the write cursor and the sequence counter for one instance. Every
/// append is flushed to stable storage before it returns, so a successful
/// append survives an immediate crash.
pub struct LogWriter {
    config: MetalogConfig,
    inner: Mutex<WriterInner>,
}

struct WriterInner {
    file: File,
    segment_id: u64,
    bytes_written: u64,
    next_sequence: u64,
    opened_at: Instant,
    /// The active file already carries the terminal marker; nothing may be
    /// appended to it and the next append must finish the rotation
    sealed: bool,
}

impl LogWriter {
    /// Open the writer at the position recovery determined
    pub fn open(config: MetalogConfig, start: WriterStart) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;

        let (file, bytes_written) = if start.append_existing {
            let path = segment_path(&config.dir, start.segment_id);
            let file = OpenOptions::new().append(true).open(&path)?;
            let len = file.metadata()?.len();
            (file, len)
        } else {
            Self::create_segment(&config, start.segment_id)?
        };

        debug!(
            segment = start.segment_id,
            next_sequence = start.next_sequence,
            "log writer open"
        );

        let inner = WriterInner {
            file,
            segment_id: start.segment_id,
            bytes_written,
            next_sequence: start.next_sequence,
            opened_at: Instant::now(),
            sealed: false,
        };

        Ok(Self {
            config,
            inner: Mutex::new(inner),
        })
    }

    /// Append one lifecycle record durably.
    ///
    /// Assigns the next sequence number, rotates the segment if the size or
    /// age bound is hit, writes the record, and syncs before returning. The
    /// returned record carries the assigned sequence. IO failures are
    /// surfaced as-is; retrying is the caller's decision.
    pub fn append(
        &self,
        kind: RecordKind,
        entity: Uuid,
        parent: Option<Uuid>,
    ) -> Result<LifecycleRecord> {
        let mut inner = self.inner.lock();

        let sequence = inner.next_sequence;
        let record = match kind {
            RecordKind::DimensionCreated => {
                let chart = parent.ok_or_else(|| {
                    MetalogError::InvalidFormat("dimension record requires a parent chart".into())
                })?;
                LifecycleRecord::dimension_created(sequence, entity, chart)
            }
            RecordKind::DimensionDeleted => {
                let chart = parent.ok_or_else(|| {
                    MetalogError::InvalidFormat("dimension record requires a parent chart".into())
                })?;
                LifecycleRecord::dimension_deleted(sequence, entity, chart)
            }
            RecordKind::ChartDeleted => LifecycleRecord::chart_deleted(sequence, entity),
        };
        let serialized = record.serialize_with_checksum();

        if self.should_rotate(&inner, serialized.len()) {
            self.rotate_segment(&mut inner)?;
        }

        let offset_before = inner.bytes_written;
        if let Err(e) = Self::write_durable(&mut inner.file, &serialized) {
            // Roll the file back to the last record boundary so a failed
            // append can never leave a partial frame in front of later ones.
            let _ = inner.file.set_len(offset_before);
            return Err(e);
        }

        inner.bytes_written += serialized.len() as u64;
        inner.next_sequence += 1;

        Ok(record)
    }

    /// Force sync to disk
    pub fn sync(&self) -> Result<()> {
        let inner = self.inner.lock();
        inner.file.sync_all()?;
        Ok(())
    }

    /// Get current segment ID
    pub fn current_segment(&self) -> u64 {
        self.inner.lock().segment_id
    }

    /// Sequence number of the most recently appended record, 0 if none
    pub fn last_sequence(&self) -> u64 {
        self.inner.lock().next_sequence.saturating_sub(1)
    }

    fn write_durable(file: &mut File, data: &[u8]) -> Result<()> {
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    }

    fn should_rotate(&self, inner: &WriterInner, incoming: usize) -> bool {
        if inner.sealed {
            return true;
        }
        if inner.bytes_written + incoming as u64 > self.config.segment_max_bytes as u64 {
            return true;
        }
        if let Some(max_age) = self.config.segment_max_age {
            // Never rotate a segment that holds no records yet
            if inner.bytes_written > SEGMENT_HEADER_LEN as u64 && inner.opened_at.elapsed() > max_age
            {
                return true;
            }
        }
        false
    }

    fn rotate_segment(&self, inner: &mut WriterInner) -> Result<()> {
        // Seal the active segment; sealed segments are immutable from here on
        if !inner.sealed {
            let offset = inner.bytes_written;
            if let Err(e) = Self::write_durable(&mut inner.file, &SEAL_MARKER.to_le_bytes()) {
                let _ = inner.file.set_len(offset);
                return Err(e);
            }
            inner.sealed = true;
        }

        let sealed_id = inner.segment_id;
        let (file, bytes_written) = Self::create_segment(&self.config, sealed_id + 1)?;
        inner.file = file;
        inner.segment_id = sealed_id + 1;
        inner.bytes_written = bytes_written;
        inner.opened_at = Instant::now();
        inner.sealed = false;

        info!(
            sealed = sealed_id,
            opened = inner.segment_id,
            "rotated metalog segment"
        );
        Ok(())
    }

    fn create_segment(config: &MetalogConfig, segment_id: u64) -> Result<(File, u64)> {
        let path = segment_path(&config.dir, segment_id);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        file.write_all(&encode_header())?;
        file.sync_all()?;
        Ok((file, SEGMENT_HEADER_LEN as u64))
    }
}
