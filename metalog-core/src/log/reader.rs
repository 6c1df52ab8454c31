//! Log reader for recovery
//!
//! Scans segment files oldest to newest, validates structure, and
//! classifies damage: an incomplete or checksum-failing record at the tail
//! of the newest, unsealed segment is crash residue and marks a truncation
//! point; the same damage anywhere else is storage-layer corruption and
//! aborts the scan.

use super::record::LifecycleRecord;
use super::segment::{
    list_segments, validate_header, SegmentInfo, SEAL_MARKER, SEGMENT_HEADER_LEN,
};
use super::writer::WriterStart;
use super::MetalogConfig;
use crate::{MetalogError, Result};
use std::fs::File;
use std::io::Read;
use tracing::{info, warn};

/// Scan result for one segment
#[derive(Debug)]
pub struct SegmentScan {
    /// The segment file
    pub info: SegmentInfo,
    /// Whether the segment ends with the terminal marker
    pub sealed: bool,
    /// Well-formed records, in sequence order
    pub records: Vec<LifecycleRecord>,
    /// Byte offset of the last well-formed boundary
    pub valid_len: u64,
    /// Whether crash residue was found (and must be cut) past `valid_len`
    pub truncated_tail: bool,
}

/// Scan result for the whole log directory
#[derive(Debug)]
pub struct ScanOutcome {
    /// Per-segment results, oldest first
    pub segments: Vec<SegmentScan>,
    /// Sequence number the writer hands out next
    pub next_sequence: u64,
    /// Where the writer picks up
    pub writer_start: WriterStart,
}

/// Reads segment files for recovery
pub struct LogReader {
    config: MetalogConfig,
}

impl LogReader {
    /// Create a new log reader
    pub fn new(config: MetalogConfig) -> Self {
        Self { config }
    }

    /// Scan every segment in creation order.
    ///
    /// Fails with `Corruption` on damage recovery must not repair: a bad
    /// header, an unsealed segment that is not the newest, data after a seal
    /// marker, a broken record in a sealed segment, or a sequence gap.
    pub fn scan(&self) -> Result<ScanOutcome> {
        let segments = list_segments(&self.config.dir)?;
        if segments.is_empty() {
            return Ok(ScanOutcome {
                segments: Vec::new(),
                next_sequence: 1,
                writer_start: WriterStart::fresh(),
            });
        }

        let last_index = segments.len() - 1;
        let mut scans = Vec::with_capacity(segments.len());
        let mut prev_sequence: Option<u64> = None;

        for (i, info) in segments.into_iter().enumerate() {
            let scan = self.scan_segment(info, i == last_index, &mut prev_sequence)?;
            info!(
                segment = scan.info.id,
                records = scan.records.len(),
                sealed = scan.sealed,
                "scanned metalog segment"
            );
            scans.push(scan);
        }

        let next_sequence = prev_sequence.map_or(1, |s| s + 1);
        let writer_start = Self::writer_start(scans.last(), next_sequence);

        Ok(ScanOutcome {
            segments: scans,
            next_sequence,
            writer_start,
        })
    }

    fn scan_segment(
        &self,
        info: SegmentInfo,
        is_last: bool,
        prev_sequence: &mut Option<u64>,
    ) -> Result<SegmentScan> {
        let mut file = File::open(&info.path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        match validate_header(&data) {
            Ok(()) => {}
            Err(e @ MetalogError::IncompleteRecord(_)) => {
                if is_last {
                    // Crash right after segment creation; cut the whole file
                    warn!(segment = info.id, "segment header cut short, truncating");
                    return Ok(SegmentScan {
                        info,
                        sealed: false,
                        records: Vec::new(),
                        valid_len: 0,
                        truncated_tail: true,
                    });
                }
                return Err(self.fatal(&info, e));
            }
            Err(e) => return Err(self.fatal(&info, e)),
        }

        let mut records = Vec::new();
        let mut offset = SEGMENT_HEADER_LEN;
        let mut sealed = false;
        let mut truncated_tail = false;

        while offset < data.len() {
            if data.len() - offset >= 4 && data[offset..offset + 4] == SEAL_MARKER.to_le_bytes() {
                sealed = true;
                offset += 4;
                if offset != data.len() {
                    return Err(self.fatal(
                        &info,
                        MetalogError::Corruption("data after seal marker".into()),
                    ));
                }
                break;
            }

            match LifecycleRecord::deserialize_with_checksum(&data[offset..]) {
                Ok((record, consumed)) => {
                    if let Some(prev) = *prev_sequence {
                        if record.sequence != prev + 1 {
                            return Err(self.fatal(
                                &info,
                                MetalogError::Corruption(format!(
                                    "sequence {} follows {}",
                                    record.sequence, prev
                                )),
                            ));
                        }
                    }
                    *prev_sequence = Some(record.sequence);
                    records.push(record);
                    offset += consumed;
                }
                Err(e) if is_last && Self::is_crash_residue(&e, &data, offset) => {
                    // The expected outcome of a crash mid-write: discard the
                    // partial record and everything after it
                    warn!(
                        segment = info.id,
                        offset,
                        error = %e,
                        "discarding crash residue at segment tail"
                    );
                    truncated_tail = true;
                    break;
                }
                Err(e) => return Err(self.fatal(&info, e)),
            }
        }

        if !sealed && !is_last {
            return Err(self.fatal(
                &info,
                MetalogError::Corruption("unsealed segment is not the newest".into()),
            ));
        }

        Ok(SegmentScan {
            info,
            sealed,
            records,
            valid_len: offset as u64,
            truncated_tail,
        })
    }

    /// Whether a broken record in the active segment is an interrupted
    /// write rather than storage damage. An incomplete frame extends past
    /// the end of the file by definition; a checksum failure qualifies only
    /// when the bad frame is the final one; a bad record with well-formed
    /// data after it means acknowledged history was lost.
    fn is_crash_residue(error: &MetalogError, data: &[u8], offset: usize) -> bool {
        match error {
            MetalogError::IncompleteRecord(_) => true,
            MetalogError::ChecksumMismatch { .. } => {
                let declared = {
                    let mut c = std::io::Cursor::new(&data[offset..offset + 4]);
                    bytes::Buf::get_u32_le(&mut c) as usize
                };
                offset + 4 + declared >= data.len()
            }
            _ => false,
        }
    }

    fn writer_start(last: Option<&SegmentScan>, next_sequence: u64) -> WriterStart {
        match last {
            None => WriterStart::fresh(),
            Some(scan) if scan.sealed => WriterStart {
                segment_id: scan.info.id + 1,
                append_existing: false,
                next_sequence,
            },
            Some(scan) => WriterStart {
                // Continue the unsealed tail; when the header itself was cut
                // the file is rewritten from scratch
                segment_id: scan.info.id,
                append_existing: scan.valid_len > 0,
                next_sequence,
            },
        }
    }

    fn fatal(&self, info: &SegmentInfo, cause: MetalogError) -> MetalogError {
        MetalogError::Corruption(format!(
            "segment {} ({}): {}",
            info.id,
            info.path.display(),
            cause
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::record::RecordKind;
    use crate::log::writer::LogWriter;
    use std::fs;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn config(dir: &TempDir, segment_max_bytes: usize) -> MetalogConfig {
        MetalogConfig {
            dir: dir.path().to_path_buf(),
            segment_max_bytes,
            segment_max_age: None,
        }
    }

    fn fill(cfg: &MetalogConfig, n: usize) -> Vec<LifecycleRecord> {
        let writer = LogWriter::open(cfg.clone(), WriterStart::fresh()).unwrap();
        let chart = Uuid::new_v4();
        (0..n)
            .map(|_| {
                writer
                    .append(RecordKind::DimensionCreated, Uuid::new_v4(), Some(chart))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_scan_empty_dir() {
        let temp_dir = TempDir::new().unwrap();
        let outcome = LogReader::new(config(&temp_dir, 1 << 20)).scan().unwrap();
        assert!(outcome.segments.is_empty());
        assert_eq!(outcome.next_sequence, 1);
        assert!(!outcome.writer_start.append_existing);
    }

    #[test]
    fn test_scan_recovers_all_records() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = config(&temp_dir, 1 << 20);
        let written = fill(&cfg, 10);

        let outcome = LogReader::new(cfg).scan().unwrap();
        let recovered: Vec<_> = outcome.segments.iter().flat_map(|s| &s.records).collect();
        assert_eq!(recovered.len(), 10);
        assert_eq!(*recovered[9], written[9]);
        assert_eq!(outcome.next_sequence, 11);
        assert!(outcome.writer_start.append_existing);
    }

    #[test]
    fn test_scan_across_rotated_segments() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = config(&temp_dir, 128);
        fill(&cfg, 20);

        let outcome = LogReader::new(cfg).scan().unwrap();
        assert!(outcome.segments.len() > 1);

        let sequences: Vec<u64> = outcome
            .segments
            .iter()
            .flat_map(|s| s.records.iter().map(|r| r.sequence))
            .collect();
        let expected: Vec<u64> = (1..=20).collect();
        assert_eq!(sequences, expected);
    }

    #[test]
    fn test_tail_truncation_at_every_cut_point() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = config(&temp_dir, 1 << 20);
        fill(&cfg, 3);

        let path = crate::log::segment::segment_path(temp_dir.path(), 1);
        let full = fs::read(&path).unwrap();

        // Byte-truncate the final record at every cut point; the two prior
        // records must always survive
        let record_len = (full.len() - SEGMENT_HEADER_LEN) / 3;
        let third_start = full.len() - record_len;
        for cut in third_start + 1..full.len() {
            fs::write(&path, &full[..cut]).unwrap();
            let outcome = LogReader::new(cfg.clone()).scan().unwrap();
            let scan = &outcome.segments[0];
            assert_eq!(scan.records.len(), 2, "cut at {}", cut);
            assert!(scan.truncated_tail);
            assert_eq!(scan.valid_len as usize, third_start);
            assert_eq!(outcome.next_sequence, 3);
        }
    }

    #[test]
    fn test_corrupt_tail_record_is_discarded() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = config(&temp_dir, 1 << 20);
        fill(&cfg, 2);

        let path = crate::log::segment::segment_path(temp_dir.path(), 1);
        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 5;
        data[last] ^= 0xFF;
        fs::write(&path, &data).unwrap();

        let outcome = LogReader::new(cfg).scan().unwrap();
        assert_eq!(outcome.segments[0].records.len(), 1);
        assert!(outcome.segments[0].truncated_tail);
    }

    #[test]
    fn test_mid_segment_corruption_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = config(&temp_dir, 1 << 20);
        fill(&cfg, 3);

        let path = crate::log::segment::segment_path(temp_dir.path(), 1);
        let mut data = fs::read(&path).unwrap();
        // Flip a byte inside the first record's body
        data[SEGMENT_HEADER_LEN + 6] ^= 0xFF;
        fs::write(&path, &data).unwrap();

        let result = LogReader::new(cfg).scan();
        assert!(matches!(result, Err(MetalogError::Corruption(_))));
    }

    #[test]
    fn test_sealed_segment_corruption_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = config(&temp_dir, 128);
        fill(&cfg, 20);

        // Damage the tail of the first (sealed) segment
        let path = crate::log::segment::segment_path(temp_dir.path(), 1);
        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() - 3]).unwrap();

        let result = LogReader::new(cfg).scan();
        assert!(matches!(result, Err(MetalogError::Corruption(_))));
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = config(&temp_dir, 1 << 20);
        fill(&cfg, 1);

        let path = crate::log::segment::segment_path(temp_dir.path(), 1);
        let mut data = fs::read(&path).unwrap();
        data[0] = b'X';
        fs::write(&path, &data).unwrap();

        let result = LogReader::new(cfg).scan();
        assert!(matches!(result, Err(MetalogError::Corruption(_))));
    }
}
