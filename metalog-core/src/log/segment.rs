//! Segment file format and naming
//!
//! A segment is one append-only file of lifecycle records. Segments are
//! numbered by creation order; rotation seals the active segment with a
//! terminal marker and opens the next one. Only the highest-numbered
//! segment may ever be unsealed.

use crate::{MetalogError, Result};
use bytes::Buf;
use std::fs;
use std::path::{Path, PathBuf};

/// Magic bytes at the start of every segment file
pub const SEGMENT_MAGIC: [u8; 4] = *b"MLG1";

/// Segment format version
pub const FORMAT_VERSION: u32 = 1;

/// Header size: magic + version
pub const SEGMENT_HEADER_LEN: usize = 8;

/// Terminal marker written in the length-prefix position when a segment is
/// sealed. No record body can declare this length.
pub const SEAL_MARKER: u32 = u32::MAX;

/// A segment file discovered on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Creation-order id
    pub id: u64,
    /// Path to the segment file
    pub path: PathBuf,
}

/// File name for a segment id
pub fn segment_file_name(id: u64) -> String {
    format!("metalog_{:020}.mlg", id)
}

/// Full path for a segment id under a log directory
pub fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(segment_file_name(id))
}

/// Parse the segment id out of a file name, `None` for foreign files
pub fn parse_segment_id(path: &Path) -> Option<u64> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|s| s.strip_prefix("metalog_"))
        .and_then(|s| s.strip_suffix(".mlg"))
        .and_then(|s| s.parse().ok())
}

/// Enumerate segment files in a directory, sorted by creation id
pub fn list_segments(dir: &Path) -> Result<Vec<SegmentInfo>> {
    let mut segments = Vec::new();

    if !dir.exists() {
        return Ok(segments);
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if let Some(id) = parse_segment_id(&path) {
            segments.push(SegmentInfo { id, path });
        }
    }

    segments.sort_by_key(|s| s.id);
    Ok(segments)
}

/// Serialized segment header
pub fn encode_header() -> [u8; SEGMENT_HEADER_LEN] {
    let mut header = [0u8; SEGMENT_HEADER_LEN];
    header[..4].copy_from_slice(&SEGMENT_MAGIC);
    header[4..].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    header
}

/// Validate a segment's header bytes.
///
/// A buffer shorter than the header is reported as `IncompleteRecord` so the
/// caller can classify it: at the newest segment it is crash residue from a
/// file created right before the header write landed, anywhere else it is
/// damage.
pub fn validate_header(data: &[u8]) -> Result<()> {
    if data.len() < SEGMENT_HEADER_LEN {
        return Err(MetalogError::IncompleteRecord(
            "segment header cut short".into(),
        ));
    }
    if data[..4] != SEGMENT_MAGIC {
        return Err(MetalogError::Corruption(
            "bad segment magic".into(),
        ));
    }
    let version = {
        let mut c = std::io::Cursor::new(&data[4..8]);
        c.get_u32_le()
    };
    if version != FORMAT_VERSION {
        return Err(MetalogError::Corruption(format!(
            "unsupported segment format version {}",
            version
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_segment_naming_roundtrip() {
        let dir = Path::new("/tmp/metalog");
        let path = segment_path(dir, 42);
        assert_eq!(parse_segment_id(&path), Some(42));
        assert_eq!(parse_segment_id(Path::new("/tmp/other.log")), None);
    }

    #[test]
    fn test_list_segments_sorted() {
        let temp_dir = TempDir::new().unwrap();
        for id in [3u64, 1, 2] {
            fs::write(segment_path(temp_dir.path(), id), b"").unwrap();
        }
        // Foreign files are ignored
        fs::write(temp_dir.path().join("notes.txt"), b"x").unwrap();

        let segments = list_segments(temp_dir.path()).unwrap();
        let ids: Vec<u64> = segments.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_header_validation() {
        let header = encode_header();
        assert!(validate_header(&header).is_ok());

        let mut bad = header;
        bad[0] = b'X';
        assert!(matches!(
            validate_header(&bad),
            Err(MetalogError::Corruption(_))
        ));

        assert!(matches!(
            validate_header(&header[..4]),
            Err(MetalogError::IncompleteRecord(_))
        ));
    }
}
