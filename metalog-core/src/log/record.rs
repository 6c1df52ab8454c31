//! Lifecycle record types and serialization

use crate::{MetalogError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle record kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RecordKind {
    /// A dimension came into existence under a chart
    DimensionCreated = 1,
    /// A single dimension was deleted
    DimensionDeleted = 2,
    /// A chart and, implicitly, all its dimensions were deleted
    ChartDeleted = 3,
}

impl TryFrom<u8> for RecordKind {
    type Error = MetalogError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(RecordKind::DimensionCreated),
            2 => Ok(RecordKind::DimensionDeleted),
            3 => Ok(RecordKind::ChartDeleted),
            _ => Err(MetalogError::InvalidFormat(format!(
                "Invalid record kind: {}",
                value
            ))),
        }
    }
}

/// A single lifecycle record.
///
/// Records are immutable once appended. Sequence numbers are assigned by the
/// writer, strictly increase within an instance, and continue across segment
/// rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRecord {
    /// Position in the instance-wide total order
    pub sequence: u64,
    /// Record kind
    pub kind: RecordKind,
    /// UUID of the entity the record is about (dimension or chart)
    pub entity_uuid: Uuid,
    /// Owning chart UUID, present on dimension records only
    pub parent_uuid: Option<Uuid>,
    /// Unix timestamp (seconds) at append time
    pub timestamp: i64,
}

impl LifecycleRecord {
    /// Create a dimension-created record
    pub fn dimension_created(sequence: u64, dimension: Uuid, chart: Uuid) -> Self {
        Self {
            sequence,
            kind: RecordKind::DimensionCreated,
            entity_uuid: dimension,
            parent_uuid: Some(chart),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Create a dimension-deleted record
    pub fn dimension_deleted(sequence: u64, dimension: Uuid, chart: Uuid) -> Self {
        Self {
            sequence,
            kind: RecordKind::DimensionDeleted,
            entity_uuid: dimension,
            parent_uuid: Some(chart),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Create a chart-deleted record. One record stands in for the deletion
    /// of every dimension under the chart.
    pub fn chart_deleted(sequence: u64, chart: Uuid) -> Self {
        Self {
            sequence,
            kind: RecordKind::ChartDeleted,
            entity_uuid: chart,
            parent_uuid: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Serialize the record with length prefix and CRC checksum
    ///
    /// Format:
    /// - 4 bytes: body length (excluding this field)
    /// - 8 bytes: sequence number
    /// - 1 byte: record kind
    /// - 16 bytes: entity UUID
    /// - 1 byte: parent-present flag
    /// - 16 bytes: parent UUID (only when the flag is set)
    /// - 8 bytes: timestamp
    /// - 4 bytes: CRC32 checksum over the body
    pub fn serialize_with_checksum(&self) -> Bytes {
        let mut buf = BytesMut::new();

        // Reserve space for length prefix
        buf.put_u32_le(0);

        buf.put_u64_le(self.sequence);
        buf.put_u8(self.kind as u8);
        buf.put_slice(self.entity_uuid.as_bytes());

        match self.parent_uuid {
            Some(parent) => {
                buf.put_u8(1);
                buf.put_slice(parent.as_bytes());
            }
            None => buf.put_u8(0),
        }

        buf.put_i64_le(self.timestamp);

        // Calculate and write checksum (excluding length prefix)
        let checksum = crc32fast::hash(&buf[4..]);
        buf.put_u32_le(checksum);

        // Write actual length
        let len = (buf.len() - 4) as u32;
        buf[0..4].copy_from_slice(&len.to_le_bytes());

        buf.freeze()
    }

    /// Deserialize a record from bytes, validating the checksum.
    ///
    /// Returns the record and the number of bytes consumed. An
    /// `IncompleteRecord` error means the buffer ends before the declared
    /// length, which at the tail of the active segment is crash residue
    /// rather than corruption.
    pub fn deserialize_with_checksum(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 4 {
            return Err(MetalogError::IncompleteRecord(
                "length prefix cut short".into(),
            ));
        }

        let mut cursor = std::io::Cursor::new(data);
        let len = cursor.get_u32_le() as usize;

        if data.len() < 4 + len {
            return Err(MetalogError::IncompleteRecord(format!(
                "declared {} body bytes, {} remain",
                len,
                data.len() - 4
            )));
        }
        if len < MIN_BODY_LEN {
            return Err(MetalogError::InvalidFormat(format!(
                "Record body too small: {} bytes",
                len
            )));
        }

        let body = &data[4..4 + len];

        // Validate checksum
        let expected_checksum = {
            let mut c = std::io::Cursor::new(&body[body.len() - 4..]);
            c.get_u32_le()
        };
        let actual_checksum = crc32fast::hash(&body[..body.len() - 4]);
        if expected_checksum != actual_checksum {
            return Err(MetalogError::ChecksumMismatch {
                expected: expected_checksum,
                actual: actual_checksum,
            });
        }

        let mut cursor = std::io::Cursor::new(&body[..body.len() - 4]);

        let sequence = cursor.get_u64_le();
        let kind = RecordKind::try_from(cursor.get_u8())?;

        let mut uuid_bytes = [0u8; 16];
        cursor.copy_to_slice(&mut uuid_bytes);
        let entity_uuid = Uuid::from_bytes(uuid_bytes);

        let parent_uuid = match cursor.get_u8() {
            0 => None,
            1 => {
                if cursor.remaining() < 16 + 8 {
                    return Err(MetalogError::InvalidFormat(
                        "parent UUID cut short".into(),
                    ));
                }
                let mut parent_bytes = [0u8; 16];
                cursor.copy_to_slice(&mut parent_bytes);
                Some(Uuid::from_bytes(parent_bytes))
            }
            other => {
                return Err(MetalogError::InvalidFormat(format!(
                    "Invalid parent flag: {}",
                    other
                )))
            }
        };

        if cursor.remaining() < 8 {
            return Err(MetalogError::InvalidFormat("timestamp cut short".into()));
        }
        let timestamp = cursor.get_i64_le();

        let record = LifecycleRecord {
            sequence,
            kind,
            entity_uuid,
            parent_uuid,
            timestamp,
        };

        Ok((record, 4 + len))
    }
}

/// Smallest legal body: sequence + kind + entity UUID + parent flag +
/// timestamp + checksum
const MIN_BODY_LEN: usize = 8 + 1 + 16 + 1 + 8 + 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serialization() {
        let dim = Uuid::new_v4();
        let chart = Uuid::new_v4();
        let record = LifecycleRecord::dimension_created(7, dim, chart);

        let serialized = record.serialize_with_checksum();
        let (deserialized, len) =
            LifecycleRecord::deserialize_with_checksum(&serialized).unwrap();

        assert_eq!(len, serialized.len());
        assert_eq!(deserialized, record);
    }

    #[test]
    fn test_chart_deleted_has_no_parent() {
        let chart = Uuid::new_v4();
        let record = LifecycleRecord::chart_deleted(3, chart);

        let serialized = record.serialize_with_checksum();
        let (deserialized, _) =
            LifecycleRecord::deserialize_with_checksum(&serialized).unwrap();

        assert_eq!(deserialized.kind, RecordKind::ChartDeleted);
        assert_eq!(deserialized.entity_uuid, chart);
        assert_eq!(deserialized.parent_uuid, None);
    }

    #[test]
    fn test_checksum_validation() {
        let record = LifecycleRecord::dimension_deleted(1, Uuid::new_v4(), Uuid::new_v4());
        let mut serialized = record.serialize_with_checksum().to_vec();

        // Corrupt the body
        serialized[10] ^= 0xFF;

        let result = LifecycleRecord::deserialize_with_checksum(&serialized);
        assert!(matches!(
            result,
            Err(MetalogError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_record_is_incomplete() {
        let record = LifecycleRecord::dimension_created(1, Uuid::new_v4(), Uuid::new_v4());
        let serialized = record.serialize_with_checksum();

        for cut in 0..serialized.len() {
            let result = LifecycleRecord::deserialize_with_checksum(&serialized[..cut]);
            assert!(
                matches!(result, Err(MetalogError::IncompleteRecord(_))),
                "cut at {} should read as incomplete",
                cut
            );
        }
    }

    #[test]
    fn test_invalid_kind_rejected() {
        let record = LifecycleRecord::chart_deleted(1, Uuid::new_v4());
        let mut serialized = record.serialize_with_checksum().to_vec();

        // Kind byte sits after length prefix and sequence; patch it and
        // rewrite the checksum so only the kind is wrong.
        serialized[4 + 8] = 99;
        let body_len = serialized.len() - 4;
        let checksum = crc32fast::hash(&serialized[4..4 + body_len - 4]);
        let at = serialized.len() - 4;
        serialized[at..].copy_from_slice(&checksum.to_le_bytes());

        let result = LifecycleRecord::deserialize_with_checksum(&serialized);
        assert!(matches!(result, Err(MetalogError::InvalidFormat(_))));
    }
}
