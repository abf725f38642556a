// ABOUTME: Payload chunking and batch framing for size-limited transport
// ABOUTME: Splits serialized batches into parts whose concatenation reconstructs the payload exactly

use serde::Deserialize;
use uuid::Uuid;

use crate::error::ReplicateError;
use crate::row::RowBatch;

/// One size-bounded part of a chunked payload.
///
/// For a given `schema_id`, `total_parts` is identical across all parts and
/// parts `0..total_parts-1` concatenated in order reconstruct the original
/// byte sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct MessagePart {
    pub schema_id: String,
    pub part_number: usize,
    pub total_parts: usize,
    pub payload: Vec<u8>,
}

impl MessagePart {
    /// Convert the part into a transport message keyed by the table name,
    /// carrying reassembly metadata as text headers.
    pub fn into_message(self, table: &str) -> StreamMessage {
        StreamMessage {
            key: Some(table.to_string()),
            headers: vec![
                ("schema_id".to_string(), self.schema_id),
                ("part_number".to_string(), self.part_number.to_string()),
                ("total_parts".to_string(), self.total_parts.to_string()),
            ],
            payload: self.payload,
        }
    }
}

/// Transport-neutral outbound unit handed to the stream publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMessage {
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

/// How a fetched batch is framed into stream messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FramingMode {
    /// Serialize the whole batch and split it into size-bounded parts.
    Chunked,
    /// One message per serialized row, no reassembly metadata.
    PerRow,
}

/// Split `payload` into parts of at most `max_part_size` bytes.
///
/// An empty payload yields exactly one zero-length part with `total_parts`
/// of 1, so a batch is never framed as nothing.
///
/// # Panics
///
/// Panics if `max_part_size` is 0 (caller contract violation).
pub fn chunk(schema_id: &str, payload: &[u8], max_part_size: usize) -> Vec<MessagePart> {
    assert!(max_part_size > 0, "max_part_size must be positive");

    let total_parts = payload.len().div_ceil(max_part_size).max(1);
    (0..total_parts)
        .map(|part_number| {
            let start = part_number * max_part_size;
            let end = usize::min(start + max_part_size, payload.len());
            MessagePart {
                schema_id: schema_id.to_string(),
                part_number,
                total_parts,
                payload: payload[start..end].to_vec(),
            }
        })
        .collect()
}

/// Frame a fetched batch into outbound messages.
///
/// Chunked framing tags every part with a schema id unique to this
/// (table, batch) pair so concurrent tables and cycles reassemble
/// unambiguously downstream.
pub fn frame_batch(
    table: &str,
    batch: &RowBatch,
    mode: FramingMode,
    max_part_size: usize,
) -> Result<Vec<StreamMessage>, ReplicateError> {
    match mode {
        FramingMode::PerRow => batch
            .rows
            .iter()
            .map(|row| {
                Ok(StreamMessage {
                    key: Some(table.to_string()),
                    payload: serde_json::to_vec(row)?,
                    headers: Vec::new(),
                })
            })
            .collect(),
        FramingMode::Chunked => {
            let payload = serde_json::to_vec(&batch.rows)?;
            let schema_id = format!("{}-{}", table, Uuid::new_v4());
            Ok(chunk(&schema_id, &payload, max_part_size)
                .into_iter()
                .map(|part| part.into_message(table))
                .collect())
        }
    }
}
