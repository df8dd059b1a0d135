//! Encode and decode snapshot artifacts as Arrow IPC files.

use std::io::Cursor;
use std::sync::Arc;

use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, StringArray,
};
use arrow_ipc::reader::FileReader;
use arrow_ipc::writer::FileWriter;
use arrow_schema::{ArrowError, DataType, Field, Schema, SchemaRef};
use uuid::Uuid;

use mneme_types::conversation::{Conversation, ConversationId};
use mneme_types::memory::{InternalId, Memory};

use super::schema::{DIMENSION_KEY, conversations_schema, memories_schema, vectors_schema};
use crate::timestamp;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("column '{0}' is missing or has an unexpected type")]
    Column(String),

    #[error("invalid value in column '{column}': {message}")]
    Value { column: String, message: String },
}

impl CodecError {
    fn value(column: &str, message: impl ToString) -> Self {
        Self::Value {
            column: column.to_string(),
            message: message.to_string(),
        }
    }
}

/// Write `batches` as a single Arrow IPC file.
pub fn write_ipc(schema: &Schema, batches: &[RecordBatch]) -> Result<Vec<u8>, CodecError> {
    let mut writer = FileWriter::try_new(Vec::new(), schema)?;
    for batch in batches {
        writer.write(batch)?;
    }
    writer.finish()?;
    Ok(writer.into_inner()?)
}

/// Read every batch of an Arrow IPC file.
pub fn read_ipc(bytes: &[u8]) -> Result<(SchemaRef, Vec<RecordBatch>), CodecError> {
    let reader = FileReader::try_new(Cursor::new(bytes), None)?;
    let schema = reader.schema();
    let batches = reader.collect::<Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}

pub fn encode_conversations(conversations: &[Conversation]) -> Result<Vec<u8>, CodecError> {
    let schema = Arc::new(conversations_schema());
    if conversations.is_empty() {
        return write_ipc(&schema, &[]);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            conversations.iter().map(|c| c.id.to_string()),
        )),
        Arc::new(StringArray::from_iter_values(
            conversations.iter().map(|c| c.agent.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            conversations.iter().map(|c| c.user.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            conversations.iter().map(|c| timestamp::format(&c.created_at)),
        )),
    ];
    let batch = RecordBatch::try_new(Arc::clone(&schema), columns)?;
    write_ipc(&schema, &[batch])
}

pub fn decode_conversations(bytes: &[u8]) -> Result<Vec<Conversation>, CodecError> {
    let (_, batches) = read_ipc(bytes)?;
    let mut out = Vec::new();
    for batch in &batches {
        let ids = string_column(batch, "id")?;
        let agents = string_column(batch, "agent")?;
        let users = string_column(batch, "user")?;
        let created = string_column(batch, "created_at")?;
        for row in 0..batch.num_rows() {
            out.push(Conversation {
                id: ids
                    .value(row)
                    .parse::<ConversationId>()
                    .map_err(|e| CodecError::value("id", e))?,
                agent: agents.value(row).to_string(),
                user: users.value(row).to_string(),
                created_at: timestamp::parse(created.value(row))
                    .map_err(|e| CodecError::value("created_at", e))?,
            });
        }
    }
    Ok(out)
}

pub fn encode_memories(memories: &[Memory]) -> Result<Vec<u8>, CodecError> {
    let schema = Arc::new(memories_schema());
    if memories.is_empty() {
        return write_ipc(&schema, &[]);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(
            memories.iter().map(|m| m.internal_id),
        )),
        Arc::new(StringArray::from_iter_values(
            memories.iter().map(|m| m.external_id.to_string()),
        )),
        Arc::new(StringArray::from_iter_values(
            memories.iter().map(|m| m.conversation_id.to_string()),
        )),
        Arc::new(StringArray::from_iter_values(
            memories.iter().map(|m| m.query.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            memories.iter().map(|m| m.response.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            memories.iter().map(|m| timestamp::format(&m.created_at)),
        )),
    ];
    let batch = RecordBatch::try_new(Arc::clone(&schema), columns)?;
    write_ipc(&schema, &[batch])
}

pub fn decode_memories(bytes: &[u8]) -> Result<Vec<Memory>, CodecError> {
    let (_, batches) = read_ipc(bytes)?;
    let mut out = Vec::new();
    for batch in &batches {
        let ids = int64_column(batch, "id")?;
        let external = string_column(batch, "external_id")?;
        let conversations = string_column(batch, "conversation_id")?;
        let queries = string_column(batch, "query")?;
        let responses = string_column(batch, "response")?;
        let created = string_column(batch, "created_at")?;
        for row in 0..batch.num_rows() {
            out.push(Memory {
                internal_id: ids.value(row),
                external_id: Uuid::parse_str(external.value(row))
                    .map_err(|e| CodecError::value("external_id", e))?,
                conversation_id: conversations
                    .value(row)
                    .parse::<ConversationId>()
                    .map_err(|e| CodecError::value("conversation_id", e))?,
                query: queries.value(row).to_string(),
                response: responses.value(row).to_string(),
                created_at: timestamp::parse(created.value(row))
                    .map_err(|e| CodecError::value("created_at", e))?,
            });
        }
    }
    Ok(out)
}

/// Encode one partition. `vectors` is row-major, `ids.len() * dimension` long.
pub fn encode_vectors(
    dimension: usize,
    ids: &[InternalId],
    vectors: &[f32],
) -> Result<Vec<u8>, CodecError> {
    let size = i32::try_from(dimension).map_err(|e| CodecError::value("vector", e))?;
    if vectors.len() != ids.len() * dimension {
        return Err(CodecError::value(
            "vector",
            format!("{} values for {} ids of dimension {dimension}", vectors.len(), ids.len()),
        ));
    }

    let schema = Arc::new(vectors_schema(size));
    if ids.is_empty() {
        return write_ipc(&schema, &[]);
    }

    let item = Arc::new(Field::new("item", DataType::Float32, true));
    let values: ArrayRef = Arc::new(Float32Array::from(vectors.to_vec()));
    let vector_array = FixedSizeListArray::try_new(item, size, values, None)?;

    let batch = RecordBatch::try_new(
        Arc::clone(&schema),
        vec![
            Arc::new(Int64Array::from(ids.to_vec())),
            Arc::new(vector_array),
        ],
    )?;
    write_ipc(&schema, &[batch])
}

/// Decode one partition into `(dimension, ids, row-major vectors)`.
pub fn decode_vectors(bytes: &[u8]) -> Result<(usize, Vec<InternalId>, Vec<f32>), CodecError> {
    let (schema, batches) = read_ipc(bytes)?;
    let dimension: usize = schema
        .metadata()
        .get(DIMENSION_KEY)
        .ok_or_else(|| CodecError::Column(DIMENSION_KEY.to_string()))?
        .parse()
        .map_err(|e| CodecError::value(DIMENSION_KEY, e))?;

    let mut ids = Vec::new();
    let mut vectors = Vec::new();
    for batch in &batches {
        let id_column = int64_column(batch, "id")?;
        let list = batch
            .column_by_name("vector")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| CodecError::Column("vector".to_string()))?;
        if list.value_length() as usize != dimension {
            return Err(CodecError::value(
                "vector",
                format!("list size {} does not match dimension {dimension}", list.value_length()),
            ));
        }
        for row in 0..batch.num_rows() {
            let values = list.value(row);
            let floats = values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| CodecError::Column("vector.item".to_string()))?;
            ids.push(id_column.value(row));
            vectors.extend_from_slice(floats.values());
        }
    }
    Ok((dimension, ids, vectors))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, CodecError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| CodecError::Column(name.to_string()))
}

fn int64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array, CodecError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| CodecError::Column(name.to_string()))
}
