//! Arrow schema definitions for snapshot artifacts.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings, ids as UUID strings.

use std::collections::HashMap;
use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

/// Schema metadata key carrying a vector partition's dimension.
pub const DIMENSION_KEY: &str = "mneme.dimension";

/// Schema for the `conversations` table dump.
pub fn conversations_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("agent", DataType::Utf8, false),
        Field::new("user", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ])
}

/// Schema for the `memories` table dump.
pub fn memories_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("external_id", DataType::Utf8, false),
        Field::new("conversation_id", DataType::Utf8, false),
        Field::new("query", DataType::Utf8, false),
        Field::new("response", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ])
}

/// Schema for one index partition: internal ids and their vectors.
///
/// The dimension is also kept in schema metadata so an empty partition
/// round-trips with its dimension intact.
pub fn vectors_schema(dimension: i32) -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension,
            ),
            false,
        ),
    ])
    .with_metadata(HashMap::from([(
        DIMENSION_KEY.to_string(),
        dimension.to_string(),
    )]))
}
