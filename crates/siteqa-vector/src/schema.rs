use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const COL_ORDINAL: &str = "ordinal";
pub const COL_CONTENT: &str = "content";
pub const COL_METADATA: &str = "metadata";
pub const COL_VECTOR: &str = "vector";

/// One row per chunk; `ordinal` is the chunk's position in the corpus and
/// `metadata` its JSON-encoded metadata map.
pub fn build_arrow_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(COL_ORDINAL, DataType::Int32, false),
		Field::new(COL_CONTENT, DataType::Utf8, false),
		Field::new(COL_METADATA, DataType::Utf8, false),
		Field::new(COL_VECTOR, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}
