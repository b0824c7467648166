use std::io::Write;
use std::sync::Arc;

use arrow_array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_json::writer::{LineDelimited, WriterBuilder};
use arrow_schema::{ArrowError, DataType, Field, Schema, SchemaRef};

use crate::normalizer::{
    NormalizedRecord, DESCRIPTION_FIELD, ID_FIELD, NAME_FIELD, PRICE_FIELD,
};

pub trait RowEncoder {
    /// Writes every row of `batch` to `out` and returns the number of rows written.
    fn encode<W: Write>(&self, batch: &RecordBatch, out: W) -> Result<usize, ArrowError>;
}

/// Schema of a staged artifact. Only `id` is non-nullable.
pub fn staged_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(ID_FIELD, DataType::Int64, false),
        Field::new(NAME_FIELD, DataType::Utf8, true),
        Field::new(DESCRIPTION_FIELD, DataType::Utf8, true),
        Field::new(PRICE_FIELD, DataType::Float64, true),
    ]))
}

pub fn records_to_batch(records: &[NormalizedRecord]) -> Result<RecordBatch, ArrowError> {
    let ids = Int64Array::from_iter_values(records.iter().map(|r| r.id));
    let names: StringArray = records.iter().map(|r| r.name.as_deref()).collect();
    let descriptions: StringArray = records.iter().map(|r| r.description.as_deref()).collect();
    let prices: Float64Array = records.iter().map(|r| r.price).collect();

    RecordBatch::try_new(
        staged_schema(),
        vec![
            Arc::new(ids) as ArrayRef,
            Arc::new(names) as ArrayRef,
            Arc::new(descriptions) as ArrayRef,
            Arc::new(prices) as ArrayRef,
        ],
    )
}

/// Writes one JSON object per line. Nulls are written out so every line carries every key.
#[derive(Debug, Clone, Copy)]
pub struct JsonLinesEncoder {
    explicit_nulls: bool,
}

impl Default for JsonLinesEncoder {
    fn default() -> Self {
        Self {
            explicit_nulls: true,
        }
    }
}

impl JsonLinesEncoder {
    pub fn with_explicit_nulls(mut self, explicit_nulls: bool) -> Self {
        self.explicit_nulls = explicit_nulls;
        self
    }
}

impl RowEncoder for JsonLinesEncoder {
    fn encode<W: Write>(&self, batch: &RecordBatch, out: W) -> Result<usize, ArrowError> {
        if batch.num_rows() == 0 {
            return Ok(0);
        }

        let mut writer = WriterBuilder::new()
            .with_explicit_nulls(self.explicit_nulls)
            .build::<_, LineDelimited>(out);
        writer.write(batch)?;
        writer.finish()?;

        Ok(batch.num_rows())
    }
}
