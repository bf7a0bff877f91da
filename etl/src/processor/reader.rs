use crate::schema::{RecordSchema, get_record_schema};
use crate::storage::ObjectStorage;
use crate::utils::paths::GlobPattern;
use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use arrow::json::reader::ReaderBuilder;
use arrow::record_batch::RecordBatch;
use common::{Error, Result};
use datafusion::datasource::MemTable;
use datafusion::prelude::*;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info};

const FETCH_CONCURRENCY: usize = 16;

/// Loads JSON records from an input location into DataFusion with a fixed schema.
pub struct RecordReader {
    storage: Arc<dyn ObjectStorage>,
    batch_size: usize,
}

impl RecordReader {
    pub fn new(storage: Arc<dyn ObjectStorage>, batch_size: usize) -> Self {
        Self {
            storage,
            batch_size,
        }
    }

    /// Keys under the pattern's literal prefix that match the whole pattern, sorted.
    pub async fn matching_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let glob = GlobPattern::new(pattern)?;
        let keys: Vec<String> = self
            .storage
            .list_objects(glob.prefix())
            .await?
            .into_iter()
            .filter(|key| glob.matches(key))
            .collect();

        if keys.is_empty() {
            return Err(Error::InvalidInput(format!(
                "No objects match '{}' under {}",
                glob.pattern(),
                self.storage.location()
            )));
        }

        Ok(keys)
    }

    /// Decodes every matching object. Any record that does not fit the schema fails the read.
    pub async fn read_records(&self, pattern: &str, schema: SchemaRef) -> Result<Vec<RecordBatch>> {
        let keys = self.matching_keys(pattern).await?;
        info!(
            pattern,
            location = self.storage.location(),
            files = keys.len(),
            "Reading input records"
        );

        let batch_size = self.batch_size;
        let per_file: Vec<Vec<RecordBatch>> = stream::iter(keys)
            .map(|key| {
                let storage = Arc::clone(&self.storage);
                let schema = schema.clone();
                async move {
                    let data = storage.get_object(&key).await?;
                    decode_json_records(&data, schema, batch_size).map_err(|e| {
                        Error::SchemaValidation(format!("{}: {}", key, e))
                    })
                }
            })
            .buffered(FETCH_CONCURRENCY)
            .try_collect()
            .await?;

        let batches: Vec<RecordBatch> = per_file.into_iter().flatten().collect();
        debug!(
            pattern,
            rows = batches.iter().map(|b| b.num_rows()).sum::<usize>(),
            "Decoded input records"
        );
        Ok(batches)
    }

    pub async fn load(
        &self,
        ctx: &SessionContext,
        pattern: &str,
        kind: RecordSchema,
    ) -> Result<DataFrame> {
        let schema = get_record_schema(kind);
        let batches = self.read_records(pattern, schema.clone()).await?;
        let table = MemTable::try_new(schema, vec![batches])?;
        Ok(ctx.read_table(Arc::new(table))?)
    }
}

/// Decodes JSON objects (one per file or one per line) against `schema`.
pub fn decode_json_records(
    data: &[u8],
    schema: SchemaRef,
    batch_size: usize,
) -> std::result::Result<Vec<RecordBatch>, ArrowError> {
    let reader = ReaderBuilder::new(schema)
        .with_batch_size(batch_size)
        .build(Cursor::new(data))?;
    reader.collect()
}
