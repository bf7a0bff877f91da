use super::table::OutputTable;
use crate::storage::ObjectStorage;
use crate::utils::paths::PathBuilder;
use arrow::array::{Array, UInt32Array};
use arrow::compute::take_record_batch;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::{Error, Result};
use futures::stream::{self, TryStreamExt};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const MARKER_FILE: &str = "_SUCCESS";
const PART_FILE: &str = "part-00000.parquet";
const IO_CONCURRENCY: usize = 16;

/// Written as `<table>/_SUCCESS` once every part file of the table is in place.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TableMarker {
    pub table: String,
    pub row_count: usize,
    pub partition_columns: Vec<String>,
    /// Part file keys relative to the output root.
    pub files: Vec<String>,
    /// Columns stored inside the part files.
    pub columns: Vec<String>,
    pub written_at: DateTime<Utc>,
}

/// One encoded part file waiting to be uploaded.
struct EncodedPart {
    key: String,
    rows: usize,
    data: Bytes,
}

/// Replaces whole table directories under an output location with Hive-partitioned Parquet.
pub struct PartitionedWriter {
    storage: Arc<dyn ObjectStorage>,
}

impl PartitionedWriter {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    pub fn location(&self) -> &str {
        self.storage.location()
    }

    /// Overwrites `table` with `batch`. The marker is removed before anything else is
    /// touched and written only after the last part file, so a reader that sees it sees
    /// a complete table.
    pub async fn write_table(&self, table: OutputTable, batch: &RecordBatch) -> Result<TableMarker> {
        self.replace_table(table, batch)
            .await
            .map_err(|e| Error::table_write(table.name(), e))
    }

    /// Reads back the marker of a previous write, if the table is complete.
    pub async fn read_marker(&self, table: OutputTable) -> Result<Option<TableMarker>> {
        let key = marker_key(table);
        if !self.storage.check_file_exists(&key).await? {
            return Ok(None);
        }
        let data = self.storage.get_object(&key).await?;
        Ok(Some(serde_json::from_slice(&data)?))
    }

    async fn replace_table(&self, table: OutputTable, batch: &RecordBatch) -> Result<TableMarker> {
        let parts = encode_partitions(table, batch)?;

        let marker_key = marker_key(table);
        self.storage.delete_object(&marker_key).await?;

        let stale = self.storage.list_objects(table.name()).await?;
        debug!(table = %table, objects = stale.len(), "Removing previous table contents");
        stream::iter(stale.into_iter().map(Ok::<_, Error>))
            .try_for_each_concurrent(IO_CONCURRENCY, |key| {
                let storage = Arc::clone(&self.storage);
                async move { storage.delete_object(&key).await }
            })
            .await?;

        let files: Vec<String> = parts.iter().map(|part| part.key.clone()).collect();
        let row_count = parts.iter().map(|part| part.rows).sum();
        stream::iter(parts.into_iter().map(Ok::<_, Error>))
            .try_for_each_concurrent(IO_CONCURRENCY, |part| {
                let storage = Arc::clone(&self.storage);
                async move {
                    debug!(key = %part.key, rows = part.rows, "Uploading part file");
                    storage.put_object(&part.key, part.data).await
                }
            })
            .await?;

        let partition_columns = table.partition_columns();
        let marker = TableMarker {
            table: table.name().to_string(),
            row_count,
            partition_columns: partition_columns.iter().map(|c| c.to_string()).collect(),
            files,
            columns: batch
                .schema()
                .fields()
                .iter()
                .map(|f| f.name().clone())
                .filter(|name| !partition_columns.contains(&name.as_str()))
                .collect(),
            written_at: Utc::now(),
        };
        self.storage
            .put_object(&marker_key, Bytes::from(serde_json::to_vec_pretty(&marker)?))
            .await?;

        info!(
            table = %table,
            rows = marker.row_count,
            files = marker.files.len(),
            location = self.storage.location(),
            "Table written"
        );
        Ok(marker)
    }
}

fn marker_key(table: OutputTable) -> String {
    PathBuilder::new(table.name()).build_file_path(MARKER_FILE)
}

fn writer_properties(table: OutputTable) -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_key_value_metadata(Some(vec![KeyValue {
            key: "table".to_string(),
            value: Some(table.name().to_string()),
        }]))
        .build()
}

/// Splits `batch` by the table's partition columns and encodes each piece in memory.
fn encode_partitions(table: OutputTable, batch: &RecordBatch) -> Result<Vec<EncodedPart>> {
    let partition_columns = table.partition_columns();
    let schema = batch.schema();

    let partition_arrays = partition_columns
        .iter()
        .map(|name| {
            batch.column_by_name(name).cloned().ok_or_else(|| {
                Error::SchemaValidation(format!(
                    "Partition column '{}' missing from table '{}'",
                    name, table
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let data_columns: Vec<usize> = (0..schema.fields().len())
        .filter(|i| !partition_columns.contains(&schema.field(*i).name().as_str()))
        .collect();

    // Row indices per partition value tuple, in a stable directory order.
    let mut groups: BTreeMap<Vec<Option<String>>, Vec<u32>> = BTreeMap::new();
    if partition_columns.is_empty() {
        groups.insert(Vec::new(), (0..batch.num_rows() as u32).collect());
    } else {
        for row in 0..batch.num_rows() {
            let values = partition_arrays
                .iter()
                .map(|array| {
                    if array.is_null(row) {
                        return Ok(None);
                    }
                    // "" lands in the default partition, same as null
                    array_value_to_string(array, row)
                        .map(|value| Some(value).filter(|v| !v.is_empty()))
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            groups.entry(values).or_default().push(row as u32);
        }
    }

    let properties = writer_properties(table);
    groups
        .into_iter()
        .map(|(values, rows)| -> Result<EncodedPart> {
            let path = partition_columns
                .iter()
                .zip(values.iter())
                .fold(PathBuilder::new(table.name()), |path, (column, value)| {
                    path.with_partition(column, value.as_deref())
                });

            let piece = take_record_batch(batch, &UInt32Array::from(rows))?.project(&data_columns)?;
            Ok(EncodedPart {
                key: path.build_file_path(PART_FILE),
                rows: piece.num_rows(),
                data: encode_parquet(&piece, properties.clone())?,
            })
        })
        .collect()
}

fn encode_parquet(batch: &RecordBatch, properties: WriterProperties) -> Result<Bytes> {
    let mut buffer: Vec<u8> = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(properties))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(Bytes::from(buffer))
}
