use arrow::array::{ArrayRef, BooleanArray};
use arrow::compute::{concat_batches, filter_record_batch};
use arrow::record_batch::RecordBatch;
use arrow::row::{RowConverter, SortField};
use common::{Error, Result};
use datafusion::prelude::DataFrame;

/// Runs a plan and concatenates its output, preserving the plan's row order.
pub async fn collect_batch(df: DataFrame) -> Result<RecordBatch> {
    let plan_schema = df.schema().inner().clone();
    let batches = df.collect().await?;
    let schema = batches
        .first()
        .map(|batch| batch.schema())
        .unwrap_or(plan_schema);
    Ok(concat_batches(&schema, &batches)?)
}

/// Keeps the first row of every run of equal key values.
///
/// The batch must already be sorted so that equal keys are adjacent; the sort
/// order decides which row survives.
pub fn keep_first_per_key(batch: &RecordBatch, key_columns: &[&str]) -> Result<RecordBatch> {
    if batch.num_rows() == 0 {
        return Ok(batch.clone());
    }

    let keys = key_columns
        .iter()
        .map(|name| {
            batch.column_by_name(name).cloned().ok_or_else(|| {
                Error::SchemaValidation(format!("Missing key column '{}'", name))
            })
        })
        .collect::<Result<Vec<ArrayRef>>>()?;

    let converter = RowConverter::new(
        keys.iter()
            .map(|array| SortField::new(array.data_type().clone()))
            .collect(),
    )?;
    let rows = converter.convert_columns(&keys)?;

    let mask: BooleanArray = (0..rows.num_rows())
        .map(|i| Some(i == 0 || rows.row(i) != rows.row(i - 1)))
        .collect();

    Ok(filter_record_batch(batch, &mask)?)
}
