use super::dedup::{collect_batch, keep_first_per_key};
use arrow::record_batch::RecordBatch;
use common::Result;
use datafusion::logical_expr::SortExpr;
use datafusion::prelude::*;
use tracing::{info, warn};

pub const SONG_COLUMNS: &[&str] = &["song_id", "title", "artist_id", "year", "duration"];
pub const ARTIST_COLUMNS: &[&str] = &["artist_id", "name", "location", "latitude", "longitude"];

/// Ascending, nulls last, in the given column order.
pub(crate) fn ascending(columns: &[&str]) -> Vec<SortExpr> {
    columns.iter().map(|c| col(*c).sort(true, false)).collect()
}

/// `songs`: one row per `song_id`.
pub async fn build_songs_table(records: &DataFrame) -> Result<RecordBatch> {
    let distinct = records
        .clone()
        .select_columns(SONG_COLUMNS)?
        .distinct()?
        .sort(ascending(SONG_COLUMNS))?;

    unique_by_key("songs", collect_batch(distinct).await?, "song_id")
}

/// `artists`: one row per `artist_id`, artist-prefixed fields renamed.
pub async fn build_artists_table(records: &DataFrame) -> Result<RecordBatch> {
    let distinct = records
        .clone()
        .select(vec![
            col("artist_id"),
            col("artist_name").alias("name"),
            col("artist_location").alias("location"),
            col("artist_latitude").alias("latitude"),
            col("artist_longitude").alias("longitude"),
        ])?
        .distinct()?
        .sort(ascending(ARTIST_COLUMNS))?;

    unique_by_key("artists", collect_batch(distinct).await?, "artist_id")
}

/// Exact duplicates are already gone; rows that still share a key disagree on some
/// attribute, and the first one in sort order is kept.
fn unique_by_key(table: &str, sorted: RecordBatch, key: &str) -> Result<RecordBatch> {
    let unique = keep_first_per_key(&sorted, &[key])?;

    let conflicting = sorted.num_rows() - unique.num_rows();
    if conflicting > 0 {
        warn!(
            table,
            key,
            dropped_rows = conflicting,
            "Rows sharing a key with different attributes; kept the first in sort order"
        );
    }

    info!(table, rows = unique.num_rows(), "Built dimension table");
    Ok(unique)
}
