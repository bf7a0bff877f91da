use super::dedup::collect_batch;
use super::udf::CalendarPart;
use crate::schema::start_time_type;
use arrow::record_batch::RecordBatch;
use common::Result;
use datafusion::prelude::*;
use tracing::info;

pub const TIME_COLUMNS: &[&str] = &[
    "start_time",
    "hour",
    "day",
    "week_of_year",
    "month",
    "year",
    "weekday",
];

/// `time`: one row per distinct play timestamp, decomposed into calendar parts.
pub async fn build_time_table(plays: &DataFrame) -> Result<RecordBatch> {
    let ts = || col("event_timestamp");

    let df = plays
        .clone()
        .select_columns(&["event_timestamp"])?
        .distinct()?
        .select(vec![
            cast(ts(), start_time_type()).alias("start_time"),
            CalendarPart::Hour.apply(ts()).alias("hour"),
            CalendarPart::Day.apply(ts()).alias("day"),
            CalendarPart::WeekOfYear.apply(ts()).alias("week_of_year"),
            CalendarPart::Month.apply(ts()).alias("month"),
            CalendarPart::Year.apply(ts()).alias("year"),
            CalendarPart::Weekday.apply(ts()).alias("weekday"),
        ])?
        .sort(vec![col("start_time").sort(true, false)])?;

    let time = collect_batch(df).await?;
    info!(table = "time", rows = time.num_rows(), "Built dimension table");
    Ok(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::activity::{filter_play_actions, normalize_activity};
    use crate::processor::reader::decode_json_records;
    use crate::schema::raw_activity_schema;
    use arrow::array::{Array, Int32Array, TimestampMillisecondArray};
    use datafusion::datasource::MemTable;
    use std::sync::Arc;

    async fn plays(lines: &str) -> DataFrame {
        let ctx = SessionContext::new();
        let schema = Arc::new(raw_activity_schema());
        let batches = decode_json_records(lines.as_bytes(), schema.clone(), 1024).unwrap();
        let table = MemTable::try_new(schema, vec![batches]).unwrap();
        let raw = ctx.read_table(Arc::new(table)).unwrap();
        filter_play_actions(normalize_activity(raw).unwrap()).unwrap()
    }

    fn ints<'a>(batch: &'a RecordBatch, name: &str) -> &'a Int32Array {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<Int32Array>()
            .unwrap()
    }

    #[tokio::test]
    async fn test_exactly_distinct_play_timestamps() {
        let lines = [
            r#"{"page":"NextSong","ts":1541106106796}"#,
            r#"{"page":"NextSong","ts":1541106106796}"#,
            r#"{"page":"NextSong","ts":1541106352796}"#,
            r#"{"page":"Home","ts":1541105830796}"#,
        ]
        .join("\n");

        let time = build_time_table(&plays(&lines).await).await.unwrap();
        assert_eq!(time.num_rows(), 2);

        let start = time
            .column_by_name("start_time")
            .unwrap()
            .as_any()
            .downcast_ref::<TimestampMillisecondArray>()
            .unwrap();
        assert_eq!(start.values().to_vec(), vec![1541106106796, 1541106352796]);
    }

    #[tokio::test]
    async fn test_calendar_columns() {
        let time = build_time_table(&plays(r#"{"page":"NextSong","ts":1541106106796}"#).await)
            .await
            .unwrap();

        let names: Vec<String> = time
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, TIME_COLUMNS);

        assert_eq!(ints(&time, "hour").value(0), 21);
        assert_eq!(ints(&time, "day").value(0), 1);
        assert_eq!(ints(&time, "week_of_year").value(0), 44);
        assert_eq!(ints(&time, "month").value(0), 11);
        assert_eq!(ints(&time, "year").value(0), 2018);
        assert_eq!(ints(&time, "weekday").value(0), 4);
    }

    #[tokio::test]
    async fn test_no_plays_gives_empty_table() {
        let time = build_time_table(&plays(r#"{"page":"Home","ts":1}"#).await)
            .await
            .unwrap();
        assert_eq!(time.num_rows(), 0);
        assert_eq!(time.num_columns(), TIME_COLUMNS.len());
    }
}
