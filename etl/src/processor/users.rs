use super::dedup::{collect_batch, keep_first_per_key};
use arrow::record_batch::RecordBatch;
use common::Result;
use datafusion::prelude::*;
use tracing::info;

pub const USER_COLUMNS: &[&str] = &["user_id", "first_name", "last_name", "gender", "level"];

/// `users`: one row per known user, taken from that user's most recent play.
///
/// Plays without a user id (logged-out sessions) are ignored. When two plays of
/// a user share the latest timestamp the remaining columns decide, ascending.
pub async fn build_users_table(plays: &DataFrame) -> Result<RecordBatch> {
    let df = plays
        .clone()
        .filter(col("user_id").is_not_null().and(col("user_id").not_eq(lit(""))))?
        .select_columns(&[
            "user_id",
            "event_timestamp",
            "first_name",
            "last_name",
            "gender",
            "level",
        ])?
        .sort(vec![
            col("user_id").sort(true, false),
            col("event_timestamp").sort(false, false),
            col("first_name").sort(true, false),
            col("last_name").sort(true, false),
            col("gender").sort(true, false),
            col("level").sort(true, false),
        ])?;

    let latest = keep_first_per_key(&collect_batch(df).await?, &["user_id"])?;

    let schema = latest.schema();
    let projection = USER_COLUMNS
        .iter()
        .map(|name| schema.index_of(name))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let users = latest.project(&projection)?;

    info!(table = "users", rows = users.num_rows(), "Built dimension table");
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::activity::{filter_play_actions, normalize_activity};
    use crate::processor::reader::decode_json_records;
    use crate::schema::raw_activity_schema;
    use arrow::array::{Array, StringArray};
    use datafusion::datasource::MemTable;
    use std::sync::Arc;

    async fn plays(lines: &[&str]) -> DataFrame {
        let ctx = SessionContext::new();
        let schema = Arc::new(raw_activity_schema());
        let batches =
            decode_json_records(lines.join("\n").as_bytes(), schema.clone(), 1024).unwrap();
        let table = MemTable::try_new(schema, vec![batches]).unwrap();
        let raw = ctx.read_table(Arc::new(table)).unwrap();
        filter_play_actions(normalize_activity(raw).unwrap()).unwrap()
    }

    fn strings<'a>(batch: &'a RecordBatch, name: &str) -> &'a StringArray {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
    }

    #[tokio::test]
    async fn test_latest_level_wins() {
        let plays = plays(&[
            r#"{"page":"NextSong","ts":300,"userId":"15","firstName":"Lily","lastName":"Koch","gender":"F","level":"paid"}"#,
            r#"{"page":"NextSong","ts":100,"userId":"15","firstName":"Lily","lastName":"Koch","gender":"F","level":"free"}"#,
            r#"{"page":"NextSong","ts":200,"userId":"8","firstName":"Kaylee","lastName":"Summers","gender":"F","level":"free"}"#,
            r#"{"page":"Home","ts":400,"userId":"8","firstName":"Kaylee","lastName":"Summers","gender":"F","level":"paid"}"#,
        ])
        .await;

        let users = build_users_table(&plays).await.unwrap();
        assert_eq!(users.num_rows(), 2);
        assert_eq!(strings(&users, "user_id").value(0), "15");
        assert_eq!(strings(&users, "level").value(0), "paid");
        // the later "paid" row for 8 is not a play
        assert_eq!(strings(&users, "user_id").value(1), "8");
        assert_eq!(strings(&users, "level").value(1), "free");
    }

    #[tokio::test]
    async fn test_downgrade_is_kept_when_latest() {
        let plays = plays(&[
            r#"{"page":"NextSong","ts":100,"userId":"29","level":"paid"}"#,
            r#"{"page":"NextSong","ts":900,"userId":"29","level":"free"}"#,
            r#"{"page":"NextSong","ts":500,"userId":"29","level":"paid"}"#,
        ])
        .await;

        let users = build_users_table(&plays).await.unwrap();
        assert_eq!(users.num_rows(), 1);
        assert_eq!(strings(&users, "level").value(0), "free");
    }

    #[tokio::test]
    async fn test_missing_user_ids_excluded() {
        let plays = plays(&[
            r#"{"page":"NextSong","ts":1,"userId":""}"#,
            r#"{"page":"NextSong","ts":2}"#,
            r#"{"page":"NextSong","ts":3,"userId":"42","level":"free"}"#,
        ])
        .await;

        let users = build_users_table(&plays).await.unwrap();
        assert_eq!(users.num_rows(), 1);
        assert_eq!(strings(&users, "user_id").value(0), "42");

        let names: Vec<String> = users
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, USER_COLUMNS);
        assert!(strings(&users, "first_name").is_null(0));
    }
}
