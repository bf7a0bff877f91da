use super::dedup::collect_batch;
use super::songs::ascending;
use super::udf::CalendarPart;
use crate::schema::start_time_type;
use arrow::array::{ArrayRef, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use common::Result;
use datafusion::functions_aggregate::expr_fn::{count, min};
use datafusion::prelude::*;
use std::sync::Arc;
use tracing::info;

pub const SONGPLAY_COLUMNS: &[&str] = &[
    "songplay_id",
    "start_time",
    "user_id",
    "level",
    "song_id",
    "artist_id",
    "session_id",
    "location",
    "user_agent",
    "year",
    "month",
];

/// Row order used to number songplays. Every non-derived output column takes part,
/// so the numbering never depends on how the engine happened to partition the join.
const SONGPLAY_ORDER: &[&str] = &[
    "start_time",
    "user_id",
    "session_id",
    "item_in_session",
    "song_id",
    "artist_id",
    "level",
    "location",
    "user_agent",
];

/// Songs joined to their artists, keyed by (title, artist name, duration).
///
/// Keys shared by more than one song/artist pair are dropped so a play never
/// fans out into several facts and never resolves to an arbitrary song.
pub fn song_catalog(
    ctx: &SessionContext,
    songs: &RecordBatch,
    artists: &RecordBatch,
) -> Result<DataFrame> {
    let songs = ctx.read_batch(songs.clone())?.select(vec![
        col("song_id"),
        col("title"),
        col("artist_id"),
        col("duration"),
    ])?;
    let artists = ctx.read_batch(artists.clone())?.select(vec![
        col("artist_id").alias("catalog_artist_id"),
        col("name").alias("catalog_artist_name"),
    ])?;

    let catalog = songs
        .join(
            artists,
            JoinType::Inner,
            &["artist_id"],
            &["catalog_artist_id"],
            None,
        )?
        .aggregate(
            vec![col("title"), col("catalog_artist_name"), col("duration")],
            vec![
                count(lit(1)).alias("candidates"),
                min(col("song_id")).alias("catalog_song_id"),
                min(col("artist_id")).alias("catalog_song_artist_id"),
            ],
        )?
        .filter(col("candidates").eq(lit(1_i64)))?
        .select(vec![
            col("title").alias("catalog_title"),
            col("catalog_artist_name"),
            col("duration").alias("catalog_duration"),
            col("catalog_song_id").alias("song_id"),
            col("catalog_song_artist_id").alias("artist_id"),
        ])?;

    Ok(catalog)
}

/// `songplays`: one fact per play, numbered 1..n in [`SONGPLAY_ORDER`].
pub async fn build_songplays_table(
    ctx: &SessionContext,
    plays: &DataFrame,
    songs: &RecordBatch,
    artists: &RecordBatch,
) -> Result<RecordBatch> {
    let catalog = song_catalog(ctx, songs, artists)?;
    let ts = || col("event_timestamp");

    let ordered = plays
        .clone()
        .join(
            catalog,
            JoinType::Left,
            &["song_title", "artist_name", "song_duration"],
            &["catalog_title", "catalog_artist_name", "catalog_duration"],
            None,
        )?
        .select(vec![
            cast(ts(), start_time_type()).alias("start_time"),
            col("user_id"),
            col("level"),
            col("song_id"),
            col("artist_id"),
            col("session_id"),
            col("location"),
            col("user_agent"),
            CalendarPart::Year.apply(ts()).alias("year"),
            CalendarPart::Month.apply(ts()).alias("month"),
            col("item_in_session"),
        ])?
        .sort(ascending(SONGPLAY_ORDER))?
        .select_columns(&SONGPLAY_COLUMNS[1..])?;

    let songplays = assign_songplay_ids(&collect_batch(ordered).await?)?;

    let resolved = songplays.num_rows()
        - songplays
            .column_by_name("song_id")
            .map(|c| c.null_count())
            .unwrap_or_default();
    info!(
        table = "songplays",
        rows = songplays.num_rows(),
        resolved,
        "Built fact table"
    );
    Ok(songplays)
}

/// Prepends `songplay_id` numbered from 1 in the batch's current row order.
pub fn assign_songplay_ids(batch: &RecordBatch) -> Result<RecordBatch> {
    let ids = Int64Array::from_iter_values(1..=batch.num_rows() as i64);

    let mut fields = vec![Arc::new(Field::new("songplay_id", DataType::Int64, false))];
    fields.extend(batch.schema().fields().iter().cloned());

    let mut columns: Vec<ArrayRef> = vec![Arc::new(ids)];
    columns.extend(batch.columns().iter().cloned());

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::activity::{filter_play_actions, normalize_activity};
    use crate::processor::reader::decode_json_records;
    use crate::processor::songs::{build_artists_table, build_songs_table};
    use crate::schema::{raw_activity_schema, raw_song_schema};
    use arrow::array::{Array, StringArray};
    use datafusion::datasource::MemTable;

    fn table(ctx: &SessionContext, schema: Schema, lines: &[&str]) -> DataFrame {
        let schema = Arc::new(schema);
        let batches =
            decode_json_records(lines.join("\n").as_bytes(), schema.clone(), 1024).unwrap();
        let table = MemTable::try_new(schema, vec![batches]).unwrap();
        ctx.read_table(Arc::new(table)).unwrap()
    }

    async fn run(song_lines: &[&str], log_lines: &[&str]) -> RecordBatch {
        let ctx = SessionContext::new();
        let records = table(&ctx, raw_song_schema(), song_lines);
        let songs = build_songs_table(&records).await.unwrap();
        let artists = build_artists_table(&records).await.unwrap();
        let plays = filter_play_actions(
            normalize_activity(table(&ctx, raw_activity_schema(), log_lines)).unwrap(),
        )
        .unwrap();
        build_songplays_table(&ctx, &plays, &songs, &artists)
            .await
            .unwrap()
    }

    fn strings<'a>(batch: &'a RecordBatch, name: &str) -> &'a StringArray {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
    }

    fn ids(batch: &RecordBatch) -> Vec<i64> {
        batch
            .column_by_name("songplay_id")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .values()
            .to_vec()
    }

    const SONG: &str = r#"{"song_id":"S1","title":"X","artist_id":"A1","artist_name":"Art","year":2000,"duration":180.5}"#;

    #[tokio::test]
    async fn test_matching_play_resolves_keys() {
        let facts = run(
            &[SONG],
            &[r#"{"page":"NextSong","ts":1541106106796,"song":"X","artist":"Art","length":180.5,"userId":"U1","level":"free","sessionId":1,"location":"LA","userAgent":"ua"}"#],
        )
        .await;

        assert_eq!(facts.num_rows(), 1);
        assert_eq!(strings(&facts, "song_id").value(0), "S1");
        assert_eq!(strings(&facts, "artist_id").value(0), "A1");
        assert_eq!(ids(&facts), vec![1]);

        let names: Vec<String> = facts
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, SONGPLAY_COLUMNS);
    }

    #[tokio::test]
    async fn test_unmatched_plays_are_kept_with_null_keys() {
        let facts = run(
            &[SONG],
            &[
                // duration differs
                r#"{"page":"NextSong","ts":1,"song":"X","artist":"Art","length":180.4,"userId":"U1"}"#,
                // artist differs
                r#"{"page":"NextSong","ts":2,"song":"X","artist":"Someone","length":180.5,"userId":"U1"}"#,
                // no song at all
                r#"{"page":"NextSong","ts":3,"userId":"U1"}"#,
            ],
        )
        .await;

        assert_eq!(facts.num_rows(), 3);
        assert_eq!(strings(&facts, "song_id").null_count(), 3);
        assert_eq!(strings(&facts, "artist_id").null_count(), 3);
    }

    #[tokio::test]
    async fn test_ambiguous_catalog_match_is_unresolved() {
        let facts = run(
            &[
                SONG,
                r#"{"song_id":"S9","title":"X","artist_id":"A9","artist_name":"Art","year":2010,"duration":180.5}"#,
            ],
            &[r#"{"page":"NextSong","ts":1,"song":"X","artist":"Art","length":180.5,"userId":"U1"}"#],
        )
        .await;

        assert_eq!(facts.num_rows(), 1);
        assert!(strings(&facts, "song_id").is_null(0));
    }

    #[tokio::test]
    async fn test_ids_follow_time_order_regardless_of_input_order() {
        let logs = [
            r#"{"page":"NextSong","ts":3000,"userId":"2","sessionId":7,"itemInSession":1}"#,
            r#"{"page":"NextSong","ts":1000,"userId":"1","sessionId":5,"itemInSession":0}"#,
            r#"{"page":"NextSong","ts":3000,"userId":"1","sessionId":5,"itemInSession":4}"#,
            r#"{"page":"NextSong","ts":2000,"userId":"1","sessionId":5,"itemInSession":2}"#,
        ];
        let mut reversed = logs;
        reversed.reverse();

        let forward = run(&[SONG], &logs).await;
        let backward = run(&[SONG], &reversed).await;

        assert_eq!(ids(&forward), vec![1, 2, 3, 4]);
        assert_eq!(forward, backward);

        let users = strings(&forward, "user_id");
        assert_eq!(
            users.iter().flatten().collect::<Vec<_>>(),
            vec!["1", "1", "1", "2"]
        );
    }

    #[test]
    fn test_assign_ids_on_empty_batch() {
        let schema = Arc::new(Schema::new(vec![Field::new("user_id", DataType::Utf8, true)]));
        let empty = RecordBatch::new_empty(schema);
        let numbered = assign_songplay_ids(&empty).unwrap();
        assert_eq!(numbered.num_rows(), 0);
        assert_eq!(numbered.schema().field(0).name(), "songplay_id");
    }
}
