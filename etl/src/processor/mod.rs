pub mod activity;
pub mod dedup;
pub mod reader;
pub mod songplays;
pub mod songs;
pub mod table;
pub mod time;
pub mod udf;
pub mod users;
pub mod writer;

pub use reader::RecordReader;
pub use table::OutputTable;
pub use writer::{PartitionedWriter, TableMarker};

use crate::schema::RecordSchema;
use crate::storage::StorageManager;
use activity::{filter_play_actions, normalize_activity};
use arrow::record_batch::RecordBatch;
use common::config::{InputConfig, Settings};
use common::Result;
use datafusion::execution::context::SessionContext;
use datafusion::prelude::SessionConfig;
use songplays::build_songplays_table;
use songs::{build_artists_table, build_songs_table};
use std::time::{Duration, Instant};
use self::time::build_time_table;
use tracing::info;
use users::build_users_table;

/// Outcome of a completed run: one marker per written table, in write order.
#[derive(Debug, Clone)]
pub struct EtlSummary {
    pub tables: Vec<TableMarker>,
    pub elapsed: Duration,
}

impl EtlSummary {
    pub fn rows(&self, table: OutputTable) -> Option<usize> {
        self.tables
            .iter()
            .find(|marker| marker.table == table.name())
            .map(|marker| marker.row_count)
    }
}

/// The five output tables of one run, built fully before anything is written.
struct StarSchema {
    songs: RecordBatch,
    artists: RecordBatch,
    users: RecordBatch,
    time: RecordBatch,
    songplays: RecordBatch,
}

impl StarSchema {
    fn batch(&self, table: OutputTable) -> &RecordBatch {
        match table {
            OutputTable::Songs => &self.songs,
            OutputTable::Artists => &self.artists,
            OutputTable::Users => &self.users,
            OutputTable::Time => &self.time,
            OutputTable::Songplays => &self.songplays,
        }
    }
}

/// Reads song and log records from the input location and rewrites the star schema
/// under the output location.
pub struct EtlProcessor {
    ctx: SessionContext,
    input: InputConfig,
    reader: RecordReader,
    writer: PartitionedWriter,
}

impl EtlProcessor {
    pub fn new(settings: &Settings, storage: &StorageManager) -> Result<Self> {
        let config = SessionConfig::new()
            .with_target_partitions(settings.engine.target_partitions)
            .with_batch_size(settings.engine.batch_size);
        let ctx = SessionContext::new_with_config(config);

        let reader = RecordReader::new(
            storage.storage_for(&settings.input.url)?,
            settings.engine.batch_size,
        );
        let writer = PartitionedWriter::new(storage.output_storage_for(&settings.output.url)?);

        Ok(Self {
            ctx,
            input: settings.input.clone(),
            reader,
            writer,
        })
    }

    pub async fn run(&self) -> Result<EtlSummary> {
        let started = Instant::now();
        let schema = self.build().await?;

        let mut tables = Vec::with_capacity(OutputTable::all().len());
        for table in OutputTable::all() {
            tables.push(self.writer.write_table(table, schema.batch(table)).await?);
        }

        let summary = EtlSummary {
            tables,
            elapsed: started.elapsed(),
        };
        info!(
            output = self.writer.location(),
            songplays = summary.rows(OutputTable::Songplays).unwrap_or_default(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "ETL run complete"
        );
        Ok(summary)
    }

    async fn build(&self) -> Result<StarSchema> {
        let records = self
            .reader
            .load(&self.ctx, &self.input.song_pattern, RecordSchema::Song)
            .await?;
        let songs = build_songs_table(&records).await?;
        let artists = build_artists_table(&records).await?;

        let activity = self
            .reader
            .load(&self.ctx, &self.input.log_pattern, RecordSchema::Activity)
            .await?;
        let plays = filter_play_actions(normalize_activity(activity)?)?;

        let time = build_time_table(&plays).await?;
        let users = build_users_table(&plays).await?;
        let songplays = build_songplays_table(&self.ctx, &plays, &songs, &artists).await?;

        Ok(StarSchema {
            songs,
            artists,
            users,
            time,
            songplays,
        })
    }
}
