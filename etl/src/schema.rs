use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use lazy_static::lazy_static;
use std::sync::Arc;

/// `page` value marking an actual song playback in the activity log.
pub const PLAY_ACTION: &str = "NextSong";

// Raw source schemas
pub fn raw_song_schema() -> Schema {
    Schema::new(vec![
        Field::new("num_songs", DataType::Int64, true),
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("artist_latitude", DataType::Float64, true),
        Field::new("artist_longitude", DataType::Float64, true),
        Field::new("artist_location", DataType::Utf8, true),
        Field::new("artist_name", DataType::Utf8, true),
        Field::new("song_id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, true),
        Field::new("duration", DataType::Float64, true),
        Field::new("year", DataType::Int32, true),
    ])
}

pub fn raw_activity_schema() -> Schema {
    Schema::new(vec![
        Field::new("artist", DataType::Utf8, true),
        Field::new("auth", DataType::Utf8, true),
        Field::new("firstName", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("itemInSession", DataType::Int64, true),
        Field::new("lastName", DataType::Utf8, true),
        Field::new("length", DataType::Float64, true),
        Field::new("level", DataType::Utf8, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("method", DataType::Utf8, true),
        Field::new("page", DataType::Utf8, false),
        Field::new("registration", DataType::Float64, true),
        Field::new("sessionId", DataType::Int64, true),
        Field::new("song", DataType::Utf8, true),
        Field::new("status", DataType::Int64, true),
        Field::new("ts", DataType::Int64, false),
        Field::new("userAgent", DataType::Utf8, true),
        Field::new("userId", DataType::Utf8, true),
    ])
}

/// Raw log field name paired with the activity column it becomes.
pub const ACTIVITY_COLUMNS: &[(&str, &str)] = &[
    ("ts", "event_timestamp"),
    ("userId", "user_id"),
    ("firstName", "first_name"),
    ("lastName", "last_name"),
    ("gender", "gender"),
    ("level", "level"),
    ("song", "song_title"),
    ("artist", "artist_name"),
    ("length", "song_duration"),
    ("sessionId", "session_id"),
    ("itemInSession", "item_in_session"),
    ("userAgent", "user_agent"),
    ("location", "location"),
    ("page", "page"),
];

/// Type of every `start_time` column: milliseconds, no timezone attached.
pub fn start_time_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, None)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSchema {
    Song,
    Activity,
}

pub fn get_record_schema(kind: RecordSchema) -> SchemaRef {
    match kind {
        RecordSchema::Song => RAW_SONG_SCHEMA.clone(),
        RecordSchema::Activity => RAW_ACTIVITY_SCHEMA.clone(),
    }
}

// Lazy-loaded static schemas
lazy_static! {
    static ref RAW_SONG_SCHEMA: SchemaRef = Arc::new(raw_song_schema());
    static ref RAW_ACTIVITY_SCHEMA: SchemaRef = Arc::new(raw_activity_schema());
}
