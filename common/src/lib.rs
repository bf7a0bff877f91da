use arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use parquet::errors::ParquetError;
use thiserror::Error;
use url::ParseError;

pub mod config;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("DataFusion error: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Schema validation error: {0}")]
    SchemaValidation(String),

    #[error("Invalid Uri: {0}")]
    InvalidUri(String),

    #[error("Failed to write table '{table}': {source}")]
    TableWrite {
        table: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    Other(String),
}

impl From<object_store::path::Error> for Error {
    fn from(err: object_store::path::Error) -> Self {
        Error::InvalidInput(format!("Invalid object path: {}", err))
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::InvalidUri(format!("URL parse error: {}", err))
    }
}

impl Error {
    /// Wraps an error with the name of the output table it interrupted.
    pub fn table_write(table: &str, source: Error) -> Self {
        Error::TableWrite {
            table: table.to_string(),
            source: Box::new(source),
        }
    }
}
