use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV read failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet read failed: {0}")]
    Excel(#[from] calamine::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source file not found: {}", path.display())]
    MissingSource { path: PathBuf },

    #[error("Unsupported source file: {}", path.display())]
    UnsupportedFile { path: PathBuf },

    #[error("Please specify a correct load method: [insert, upsert, overwrite], got '{0}'")]
    UnknownLoadMethod(String),

    #[error("Table '{table}' declares no primary key; upsert cannot resolve conflicts")]
    MissingPrimaryKey { table: String },

    #[error("Row {row} has a null value for primary key column '{column}' of table '{table}'")]
    NullKey {
        table: String,
        column: String,
        row: usize,
    },

    #[error("Column '{column}' is not defined on table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Duplicate primary key {key} in table '{table}'")]
    DuplicateKey { table: String, key: String },
}

impl EtlError {
    /// Configuration failures are fatal for the run and are raised before any write.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            EtlError::Config(_)
                | EtlError::MissingSource { .. }
                | EtlError::UnknownLoadMethod(_)
                | EtlError::MissingPrimaryKey { .. }
                | EtlError::Toml(_)
                | EtlError::Env(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
