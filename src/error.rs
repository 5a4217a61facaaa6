use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Load error: {0}")]
    Load(String),

    #[error("Worksheet '{sheet}' not found in {file} (available: {available})")]
    MissingSheet {
        file: String,
        sheet: String,
        available: String,
    },

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

impl From<calamine::Error> for AgentError {
    fn from(e: calamine::Error) -> Self {
        AgentError::Spreadsheet(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
