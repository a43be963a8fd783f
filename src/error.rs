use thiserror::Error;

/// Everything that can go wrong while importing a source.
#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("could not connect to database: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("could not fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed spreadsheet: {0}")]
    Tsv(#[from] csv::Error),

    #[error("could not read workbook: {0}")]
    Workbook(String),

    #[error("invalid URL {0:?}")]
    InvalidUrl(String),

    #[error("invalid SQL identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    InvalidInput(String),
}

impl From<calamine::XlsxError> for Error {
    fn from(err: calamine::XlsxError) -> Self {
        Self::Workbook(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
