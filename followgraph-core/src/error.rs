use followgraph_fetch::FetchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Empty response body")]
    Empty,

    #[error("Malformed follower page: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Constraint violated: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, msg)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(msg.clone().unwrap_or_else(|| err.to_string()))
            }
            _ => StoreError::Sqlite(e),
        }
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Root user '{0}' must be seeded before its followers can be crawled")]
    RootUserNotSeeded(String),

    #[error("Fetching page at offset {offset} failed: {source}")]
    Fetch {
        offset: u64,
        #[source]
        source: FetchError,
    },

    #[error("Parsing page at offset {offset} failed: {source}")]
    Parse {
        offset: u64,
        #[source]
        source: ParseError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
