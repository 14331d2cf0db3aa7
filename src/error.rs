use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("The start date: '{start}' is greater than the end date: '{end}'")]
    InvalidRange { start: String, end: String },

    #[error("API responded with error: {0}")]
    ApiFailure(#[from] reqwest::Error),

    #[error("Failed to parse URL: {0}")]
    UrlParsingFailed(#[from] url::ParseError),

    #[error("Report job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Report job {job_id} timed out after {timeout_secs}s")]
    JobTimeout { job_id: String, timeout_secs: u64 },

    #[error("Cannot convert value '{value}' in column '{column}': {reason}")]
    Transform {
        column: String,
        value: String,
        reason: String,
    },

    #[error("Warehouse operation on table '{table}' failed: {message}")]
    Load { table: String, message: String },

    #[error("{failed} of {attempted} report partitions failed")]
    BackfillIncomplete { failed: usize, attempted: usize },
}
