use thiserror::Error;

/// The nine error kinds recognized by the pipeline's error-handling design.
///
/// Per-item variants are caught at step boundaries and never unwind past
/// them; step-fatal variants (`StoreConflict` after retries, `ConfigInvalid`)
/// propagate out and fail the step.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("transient network error fetching {url}: {source}")]
    TransientNetwork {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("oracle returned output that failed schema validation: {detail}")]
    OracleInvalidOutput { detail: String },

    #[error("oracle rate limit hit, retry after {retry_after_secs:?}s")]
    OracleRateLimit { retry_after_secs: Option<u64> },

    #[error("extraction for {url} produced insufficient text ({chars} chars)")]
    ExtractionInsufficient { url: String, chars: usize },

    #[error("extraction for {url} failed: {reason}")]
    ExtractionFailure { url: String, reason: String },

    #[error("row for {row} violated its schema: {detail}")]
    SchemaViolation { row: String, detail: String },

    #[error("store write conflict on {table}: {detail}")]
    StoreConflict { table: String, detail: String },

    #[error("run {run_id} interrupted during step {step}")]
    Interruption { run_id: String, step: String },

    #[error("configuration invalid: {detail}")]
    ConfigInvalid { detail: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
