use thiserror::Error;

/// Startup failures. These are the only errors allowed to reach the
/// process boundary; everything below is absorbed per request.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing api key for provider {0}: set {1}")]
    MissingApiKey(&'static str, &'static str),

    #[error("unsupported llm provider: {0}")]
    UnsupportedProvider(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ocr failed: {0}")]
    OcrFailed(String),

    #[error("no pdf files found in {0}")]
    EmptyCorpus(String),

    #[error("indexing failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("embedding dimension {got} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("destructive operation `{0}` refused: pass confirmed=true to proceed")]
    ConfirmationRequired(&'static str),

    #[error("store request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned {status}: {details}")]
    Provider {
        provider: &'static str,
        status: u16,
        details: String,
    },

    #[error("llm response contained no text")]
    EmptyResponse,
}

/// Per-question failure inside `ask`. Never escapes the orchestrator:
/// it is converted into the degraded `ChatAnswer` shape.
#[derive(Debug, Error)]
pub enum AskError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] StoreError),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("answer deadline of {0:?} exceeded")]
    Timeout(std::time::Duration),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
