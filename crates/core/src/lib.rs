pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod llm;
pub mod memory;
pub mod metadata;
pub mod models;
pub mod qa;
pub mod store;
pub mod stores;
pub mod traits;

pub use chunking::{
    default_separators, split_documents, split_text, ChunkingConfig, DEFAULT_CHUNK_OVERLAP,
    DEFAULT_CHUNK_SIZE,
};
pub use embeddings::{Embedder, HashEmbedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{AskError, ConfigError, GenerationError, IngestError, StoreError};
pub use extractor::{
    load_manual, needs_ocr, LoadedManual, LopdfExtractor, OcrClient, PageText, PdfExtractor,
    LOW_TEXT_THRESHOLD,
};
pub use ingest::{
    corpus_stats, discover_pdf_files, load_corpus_chunks, process_and_index, CorpusLoad,
    IngestionReport, SkippedManual,
};
pub use llm::{build_language_model, AnthropicChat, LanguageModel, LlmConfig, LlmProvider, OpenAiChat};
pub use memory::ConversationMemory;
pub use metadata::extract_from_filename;
pub use models::{
    ChatAnswer, ConversationTurn, CorpusStats, ExtractionMethod, IndexStats, ManualChunk,
    ManualMetadata, PageDocument, QueryFilter, RetrievedSource, Role, DEFAULT_DOC_TYPE,
    NOT_AVAILABLE,
};
pub use qa::{
    format_sources, ManualChatbot, QaOptions, FALLBACK_ANSWER, NO_CONTEXT_ANSWER, SOURCE_PREVIEW_CHARS,
    SYSTEM_PROMPT,
};
pub use store::{record_id, StoreOptions, VectorStoreManager, DEFAULT_BATCH_SIZE, DEFAULT_RETRIEVAL_K, DEFAULT_SIMILARITY_THRESHOLD};
pub use stores::QdrantStore;
pub use traits::{IndexRecord, ScoredChunk, VectorIndex};
