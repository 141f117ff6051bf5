use crate::chunking::{split_documents, ChunkingConfig};
use crate::error::IngestError;
use crate::extractor::{load_manual, OcrClient};
use crate::metadata::extract_from_filename;
use crate::models::{CorpusStats, ExtractionMethod, ManualChunk};
use crate::store::VectorStoreManager;
use crate::traits::VectorIndex;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Recursively lists the PDF manuals under `folder`, sorted for
/// reproducible ingestion order.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder).into_iter().filter_map(|item| item.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

#[derive(Debug)]
pub struct SkippedManual {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a corpus pass. One unreadable file never aborts the
/// batch; it lands in `skipped` instead.
#[derive(Debug, Default)]
pub struct CorpusLoad {
    pub chunks: Vec<ManualChunk>,
    pub files_processed: usize,
    pub ocr_files: usize,
    pub skipped: Vec<SkippedManual>,
}

#[derive(Debug)]
pub struct IngestionReport {
    pub chunks_indexed: usize,
    pub files_processed: usize,
    pub ocr_files: usize,
    pub skipped: Vec<SkippedManual>,
}

/// Loads and chunks every manual under `corpus`, best effort.
pub async fn load_corpus_chunks(
    corpus: &Path,
    use_ocr: bool,
    ocr: Option<&OcrClient>,
    config: &ChunkingConfig,
) -> Result<CorpusLoad, IngestError> {
    config.validate()?;

    let files = discover_pdf_files(corpus);
    if files.is_empty() {
        return Err(IngestError::EmptyCorpus(corpus.display().to_string()));
    }

    info!(manuals = files.len(), "processing manual corpus");

    let mut load = CorpusLoad::default();
    for path in files {
        match load_manual(&path, use_ocr, ocr).await {
            Ok(manual) => {
                if manual.method == ExtractionMethod::Ocr {
                    load.ocr_files += 1;
                }
                let chunks = split_documents(&manual.pages, config);
                info!(
                    file = %path.display(),
                    pages = manual.pages.len(),
                    chunks = chunks.len(),
                    method = ?manual.method,
                    "manual loaded"
                );
                load.chunks.extend(chunks);
                load.files_processed += 1;
            }
            Err(error) => {
                warn!(file = %path.display(), %error, "skipping unreadable manual");
                load.skipped.push(SkippedManual {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(load)
}

/// Full ingestion pipeline: discover, load (with optional OCR
/// fallback), chunk and index the whole corpus.
pub async fn process_and_index<V: VectorIndex + Send + Sync>(
    manager: &VectorStoreManager<V>,
    corpus: &Path,
    use_ocr: bool,
    ocr: Option<&OcrClient>,
    config: &ChunkingConfig,
) -> Result<IngestionReport, IngestError> {
    let load = load_corpus_chunks(corpus, use_ocr, ocr, config).await?;

    let chunks_indexed = manager.index_chunks(&load.chunks).await?;

    Ok(IngestionReport {
        chunks_indexed,
        files_processed: load.files_processed,
        ocr_files: load.ocr_files,
        skipped: load.skipped,
    })
}

/// Per-brand inventory of the manuals on disk, derived purely from
/// filenames.
pub fn corpus_stats(folder: &Path) -> CorpusStats {
    let mut stats = CorpusStats::default();

    for path in discover_pdf_files(folder) {
        let Some(filename) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let metadata = extract_from_filename(filename);
        let brand = metadata.brand.unwrap_or_else(|| "UNKNOWN".to_string());
        *stats.by_brand.entry(brand).or_insert(0) += 1;
        stats.total_manuals += 1;
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkingConfig;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn discovery_is_recursive_and_case_insensitive() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("fiat");
        fs::create_dir(&nested).unwrap();

        fs::write(dir.path().join("FIAT_500_2020_Officina.pdf"), b"%PDF-1.4\n%x").unwrap();
        fs::write(nested.join("FIAT_Panda_2018_Officina.PDF"), b"%PDF-1.4\n%x").unwrap();
        fs::write(dir.path().join("note.txt"), b"non un pdf").unwrap();

        let files = discover_pdf_files(dir.path());
        assert_eq!(files.len(), 2);
    }

    #[tokio::test]
    async fn empty_corpus_is_reported_as_such() {
        let dir = tempdir().unwrap();
        let result =
            load_corpus_chunks(dir.path(), false, None, &ChunkingConfig::default()).await;
        assert!(matches!(result, Err(IngestError::EmptyCorpus(_))));
    }

    #[tokio::test]
    async fn unreadable_manuals_are_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("FIAT_500_2020_Officina.pdf"), b"%PDF-1.4\n%broken").unwrap();

        let load = load_corpus_chunks(dir.path(), false, None, &ChunkingConfig::default())
            .await
            .unwrap();

        assert_eq!(load.files_processed, 0);
        assert_eq!(load.chunks.len(), 0);
        assert_eq!(load.skipped.len(), 1);
        assert!(load.skipped[0]
            .path
            .to_string_lossy()
            .ends_with("FIAT_500_2020_Officina.pdf"));
    }

    #[tokio::test]
    async fn invalid_chunking_config_is_rejected_before_processing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("FIAT_500_2020_Officina.pdf"), b"%PDF-1.4\n%x").unwrap();

        let config = ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..ChunkingConfig::default()
        };
        let result = load_corpus_chunks(dir.path(), false, None, &config).await;
        assert!(matches!(result, Err(IngestError::Config(_))));
    }

    #[test]
    fn corpus_stats_group_by_brand() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("FIAT_500_2020_Officina.pdf"), b"%PDF").unwrap();
        fs::write(dir.path().join("FIAT_Panda_2018_Officina.pdf"), b"%PDF").unwrap();
        fs::write(dir.path().join("OPEL_Corsa_2019_Officina.pdf"), b"%PDF").unwrap();
        fs::write(dir.path().join("manuale.pdf"), b"%PDF").unwrap();

        let stats = corpus_stats(dir.path());
        assert_eq!(stats.total_manuals, 4);
        assert_eq!(stats.by_brand.get("FIAT"), Some(&2));
        assert_eq!(stats.by_brand.get("OPEL"), Some(&1));
        assert_eq!(stats.by_brand.get("UNKNOWN"), Some(&1));
    }
}
