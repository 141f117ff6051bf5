use crate::error::ConfigError;
use crate::models::{ManualChunk, PageDocument};
use tracing::debug;

pub const DEFAULT_CHUNK_SIZE: usize = 1500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 300;

/// Separator ladder tried in order: paragraph break, line break,
/// sentence punctuation, clause punctuation, space, and the empty
/// string as the character-level last resort that guarantees
/// termination.
pub fn default_separators() -> Vec<String> {
    ["\n\n", "\n", ". ", "! ", "? ", "; ", ": ", " ", ""]
        .iter()
        .map(|separator| separator.to_string())
        .collect()
}

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: default_separators(),
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidChunkConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Splits `text` into pieces no longer than `max_chars`, trying each
/// separator in order and recursing with the remaining separators on
/// pieces that are still too long. The empty-string separator expands
/// to single characters so every position becomes a legal cut point.
/// Concatenating the output reproduces `text` exactly.
fn split_pieces(text: &str, separators: &[String], max_chars: usize, out: &mut Vec<String>) {
    if text.chars().count() <= max_chars {
        out.push(text.to_string());
        return;
    }

    let Some((separator, rest)) = separators.split_first() else {
        // No separator left: keep the oversized piece verbatim.
        out.push(text.to_string());
        return;
    };

    if separator.is_empty() {
        out.extend(text.chars().map(|character| character.to_string()));
        return;
    }

    if !text.contains(separator.as_str()) {
        split_pieces(text, rest, max_chars, out);
        return;
    }

    for part in text.split_inclusive(separator.as_str()) {
        if part.chars().count() <= max_chars {
            out.push(part.to_string());
        } else {
            split_pieces(part, rest, max_chars, out);
        }
    }
}

fn furthest_cut(cuts: &[usize], after: usize, limit: usize) -> Option<usize> {
    cuts.iter()
        .copied()
        .filter(|&cut| cut > after && cut <= limit)
        .last()
}

/// Reassembles pieces into windows of at most `chunk_size` characters.
///
/// Windows end on piece boundaries, merged greedily up to the size
/// limit; the next window starts exactly `chunk_overlap` characters
/// before the previous window's end, measured in characters of the
/// original text rather than piece boundaries. Adjacent windows from
/// the same input therefore share their overlap region verbatim.
/// Every window extends past the previous window's end: when the
/// following piece is too long to fit together with the overlap
/// region, the overlap is dropped for that window before the size
/// bound is. Whitespace-only input yields no windows.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    split_pieces(text, &config.separators, config.chunk_size, &mut pieces);

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();

    let mut cuts = Vec::with_capacity(pieces.len());
    let mut offset = 0usize;
    for piece in &pieces {
        offset += piece.chars().count();
        cuts.push(offset);
    }

    let mut windows = Vec::new();
    let mut start = 0usize;
    let mut last_end = 0usize;

    loop {
        let mut end = furthest_cut(&cuts, last_end, start + config.chunk_size);

        if end.is_none() && start < last_end {
            // Overlap plus the next piece would exceed the size limit;
            // restart at the previous end with no overlap instead.
            start = last_end;
            end = furthest_cut(&cuts, last_end, start + config.chunk_size);
        }

        let end = end
            // A lone unsplittable piece is emitted verbatim.
            .or_else(|| cuts.iter().copied().find(|&cut| cut > last_end))
            .unwrap_or(total);

        let window: String = chars[start..end].iter().collect();
        if !window.trim().is_empty() {
            windows.push(window);
        }

        if end >= total {
            break;
        }

        last_end = end;
        start = end.saturating_sub(config.chunk_overlap);
    }

    windows
}

/// Chunks every page document, each chunk inheriting its source page's
/// full metadata unchanged.
pub fn split_documents(documents: &[PageDocument], config: &ChunkingConfig) -> Vec<ManualChunk> {
    let mut chunks = Vec::new();

    for document in documents {
        for window in split_text(&document.text, config) {
            chunks.push(ManualChunk {
                content: window,
                metadata: document.metadata.clone(),
            });
        }
    }

    debug!(
        document_count = documents.len(),
        chunk_count = chunks.len(),
        "split documents into chunks"
    );
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::extract_from_filename;

    fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            chunk_overlap,
            separators: default_separators(),
        }
    }

    #[test]
    fn no_window_exceeds_chunk_size() {
        let text = "Controllare il livello olio motore. Serrare la vite a 25 Nm. \
                    Sostituire il filtro ogni 15000 km. Verificare la pressione pneumatici."
            .repeat(4);
        for window in split_text(&text, &config(80, 20)) {
            assert!(window.chars().count() <= 80, "window too long: {window:?}");
        }
    }

    #[test]
    fn overlap_region_round_trips() {
        let text = "Procedura di smontaggio paraurti anteriore. ".repeat(20);
        let cfg = config(100, 30);
        let windows = split_text(&text, &cfg);
        assert!(windows.len() > 1);

        for pair in windows.windows(2) {
            let previous: Vec<char> = pair[0].chars().collect();
            let tail: String = previous[previous.len().saturating_sub(cfg.chunk_overlap)..]
                .iter()
                .collect();
            assert!(
                pair[1].starts_with(&tail),
                "next window does not start with previous tail"
            );
        }
    }

    #[test]
    fn text_without_any_separator_is_cut_at_character_limit() {
        let text = "a".repeat(100);
        let windows = split_text(&text, &config(30, 5));
        assert_eq!(windows[0].chars().count(), 30);
        // Step is size minus overlap, so the second window starts 5
        // characters before the first window's end.
        assert_eq!(windows[1].chars().count(), 30);
        assert!(windows.iter().all(|window| window.chars().count() <= 30));
    }

    #[test]
    fn unsplittable_token_without_last_resort_separator_is_kept_verbatim() {
        let cfg = ChunkingConfig {
            chunk_size: 10,
            chunk_overlap: 2,
            separators: vec![" ".to_string()],
        };
        let windows = split_text("abcdefghijklmnopqrstuvwxyz", &cfg);
        assert_eq!(windows, vec!["abcdefghijklmnopqrstuvwxyz".to_string()]);
    }

    #[test]
    fn whitespace_only_document_yields_zero_chunks() {
        assert!(split_text("", &config(100, 10)).is_empty());
        assert!(split_text("   \n\n \t ", &config(100, 10)).is_empty());
    }

    #[test]
    fn long_following_paragraph_never_duplicates_previous_tail() {
        // Two paragraphs that each fit a window on their own but not
        // together with the overlap region. Every window must carry
        // new text: no window may be a repeat of the previous tail.
        let text = format!("{}\n\n{}", "a".repeat(1300), "b".repeat(1300));
        let windows = split_text(&text, &ChunkingConfig::default());

        assert_eq!(windows.len(), 2);
        assert!(windows[1].starts_with('b'));
        for window in &windows {
            assert!(window.chars().count() <= DEFAULT_CHUNK_SIZE);
        }
        for pair in windows.windows(2) {
            assert!(
                !pair[0].ends_with(pair[1].as_str()),
                "window repeats the previous window's tail"
            );
        }
    }

    #[test]
    fn paragraph_breaks_are_preferred_cut_points() {
        let text = format!("{}\n\n{}", "Primo paragrafo breve.", "Secondo paragrafo breve.");
        let windows = split_text(&text, &config(30, 5));
        assert_eq!(windows.len(), 2);
        // The first window ends exactly on the paragraph break even
        // though more characters would have fit under the size limit.
        assert!(windows[0].ends_with("breve.\n\n"));
        assert!(windows[1].ends_with("Secondo paragrafo breve."));
    }

    #[test]
    fn chunks_inherit_page_metadata_unchanged() {
        let mut metadata = extract_from_filename("FIAT_500_2020_Manuale_Officina.pdf");
        metadata.page = 7;
        metadata.source_path = "/manuali/FIAT_500_2020_Manuale_Officina.pdf".to_string();

        let documents = vec![PageDocument {
            text: "Coppia di serraggio: 25 Nm. ".repeat(10),
            metadata: metadata.clone(),
        }];

        let chunks = split_documents(&documents, &config(60, 10));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert_eq!(chunk.metadata, metadata);
        }
    }

    #[test]
    fn single_short_page_yields_single_chunk() {
        let metadata = extract_from_filename("FIAT_500_2020_Manuale_Officina.pdf");
        let documents = vec![PageDocument {
            text: "Coppia di serraggio: 25 Nm".to_string(),
            metadata,
        }];
        let chunks = split_documents(&documents, &ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Coppia di serraggio: 25 Nm");
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        assert!(config(100, 100).validate().is_err());
        assert!(config(0, 0).validate().is_err());
        assert!(config(100, 20).validate().is_ok());
    }
}
