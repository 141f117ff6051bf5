use crate::error::AskError;
use crate::llm::LanguageModel;
use crate::memory::ConversationMemory;
use crate::models::{ChatAnswer, ConversationTurn, QueryFilter, RetrievedSource, Role};
use crate::store::VectorStoreManager;
use crate::traits::{ScoredChunk, VectorIndex};
use std::time::Duration;
use tracing::{info, warn};

/// Characters of chunk content included in a source citation before
/// the ellipsis marker.
pub const SOURCE_PREVIEW_CHARS: usize = 300;

/// Answer used whenever retrieval or generation fails. The raw error
/// never reaches the user; it is kept in the response's diagnostic
/// field instead.
pub const FALLBACK_ANSWER: &str =
    "Mi dispiace, si è verificato un errore nell'elaborazione della tua domanda. Riprova.";

/// Answer used when no relevant excerpts were retrieved.
pub const NO_CONTEXT_ANSWER: &str =
    "Non ho trovato informazioni rilevanti nei manuali disponibili.";

/// Grounding rules prepended to every generation prompt.
pub const SYSTEM_PROMPT: &str = "\
Sei un assistente esperto per officine meccaniche. Rispondi a domande tecniche \
basandoti esclusivamente sugli estratti di manuale forniti.

Regole:
1. Rispondi SOLO con informazioni presenti negli estratti
2. Se l'informazione non c'è, dillo chiaramente
3. Cita sempre la fonte (marca, modello, pagina)
4. Menziona sempre le procedure di sicurezza presenti
5. Riporta i valori numerici esattamente come scritti (coppie di serraggio, capacità, ecc.)";

#[derive(Debug, Clone)]
pub struct QaOptions {
    pub retrieval_k: usize,
    /// Minimum similarity for a retrieved chunk to be used; `None`
    /// keeps everything the index returns.
    pub similarity_threshold: Option<f32>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Bounds retrieval plus generation; on expiry the caller gets the
    /// same degraded response shape as on any other failure.
    pub answer_timeout: Option<Duration>,
}

impl Default for QaOptions {
    fn default() -> Self {
        Self {
            retrieval_k: 5,
            similarity_threshold: Some(0.7),
            temperature: 0.0,
            max_tokens: 2000,
            answer_timeout: None,
        }
    }
}

/// Composes the LLM client, the vector store manager and an optional
/// conversation memory into `ask`. One instance serves one session:
/// `ask` takes `&mut self`, so concurrent callers need an instance
/// each. Filters are per-call arguments, never stored on the
/// orchestrator.
pub struct ManualChatbot<V: VectorIndex> {
    llm: Box<dyn LanguageModel>,
    store: VectorStoreManager<V>,
    memory: Option<ConversationMemory>,
    options: QaOptions,
}

impl<V: VectorIndex + Send + Sync> ManualChatbot<V> {
    /// Stateless mode: every question stands alone.
    pub fn new(llm: Box<dyn LanguageModel>, store: VectorStoreManager<V>, options: QaOptions) -> Self {
        Self {
            llm,
            store,
            memory: None,
            options,
        }
    }

    /// Stateful mode: prior turns are included as context and each
    /// exchange is appended to the session memory.
    pub fn with_memory(
        llm: Box<dyn LanguageModel>,
        store: VectorStoreManager<V>,
        options: QaOptions,
    ) -> Self {
        Self {
            llm,
            store,
            memory: Some(ConversationMemory::new()),
            options,
        }
    }

    /// Answers a question grounded in retrieved manual excerpts.
    /// Never fails: any internal error degrades to the fixed apology
    /// answer with the raw error recorded in the diagnostic field.
    pub async fn ask(
        &mut self,
        question: &str,
        filter: Option<&QueryFilter>,
        return_sources: bool,
    ) -> ChatAnswer {
        info!(question, has_filter = filter.is_some(), "question received");

        match self.answer(question, filter).await {
            Ok((answer, hits)) => {
                if let Some(memory) = &mut self.memory {
                    memory.append(ConversationTurn::user(question));
                    memory.append(ConversationTurn::assistant(answer.clone()));
                }

                let sources = if return_sources {
                    format_sources(&hits)
                } else {
                    Vec::new()
                };

                info!(chars = answer.len(), sources = sources.len(), "answer generated");
                ChatAnswer {
                    answer,
                    sources,
                    error: None,
                }
            }
            Err(error) => {
                warn!(%error, "question failed, returning degraded answer");
                ChatAnswer {
                    answer: FALLBACK_ANSWER.to_string(),
                    sources: Vec::new(),
                    error: Some(error.to_string()),
                }
            }
        }
    }

    async fn answer(
        &self,
        question: &str,
        filter: Option<&QueryFilter>,
    ) -> Result<(String, Vec<ScoredChunk>), AskError> {
        match self.options.answer_timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.answer_inner(question, filter))
                .await
                .map_err(|_| AskError::Timeout(deadline))?,
            None => self.answer_inner(question, filter).await,
        }
    }

    async fn answer_inner(
        &self,
        question: &str,
        filter: Option<&QueryFilter>,
    ) -> Result<(String, Vec<ScoredChunk>), AskError> {
        let unfiltered = QueryFilter::new();
        let filter = filter.unwrap_or(&unfiltered);
        let k = Some(self.options.retrieval_k);

        // Retrieval completes before generation begins.
        let hits = match self.options.similarity_threshold {
            Some(threshold) => {
                self.store
                    .search_with_threshold(question, k, filter, Some(threshold))
                    .await?
            }
            None => self.store.search(question, k, filter).await?,
        };

        if hits.is_empty() {
            info!("no relevant excerpts retrieved");
            return Ok((NO_CONTEXT_ANSWER.to_string(), hits));
        }

        let prompt = self.build_prompt(question, &hits);
        let answer = self
            .llm
            .generate(&prompt, self.options.temperature, self.options.max_tokens)
            .await?;

        Ok((answer, hits))
    }

    fn build_prompt(&self, question: &str, hits: &[ScoredChunk]) -> String {
        let mut prompt = String::from(SYSTEM_PROMPT);
        prompt.push_str("\n\n");

        if let Some(memory) = &self.memory {
            if !memory.is_empty() {
                prompt.push_str("Conversazione precedente:\n");
                for turn in memory.turns() {
                    let speaker = match turn.role {
                        Role::User => "Utente",
                        Role::Assistant => "Assistente",
                    };
                    prompt.push_str(&format!("{speaker}: {}\n", turn.content));
                }
                prompt.push('\n');
            }
        }

        prompt.push_str("Contesto dai manuali:\n");
        for hit in hits {
            let metadata = &hit.chunk.metadata;
            prompt.push_str(&format!(
                "[{} {} {} — pagina {}]\n{}\n\n",
                metadata.brand_display(),
                metadata.model_display(),
                metadata.year_display(),
                metadata.page,
                hit.chunk.content
            ));
        }

        prompt.push_str(&format!("Domanda: {question}\n\nRisposta:"));
        prompt
    }

    /// Wipes the session history. A no-op, not an error, when the
    /// chatbot was built without memory.
    pub fn clear_memory(&mut self) {
        if let Some(memory) = &mut self.memory {
            memory.clear();
        }
    }

    /// Ordered conversation turns; empty in stateless mode.
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.memory
            .as_ref()
            .map(|memory| memory.turns().to_vec())
            .unwrap_or_default()
    }
}

/// Formats retrieved chunks into 1-based citations with a bounded
/// excerpt preview. Metadata gaps render as the display sentinel.
pub fn format_sources(hits: &[ScoredChunk]) -> Vec<RetrievedSource> {
    hits.iter()
        .enumerate()
        .map(|(position, hit)| {
            let metadata = &hit.chunk.metadata;
            RetrievedSource {
                index: position + 1,
                brand: metadata.brand_display().to_string(),
                model: metadata.model_display().to_string(),
                year: metadata.year_display().to_string(),
                page: metadata.page,
                filename: metadata.filename.clone(),
                excerpt: excerpt(&hit.chunk.content),
            }
        })
        .collect()
}

fn excerpt(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= SOURCE_PREVIEW_CHARS {
        content.to_string()
    } else {
        let preview: String = chars[..SOURCE_PREVIEW_CHARS].iter().collect();
        format!("{preview}...")
    }
}
