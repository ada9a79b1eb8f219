//! Question-answering orchestration.
//!
//! [`QaEngine::answer`] runs one conversational turn as explicit steps:
//!
//! 1. reject an empty question (no side effects)
//! 2. build the index from the text directory if it was never built
//! 3. retrieve the top-`k` chunks
//! 4. render the context block and the prompt, history included
//! 5. generate (failures propagate, no retry, session untouched)
//! 6. append the turn to the session
//! 7. return the answer with deduplicated source attributions
//!
//! An optional, bounded response cache sits in front of steps 3-5. It is
//! keyed by the normalized question plus the serialized history, and it is
//! emptied on reindex and when a session's history is cleared.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use crate::chunk;
use crate::config::{ChunkingConfig, Config};
use crate::embedding;
use crate::error::{QaError, Result};
use crate::generation::{self, GenerationProvider};
use crate::index::{IndexHandle, VectorIndex};
use crate::loader;
use crate::models::{ScoredChunk, SourceAttribution};
use crate::normalize::normalize;
use crate::prompt;
use crate::session::{Session, Turn};

/// The result of one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceAttribution>,
}

#[derive(Debug, Clone)]
struct CachedAnswer {
    answer: String,
    sources: Vec<SourceAttribution>,
}

/// FIFO-bounded map from cache key to answer.
#[derive(Debug)]
struct ResponseCache {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashMap<String, CachedAnswer>,
}

impl ResponseCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    fn get(&self, key: &str) -> Option<&CachedAnswer> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: String, value: CachedAnswer) {
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn cache_key(question: &str, history: &[Turn]) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(normalize(question).as_bytes());
    hasher.update([0u8]);
    hasher.update(serde_json::to_vec(history)?);
    Ok(hex::encode(hasher.finalize()))
}

pub struct QaEngine {
    index: VectorIndex,
    generator: Arc<dyn GenerationProvider>,
    text_dir: PathBuf,
    include_globs: Vec<String>,
    chunking: ChunkingConfig,
    k: usize,
    excerpt_chars: usize,
    cache: Option<ResponseCache>,
}

impl QaEngine {
    pub fn new(index: VectorIndex, generator: Arc<dyn GenerationProvider>, config: &Config) -> Self {
        Self {
            index,
            generator,
            text_dir: config.paths.text_dir.clone(),
            include_globs: config.loader.include_globs.clone(),
            chunking: config.chunking.clone(),
            k: config.retrieval.k,
            excerpt_chars: config.retrieval.excerpt_chars,
            cache: config
                .cache
                .enabled
                .then(|| ResponseCache::new(config.cache.capacity)),
        }
    }

    /// Creates providers from config and opens the index.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = embedding::create_provider(&config.embedding)?;
        let generator = generation::create_generator(&config.generation)?;
        let index = VectorIndex::open(
            &config.paths.index_path,
            embedder,
            config.embedding.batch_size,
        )
        .await?;
        Ok(Self::new(index, generator, config))
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn generator_model(&self) -> &str {
        self.generator.model_name()
    }

    pub fn cached_answers(&self) -> usize {
        self.cache.as_ref().map(ResponseCache::len).unwrap_or(0)
    }

    /// Answers `question` in the context of `session` and records the turn.
    pub async fn answer(&mut self, session: &mut Session, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QaError::invalid("question must not be empty"));
        }

        self.ensure_index().await?;

        let history = session.as_pairs();
        let key = match self.cache {
            Some(_) => Some(cache_key(question, &history)?),
            None => None,
        };

        if let (Some(cache), Some(key)) = (self.cache.as_ref(), key.as_deref()) {
            if let Some(hit) = cache.get(key) {
                tracing::debug!(turn = session.turn_count(), "answer served from cache");
                let hit = hit.clone();
                session.append(question, hit.answer.clone());
                return Ok(Answer {
                    question: question.to_string(),
                    answer: hit.answer,
                    sources: hit.sources,
                });
            }
        }

        let results = self.index.query(question, self.k).await?;
        let context = prompt::build_context(&results);
        let full_prompt = prompt::build_prompt(&context, &history, question);

        let text = self.generator.generate(&full_prompt).await.map_err(|e| {
            tracing::error!(model = %self.generator.model_name(), error = %e, "generation failed");
            QaError::Generation(format!("{:#}", e))
        })?;

        let sources = dedup_sources(&results, self.excerpt_chars);
        session.append(question, text.clone());

        if let (Some(cache), Some(key)) = (self.cache.as_mut(), key) {
            cache.insert(
                key,
                CachedAnswer {
                    answer: text.clone(),
                    sources: sources.clone(),
                },
            );
        }

        tracing::info!(
            retrieved = results.len(),
            sources = sources.len(),
            turn = session.turn_count(),
            "answered question"
        );

        Ok(Answer {
            question: question.to_string(),
            answer: text,
            sources,
        })
    }

    /// Returns the current index, building it from the text directory on first use.
    pub async fn ensure_index(&self) -> Result<IndexHandle> {
        if let Some(handle) = self.index.handle().await? {
            return Ok(handle);
        }
        tracing::info!(dir = %self.text_dir.display(), "no index yet, building");
        let chunks = self.load_chunks()?;
        self.index.build(&chunks).await
    }

    /// Reloads the text directory and replaces the index. Empties the cache.
    pub async fn reindex(&mut self) -> Result<IndexHandle> {
        let chunks = self.load_chunks()?;
        let handle = self.index.reindex(&chunks).await?;
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
        Ok(handle)
    }

    /// Clears the session's history and the response cache.
    pub fn clear_history(&mut self, session: &mut Session) {
        session.clear();
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }

    fn load_chunks(&self) -> Result<Vec<crate::models::Chunk>> {
        let documents = loader::load(&self.text_dir, &self.include_globs)?;
        let chunks = chunk::split_all(&documents, &self.chunking)?;
        tracing::info!(documents = documents.len(), chunks = chunks.len(), "prepared chunks");
        Ok(chunks)
    }
}

/// Attributions in rank order, dropping exact duplicates.
fn dedup_sources(results: &[ScoredChunk], excerpt_chars: usize) -> Vec<SourceAttribution> {
    let mut sources: Vec<SourceAttribution> = Vec::with_capacity(results.len());
    for r in results {
        let attribution = SourceAttribution::from_chunk(&r.chunk, excerpt_chars);
        if !sources.contains(&attribution) {
            sources.push(attribution);
        }
    }
    sources
}
