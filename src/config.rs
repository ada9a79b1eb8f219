//! TOML configuration.
//!
//! Every section carries serde defaults, so an empty file (or no file at all)
//! yields a working local setup: Ollama for embeddings and generation, data
//! directories relative to the working directory.
//!
//! Named profiles (`[profiles.<name>]`) override the knobs that differ between
//! pipeline variants (chunk size, overlap, `k`, model names) without copying
//! the rest of the file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::QaError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

/// Logical directory layout. All directories are created on startup.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PathsConfig {
    /// Inbox of PDFs consumed by `docqa extract`.
    pub pdf_dir: PathBuf,
    /// Extracted, normalized text files consumed by the loader.
    pub text_dir: PathBuf,
    /// SQLite database holding the vector index.
    pub index_path: PathBuf,
    pub logs_dir: PathBuf,
    /// Feedback and other durable application data.
    pub data_dir: PathBuf,
    pub exports_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            pdf_dir: PathBuf::from("pdfs"),
            text_dir: PathBuf::from("extracted_texts"),
            index_path: PathBuf::from("data/index/docqa.sqlite"),
            logs_dir: PathBuf::from("logs"),
            data_dir: PathBuf::from("data"),
            exports_dir: PathBuf::from("exports"),
        }
    }
}

impl PathsConfig {
    pub fn feedback_path(&self) -> PathBuf {
        self.data_dir.join("feedback.json")
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoaderConfig {
    /// File-name globs recognized as text documents (matched non-recursively).
    pub include_globs: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            include_globs: vec!["*.txt".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks.
    pub chunk_overlap: usize,
    /// Split separators, coarsest first. `""` is a hard character cut.
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
            separators: default_separators(),
        }
    }
}

pub fn default_separators() -> Vec<String> {
    vec![
        "\n\n".to_string(),
        "\n".to_string(),
        " ".to_string(),
        String::new(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per question.
    pub k: usize,
    /// Characters of chunk text kept in each source attribution.
    pub excerpt_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 4,
            excerpt_chars: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `ollama`, `openai`, `hashed`, `local`, or `disabled`.
    pub provider: String,
    pub model: Option<String>,
    pub dims: Option<usize>,
    /// Base URL override (Ollama server or OpenAI-compatible endpoint).
    pub url: Option<String>,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: Some("nomic-embed-text".to_string()),
            dims: None,
            url: None,
            batch_size: 32,
            max_retries: 2,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    /// `ollama`, `openai`, or `disabled`.
    pub provider: String,
    pub model: Option<String>,
    pub url: Option<String>,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: Some("mistral".to_string()),
            url: None,
            temperature: 0.3,
            top_k: 40,
            top_p: 0.9,
            repeat_penalty: 1.1,
            max_tokens: None,
            timeout_secs: 300,
        }
    }
}

/// Optional memoization of answers keyed by question and history.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: 128,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Most sessions kept in memory; the least recently used one is evicted first.
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8501".to_string(),
            max_sessions: 1000,
        }
    }
}

/// Overrides applied by `--profile <name>`. Unset fields keep the base value.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Profile {
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub k: Option<usize>,
    pub embedding_model: Option<String>,
    pub generation_model: Option<String>,
}

impl Config {
    /// Returns a copy of this config with the named profile applied.
    pub fn with_profile(&self, name: &str) -> Result<Config> {
        let profile = self.profiles.get(name).ok_or_else(|| {
            let mut known: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
            known.sort_unstable();
            anyhow::anyhow!(
                "Unknown profile: '{}'. Known profiles: [{}]",
                name,
                known.join(", ")
            )
        })?;

        let mut cfg = self.clone();
        if let Some(size) = profile.chunk_size {
            cfg.chunking.chunk_size = size;
        }
        if let Some(overlap) = profile.chunk_overlap {
            cfg.chunking.chunk_overlap = overlap;
        }
        if let Some(k) = profile.k {
            cfg.retrieval.k = k;
        }
        if let Some(ref model) = profile.embedding_model {
            cfg.embedding.model = Some(model.clone());
        }
        if let Some(ref model) = profile.generation_model {
            cfg.generation.model = Some(model.clone());
        }

        cfg.validate()
            .with_context(|| format!("profile '{}' produced an invalid config", name))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if self.chunking.separators.is_empty() {
            bail!("chunking.separators must not be empty");
        }

        if self.retrieval.k < 1 {
            bail!("retrieval.k must be >= 1");
        }

        if self.cache.enabled && self.cache.capacity == 0 {
            bail!("cache.capacity must be >= 1 when the cache is enabled");
        }

        if self.server.max_sessions == 0 {
            bail!("server.max_sessions must be >= 1");
        }

        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }

        match self.embedding.provider.as_str() {
            "ollama" | "openai" => {
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            "hashed" | "local" | "disabled" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be ollama, openai, hashed, local, or disabled.",
                other
            ),
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0 when set");
        }

        match self.generation.provider.as_str() {
            "ollama" | "openai" => {
                if self.generation.model.is_none() {
                    bail!(
                        "generation.model must be specified when provider is '{}'",
                        self.generation.provider
                    );
                }
            }
            "disabled" => {}
            other => bail!(
                "Unknown generation provider: '{}'. Must be ollama, openai, or disabled.",
                other
            ),
        }

        Ok(())
    }

    /// Creates every configured directory that does not exist yet.
    pub fn ensure_directories(&self) -> crate::error::Result<()> {
        let mut dirs: Vec<&Path> = vec![
            &self.paths.pdf_dir,
            &self.paths.text_dir,
            &self.paths.logs_dir,
            &self.paths.data_dir,
            &self.paths.exports_dir,
        ];
        if let Some(parent) = self.paths.index_path.parent() {
            if !parent.as_os_str().is_empty() {
                dirs.push(parent);
            }
        }

        for dir in dirs {
            std::fs::create_dir_all(dir).map_err(|e| QaError::io("create directory", dir, e))?;
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.chunking.chunk_size, 500);
        assert_eq!(cfg.chunking.chunk_overlap, 100);
        assert_eq!(cfg.retrieval.k, 4);
        assert_eq!(cfg.embedding.provider, "ollama");
        assert_eq!(cfg.generation.model.as_deref(), Some("mistral"));
        assert_eq!(cfg.chunking.separators, default_separators());
        assert_eq!(
            cfg.paths.feedback_path(),
            PathBuf::from("data").join("feedback.json")
        );
    }

    #[test]
    fn test_example_config_is_valid() {
        let cfg: Config = toml::from_str(include_str!("../config/docqa.example.toml")).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:8501");
        assert!(cfg.with_profile("precise").is_ok());
        assert!(cfg.with_profile("broad").is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let cfg: Config = toml::from_str(
            r#"
[chunking]
chunk_size = 100
chunk_overlap = 100
"#,
        )
        .unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let cfg: Config = toml::from_str(
            r#"
[embedding]
provider = "carrier-pigeon"
"#,
        )
        .unwrap();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("carrier-pigeon"));
    }

    #[test]
    fn test_profile_overrides() {
        let cfg: Config = toml::from_str(
            r#"
[retrieval]
k = 4

[profiles.precise]
chunk_size = 300
chunk_overlap = 50
k = 6
generation_model = "llama3"
"#,
        )
        .unwrap();

        let precise = cfg.with_profile("precise").unwrap();
        assert_eq!(precise.chunking.chunk_size, 300);
        assert_eq!(precise.chunking.chunk_overlap, 50);
        assert_eq!(precise.retrieval.k, 6);
        assert_eq!(precise.generation.model.as_deref(), Some("llama3"));
        // Base config untouched
        assert_eq!(cfg.retrieval.k, 4);

        assert!(cfg.with_profile("missing").is_err());
    }

    #[test]
    fn test_invalid_profile_rejected() {
        let cfg: Config = toml::from_str(
            r#"
[profiles.broken]
chunk_size = 50
"#,
        )
        .unwrap();
        // default overlap (100) >= 50
        assert!(cfg.with_profile("broken").is_err());
    }

    #[test]
    fn test_ensure_directories() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path();
        let cfg: Config = toml::from_str(&format!(
            r#"
[paths]
pdf_dir = "{root}/pdfs"
text_dir = "{root}/texts"
index_path = "{root}/data/index/qa.sqlite"
logs_dir = "{root}/logs"
data_dir = "{root}/data"
exports_dir = "{root}/exports"
"#,
            root = root.display()
        ))
        .unwrap();

        cfg.ensure_directories().unwrap();
        for dir in ["pdfs", "texts", "data/index", "logs", "data", "exports"] {
            assert!(root.join(dir).is_dir(), "{} missing", dir);
        }
        // Idempotent
        cfg.ensure_directories().unwrap();
    }
}
