//! Configuration management for the fomentos services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{env}.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Authentication configuration
    pub auth: AuthConfig,

    /// Canonical store (MongoDB) configuration
    pub mongo: MongoConfig,

    /// Vector index (Chroma) configuration
    pub chroma: ChromaConfig,

    /// OpenAI configuration (chat + embeddings)
    pub openai: OpenAiConfig,

    /// RAG chat knobs
    pub chat: ChatConfig,

    /// Ingestion job knobs
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Verbose (pretty, debug-level) logging
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Secret used to sign access tokens
    pub secret_key: String,

    /// Access token lifetime in minutes
    #[serde(default = "default_token_expire_minutes")]
    pub access_token_expire_minutes: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MongoConfig {
    /// Connection string
    #[serde(default = "default_mongo_uri")]
    pub uri: String,

    /// Database name
    #[serde(default = "default_mongo_database")]
    pub database: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChromaConfig {
    /// Chroma server host
    #[serde(default = "default_chroma_host")]
    pub host: String,

    /// Chroma server port
    #[serde(default = "default_chroma_port")]
    pub port: u16,

    /// Logical collection name
    #[serde(default = "default_chroma_collection")]
    pub collection: String,
}

impl ChromaConfig {
    /// Base URL of the Chroma REST API
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAiConfig {
    /// API key for chat + embedding requests
    pub api_key: String,

    /// API base URL (overridable for testing)
    #[serde(default = "default_openai_base")]
    pub api_base: String,

    /// Embedding model; fingerprints the vector collection
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Chat model used by the extractor and the RAG engine
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Request timeout in seconds
    #[serde(default = "default_openai_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    /// Answer generation temperature
    #[serde(default = "default_chat_temperature")]
    pub temperature: f32,

    /// How many chunks end up in the prompt context
    #[serde(default = "default_top_k_chunks")]
    pub top_k_chunks: usize,

    /// Cap on the concatenated context, in characters
    #[serde(default = "default_max_context_length")]
    pub max_context_length: usize,

    /// Chunks with distance >= threshold are discarded
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    /// PDF parsing worker pool size
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Sleep between LLM chunk extractions
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,

    /// Sleep between consecutive PDFs within one job
    #[serde(default = "default_pdf_processing_delay_ms")]
    pub pdf_processing_delay_ms: u64,

    /// LLM extraction chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_token_expire_minutes() -> u64 { 30 }
fn default_mongo_uri() -> String { "mongodb://localhost:27017".to_string() }
fn default_mongo_database() -> String { "fomentos".to_string() }
fn default_chroma_host() -> String { "localhost".to_string() }
fn default_chroma_port() -> u16 { 8001 }
fn default_chroma_collection() -> String { "editais_chunks".to_string() }
fn default_openai_base() -> String { "https://api.openai.com/v1".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_chat_model() -> String { "gpt-4o-mini".to_string() }
fn default_openai_timeout() -> u64 { 60 }
fn default_chat_temperature() -> f32 { 0.3 }
fn default_top_k_chunks() -> usize { 5 }
fn default_max_context_length() -> usize { 4000 }
fn default_distance_threshold() -> f32 { 1.5 }
fn default_max_workers() -> usize { 2 }
fn default_chunk_delay_ms() -> u64 { 500 }
fn default_pdf_processing_delay_ms() -> u64 { 1000 }
fn default_chunk_size() -> usize { 3000 }
fn default_chunk_overlap() -> usize { 300 }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__MONGO__URI=mongodb://mongo:27017
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file (tests, one-off tools)
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Delay between LLM chunk extractions as a Duration
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.jobs.chunk_delay_ms)
    }

    /// Delay between consecutive PDFs as a Duration
    pub fn pdf_processing_delay(&self) -> Duration {
        Duration::from_millis(self.jobs.pdf_processing_delay_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                debug: false,
            },
            auth: AuthConfig {
                secret_key: "change-me".to_string(),
                access_token_expire_minutes: default_token_expire_minutes(),
            },
            mongo: MongoConfig {
                uri: default_mongo_uri(),
                database: default_mongo_database(),
            },
            chroma: ChromaConfig {
                host: default_chroma_host(),
                port: default_chroma_port(),
                collection: default_chroma_collection(),
            },
            openai: OpenAiConfig {
                api_key: String::new(),
                api_base: default_openai_base(),
                embedding_model: default_embedding_model(),
                chat_model: default_chat_model(),
                timeout_secs: default_openai_timeout(),
            },
            chat: ChatConfig {
                temperature: default_chat_temperature(),
                top_k_chunks: default_top_k_chunks(),
                max_context_length: default_max_context_length(),
                distance_threshold: default_distance_threshold(),
            },
            jobs: JobsConfig {
                max_workers: default_max_workers(),
                chunk_delay_ms: default_chunk_delay_ms(),
                pdf_processing_delay_ms: default_pdf_processing_delay_ms(),
                chunk_size: default_chunk_size(),
                chunk_overlap: default_chunk_overlap(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.openai.embedding_model, "text-embedding-3-small");
        assert_eq!(config.chat.top_k_chunks, 5);
        assert_eq!(config.jobs.chunk_size, 3000);
        assert_eq!(config.jobs.chunk_overlap, 300);
    }

    #[test]
    fn test_chroma_base_url() {
        let config = AppConfig::default();
        assert_eq!(config.chroma.base_url(), "http://localhost:8001");
    }

    #[test]
    fn test_delays() {
        let config = AppConfig::default();
        assert_eq!(config.chunk_delay(), Duration::from_millis(500));
        assert_eq!(config.pdf_processing_delay(), Duration::from_millis(1000));
    }
}
