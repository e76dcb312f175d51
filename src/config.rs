use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the policy assistant.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Human readable service name reported by `GET /`.
    pub app_name: String,
    /// Backend used for chat completions.
    pub llm_provider: ModelProvider,
    /// API key for the hosted OpenAI endpoints.
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API.
    pub openai_base_url: String,
    /// Base URL of the local Ollama runtime.
    pub ollama_url: String,
    /// Chat model identifier passed to the provider.
    pub chat_model: String,
    /// Sampling temperature for chat completions.
    pub chat_temperature: f32,
    /// Backend used for embeddings.
    pub embedding_provider: ModelProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Directory holding the `.txt` policy corpus.
    pub policies_dir: PathBuf,
    /// Directory holding the persisted embedding index.
    pub index_dir: PathBuf,
    /// Directory holding the versioned prompt templates.
    pub prompts_dir: PathBuf,
    /// Number of retrieved chunks when a request omits `top_k`.
    pub default_top_k: usize,
    /// Character budget for the assembled prompt context.
    pub max_context_chars: usize,
    /// QA prompt version used when a request omits `prompt_version`.
    pub prompt_version: String,
    /// Router prompt version, fixed for the process lifetime.
    pub router_version: String,
    /// Window size, in characters, used during ingestion.
    pub chunk_size: usize,
    /// Overlap, in characters, between adjacent windows.
    pub chunk_overlap: usize,
    /// Client-level timeout applied to model and embedding calls.
    pub model_timeout_secs: u64,
    /// Optional file with extra injection patterns, one regex per line.
    pub injection_patterns_file: Option<PathBuf>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported model backends for chat completions and embeddings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// Hosted OpenAI API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            app_name: load_env_or("APP_NAME", "Policy Assistant"),
            llm_provider: load_env_or("LLM_PROVIDER", "openai")
                .parse()
                .map_err(|()| ConfigError::InvalidValue("LLM_PROVIDER".into()))?,
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            openai_base_url: load_env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            ollama_url: load_env_or("OLLAMA_URL", "http://127.0.0.1:11434"),
            chat_model: load_env_or("CHAT_MODEL", "gpt-4o-mini"),
            chat_temperature: parse_env_or("CHAT_TEMPERATURE", 0.2)?,
            embedding_provider: load_env_or("EMBEDDING_PROVIDER", "openai")
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))?,
            embedding_model: load_env_or("EMB_MODEL", "text-embedding-3-small"),
            policies_dir: load_env_or("POLICIES_DIR", "data/policies").into(),
            index_dir: load_env_or("INDEX_DIR", "index").into(),
            prompts_dir: load_env_or("PROMPTS_DIR", "prompts").into(),
            default_top_k: parse_env_or("DEFAULT_TOP_K", 5)?,
            max_context_chars: parse_env_or("MAX_CONTEXT_CHARS", 12_000)?,
            prompt_version: load_env_or("PROMPT_VERSION", "v2"),
            router_version: load_env_or("ROUTER_VERSION", "v1"),
            chunk_size: parse_env_or("CHUNK_SIZE", 900)?,
            chunk_overlap: parse_env_or("CHUNK_OVERLAP", 150)?,
            model_timeout_secs: parse_env_or("MODEL_TIMEOUT_SECS", 60)?,
            injection_patterns_file: load_env_optional("INJECTION_PATTERNS_FILE").map(Into::into),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that individual parsers cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidValue("CHUNK_OVERLAP".into()));
        }
        if !(1..=20).contains(&self.default_top_k) {
            return Err(ConfigError::InvalidValue("DEFAULT_TOP_K".into()));
        }
        if self.max_context_chars == 0 {
            return Err(ConfigError::InvalidValue("MAX_CONTEXT_CHARS".into()));
        }
        if !(0.0..=2.0).contains(&self.chat_temperature) {
            return Err(ConfigError::InvalidValue("CHAT_TEMPERATURE".into()));
        }
        Ok(())
    }

    /// Timeout applied to every outbound model request.
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }
}

/// Load `.env` (when present) and read the configuration from the environment.
pub fn load() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        llm_provider = ?config.llm_provider,
        chat_model = %config.chat_model,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        index_dir = %config.index_dir.display(),
        prompts_dir = %config.prompts_dir.display(),
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(config)
}

fn load_env_or(key: &str, default: &str) -> String {
    load_env_optional(key).unwrap_or_else(|| default.to_string())
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

impl std::str::FromStr for ModelProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        app_name: "Policy Assistant".into(),
        llm_provider: ModelProvider::OpenAI,
        openai_api_key: Some("sk-test".into()),
        openai_base_url: "http://127.0.0.1:9".into(),
        ollama_url: "http://127.0.0.1:11434".into(),
        chat_model: "gpt-4o-mini".into(),
        chat_temperature: 0.2,
        embedding_provider: ModelProvider::OpenAI,
        embedding_model: "text-embedding-3-small".into(),
        policies_dir: "data/policies".into(),
        index_dir: "index".into(),
        prompts_dir: "prompts".into(),
        default_top_k: 5,
        max_context_chars: 12_000,
        prompt_version: "v2".into(),
        router_version: "v1".into(),
        chunk_size: 900,
        chunk_overlap: 150,
        model_timeout_secs: 60,
        injection_patterns_file: None,
        server_port: None,
    }
}
