use crate::backends::Backend;
use crate::error::{NuwaError, Result};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Provider name, e.g. `gemini` or `ollama`.
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub ollama_server_url: Option<String>,
    /// Override for OpenAI-compatible endpoints.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub use_mock: bool,
    /// Taken from `HOME`, never from the file.
    #[serde(skip)]
    pub home: Option<PathBuf>,
}

impl Config {
    /// Load configuration from file, then apply environment variables on top.
    pub fn load() -> Result<Self> {
        let config = Self::load_from_file().unwrap_or_else(|| {
            info!("No config file found, using defaults");
            Self::default()
        });

        config.with_env(|key| std::env::var(key).ok())
    }

    fn load_from_file() -> Option<Self> {
        let config_path = Self::get_config_path().ok()?;
        let content = fs::read_to_string(&config_path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => {
                info!("Loaded config from: {}", config_path.display());
                Some(config)
            }
            Err(e) => {
                warn!("Ignoring malformed config file {}: {}", config_path.display(), e);
                None
            }
        }
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// Empty values count as unset.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(backend) = get("LLM_BACKEND") {
            self.backend = Some(backend);
        }
        if let Some(model) = get("LLM_MODEL_NAME") {
            self.model_name = Some(model);
        }
        if let Some(key) = get("LLM_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(url) = get("OLLAMA_SERVER_URL") {
            self.ollama_server_url = Some(url);
        }
        if let Some(url) = get("LLM_BASE_URL") {
            self.base_url = Some(url);
        }
        if let Some(raw) = get("LLM_TEMPERATURE") {
            let temperature = raw.trim().parse::<f32>().map_err(|_| {
                NuwaError::Config(format!("failed to parse LLM_TEMPERATURE '{}'", raw))
            })?;
            self.temperature = Some(temperature);
        }
        if get("NUWA_USE_MOCK").is_some() {
            self.use_mock = true;
        }
        self.home = get("HOME").map(PathBuf::from);

        if self.api_key.is_none() {
            if let Some(var) = self.backend().ok().and_then(|b| b.api_key_var()) {
                self.api_key = get(var);
            }
        }

        Ok(self)
    }

    /// The selected backend; `gemini` when none is configured.
    pub fn backend(&self) -> Result<Backend> {
        if self.use_mock {
            return Ok(Backend::Mock);
        }
        match self.backend.as_deref() {
            Some(name) => name.parse(),
            None => Ok(Backend::Gemini),
        }
    }

    /// The configured model name, or the backend's default.
    pub fn model_name_for(&self, backend: Backend) -> String {
        self.model_name
            .clone()
            .unwrap_or_else(|| backend.default_model().to_string())
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| NuwaError::Config("LLM_API_KEY is not set".to_string()))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::get_config_dir()?.join("config.toml"))
    }

    pub fn get_config_dir() -> Result<PathBuf> {
        let home = home_dir()
            .ok_or_else(|| NuwaError::Config("Could not find home directory".to_string()))?;
        Ok(home.join(crate::script::NUWA_DIR))
    }

    pub fn show_config_info() -> Result<()> {
        let config_path = Self::get_config_path()?;
        println!("Configuration file: {}", config_path.display());
        println!(
            "Status: {}",
            if config_path.exists() { "Found" } else { "Not found (using defaults)" }
        );

        let config = Self::load()?;
        match config.backend() {
            Ok(backend) => {
                println!("Backend: {}", backend);
                println!("Model: {}", config.model_name_for(backend));
            }
            Err(e) => println!("Backend: invalid ({})", e),
        }
        println!("API Key: {}", if config.api_key.is_some() { "Set" } else { "Not set" });
        if let Some(t) = config.temperature {
            println!("Temperature: {}", t);
        }
        if let Some(url) = &config.ollama_server_url {
            println!("Ollama server: {}", url);
        }
        println!("Mock mode: {}", config.use_mock);

        println!("\nEnvironment variables:");
        println!("  LLM_BACKEND        gemini | ollama | groq | deepseek | openai | claude");
        println!("  LLM_MODEL_NAME     model to use (backend default otherwise)");
        println!("  LLM_API_KEY        API key (or GEMINI_API_KEY, OPENAI_API_KEY, ...)");
        println!("  LLM_TEMPERATURE    sampling temperature");
        println!("  OLLAMA_SERVER_URL  Ollama server, e.g. http://localhost:11434");

        Ok(())
    }
}
