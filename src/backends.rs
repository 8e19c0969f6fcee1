//! LLM provider implementations and the registry that selects one.
//!
//! Every provider is a thin JSON-over-HTTP client implementing [`Model`].
//! Providers are keyed by the closed [`Backend`] enum; the
//! [`ModelRegistry`] maps each key to a factory so adding a provider means
//! registering a factory rather than growing a branch chain.

use crate::config::Config;
use crate::error::{NuwaError, Result};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::model::{ChatMessage, Model, Role};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const OPENAI_URL: &str = "https://api.openai.com/v1";
const GROQ_URL: &str = "https://api.groq.com/openai/v1";
const DEEPSEEK_URL: &str = "https://api.deepseek.com/beta";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 4096;

/// Supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Gemini,
    Ollama,
    Groq,
    DeepSeek,
    OpenAi,
    Claude,
    /// Offline, deterministic replies for tests and demos.
    Mock,
}

impl Backend {
    pub const ALL: [Backend; 7] = [
        Backend::Gemini,
        Backend::Ollama,
        Backend::Groq,
        Backend::DeepSeek,
        Backend::OpenAi,
        Backend::Claude,
        Backend::Mock,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Gemini => "gemini",
            Backend::Ollama => "ollama",
            Backend::Groq => "groq",
            Backend::DeepSeek => "deepseek",
            Backend::OpenAi => "openai",
            Backend::Claude => "claude",
            Backend::Mock => "mock",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Backend::Gemini => "gemini-1.5-pro",
            Backend::Ollama => "llama3",
            Backend::Groq => "llama3-8b-8192",
            Backend::DeepSeek => "deepseek-chat",
            Backend::OpenAi => "gpt-4o-mini",
            Backend::Claude => "claude-3-5-sonnet-20240620",
            Backend::Mock => "mock",
        }
    }

    /// Provider-specific key variable consulted when `LLM_API_KEY` is unset.
    pub fn api_key_var(self) -> Option<&'static str> {
        match self {
            Backend::Gemini => Some("GEMINI_API_KEY"),
            Backend::Groq => Some("GROQ_API_KEY"),
            Backend::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Backend::OpenAi => Some("OPENAI_API_KEY"),
            Backend::Claude => Some("ANTHROPIC_API_KEY"),
            Backend::Ollama | Backend::Mock => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = NuwaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Backend::Claude),
            name => Backend::ALL
                .into_iter()
                .find(|b| b.as_str() == name)
                .ok_or_else(|| NuwaError::Config(format!("unknown LLM backend: {}", s))),
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

pub type ModelFactory = fn(&Config, Arc<dyn HttpClient>) -> Result<Arc<dyn Model>>;

/// Maps each [`Backend`] to the factory that builds it.
pub struct ModelRegistry {
    factories: HashMap<Backend, ModelFactory>,
    http: Arc<dyn HttpClient>,
}

impl ModelRegistry {
    /// Registry with every built-in provider over a real HTTP client.
    pub fn with_defaults() -> Self {
        Self::with_http(Arc::new(ReqwestHttpClient::new()))
    }

    pub fn with_http(http: Arc<dyn HttpClient>) -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
            http,
        };
        registry.register(Backend::Gemini, GeminiModel::from_config);
        registry.register(Backend::Ollama, OllamaModel::from_config);
        registry.register(Backend::Groq, OpenAiCompatModel::from_config);
        registry.register(Backend::DeepSeek, OpenAiCompatModel::from_config);
        registry.register(Backend::OpenAi, OpenAiCompatModel::from_config);
        registry.register(Backend::Claude, AnthropicModel::from_config);
        registry.register(Backend::Mock, |_, _| Ok(Arc::new(MockModel)));
        registry
    }

    /// Adds or replaces the factory for `backend`.
    pub fn register(&mut self, backend: Backend, factory: ModelFactory) {
        self.factories.insert(backend, factory);
    }

    /// Builds the backend selected by `config`.
    ///
    /// # Errors
    ///
    /// [`NuwaError::Config`] for an unknown backend or missing settings.
    pub fn build(&self, config: &Config) -> Result<Arc<dyn Model>> {
        let backend = config.backend()?;
        let factory = self.factories.get(&backend).ok_or_else(|| {
            NuwaError::Config(format!("no factory registered for backend {}", backend))
        })?;

        let model = factory(config, self.http.clone())?;
        info!("Using {} backend ({})", backend, config.model_name_for(backend));
        Ok(model)
    }
}

// =============================================================================
// Shared reply handling
// =============================================================================

/// Parses a provider reply and extracts its text, or surfaces the provider's
/// own error message.
fn extract_reply(provider: &str, text: &str, extract: impl Fn(&Value) -> Option<String>) -> Result<String> {
    let value: Value = serde_json::from_str(text).map_err(|_| {
        warn!("Non-JSON reply from {}: {}", provider, text);
        NuwaError::Model(format!("{} returned a non-JSON reply", provider))
    })?;

    if let Some(reply) = extract(&value) {
        debug!("{} reply: {}", provider, reply);
        return Ok(reply);
    }

    let message = value
        .get("error")
        .map(|e| match e.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => e.to_string(),
        })
        .unwrap_or_else(|| "reply contained no text".to_string());
    Err(NuwaError::Model(format!("{}: {}", provider, message)))
}

fn split_system(messages: &[ChatMessage]) -> (Option<&str>, Vec<&ChatMessage>) {
    let system = messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.as_str());
    let turns = messages.iter().filter(|m| m.role != Role::System).collect();
    (system, turns)
}

fn openai_messages(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::System => "system",
                Role::Human => "user",
                Role::Ai => "assistant",
            };
            json!({ "role": role, "content": m.content })
        })
        .collect()
}

// =============================================================================
// Gemini
// =============================================================================

pub struct GeminiModel {
    http: Arc<dyn HttpClient>,
    api_key: String,
    model: String,
    temperature: Option<f32>,
}

impl GeminiModel {
    fn from_config(config: &Config, http: Arc<dyn HttpClient>) -> Result<Arc<dyn Model>> {
        Ok(Arc::new(Self {
            http,
            api_key: config.require_api_key()?.to_string(),
            model: config.model_name_for(Backend::Gemini),
            temperature: config.temperature,
        }))
    }
}

#[async_trait]
impl Model for GeminiModel {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let (system, turns) = split_system(messages);
        let contents: Vec<Value> = turns
            .iter()
            .map(|m| {
                let role = if m.role == Role::Ai { "model" } else { "user" };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut body = json!({ "contents": contents });
        if let Some(system) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        if let Some(t) = self.temperature {
            body["generationConfig"] = json!({ "temperature": t });
        }

        let url = format!("{}/{}:generateContent", GEMINI_URL, self.model);
        let headers = [
            ("x-goog-api-key", self.api_key.as_str()),
            ("content-type", "application/json"),
        ];
        let text = self.http.post_json(&url, &headers, &body).await?;

        extract_reply("gemini", &text, |v| {
            let parts = v.pointer("/candidates/0/content/parts")?.as_array()?;
            Some(
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect::<String>(),
            )
        })
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// =============================================================================
// OpenAI-compatible (OpenAI, Groq, DeepSeek)
// =============================================================================

pub struct OpenAiCompatModel {
    http: Arc<dyn HttpClient>,
    provider: Backend,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiCompatModel {
    fn from_config(config: &Config, http: Arc<dyn HttpClient>) -> Result<Arc<dyn Model>> {
        let provider = config.backend()?;
        let default_url = match provider {
            Backend::Groq => GROQ_URL,
            Backend::DeepSeek => DEEPSEEK_URL,
            _ => OPENAI_URL,
        };

        Ok(Arc::new(Self {
            http,
            provider,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_url.to_string()),
            api_key: config.require_api_key()?.to_string(),
            model: config.model_name_for(provider),
            temperature: config.temperature,
        }))
    }
}

#[async_trait]
impl Model for OpenAiCompatModel {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "messages": openai_messages(messages),
        });
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let auth = format!("Bearer {}", self.api_key);
        let headers = [
            ("authorization", auth.as_str()),
            ("content-type", "application/json"),
        ];
        let text = self.http.post_json(&url, &headers, &body).await?;

        extract_reply(self.provider.as_str(), &text, |v| {
            v.pointer("/choices/0/message/content")?
                .as_str()
                .map(str::to_string)
        })
    }

    fn name(&self) -> &str {
        self.provider.as_str()
    }
}

// =============================================================================
// Ollama
// =============================================================================

pub struct OllamaModel {
    http: Arc<dyn HttpClient>,
    server_url: String,
    model: String,
    temperature: Option<f32>,
}

impl OllamaModel {
    fn from_config(config: &Config, http: Arc<dyn HttpClient>) -> Result<Arc<dyn Model>> {
        let server_url = config
            .ollama_server_url
            .clone()
            .ok_or_else(|| NuwaError::Config("OLLAMA_SERVER_URL is not set".to_string()))?;

        Ok(Arc::new(Self {
            http,
            server_url,
            model: config.model_name_for(Backend::Ollama),
            temperature: config.temperature,
        }))
    }
}

#[async_trait]
impl Model for OllamaModel {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "messages": openai_messages(messages),
            "stream": false,
        });
        if let Some(t) = self.temperature {
            body["options"] = json!({ "temperature": t });
        }

        let url = format!("{}/api/chat", self.server_url.trim_end_matches('/'));
        let text = self
            .http
            .post_json(&url, &[("content-type", "application/json")], &body)
            .await?;

        extract_reply("ollama", &text, |v| {
            v.pointer("/message/content")?.as_str().map(str::to_string)
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

// =============================================================================
// Anthropic
// =============================================================================

pub struct AnthropicModel {
    http: Arc<dyn HttpClient>,
    api_key: String,
    model: String,
    temperature: Option<f32>,
}

impl AnthropicModel {
    fn from_config(config: &Config, http: Arc<dyn HttpClient>) -> Result<Arc<dyn Model>> {
        Ok(Arc::new(Self {
            http,
            api_key: config.require_api_key()?.to_string(),
            model: config.model_name_for(Backend::Claude),
            temperature: config.temperature,
        }))
    }
}

#[async_trait]
impl Model for AnthropicModel {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let (system, turns) = split_system(messages);
        let turns: Vec<Value> = turns
            .iter()
            .map(|m| {
                let role = if m.role == Role::Ai { "assistant" } else { "user" };
                json!({ "role": role, "content": m.content })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "max_tokens": ANTHROPIC_MAX_TOKENS,
            "messages": turns,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }

        let headers = [
            ("x-api-key", self.api_key.as_str()),
            ("anthropic-version", ANTHROPIC_VERSION),
            ("content-type", "application/json"),
        ];
        let text = self.http.post_json(ANTHROPIC_URL, &headers, &body).await?;

        extract_reply("claude", &text, |v| {
            let content = v.get("content")?.as_array()?;
            Some(
                content
                    .iter()
                    .filter(|c| c.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|c| c.get("text").and_then(Value::as_str))
                    .collect::<String>(),
            )
        })
    }

    fn name(&self) -> &str {
        "claude"
    }
}

// =============================================================================
// Mock
// =============================================================================

/// Deterministic offline model.
///
/// Replies follow the contract of whichever prompt it is given, echoing the
/// user input back in the expected shape.
pub struct MockModel;

impl MockModel {
    fn reply_for(prompt: &str) -> String {
        let input = prompt.trim_end().lines().last().unwrap_or("").trim();

        if prompt.contains("Final Answer:") {
            let question = prompt
                .lines()
                .rev()
                .find_map(|l| l.strip_prefix("Question: "))
                .unwrap_or(input);
            return format!("Thought: I now know the final answer\nFinal Answer: {}", question);
        }
        if prompt.contains(crate::command_extractor::COMMAND_MARKER) {
            return format!("{}{}", crate::command_extractor::COMMAND_MARKER, input);
        }
        if prompt.contains("@FILENAME") {
            return format!("@mock.sh@\n```shell\n{}\n```", input);
        }
        format!("Mock reply: {}", input)
    }
}

#[async_trait]
impl Model for MockModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(Self::reply_for(prompt))
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Human)
            .map(|m| m.content.as_str())
            .unwrap_or("");
        Ok(format!("Mock reply: {}", last))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::tests::MockHttpClient;

    fn config(backend: &str, key: Option<&str>) -> Config {
        Config {
            backend: Some(backend.to_string()),
            api_key: key.map(str::to_string),
            temperature: Some(0.3),
            ..Config::default()
        }
    }

    fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("be terse"),
            ChatMessage::human("hi"),
            ChatMessage::ai("hello"),
            ChatMessage::human("list files"),
        ]
    }

    async fn build(backend: &str, key: Option<&str>, reply: &str) -> (Arc<dyn Model>, Arc<MockHttpClient>) {
        let http = Arc::new(MockHttpClient::new(reply));
        let mut cfg = config(backend, key);
        cfg.ollama_server_url = Some("http://localhost:11434/".to_string());
        let model = ModelRegistry::with_http(http.clone()).build(&cfg).unwrap();
        (model, http)
    }

    // =========================================================================
    // Backend selection
    // =========================================================================

    #[test]
    fn test_backend_parsing() {
        assert_eq!("gemini".parse::<Backend>().unwrap(), Backend::Gemini);
        assert_eq!("Claude".parse::<Backend>().unwrap(), Backend::Claude);
        assert_eq!("anthropic".parse::<Backend>().unwrap(), Backend::Claude);
        assert_eq!(" deepseek ".parse::<Backend>().unwrap(), Backend::DeepSeek);
        assert!(matches!("palm".parse::<Backend>(), Err(NuwaError::Config(_))));
    }

    #[test]
    fn test_backend_names_round_trip() {
        for backend in Backend::ALL {
            assert_eq!(backend.to_string().parse::<Backend>().unwrap(), backend);
        }
    }

    #[test]
    fn test_hosted_backends_require_api_key() {
        let registry = ModelRegistry::with_http(Arc::new(MockHttpClient::new("")));
        for name in ["gemini", "groq", "deepseek", "openai", "claude"] {
            let err = registry.build(&config(name, None)).err().unwrap();
            assert!(matches!(err, NuwaError::Config(_)), "{name}");
        }
    }

    #[test]
    fn test_ollama_requires_server_url() {
        let registry = ModelRegistry::with_http(Arc::new(MockHttpClient::new("")));

        let err = registry.build(&config("ollama", None)).err().unwrap();

        assert!(err.to_string().contains("OLLAMA_SERVER_URL"));
    }

    #[test]
    fn test_registered_factory_replaces_builtin() {
        let mut registry = ModelRegistry::with_http(Arc::new(MockHttpClient::new("")));
        registry.register(Backend::Gemini, |_, _| Ok(Arc::new(MockModel)));

        let model = registry.build(&config("gemini", None)).unwrap();

        assert_eq!(model.name(), "mock");
    }

    // =========================================================================
    // Wire formats
    // =========================================================================

    #[tokio::test]
    async fn test_gemini_request_and_reply() {
        let reply = r#"{"candidates":[{"content":{"parts":[{"text":"execute "},{"text":"command: ls"}]}}]}"#;
        let (model, http) = build("gemini", Some("g-key"), reply).await;

        let text = model.chat(&conversation()).await.unwrap();

        assert_eq!(text, "execute command: ls");
        let req = http.last_request();
        assert!(req.url.ends_with("/gemini-1.5-pro:generateContent"));
        assert!(req.headers.contains(&("x-goog-api-key".to_string(), "g-key".to_string())));
        assert_eq!(req.body["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(req.body["contents"][1]["role"], "model");
        assert_eq!(req.body["contents"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_groq_uses_openai_wire_format() {
        let reply = r#"{"choices":[{"message":{"role":"assistant","content":"hi there"}}]}"#;
        let (model, http) = build("groq", Some("gq"), reply).await;

        let text = model.generate("hello").await.unwrap();

        assert_eq!(text, "hi there");
        let req = http.last_request();
        assert_eq!(req.url, "https://api.groq.com/openai/v1/chat/completions");
        assert_eq!(req.body["model"], "llama3-8b-8192");
        assert_eq!(req.body["messages"][0]["role"], "user");
        assert!(req.headers.contains(&("authorization".to_string(), "Bearer gq".to_string())));
    }

    #[tokio::test]
    async fn test_ollama_request_and_reply() {
        let reply = r#"{"message":{"role":"assistant","content":"pong"},"done":true}"#;
        let (model, http) = build("ollama", None, reply).await;

        assert_eq!(model.chat(&conversation()).await.unwrap(), "pong");
        let req = http.last_request();
        assert_eq!(req.url, "http://localhost:11434/api/chat");
        assert_eq!(req.body["stream"], false);
        assert_eq!(req.body["messages"][0]["role"], "system");
        assert_eq!(req.body["messages"][2]["role"], "assistant");
    }

    #[tokio::test]
    async fn test_claude_request_and_reply() {
        let reply = r#"{"content":[{"type":"text","text":"Final Answer: done"}]}"#;
        let (model, http) = build("claude", Some("sk-ant"), reply).await;

        assert_eq!(model.chat(&conversation()).await.unwrap(), "Final Answer: done");
        let req = http.last_request();
        assert_eq!(req.body["system"], "be terse");
        assert_eq!(req.body["messages"].as_array().unwrap().len(), 3);
        assert!(req.headers.contains(&("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string())));
    }

    #[tokio::test]
    async fn test_provider_error_is_surfaced() {
        let reply = r#"{"error":{"message":"API key not valid","code":400}}"#;
        let (model, _) = build("gemini", Some("bad"), reply).await;

        let err = model.generate("x").await.unwrap_err();

        assert!(matches!(err, NuwaError::Model(_)));
        assert!(err.to_string().contains("API key not valid"));
    }

    #[tokio::test]
    async fn test_non_json_reply_is_model_error() {
        let (model, _) = build("openai", Some("k"), "<html>bad gateway</html>").await;

        let err = model.generate("x").await.unwrap_err();

        assert!(err.to_string().contains("non-JSON"));
    }

    // =========================================================================
    // Mock
    // =========================================================================

    #[tokio::test]
    async fn test_mock_follows_prompt_contracts() {
        let model = MockModel;

        let cmd = model
            .generate(&format!("{}\nls -la", crate::prompts::cmd_mode_prompt()))
            .await
            .unwrap();
        assert_eq!(cmd, "execute command: ls -la");

        let task = model
            .generate(&format!("{}\necho task", crate::prompts::task_mode_prompt()))
            .await
            .unwrap();
        assert_eq!(task, "@mock.sh@\n```shell\necho task\n```");

        let chat = model.chat(&conversation()).await.unwrap();
        assert_eq!(chat, "Mock reply: list files");
    }
}
