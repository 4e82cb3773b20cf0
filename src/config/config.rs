use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_token_expiry_hours")]
    pub token_expiry_hours: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnthropicConfig {
    pub api_base: String,
    pub api_key: String,
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    pub api_base: String,
    pub api_key: String,
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub openai: Option<OpenAiConfig>,
    pub anthropic: Option<AnthropicConfig>,
    pub gemini: Option<GeminiConfig>,
}

/// Knobs for the reading session core. Every field has a default so the
/// whole section may be omitted from `config.yaml`.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReadingConfig {
    pub system_prompt: String,
    /// JSON file with the card deck; the built-in 78-card deck is used when unset.
    pub catalog_path: Option<String>,
    pub default_reading_name: String,
    pub default_detail: String,
    /// When false, unknown session ids are created on first use instead of
    /// failing with 404.
    pub strict_session_lookup: bool,
    /// When true, card names missing from the catalog are reported back to
    /// the caller instead of being dropped silently.
    pub strict_card_draw: bool,
    /// Only the most recent N history entries are sent to the provider.
    /// Unset means the full transcript is replayed.
    pub max_history_messages: Option<usize>,
    pub random_subset_default: usize,
}

impl Default for ReadingConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            catalog_path: None,
            default_reading_name: "Tarot Reading".to_string(),
            default_detail: "detailed".to_string(),
            strict_session_lookup: true,
            strict_card_draw: false,
            max_history_messages: None,
            random_subset_default: 20,
        }
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an experienced and compassionate tarot reader. \
Greet the querent warmly and invite them to share what is on their mind before any cards are drawn. \
Once questions have been asked and cards have been chosen, interpret each card in the context of \
the querent's questions, then weave the cards together into a single coherent reading. \
Respect the level of detail the querent asks for. Never claim certainty about the future, \
and do not give medical, legal or financial advice.";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub reading: ReadingConfig,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("ARCANA").separator("__"))
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;

        // Secrets may be written as ${VAR} and resolved from the environment
        app_config.server.host = expand_env(&app_config.server.host);
        app_config.database.path = expand_env(&app_config.database.path);
        app_config.auth.jwt_secret = expand_env(&app_config.auth.jwt_secret);

        if let Some(ref mut openai) = app_config.llm.openai {
            openai.api_key = expand_env(&openai.api_key);
        }
        if let Some(ref mut anthropic) = app_config.llm.anthropic {
            anthropic.api_key = expand_env(&anthropic.api_key);
        }
        if let Some(ref mut gemini) = app_config.llm.gemini {
            gemini.api_key = expand_env(&gemini.api_key);
        }

        if app_config.auth.jwt_secret.is_empty() {
            return Err(config::ConfigError::Message(
                "auth.jwt_secret must not be empty".to_string(),
            ));
        }

        Ok(app_config)
    }
}

fn default_token_expiry_hours() -> u32 {
    24
}

fn default_timeout_secs() -> u64 {
    60
}

fn expand_env(val: &str) -> String {
    match val.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        Some(var_name) => std::env::var(var_name).unwrap_or_default(),
        None => val.to_string(),
    }
}
