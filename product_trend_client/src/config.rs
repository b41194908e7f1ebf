use anyhow::Result;
use config::Config;
use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug, serde::Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_identity_url")]
    pub identity_url: String,
    #[serde(default)]
    pub identity_api_key: String,
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub log_json: bool,
}

fn default_api_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_history_limit() -> usize {
    1000
}

fn default_health_check_interval_secs() -> u64 {
    60
}

fn default_identity_url() -> String {
    "https://identitytoolkit.googleapis.com/v1".to_string()
}

fn default_token_path() -> PathBuf {
    PathBuf::from(".product_trend_token")
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            history_limit: default_history_limit(),
            health_check_interval_secs: default_health_check_interval_secs(),
            identity_url: default_identity_url(),
            identity_api_key: String::new(),
            token_path: default_token_path(),
            log_dir: None,
            log_json: false,
        }
    }
}

impl AppConfig {
    /// Валидация конфигурации
    pub fn validate(&self) -> Result<()> {
        let base = self.api_base_url.trim();
        if base.is_empty() {
            return Err(anyhow::anyhow!("api_base_url cannot be empty"));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(anyhow::anyhow!("api_base_url must start with http:// or https://"));
        }

        if self.request_timeout_secs == 0 || self.request_timeout_secs > 300 {
            return Err(anyhow::anyhow!("request_timeout_secs must be between 1 and 300"));
        }

        if self.history_limit == 0 || self.history_limit > 5000 {
            return Err(anyhow::anyhow!("history_limit must be between 1 and 5000"));
        }

        if self.health_check_interval_secs < 5 || self.health_check_interval_secs > 3600 {
            return Err(anyhow::anyhow!(
                "health_check_interval_secs must be between 5 and 3600"
            ));
        }

        Ok(())
    }
}

pub fn load_config() -> Result<AppConfig> {
    // Загружаем .env файл
    dotenvy::dotenv().ok();

    let settings = Config::builder()
        .add_source(config::File::with_name("config").required(false))
        .add_source(config::Environment::with_prefix("TREND_CLIENT"))
        .build()?;

    let mut config: AppConfig = settings.try_deserialize()?;

    // Ключ провайдера идентификации необязателен: без него доступен только сохранённый токен
    if let Ok(key) = env::var("IDENTITY_API_KEY") {
        config.identity_api_key = key;
    }

    config.validate()?;

    Ok(config)
}
