use std::sync::Arc;

pub mod api;
pub mod comparison;
pub mod config;
pub mod dashboard;
pub mod errors;
pub mod export;
pub mod holders;
pub mod identity;
pub mod insights;
pub mod metrics;
pub mod models;
pub mod sequence;
pub mod services;
pub mod session;

pub use api::ApiClient;
pub use config::{load_config, AppConfig};
pub use errors::{ClientError, ErrorCategory, Result};
pub use holders::{AnalysisHolder, FileTokenStore, MemoryTokenStore, TokenStore};
pub use models::{AnalysisRecord, SentimentLabel, TrendDirection};
pub use services::{AnalysisHistoryService, AnalysisService, ComparisonService, StatusMonitor};
pub use session::{Session, SessionState};

/// Сервисы клиента, собранные вокруг одного `ApiClient` и общего хранилища токена.
#[derive(Clone)]
pub struct AppState {
    pub api: ApiClient,
    pub history: AnalysisHistoryService,
    pub comparison: ComparisonService,
    pub analysis: AnalysisService,
    pub status: StatusMonitor,
}

impl AppState {
    pub fn new(config: &AppConfig, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let api = ApiClient::new(config, tokens)?;
        Ok(AppState {
            history: AnalysisHistoryService::new(
                api.clone(),
                AnalysisHolder::new(),
                config.history_limit,
            ),
            comparison: ComparisonService::new(api.clone()),
            analysis: AnalysisService::new(api.clone()),
            status: StatusMonitor::new(api.clone()),
            api,
        })
    }
}
