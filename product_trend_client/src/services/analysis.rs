use std::sync::Arc;
use tokio::sync::Mutex;

use crate::api::ApiClient;
use crate::errors::{ClientError, Result};
use crate::models::{AnalysisRecord, AnalysisRequest};
use crate::sequence::InFlight;

pub const DEFAULT_TIME_RANGE: &str = "7d";
pub const TIME_RANGES: [&str; 4] = ["7d", "14d", "30d", "90d"];
pub const DEFAULT_SOURCES: [&str; 6] = [
    "reddit",
    "twitter",
    "youtube",
    "news",
    "google_trends",
    "amazon",
];

/// Проверка и нормализация запроса до отправки на бэкенд.
pub fn build_request(
    product: &str,
    time_range: Option<&str>,
    sources: Option<&[String]>,
) -> Result<AnalysisRequest> {
    let product = product.trim();
    if product.is_empty() {
        return Err(ClientError::Validation(
            "Please enter a product name".to_string(),
        ));
    }

    let time_range = time_range
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_TIME_RANGE);
    if !TIME_RANGES.contains(&time_range) {
        return Err(ClientError::Validation(format!(
            "Unsupported time range: {} (expected one of {})",
            time_range,
            TIME_RANGES.join(", ")
        )));
    }

    let sources: Vec<String> = match sources {
        Some(list) if !list.is_empty() => list
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect(),
    };
    if sources.is_empty() {
        return Err(ClientError::Validation(
            "Select at least one data source".to_string(),
        ));
    }

    Ok(AnalysisRequest {
        product: product.to_string(),
        time_range: time_range.to_string(),
        sources,
    })
}

#[derive(Clone)]
pub struct AnalysisService {
    api: ApiClient,
    running: InFlight,
    last_result: Arc<Mutex<Option<AnalysisRecord>>>,
}

impl AnalysisService {
    pub fn new(api: ApiClient) -> Self {
        AnalysisService {
            api,
            running: InFlight::new(),
            last_result: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_busy()
    }

    pub async fn analyze(
        &self,
        product: &str,
        time_range: Option<&str>,
        sources: Option<&[String]>,
    ) -> Result<AnalysisRecord> {
        let request = build_request(product, time_range, sources)?;

        let _guard = self
            .running
            .try_enter()
            .ok_or_else(|| ClientError::Busy("analyze".to_string()))?;

        tracing::info!(
            "Анализ {} за {} по источникам: {}",
            request.product,
            request.time_range,
            request.sources.join(", ")
        );
        let record = self.api.analyze(&request).await?;
        tracing::info!("Анализ {} завершён (id={})", record.product, record.id);

        *self.last_result.lock().await = Some(record.clone());
        Ok(record)
    }

    pub async fn last_result(&self) -> Option<AnalysisRecord> {
        self.last_result.lock().await.clone()
    }
}
