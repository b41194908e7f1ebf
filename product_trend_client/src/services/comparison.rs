use std::sync::Arc;
use tokio::sync::Mutex;

use crate::api::ApiClient;
use crate::comparison::{
    build_insights, build_metric_matrix, build_product_matrix, ComparisonInsights, MetricRow,
    ProductMetrics, MAX_COMPARED_PRODUCTS,
};
use crate::errors::{ClientError, ErrorCategory, Result};
use crate::models::AnalysisRecord;
use crate::sequence::RequestSequence;

/// Ошибка последнего сравнения в виде, пригодном для показа.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonFailure {
    pub category: ErrorCategory,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComparisonState {
    pub products: Vec<String>,
    pub records: Vec<AnalysisRecord>,
    pub metrics: Vec<MetricRow>,
    pub product_metrics: Vec<ProductMetrics>,
    pub insights: ComparisonInsights,
    pub error: Option<ComparisonFailure>,
}

impl ComparisonState {
    fn from_records(products: Vec<String>, records: Vec<AnalysisRecord>) -> Self {
        ComparisonState {
            products,
            metrics: build_metric_matrix(&records),
            product_metrics: build_product_matrix(&records),
            insights: build_insights(&records),
            records,
            error: None,
        }
    }

    fn failed(products: Vec<String>, error: &ClientError) -> Self {
        ComparisonState {
            products,
            error: Some(ComparisonFailure {
                category: error.category(),
                message: error.user_message(),
            }),
            ..Default::default()
        }
    }
}

#[derive(Clone)]
pub struct ComparisonService {
    api: ApiClient,
    state: Arc<Mutex<ComparisonState>>,
    sequence: RequestSequence,
}

impl ComparisonService {
    pub fn new(api: ApiClient) -> Self {
        ComparisonService {
            api,
            state: Arc::new(Mutex::new(ComparisonState::default())),
            sequence: RequestSequence::new(),
        }
    }

    pub async fn state(&self) -> ComparisonState {
        self.state.lock().await.clone()
    }

    /// Запрашивает последние анализы выбранных продуктов и пересчитывает матрицы.
    ///
    /// Пустой выбор сбрасывает состояние без запроса. При ошибке производное
    /// состояние очищается, а категория ошибки сохраняется.
    pub async fn fetch_comparison(&self, names: &[String]) -> Result<ComparisonState> {
        let names: Vec<String> = names
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();

        let ticket = self.sequence.begin();

        if names.is_empty() {
            let mut state = self.state.lock().await;
            if self.sequence.try_apply(ticket) {
                *state = ComparisonState::default();
            }
            return Ok(state.clone());
        }

        if names.len() > MAX_COMPARED_PRODUCTS {
            return Err(ClientError::Validation(format!(
                "At most {} products can be compared",
                MAX_COMPARED_PRODUCTS
            )));
        }

        tracing::info!("Сравнение продуктов: {}", names.join(", "));
        let result = self.api.compare(&names).await;

        let mut state = self.state.lock().await;
        if !self.sequence.try_apply(ticket) {
            tracing::warn!("Ответ сравнения #{} устарел и отброшен", ticket.value());
            return result.map(|_| state.clone());
        }

        match result {
            Ok(records) => {
                tracing::info!("Получено {} записей для сравнения", records.len());
                *state = ComparisonState::from_records(names, records);
                Ok(state.clone())
            }
            Err(e) => {
                tracing::error!("Ошибка сравнения: {}", e);
                *state = ComparisonState::failed(names, &e);
                Err(e)
            }
        }
    }

    pub async fn export_report(&self, names: &[String]) -> Result<Vec<u8>> {
        if names.is_empty() {
            return Err(ClientError::Validation(
                "Select at least one product to export".to_string(),
            ));
        }
        let bytes = self.api.export_comparison(names).await?;
        tracing::info!("Отчёт сравнения получен: {} байт", bytes.len());
        Ok(bytes)
    }
}
