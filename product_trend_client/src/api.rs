use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::errors::{ClientError, Result};
use crate::holders::TokenStore;
use crate::models::{normalize_records, AnalysisRecord, AnalysisRequest, ApiEnvelope, RawAnalysis, UserProfile};

/// Ответ `/health`.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct HealthResponse {
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct NotificationsResponse {
    count: Option<u64>,
}

/// HTTP клиент бэкенда анализа.
///
/// К каждому запросу добавляется `Authorization: Bearer <token>` из общего
/// `TokenStore`. Ответ 401 удаляет сохранённый токен и не повторяется.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
}

impl ApiClient {
    pub fn new(config: &AppConfig, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ClientError::Unknown(format!("Не удалось создать HTTP клиент: {}", e)))?;
        Ok(ApiClient {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisRecord> {
        tracing::info!("Запуск анализа продукта {}", request.product);
        let builder = self.client.post(self.url("/analyze")).json(request);
        let raw: RawAnalysis = self.fetch_data(builder).await?;
        Ok(raw.normalize())
    }

    pub async fn list_analyses(&self, limit: usize) -> Result<Vec<AnalysisRecord>> {
        let builder = self
            .client
            .get(self.url("/analyses"))
            .query(&[("limit", limit)]);
        let items: Vec<Value> = self.fetch_data(builder).await?;
        let records = normalize_records(items);
        tracing::debug!("Получено {} анализов", records.len());
        Ok(records)
    }

    pub async fn delete_analysis(&self, id: &str) -> Result<()> {
        let path = format!("/analysis/{}", urlencoding::encode(id));
        let response = self.send(self.client.delete(self.url(&path))).await?;
        let body: Value = response.json().await?;
        ensure_success(&body)?;
        tracing::info!("Анализ {} удалён", id);
        Ok(())
    }

    pub async fn compare(&self, names: &[String]) -> Result<Vec<AnalysisRecord>> {
        let builder = self
            .client
            .get(self.url("/compare"))
            .query(&[("products", names.join(","))]);
        let items: Vec<Value> = self.fetch_data(builder).await?;
        Ok(normalize_records(items))
    }

    /// Бинарный отчёт сравнения, сформированный бэкендом.
    pub async fn export_comparison(&self, names: &[String]) -> Result<Vec<u8>> {
        let builder = self
            .client
            .post(self.url("/compare/export"))
            .json(&json!({ "products": names.join(",") }));
        let response = self.send(builder).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }

    pub async fn profile(&self) -> Result<UserProfile> {
        self.fetch_data(self.client.get(self.url("/profile"))).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self.send(self.client.get(self.url("/health"))).await?;
        Ok(response.json().await?)
    }

    pub async fn notifications(&self) -> Result<u64> {
        let response = self.send(self.client.get(self.url("/notifications"))).await?;
        let body: NotificationsResponse = response.json().await?;
        Ok(body.count.unwrap_or(0))
    }

    async fn fetch_data<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.send(builder).await?;
        let envelope: ApiEnvelope<T> = response.json().await?;
        if !envelope.success {
            return Err(ClientError::Unknown(
                envelope
                    .message
                    .unwrap_or_else(|| "Бэкенд вернул success=false".to_string()),
            ));
        }
        envelope
            .data
            .ok_or_else(|| ClientError::Unknown("В ответе отсутствует поле data".to_string()))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let builder = match self.tokens.load()? {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status();
        tracing::debug!("{} -> {}", response.url(), status);

        if status.is_success() {
            return Ok(response);
        }

        let message = error_message(response).await;
        if status == StatusCode::UNAUTHORIZED {
            self.evict_token();
            return Err(ClientError::Auth(message));
        }
        Err(ClientError::from_status(status.as_u16(), message))
    }

    fn evict_token(&self) {
        match self.tokens.load() {
            Ok(Some(_)) => {
                tracing::warn!("Бэкенд вернул 401, сохранённый токен удалён");
                if let Err(e) = self.tokens.clear() {
                    tracing::error!("Не удалось удалить токен: {}", e);
                }
            }
            Ok(None) => tracing::debug!("401 без сохранённого токена"),
            Err(e) => tracing::error!("Не удалось прочитать токен: {}", e),
        }
    }
}

fn ensure_success(body: &Value) -> Result<()> {
    match body.get("success").and_then(Value::as_bool) {
        Some(false) => Err(ClientError::Unknown(
            body.get("message")
                .and_then(Value::as_str)
                .unwrap_or("Бэкенд вернул success=false")
                .to_string(),
        )),
        _ => Ok(()),
    }
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    let fallback = status
        .canonical_reason()
        .unwrap_or("Неизвестная ошибка")
        .to_string();
    let text = match response.text().await {
        Ok(text) => text,
        Err(_) => return fallback,
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(body) => body
            .get("message")
            .or_else(|| body.get("detail"))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or(fallback),
        Err(_) if !text.trim().is_empty() => text.trim().to_string(),
        Err(_) => fallback,
    }
}
