use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use product_trend_client::identity::RestIdentityProvider;
use product_trend_client::services::analysis::AnalysisService;
use product_trend_client::services::history::{
    DeleteOutcome, LoadOutcome, SentimentFilter, SortDirection, SortKey, TrendFilter,
};
use product_trend_client::services::status::{self, BackendStatus};
use product_trend_client::*;
use tokio_test::assert_ok;

// ---------------------------------------------------------------------------
// Тестовый бэкенд
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct Backend {
    records: Arc<Mutex<Vec<Value>>>,
    expected_token: Option<String>,
    hits: Arc<AtomicUsize>,
    deletes: Arc<AtomicUsize>,
    slow: Arc<AtomicBool>,
    fail_list: Arc<AtomicBool>,
    fail_slow_once: Arc<AtomicBool>,
    last_limit: Arc<Mutex<Option<String>>>,
    last_analyze: Arc<Mutex<Option<Value>>>,
}

impl Backend {
    fn with_records(records: Vec<Value>) -> Self {
        Backend {
            records: Arc::new(Mutex::new(records)),
            ..Default::default()
        }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        match &self.expected_token {
            None => true,
            Some(token) => headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map_or(false, |v| v == format!("Bearer {}", token)),
        }
    }

    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }

    async fn maybe_wait(&self) {
        if self.slow.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
    }
}

fn raw_record(id: &str, product: &str, timestamp: &str, sentiment: f64, trend: f64, label: &str, direction: &str) -> Value {
    json!({
        "id": id,
        "product": product,
        "timestamp": timestamp,
        "sources_used": ["reddit", "news"],
        "sentiment": {
            "overall_sentiment": label,
            "confidence_score": sentiment,
            "sample_size": 1500
        },
        "trend_prediction": {"predicted_trend": direction, "confidence": trend}
    })
}

/// Хранилище токена, считающее очистки.
#[derive(Clone, Default)]
struct CountingTokenStore {
    inner: MemoryTokenStore,
    clears: Arc<AtomicUsize>,
}

impl CountingTokenStore {
    fn with_token(token: &str) -> Self {
        CountingTokenStore {
            inner: MemoryTokenStore::with_token(token),
            ..Default::default()
        }
    }

    fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl TokenStore for CountingTokenStore {
    fn load(&self) -> Result<Option<String>> {
        self.inner.load()
    }

    fn save(&self, token: &str) -> Result<()> {
        self.inner.save(token)
    }

    fn clear(&self) -> Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear()
    }
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Invalid token"}))).into_response()
}

async fn list_analyses(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    backend.hit();
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    if backend.fail_slow_once.swap(false, Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(300)).await;
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": "db timeout"}))).into_response();
    }
    if backend.fail_list.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": "db down"}))).into_response();
    }
    *backend.last_limit.lock().unwrap() = query.get("limit").cloned();

    // Снимок на момент прихода запроса
    let snapshot = backend.records.lock().unwrap().clone();
    backend.maybe_wait().await;
    Json(json!({"success": true, "data": snapshot})).into_response()
}

async fn delete_analysis(State(backend): State<Backend>, Path(id): Path<String>) -> Response {
    backend.hit();
    let mut records = backend.records.lock().unwrap();
    let before = records.len();
    records.retain(|r| r["id"] != id.as_str());
    if records.len() == before {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Analysis not found"}))).into_response();
    }
    backend.deletes.fetch_add(1, Ordering::SeqCst);
    Json(json!({"success": true})).into_response()
}

async fn compare(State(backend): State<Backend>, Query(query): Query<HashMap<String, String>>) -> Response {
    backend.hit();
    let products = query.get("products").cloned().unwrap_or_default();
    let names: Vec<&str> = products.split(',').collect();

    if names.contains(&"missing") {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "No analyses"}))).into_response();
    }
    if names.contains(&"forbidden") {
        return (StatusCode::FORBIDDEN, Json(json!({"detail": "Forbidden"}))).into_response();
    }
    if names.contains(&"boom") {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": "boom"}))).into_response();
    }

    let records = backend.records.lock().unwrap();
    let data: Vec<Value> = names
        .iter()
        .filter_map(|name| records.iter().find(|r| r["product"] == *name).cloned())
        .collect();
    Json(json!({"success": true, "data": data})).into_response()
}

async fn export_comparison(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    backend.hit();
    let products = body["products"].as_str().unwrap_or_default().to_string();
    (StatusCode::OK, format!("REPORT:{}", products)).into_response()
}

async fn analyze(State(backend): State<Backend>, Json(body): Json<Value>) -> Response {
    backend.hit();
    *backend.last_analyze.lock().unwrap() = Some(body.clone());
    backend.maybe_wait().await;
    let product = body["product"].as_str().unwrap_or_default();
    Json(json!({
        "success": true,
        "data": {
            "analysis_id": "new-1",
            "product": product,
            "timestamp": "2024-02-01T09:00:00",
            "sentiment": {"overall_sentiment": "positive", "confidence_score": 0.9, "sample_size": 800},
            "trend_prediction": {"predicted_trend": "surge", "confidence": 0.8}
        }
    }))
    .into_response()
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy"}))
}

async fn notifications() -> Json<Value> {
    Json(json!({"count": 3}))
}

fn backend_router(backend: Backend) -> Router {
    Router::new()
        .route("/api/analyses", get(list_analyses))
        .route("/api/analysis/:id", delete(delete_analysis))
        .route("/api/compare", get(compare))
        .route("/api/compare/export", post(export_comparison))
        .route("/api/analyze", post(analyze))
        .route("/api/health", get(health))
        .route("/api/notifications", get(notifications))
        .with_state(backend)
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(router.into_make_service())
            .await
            .unwrap();
    });
    addr
}

fn config_for(addr: SocketAddr) -> AppConfig {
    AppConfig {
        api_base_url: format!("http://{}/api", addr),
        request_timeout_secs: 5,
        ..AppConfig::default()
    }
}

async fn start(backend: Backend, tokens: Arc<dyn TokenStore>) -> AppState {
    let addr = serve(backend_router(backend)).await;
    AppState::new(&config_for(addr), tokens).unwrap()
}

fn sample_records() -> Vec<Value> {
    vec![
        raw_record("a1", "iPhone 15", "2024-01-02T10:00:00Z", 0.9, 0.9, "positive", "surge"),
        raw_record("a2", "Tesla", "2024-01-01T10:00:00Z", 0.3, 0.3, "negative", "drop"),
        raw_record("a3", "Galaxy S24", "2024-01-03T10:00:00Z", 0.6, 0.6, "neutral", "stable"),
    ]
}

// ---------------------------------------------------------------------------
// История анализов
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_history_load_filter_and_sort() {
    let backend = Backend::with_records(sample_records());
    let state = start(backend.clone(), Arc::new(MemoryTokenStore::new())).await;
    let history = &state.history;

    assert_eq!(history.load().await.unwrap(), LoadOutcome::Applied(3));
    assert_eq!(backend.last_limit.lock().unwrap().as_deref(), Some("1000"));

    // Поиск без учёта регистра
    history.set_filter("iphone", TrendFilter::All, SentimentFilter::All).await;
    let visible = history.visible().await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].product, "iPhone 15");
    assert!(history.has_active_filters().await);

    // Сортировка по счёту
    history.clear_filters().await;
    history.sort_by(SortKey::Score, SortDirection::Desc).await;
    let scores: Vec<u8> = history
        .visible()
        .await
        .unwrap()
        .iter()
        .map(metrics::record_opportunity_score)
        .collect();
    assert_eq!(scores, vec![90, 60, 30]);

    // Сортировка по дате
    history.sort_by(SortKey::Timestamp, SortDirection::Asc).await;
    let ids: Vec<String> = history.visible().await.unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["a2", "a1", "a3"]);

    assert_eq!(history.counts().await.unwrap(), (3, 3));
}

#[tokio::test]
async fn test_export_csv_uses_visible_view() {
    let backend = Backend::with_records(sample_records());
    let state = start(backend, Arc::new(MemoryTokenStore::new())).await;
    let history = &state.history;

    history.load().await.unwrap();
    history.set_filter("", TrendFilter::Drop, SentimentFilter::All).await;

    let csv = history.export_csv().await.unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("\"Product\",\"Analysis Date\""));
    assert!(lines[1].starts_with("\"Tesla\""));
    assert!(lines[1].ends_with("\"reddit; news\""));
}

#[tokio::test]
async fn test_load_failure_keeps_collection() {
    let backend = Backend::with_records(sample_records());
    let state = start(backend.clone(), Arc::new(MemoryTokenStore::new())).await;
    let history = &state.history;

    history.load().await.unwrap();
    backend.fail_list.store(true, Ordering::SeqCst);

    let err = history.load().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Server);
    assert!(err.is_retryable());
    assert_eq!(history.holder().len().await.unwrap(), 3);
    assert_eq!(
        history.last_error().await.as_deref(),
        Some("Server error occurred. Please try again in a few moments.")
    );

    // Успешная загрузка сбрасывает ошибку
    backend.fail_list.store(false, Ordering::SeqCst);
    assert_ok!(history.load().await);
    assert_eq!(history.last_error().await, None);
}

#[tokio::test]
async fn test_request_timeout_is_retryable() {
    // Бэкенд отвечает дольше таймаута клиента
    let router = Router::new().route(
        "/api/analyses",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({"success": true, "data": []}))
        }),
    );
    let addr = serve(router).await;
    let config = AppConfig {
        request_timeout_secs: 1,
        ..config_for(addr)
    };
    let state = AppState::new(&config, Arc::new(MemoryTokenStore::new())).unwrap();

    let err = state.history.load().await.unwrap_err();
    assert!(matches!(err, ClientError::Timeout(_)));
    assert_eq!(err.category(), ErrorCategory::Timeout);
    assert!(err.is_retryable());
    assert!(state.history.holder().is_empty().await.unwrap());
    assert!(state.history.last_error().await.is_some());
}

#[tokio::test]
async fn test_unauthorized_evicts_token_once() {
    let backend = Backend {
        expected_token: Some("fresh".to_string()),
        ..Backend::with_records(sample_records())
    };
    let tokens = CountingTokenStore::with_token("stale");
    let state = start(backend, Arc::new(tokens.clone())).await;

    let err = state.history.load().await.unwrap_err();
    assert!(matches!(err, ClientError::Auth(ref message) if message == "Invalid token"));
    assert_eq!(tokens.load().unwrap(), None);
    assert_eq!(tokens.clear_count(), 1);

    // Без токена повторный 401 ничего не очищает
    assert!(state.history.load().await.is_err());
    assert_eq!(tokens.clear_count(), 1);
    assert!(state.history.holder().is_empty().await.unwrap());
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let backend = Backend {
        expected_token: Some("good".to_string()),
        ..Backend::with_records(sample_records())
    };
    let tokens = CountingTokenStore::with_token("good");
    let state = start(backend, Arc::new(tokens.clone())).await;

    assert_eq!(state.history.load().await.unwrap(), LoadOutcome::Applied(3));
    assert_eq!(tokens.clear_count(), 0);
}

#[tokio::test]
async fn test_delete_requires_confirmation() {
    let backend = Backend::with_records(sample_records());
    let state = start(backend.clone(), Arc::new(MemoryTokenStore::new())).await;
    let history = &state.history;
    history.load().await.unwrap();

    let prompts = Mutex::new(Vec::new());
    let decline = |prompt: &str| {
        prompts.lock().unwrap().push(prompt.to_string());
        false
    };
    assert_eq!(history.delete("a2", &decline).await.unwrap(), DeleteOutcome::Cancelled);
    assert_eq!(backend.deletes.load(Ordering::SeqCst), 0);
    assert_eq!(history.holder().len().await.unwrap(), 3);
    assert!(prompts.lock().unwrap()[0].contains("Tesla"));

    let accept = |_: &str| true;
    let outcome = history.delete("a2", &accept).await.unwrap();
    assert!(matches!(outcome, DeleteOutcome::Deleted(ref r) if r.id == "a2"));
    assert_eq!(backend.deletes.load(Ordering::SeqCst), 1);
    assert!(history.holder().find("a2").await.unwrap().is_none());

    // Неизвестный id отклоняется до запроса
    let err = history.delete("nope", &accept).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotFound);
    assert_eq!(backend.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stale_load_does_not_resurrect_deleted_record() {
    let backend = Backend::with_records(sample_records());
    let state = start(backend.clone(), Arc::new(MemoryTokenStore::new())).await;
    let history = state.history.clone();
    history.load().await.unwrap();

    // Медленная загрузка стартует до удаления и вернёт старый снимок
    backend.slow.store(true, Ordering::SeqCst);
    let slow_history = history.clone();
    let slow_load = tokio::spawn(async move { slow_history.load().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    backend.slow.store(false, Ordering::SeqCst);

    let accept = |_: &str| true;
    history.delete("a1", &accept).await.unwrap();

    let outcome = slow_load.await.unwrap().unwrap();
    assert_eq!(outcome, LoadOutcome::Superseded);
    assert!(history.holder().find("a1").await.unwrap().is_none());
    assert_eq!(history.holder().len().await.unwrap(), 2);

    // Загрузка, начатая после удаления, применяется
    assert_eq!(history.load().await.unwrap(), LoadOutcome::Applied(2));
}

#[tokio::test]
async fn test_stale_failure_does_not_override_fresh_load() {
    let backend = Backend::with_records(vec![sample_records().remove(0)]);
    let state = start(backend.clone(), Arc::new(MemoryTokenStore::new())).await;
    let history = state.history.clone();

    // Первый запрос долго висит и заканчивается ошибкой
    backend.fail_slow_once.store(true, Ordering::SeqCst);
    let slow_history = history.clone();
    let slow_load = tokio::spawn(async move { slow_history.load().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(history.load().await.unwrap(), LoadOutcome::Applied(1));

    let err = slow_load.await.unwrap().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Server);

    // Ошибка устаревшего запроса не показывается поверх свежих данных
    assert_eq!(history.last_error().await, None);
    assert_eq!(history.holder().len().await.unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Сравнение
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_comparison_of_three_products() {
    let backend = Backend::with_records(sample_records());
    let state = start(backend, Arc::new(MemoryTokenStore::new())).await;

    let names: Vec<String> = ["iPhone 15", "Tesla", "Galaxy S24"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let comparison = state.comparison.fetch_comparison(&names).await.unwrap();

    assert_eq!(comparison.records.len(), 3);
    assert_eq!(comparison.metrics.len(), 5);
    assert!(comparison.metrics.iter().all(|row| row.values.len() == 3));
    assert_eq!(comparison.product_metrics.len(), 3);
    assert_eq!(comparison.insights.winner.as_deref(), Some("iPhone 15"));
    assert_eq!(comparison.error, None);

    let report = state.comparison.export_report(&names).await.unwrap();
    assert_eq!(report, b"REPORT:iPhone 15,Tesla,Galaxy S24".to_vec());
}

#[tokio::test]
async fn test_comparison_errors_are_categorized() {
    let backend = Backend::with_records(sample_records());
    let state = start(backend, Arc::new(MemoryTokenStore::new())).await;
    let comparison = &state.comparison;

    let cases = [
        ("missing", ErrorCategory::NotFound),
        ("forbidden", ErrorCategory::Forbidden),
        ("boom", ErrorCategory::Server),
    ];
    let mut messages = Vec::new();
    for (name, category) in cases {
        comparison
            .fetch_comparison(&["iPhone 15".to_string(), "Tesla".to_string()])
            .await
            .unwrap();

        let err = comparison
            .fetch_comparison(&["iPhone 15".to_string(), name.to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.category(), category);

        // Производное состояние очищено
        let state = comparison.state().await;
        assert!(state.records.is_empty());
        assert!(state.metrics.is_empty());
        assert_eq!(state.insights.winner, None);
        let failure = state.error.unwrap();
        assert_eq!(failure.category, category);
        messages.push(failure.message);
    }

    messages.dedup();
    assert_eq!(messages.len(), 3);
}

#[tokio::test]
async fn test_comparison_network_error() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let state = AppState::new(&config_for(addr), Arc::new(MemoryTokenStore::new())).unwrap();

    let err = state
        .comparison
        .fetch_comparison(&["iPhone 15".to_string()])
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Network);
    let failure = state.comparison.state().await.error.unwrap();
    assert_eq!(failure.category, ErrorCategory::Network);
}

#[tokio::test]
async fn test_comparison_rejects_more_than_five() {
    let backend = Backend::with_records(sample_records());
    let state = start(backend.clone(), Arc::new(MemoryTokenStore::new())).await;

    let names: Vec<String> = (0..6).map(|i| format!("P{}", i)).collect();
    let err = state.comparison.fetch_comparison(&names).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert_eq!(backend.hits.load(Ordering::SeqCst), 0);

    // Пустой выбор сбрасывает состояние без запроса
    let empty = state.comparison.fetch_comparison(&[]).await.unwrap();
    assert!(empty.records.is_empty());
    assert_eq!(backend.hits.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Запуск анализа
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_analyze_validates_before_request() {
    let backend = Backend::default();
    let state = start(backend.clone(), Arc::new(MemoryTokenStore::new())).await;

    let err = state.analysis.analyze("   ", None, None).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert_eq!(backend.hits.load(Ordering::SeqCst), 0);

    let record = state.analysis.analyze("iPhone 15", None, None).await.unwrap();
    assert_eq!(record.id, "new-1");
    assert_eq!(record.product, "iPhone 15");
    assert_eq!(metrics::record_opportunity_score(&record), 85);

    let body = backend.last_analyze.lock().unwrap().clone().unwrap();
    assert_eq!(body["time_range"], "7d");
    assert_eq!(body["sources"].as_array().unwrap().len(), 6);
    assert_eq!(state.analysis.last_result().await.map(|r| r.id), Some("new-1".to_string()));
}

#[tokio::test]
async fn test_analyze_rejects_duplicate_submission() {
    let backend = Backend::default();
    backend.slow.store(true, Ordering::SeqCst);
    let addr = serve(backend_router(backend.clone())).await;
    let api = ApiClient::new(&config_for(addr), Arc::new(MemoryTokenStore::new())).unwrap();
    let service = AnalysisService::new(api);

    let second = service.clone();
    let (first, duplicate) = tokio::join!(service.analyze("Tesla", None, None), async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        second.analyze("Tesla", None, None).await
    });

    assert!(first.is_ok());
    assert_eq!(duplicate.unwrap_err().category(), ErrorCategory::Busy);
    assert_eq!(backend.hits.load(Ordering::SeqCst), 1);
    assert!(!service.is_running());
}

// ---------------------------------------------------------------------------
// Статус бэкенда
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_and_notifications() {
    let state = start(Backend::default(), Arc::new(MemoryTokenStore::new())).await;

    assert_eq!(
        status::check_health(&state.api).await,
        BackendStatus::Reported("healthy".to_string())
    );
    assert_eq!(status::notification_count(&state.api).await, 3);
}

#[tokio::test]
async fn test_health_degrades() {
    // Ответ без поля status
    let router = Router::new().route("/api/health", get(|| async { Json(json!({})) }));
    let addr = serve(router).await;
    let api = ApiClient::new(&config_for(addr), Arc::new(MemoryTokenStore::new())).unwrap();
    assert_eq!(status::check_health(&api).await, BackendStatus::Unhealthy);
    // /notifications отсутствует: 404 даёт 0
    assert_eq!(status::notification_count(&api).await, 0);

    // Бэкенд не запущен
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let api = ApiClient::new(&config_for(closed), Arc::new(MemoryTokenStore::new())).unwrap();
    assert_eq!(status::check_health(&api).await, BackendStatus::Offline);
    assert_eq!(status::notification_count(&api).await, 0);
}

#[tokio::test]
async fn test_status_monitor_publishes_and_restarts() {
    let state = start(Backend::default(), Arc::new(MemoryTokenStore::new())).await;
    let monitor = &state.status;
    let mut receiver = monitor.subscribe();

    monitor.start(Duration::from_millis(50)).await;
    tokio::time::timeout(Duration::from_secs(2), receiver.changed())
        .await
        .unwrap()
        .unwrap();
    let snapshot = receiver.borrow_and_update().clone();
    assert_eq!(snapshot.backend, BackendStatus::Reported("healthy".to_string()));
    assert_eq!(snapshot.notifications, 3);
    assert!(snapshot.checked_at.is_some());

    // Повторный запуск заменяет задачу
    monitor.start(Duration::from_millis(50)).await;
    assert!(monitor.is_running().await);
    tokio::time::timeout(Duration::from_secs(2), receiver.changed())
        .await
        .unwrap()
        .unwrap();

    monitor.stop().await;
    assert!(!monitor.is_running().await);
}

// ---------------------------------------------------------------------------
// Провайдер идентификации
// ---------------------------------------------------------------------------

async fn identity_endpoint(uri: Uri, Json(body): Json<Value>) -> Response {
    let path = uri.path();
    if uri.query() != Some("key=test-key") {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": {"message": "API_KEY_INVALID"}}))).into_response();
    }
    if path.ends_with("accounts:signInWithPassword") && body["password"] == "secret1" {
        return Json(json!({
            "idToken": "id-token-1",
            "email": body["email"],
            "localId": "uid-1"
        }))
        .into_response();
    }
    (StatusCode::BAD_REQUEST, Json(json!({"error": {"message": "INVALID_PASSWORD"}}))).into_response()
}

#[tokio::test]
async fn test_rest_identity_session() {
    let addr = serve(Router::new().fallback(identity_endpoint)).await;
    let config = AppConfig {
        identity_url: format!("http://{}/v1", addr),
        identity_api_key: "test-key".to_string(),
        ..AppConfig::default()
    };
    let tokens = MemoryTokenStore::new();
    let mut session = Session::init(
        Arc::new(RestIdentityProvider::new(&config).unwrap()),
        Arc::new(tokens.clone()),
    );

    // Ошибка провайдера передаётся как есть
    let err = session.sign_in("user@example.com", "wrong-pass").await.unwrap_err();
    assert!(matches!(err, ClientError::Auth(ref message) if message == "INVALID_PASSWORD"));
    assert_eq!(session.state(), SessionState::Anonymous);
    assert_eq!(tokens.load().unwrap(), None);

    let identity = session.sign_in("user@example.com", "secret1").await.unwrap().clone();
    assert_eq!(identity.uid, "uid-1");
    assert_eq!(session.state(), SessionState::Authenticated);
    assert_eq!(tokens.load().unwrap().as_deref(), Some("id-token-1"));
    assert!(session.login_time().is_some());

    session.teardown().await.unwrap();
    assert_eq!(session.state(), SessionState::Anonymous);
    assert_eq!(session.elapsed_session_time(), 0);
    assert_eq!(tokens.load().unwrap(), None);
}

#[tokio::test]
async fn test_identity_request_times_out() {
    let router = Router::new().fallback(|| async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        Json(json!({"idToken": "late", "localId": "uid-late"}))
    });
    let addr = serve(router).await;
    let config = AppConfig {
        identity_url: format!("http://{}/v1", addr),
        identity_api_key: "test-key".to_string(),
        request_timeout_secs: 1,
        ..AppConfig::default()
    };
    let tokens = MemoryTokenStore::new();
    let mut session = Session::init(
        Arc::new(RestIdentityProvider::new(&config).unwrap()),
        Arc::new(tokens.clone()),
    );

    let err = session.sign_in("user@example.com", "secret1").await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Timeout);
    assert_eq!(session.state(), SessionState::Anonymous);
    assert_eq!(tokens.load().unwrap(), None);
}
