use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::api::ApiClient;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackendStatus {
    #[default]
    Checking,
    /// Статус, который вернул `/health`, как есть.
    Reported(String),
    Unhealthy,
    Offline,
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendStatus::Checking => write!(f, "checking"),
            BackendStatus::Reported(status) => write!(f, "{}", status),
            BackendStatus::Unhealthy => write!(f, "unhealthy"),
            BackendStatus::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
    pub backend: BackendStatus,
    pub notifications: u64,
    pub checked_at: Option<DateTime<Utc>>,
}

pub async fn check_health(api: &ApiClient) -> BackendStatus {
    match api.health().await {
        Ok(response) => match response.status {
            Some(status) if !status.trim().is_empty() => BackendStatus::Reported(status),
            _ => BackendStatus::Unhealthy,
        },
        Err(e) => {
            tracing::warn!("Бэкенд недоступен: {}", e);
            BackendStatus::Offline
        }
    }
}

/// Число уведомлений; любая ошибка даёт 0.
pub async fn notification_count(api: &ApiClient) -> u64 {
    match api.notifications().await {
        Ok(count) => count,
        Err(e) => {
            tracing::debug!("Не удалось получить уведомления: {}", e);
            0
        }
    }
}

pub async fn snapshot(api: &ApiClient) -> StatusSnapshot {
    let (backend, notifications) = tokio::join!(check_health(api), notification_count(api));
    StatusSnapshot {
        backend,
        notifications,
        checked_at: Some(Utc::now()),
    }
}

/// Периодическая проверка бэкенда. Повторный `start` перезапускает задачу.
#[derive(Clone)]
pub struct StatusMonitor {
    api: ApiClient,
    sender: Arc<watch::Sender<StatusSnapshot>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl StatusMonitor {
    pub fn new(api: ApiClient) -> Self {
        let (sender, _) = watch::channel(StatusSnapshot::default());
        StatusMonitor {
            api,
            sender: Arc::new(sender),
            task: Arc::new(Mutex::new(None)),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.sender.subscribe()
    }

    pub fn current(&self) -> StatusSnapshot {
        self.sender.borrow().clone()
    }

    pub async fn start(&self, interval: Duration) {
        let mut task = self.task.lock().await;
        if let Some(previous) = task.take() {
            previous.abort();
            tracing::debug!("Мониторинг статуса перезапущен");
        }

        let api = self.api.clone();
        let sender = self.sender.clone();
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let snapshot = snapshot(&api).await;
                tracing::debug!(
                    "Статус бэкенда: {}, уведомлений: {}",
                    snapshot.backend,
                    snapshot.notifications
                );
                sender.send_replace(snapshot);
            }
        }));
        tracing::info!("Мониторинг статуса запущен, интервал {:?}", interval);
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            tracing::info!("Мониторинг статуса остановлен");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }
}
