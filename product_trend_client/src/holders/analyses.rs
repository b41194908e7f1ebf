use std::sync::Arc;
use tokio::sync::Mutex;
use crate::models::AnalysisRecord;
use crate::errors::Result;

/// Коллекция анализов пользователя в том виде, в каком её вернул бэкенд.
#[derive(Clone, Default)]
pub struct AnalysisHolder {
    records: Arc<Mutex<Vec<AnalysisRecord>>>,
}

impl AnalysisHolder {
    pub fn new() -> Self {
        AnalysisHolder {
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Заменяет коллекцию, только если `accept` разрешает; проверка выполняется под блокировкой.
    pub async fn replace_if(
        &self,
        items: Vec<AnalysisRecord>,
        accept: impl FnOnce() -> bool,
    ) -> Result<bool> {
        let mut records = self.records.lock().await;
        if !accept() {
            return Ok(false);
        }
        *records = items;
        Ok(true)
    }

    pub async fn get(&self) -> Result<Vec<AnalysisRecord>> {
        let records = self.records.lock().await;
        Ok(records.clone())
    }

    pub async fn find(&self, id: &str) -> Result<Option<AnalysisRecord>> {
        let records = self.records.lock().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    /// Удаляет запись и под той же блокировкой вызывает `then`.
    pub async fn remove_then(&self, id: &str, then: impl FnOnce()) -> Option<AnalysisRecord> {
        let mut records = self.records.lock().await;
        let removed = records
            .iter()
            .position(|r| r.id == id)
            .map(|index| records.remove(index));
        then();
        removed
    }

    pub async fn len(&self) -> Result<usize> {
        let records = self.records.lock().await;
        Ok(records.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
