use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::api::ApiClient;
use crate::errors::{ClientError, Result};
use crate::export::analyses_to_csv;
use crate::holders::AnalysisHolder;
use crate::metrics::record_opportunity_score;
use crate::models::{AnalysisRecord, SentimentLabel, TrendDirection};
use crate::sequence::{InFlight, RequestSequence};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrendFilter {
    #[default]
    All,
    Surge,
    Drop,
    Stable,
}

impl TrendFilter {
    fn matches(&self, trend: TrendDirection) -> bool {
        match self {
            TrendFilter::All => true,
            TrendFilter::Surge => trend == TrendDirection::Surge,
            TrendFilter::Drop => trend == TrendDirection::Drop,
            TrendFilter::Stable => trend == TrendDirection::Stable,
        }
    }
}

impl FromStr for TrendFilter {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(TrendFilter::All),
            "surge" => Ok(TrendFilter::Surge),
            "drop" => Ok(TrendFilter::Drop),
            "stable" => Ok(TrendFilter::Stable),
            other => Err(ClientError::Validation(format!("Unknown trend filter: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SentimentFilter {
    #[default]
    All,
    Positive,
    Negative,
    Neutral,
}

impl SentimentFilter {
    fn matches(&self, label: SentimentLabel) -> bool {
        match self {
            SentimentFilter::All => true,
            SentimentFilter::Positive => label == SentimentLabel::Positive,
            SentimentFilter::Negative => label == SentimentLabel::Negative,
            SentimentFilter::Neutral => label == SentimentLabel::Neutral,
        }
    }
}

impl FromStr for SentimentFilter {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(SentimentFilter::All),
            "positive" => Ok(SentimentFilter::Positive),
            "negative" => Ok(SentimentFilter::Negative),
            "neutral" => Ok(SentimentFilter::Neutral),
            other => Err(ClientError::Validation(format!(
                "Unknown sentiment filter: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Timestamp,
    Product,
    Score,
    Sentiment,
}

impl FromStr for SortKey {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "timestamp" | "date" => Ok(SortKey::Timestamp),
            "product" => Ok(SortKey::Product),
            "score" => Ok(SortKey::Score),
            "sentiment" => Ok(SortKey::Sentiment),
            other => Err(ClientError::Validation(format!("Unknown sort key: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortDirection {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(ClientError::Validation(format!("Unknown sort direction: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    pub search: String,
    pub trend: TrendFilter,
    pub sentiment: SentimentFilter,
}

impl ListFilter {
    pub fn is_active(&self) -> bool {
        !self.search.trim().is_empty()
            || self.trend != TrendFilter::All
            || self.sentiment != SentimentFilter::All
    }

    pub fn matches(&self, record: &AnalysisRecord) -> bool {
        let term = self.search.trim().to_lowercase();
        let label = record.sentiment.overall_sentiment;
        let label_text = match label {
            SentimentLabel::Unknown => "",
            other => other.as_str(),
        };
        let search_ok = term.is_empty()
            || record.product.to_lowercase().contains(&term)
            || label_text.contains(&term);

        search_ok
            && self.trend.matches(record.trend_prediction.predicted_trend)
            && self.sentiment.matches(label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDirection,
}

fn compare_by_key(a: &AnalysisRecord, b: &AnalysisRecord, key: SortKey) -> Ordering {
    match key {
        // None < Some: непарсящиеся даты идут раньше любых корректных
        SortKey::Timestamp => a.created_at.cmp(&b.created_at),
        SortKey::Product => a.product.to_lowercase().cmp(&b.product.to_lowercase()),
        SortKey::Score => record_opportunity_score(a).cmp(&record_opportunity_score(b)),
        SortKey::Sentiment => sentiment_sort_text(a).cmp(sentiment_sort_text(b)),
    }
}

fn sentiment_sort_text(record: &AnalysisRecord) -> &'static str {
    match record.sentiment.overall_sentiment {
        SentimentLabel::Unknown => "",
        other => other.as_str(),
    }
}

/// Отфильтрованное и отсортированное представление. При равенстве ключа порядок задаёт `id` по возрастанию.
pub fn apply_view(records: &[AnalysisRecord], filter: &ListFilter, sort: SortSpec) -> Vec<AnalysisRecord> {
    let mut visible: Vec<AnalysisRecord> = records
        .iter()
        .filter(|r| filter.matches(r))
        .cloned()
        .collect();

    visible.sort_by(|a, b| {
        let primary = compare_by_key(a, b, sort.key);
        let primary = match sort.direction {
            SortDirection::Asc => primary,
            SortDirection::Desc => primary.reverse(),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    });
    visible
}

/// Подтверждение удаления; вызывается до отправки запроса.
pub trait Confirmation {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirmation for F {
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Applied(usize),
    /// Ответ устарел: после начала запроса коллекция уже изменилась.
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Deleted(AnalysisRecord),
    Cancelled,
}

#[derive(Debug, Clone, Default)]
struct ViewState {
    filter: ListFilter,
    sort: SortSpec,
    last_error: Option<String>,
}

/// История анализов пользователя: загрузка, фильтры, сортировка, удаление и выгрузка.
#[derive(Clone)]
pub struct AnalysisHistoryService {
    api: ApiClient,
    holder: AnalysisHolder,
    view: Arc<Mutex<ViewState>>,
    sequence: RequestSequence,
    deleting: InFlight,
    limit: usize,
}

impl AnalysisHistoryService {
    pub fn new(api: ApiClient, holder: AnalysisHolder, limit: usize) -> Self {
        AnalysisHistoryService {
            api,
            holder,
            view: Arc::new(Mutex::new(ViewState::default())),
            sequence: RequestSequence::new(),
            deleting: InFlight::new(),
            limit,
        }
    }

    pub fn holder(&self) -> &AnalysisHolder {
        &self.holder
    }

    pub async fn load(&self) -> Result<LoadOutcome> {
        let ticket = self.sequence.begin();
        tracing::info!("Загрузка истории анализов (limit={})", self.limit);

        let records = match self.api.list_analyses(self.limit).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Ошибка загрузки истории: {}", e);
                let mut view = self.view.lock().await;
                // ошибка устаревшего запроса не затирает более свежие данные
                if self.sequence.is_stale(ticket) {
                    tracing::warn!("Ошибка запроса истории #{} устарела и не показывается", ticket.value());
                } else {
                    view.last_error = Some(e.user_message());
                }
                return Err(e);
            }
        };

        let count = records.len();
        let sequence = self.sequence.clone();
        let applied = self
            .holder
            .replace_if(records, move || sequence.try_apply(ticket))
            .await?;

        if !applied {
            tracing::warn!("Ответ истории #{} устарел и отброшен", ticket.value());
            return Ok(LoadOutcome::Superseded);
        }

        self.view.lock().await.last_error = None;
        tracing::info!("Загружено {} анализов", count);
        Ok(LoadOutcome::Applied(count))
    }

    pub async fn set_filter(&self, search: &str, trend: TrendFilter, sentiment: SentimentFilter) {
        let mut view = self.view.lock().await;
        view.filter = ListFilter {
            search: search.to_string(),
            trend,
            sentiment,
        };
    }

    pub async fn clear_filters(&self) {
        self.view.lock().await.filter = ListFilter::default();
    }

    pub async fn has_active_filters(&self) -> bool {
        self.view.lock().await.filter.is_active()
    }

    pub async fn sort_by(&self, key: SortKey, direction: SortDirection) {
        self.view.lock().await.sort = SortSpec { key, direction };
    }

    pub async fn visible(&self) -> Result<Vec<AnalysisRecord>> {
        let records = self.holder.get().await?;
        let view = self.view.lock().await;
        Ok(apply_view(&records, &view.filter, view.sort))
    }

    /// (видимые, всего)
    pub async fn counts(&self) -> Result<(usize, usize)> {
        Ok((self.visible().await?.len(), self.holder.len().await?))
    }

    pub async fn last_error(&self) -> Option<String> {
        self.view.lock().await.last_error.clone()
    }

    pub async fn delete(&self, id: &str, confirmation: &dyn Confirmation) -> Result<DeleteOutcome> {
        let record = self
            .holder
            .find(id)
            .await?
            .ok_or_else(|| ClientError::NotFound(format!("Analysis {} not found", id)))?;

        let prompt = format!(
            "Are you sure you want to delete the analysis of {}?",
            record.product
        );
        if !confirmation.confirm(&prompt) {
            tracing::debug!("Удаление {} отменено пользователем", id);
            return Ok(DeleteOutcome::Cancelled);
        }

        let _guard = self
            .deleting
            .try_enter()
            .ok_or_else(|| ClientError::Busy("delete".to_string()))?;
        let ticket = self.sequence.begin();

        if let Err(e) = self.api.delete_analysis(id).await {
            tracing::error!("Не удалось удалить анализ {}: {}", id, e);
            self.view.lock().await.last_error = Some(e.user_message());
            return Err(e);
        }

        let sequence = self.sequence.clone();
        let removed = self
            .holder
            .remove_then(id, move || {
                sequence.try_apply(ticket);
            })
            .await;

        Ok(DeleteOutcome::Deleted(removed.unwrap_or(record)))
    }

    /// CSV текущего видимого представления, а не всей коллекции.
    pub async fn export_csv(&self) -> Result<String> {
        let visible = self.visible().await?;
        analyses_to_csv(&visible)
    }
}
