use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Перечисления
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
    #[default]
    Unknown,
}

impl SentimentLabel {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "positive" => SentimentLabel::Positive,
            "negative" => SentimentLabel::Negative,
            "neutral" => SentimentLabel::Neutral,
            _ => SentimentLabel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Surge,
    Drop,
    Stable,
    #[default]
    Unknown,
}

impl TrendDirection {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "surge" => TrendDirection::Surge,
            "drop" => TrendDirection::Drop,
            "stable" => TrendDirection::Stable,
            _ => TrendDirection::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Surge => "surge",
            TrendDirection::Drop => "drop",
            TrendDirection::Stable => "stable",
            TrendDirection::Unknown => "unknown",
        }
    }
}

// ---------------------------------------------------------------------------
// Формат ответа бэкенда: все поля необязательны
// ---------------------------------------------------------------------------

/// Конверт `{success, data, message}` всех ответов API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSentiment {
    pub overall_sentiment: Option<String>,
    pub confidence_score: Option<f64>,
    pub sample_size: Option<f64>,
    pub sentiment_breakdown: Option<BTreeMap<String, f64>>,
    pub key_positive_aspects: Option<Vec<String>>,
    pub key_negative_aspects: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTrendPrediction {
    pub predicted_trend: Option<String>,
    pub confidence: Option<f64>,
    pub reasoning: Option<String>,
    pub factors: Option<Vec<String>>,
    pub expected_timeline: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawForecastPoint {
    pub ds: Option<String>,
    pub yhat: Option<f64>,
    pub yhat_lower: Option<f64>,
    pub yhat_upper: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSalesForecast {
    pub forecast: Option<Vec<RawForecastPoint>>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawData {
    pub sources_used: Option<Vec<String>>,
    pub sales_forecast: Option<RawSalesForecast>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTrendPoint {
    pub date: Option<String>,
    pub value: Option<f64>,
    pub sentiment: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAnalysis {
    pub id: Option<String>,
    pub analysis_id: Option<String>,
    pub product: Option<String>,
    pub timestamp: Option<String>,
    pub sentiment: Option<RawSentiment>,
    pub trend_prediction: Option<RawTrendPrediction>,
    pub sources_used: Option<Vec<String>>,
    pub source_breakdown: Option<BTreeMap<String, f64>>,
    pub trend_data: Option<Vec<RawTrendPoint>>,
    pub raw_data: Option<RawData>,
}

// ---------------------------------------------------------------------------
// Нормализованная модель
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SentimentBreakdown {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SentimentSummary {
    pub overall_sentiment: SentimentLabel,
    pub confidence_score: f64,
    pub sample_size: u64,
    pub sentiment_breakdown: SentimentBreakdown,
    pub key_positive_aspects: Vec<String>,
    pub key_negative_aspects: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrendSummary {
    pub predicted_trend: TrendDirection,
    pub confidence: f64,
    pub reasoning: String,
    pub factors: Vec<String>,
    pub expected_timeline: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: String,
    pub value: f64,
    pub sentiment: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub ds: String,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SalesForecast {
    pub points: Vec<ForecastPoint>,
    pub confidence: f64,
}

/// Завершённый анализ продукта после нормализации.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub product: String,
    pub timestamp: String,
    #[serde(skip)]
    pub created_at: Option<DateTime<Utc>>,
    pub sentiment: SentimentSummary,
    pub trend_prediction: TrendSummary,
    pub sources: Vec<String>,
    pub source_breakdown: BTreeMap<String, u64>,
    pub trend_data: Vec<TrendPoint>,
    pub forecast: SalesForecast,
}

pub const UNKNOWN_PRODUCT: &str = "Unknown Product";

fn unit_interval(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

fn finite(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

fn count(value: Option<f64>) -> u64 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v.round() as u64,
        _ => 0,
    }
}

/// Разбор времени анализа: RFC 3339, ISO 8601 без зоны (считается UTC) или просто дата.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

impl From<RawSentiment> for SentimentSummary {
    fn from(raw: RawSentiment) -> Self {
        let breakdown = raw.sentiment_breakdown.unwrap_or_default();
        let share = |key: &str| finite(breakdown.get(key).copied());
        SentimentSummary {
            overall_sentiment: raw
                .overall_sentiment
                .as_deref()
                .map(SentimentLabel::parse)
                .unwrap_or_default(),
            confidence_score: unit_interval(raw.confidence_score),
            sample_size: count(raw.sample_size),
            sentiment_breakdown: SentimentBreakdown {
                positive: share("positive"),
                negative: share("negative"),
                neutral: share("neutral"),
            },
            key_positive_aspects: raw.key_positive_aspects.unwrap_or_default(),
            key_negative_aspects: raw.key_negative_aspects.unwrap_or_default(),
        }
    }
}

impl From<RawTrendPrediction> for TrendSummary {
    fn from(raw: RawTrendPrediction) -> Self {
        TrendSummary {
            predicted_trend: raw
                .predicted_trend
                .as_deref()
                .map(TrendDirection::parse)
                .unwrap_or_default(),
            confidence: unit_interval(raw.confidence),
            reasoning: raw.reasoning.unwrap_or_default(),
            factors: raw.factors.unwrap_or_default(),
            expected_timeline: raw.expected_timeline.unwrap_or_default(),
        }
    }
}

impl RawAnalysis {
    /// Единственная точка нормализации: дальше по коду значения по умолчанию не вычисляются.
    pub fn normalize(self) -> AnalysisRecord {
        let raw_data = self.raw_data.unwrap_or_default();
        let source_breakdown: BTreeMap<String, u64> = self
            .source_breakdown
            .unwrap_or_default()
            .into_iter()
            .map(|(source, n)| (source, count(Some(n))))
            .collect();

        let sources = self
            .sources_used
            .or(raw_data.sources_used)
            .unwrap_or_else(|| source_breakdown.keys().cloned().collect());

        let forecast = raw_data
            .sales_forecast
            .map(|f| SalesForecast {
                points: f
                    .forecast
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| ForecastPoint {
                        ds: p.ds.unwrap_or_default(),
                        yhat: finite(p.yhat),
                        yhat_lower: finite(p.yhat_lower),
                        yhat_upper: finite(p.yhat_upper),
                    })
                    .collect(),
                confidence: unit_interval(f.confidence),
            })
            .unwrap_or_default();

        let trend_data = self
            .trend_data
            .unwrap_or_default()
            .into_iter()
            .map(|p| TrendPoint {
                date: p.date.unwrap_or_default(),
                value: finite(p.value),
                sentiment: p.sentiment.filter(|v| v.is_finite()),
            })
            .collect();

        let product = self
            .product
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| UNKNOWN_PRODUCT.to_string());

        let timestamp = self.timestamp.unwrap_or_default();
        let created_at = parse_timestamp(&timestamp);

        AnalysisRecord {
            id: self.id.or(self.analysis_id).unwrap_or_default(),
            product,
            timestamp,
            created_at,
            sentiment: self.sentiment.map(SentimentSummary::from).unwrap_or_default(),
            trend_prediction: self.trend_prediction.map(TrendSummary::from).unwrap_or_default(),
            sources,
            source_breakdown,
            trend_data,
            forecast,
        }
    }
}

/// Нормализация списка из ответа API; элементы, которые нельзя разобрать, пропускаются.
pub fn normalize_records(items: Vec<Value>) -> Vec<AnalysisRecord> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value::<RawAnalysis>(item) {
            Ok(raw) => Some(raw.normalize()),
            Err(e) => {
                tracing::warn!("Пропущена запись анализа #{}: {}", index, e);
                None
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Запросы и профиль
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalysisRequest {
    pub product: String,
    pub time_range: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProfileUser {
    pub email: String,
    pub name: String,
    pub join_date: String,
    pub plan: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProfileStats {
    pub analyses: u64,
    pub products: u64,
    pub reports: u64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Achievement {
    pub title: String,
    pub description: String,
    pub icon: String,
    pub earned: bool,
    pub progress: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActivityEntry {
    pub action: String,
    pub time: String,
    pub accuracy: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Usage {
    pub api_calls: u64,
    pub storage_used: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserProfile {
    pub user: ProfileUser,
    pub stats: ProfileStats,
    pub achievements: Vec<Achievement>,
    pub recent_activity: Vec<ActivityEntry>,
    pub usage: Usage,
}
