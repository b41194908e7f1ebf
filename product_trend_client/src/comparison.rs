//! Сравнение продуктов: выбор, матрицы метрик и выводы.

use serde::Serialize;

use crate::errors::{ClientError, Result};
use crate::metrics::record_opportunity_score;
use crate::models::{AnalysisRecord, SentimentLabel, TrendDirection};

pub const MAX_COMPARED_PRODUCTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionChange {
    Added,
    AlreadySelected,
    LimitReached,
}

/// Упорядоченный набор сравниваемых продуктов, не более пяти.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComparisonSelection {
    names: Vec<String>,
}

impl ComparisonSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Шестой продукт не добавляется; это не ошибка, но результат `LimitReached` и предупреждение в логе.
    pub fn add(&mut self, name: &str) -> Result<SelectionChange> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClientError::Validation(
                "Product name cannot be empty".to_string(),
            ));
        }
        if self.names.iter().any(|n| n == name) {
            return Ok(SelectionChange::AlreadySelected);
        }
        if self.names.len() >= MAX_COMPARED_PRODUCTS {
            tracing::warn!(
                "Продукт {} не добавлен: уже выбрано {} продуктов",
                name,
                MAX_COMPARED_PRODUCTS
            );
            return Ok(SelectionChange::LimitReached);
        }
        self.names.push(name.to_string());
        Ok(SelectionChange::Added)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.names.len();
        self.names.retain(|n| n != name.trim());
        before != self.names.len()
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.names.len() >= MAX_COMPARED_PRODUCTS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    SentimentScore,
    TrendConfidence,
    SampleSize,
    OpportunityScore,
    ModelAccuracy,
}

impl MetricKey {
    pub const ALL: [MetricKey; 5] = [
        MetricKey::SentimentScore,
        MetricKey::TrendConfidence,
        MetricKey::SampleSize,
        MetricKey::OpportunityScore,
        MetricKey::ModelAccuracy,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            MetricKey::SentimentScore => "Sentiment Score",
            MetricKey::TrendConfidence => "Trend Confidence",
            MetricKey::SampleSize => "Sample Size",
            MetricKey::OpportunityScore => "Opportunity Score",
            MetricKey::ModelAccuracy => "Model Accuracy",
        }
    }

    /// Значение метрики в шкале 0..100 для графиков.
    pub fn value(&self, record: &AnalysisRecord) -> f64 {
        match self {
            MetricKey::SentimentScore => record.sentiment.confidence_score * 100.0,
            MetricKey::TrendConfidence => record.trend_prediction.confidence * 100.0,
            // сжатие только для отображения
            MetricKey::SampleSize => (record.sentiment.sample_size as f64 / 10.0).min(100.0),
            MetricKey::OpportunityScore => record_opportunity_score(record) as f64,
            MetricKey::ModelAccuracy => record.forecast.confidence * 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductValue {
    pub product: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub key: MetricKey,
    pub name: String,
    pub values: Vec<ProductValue>,
}

impl MetricRow {
    pub fn value_for(&self, product: &str) -> Option<i64> {
        self.values.iter().find(|v| v.product == product).map(|v| v.value)
    }
}

/// Одна строка на метрику, по значению на каждый продукт в порядке записей.
pub fn build_metric_matrix(records: &[AnalysisRecord]) -> Vec<MetricRow> {
    MetricKey::ALL
        .iter()
        .map(|key| MetricRow {
            key: *key,
            name: key.display_name().to_string(),
            values: records
                .iter()
                .map(|record| ProductValue {
                    product: record.product.clone(),
                    value: key.value(record).round() as i64,
                })
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductMetrics {
    pub product: String,
    pub sentiment: f64,
    pub trend: f64,
    pub sample: f64,
    pub opportunity: f64,
}

pub fn build_product_matrix(records: &[AnalysisRecord]) -> Vec<ProductMetrics> {
    records
        .iter()
        .map(|record| ProductMetrics {
            product: record.product.clone(),
            sentiment: MetricKey::SentimentScore.value(record),
            trend: MetricKey::TrendConfidence.value(record),
            sample: MetricKey::SampleSize.value(record),
            opportunity: MetricKey::OpportunityScore.value(record),
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductInsight {
    pub product: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComparisonInsights {
    pub winner: Option<String>,
    pub products: Vec<ProductInsight>,
    pub recommendations: Vec<String>,
}

impl ComparisonInsights {
    pub fn for_product(&self, product: &str) -> Option<&ProductInsight> {
        self.products.iter().find(|p| p.product == product)
    }
}

pub fn build_insights(records: &[AnalysisRecord]) -> ComparisonInsights {
    let mut winner: Option<(&str, u8)> = None;
    let mut products = Vec::with_capacity(records.len());

    for record in records {
        let score = record_opportunity_score(record);
        // при равенстве побеждает первый
        if winner.map_or(true, |(_, best)| score > best) {
            winner = Some((record.product.as_str(), score));
        }

        let sentiment = &record.sentiment;
        let trend = &record.trend_prediction;
        let mut insight = ProductInsight {
            product: record.product.clone(),
            ..Default::default()
        };

        if sentiment.confidence_score > 0.8 {
            insight.strengths.push("High sentiment confidence".to_string());
        }
        if trend.confidence > 0.8 {
            insight.strengths.push("Strong trend prediction".to_string());
        }
        if sentiment.sample_size > 1000 {
            insight.strengths.push("Large data sample".to_string());
        }

        if sentiment.confidence_score < 0.6 {
            insight.weaknesses.push("Low sentiment confidence".to_string());
        }
        if trend.predicted_trend == TrendDirection::Drop {
            insight.weaknesses.push("Declining trend predicted".to_string());
        }
        if sentiment.sample_size < 100 {
            insight.weaknesses.push("Limited data available".to_string());
        }

        products.push(insight);
    }

    let winner = winner.map(|(name, _)| name.to_string());
    let mut recommendations = Vec::new();

    if records.len() > 1 {
        if let Some(best) = &winner {
            recommendations.push(format!("{} shows the highest overall performance score", best));
        }

        let positive = joined_products(records, |r| {
            r.sentiment.overall_sentiment == SentimentLabel::Positive
        });
        if let Some(names) = positive {
            recommendations.push(format!("Focus on products with positive sentiment: {}", names));
        }

        let surging = joined_products(records, |r| {
            r.trend_prediction.predicted_trend == TrendDirection::Surge
        });
        if let Some(names) = surging {
            recommendations.push(format!(
                "Consider increasing investment in trending products: {}",
                names
            ));
        }
    }

    ComparisonInsights {
        winner,
        products,
        recommendations,
    }
}

fn joined_products(
    records: &[AnalysisRecord],
    predicate: impl Fn(&AnalysisRecord) -> bool,
) -> Option<String> {
    let names: Vec<&str> = records
        .iter()
        .filter(|r| predicate(r))
        .map(|r| r.product.as_str())
        .collect();
    (!names.is_empty()).then(|| names.join(", "))
}
