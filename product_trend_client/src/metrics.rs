//! Производные метрики анализа: чистые функции без побочных эффектов.

use serde::Serialize;

use crate::models::{AnalysisRecord, TrendDirection};

/// Итоговая оценка возможности 0..=100.
///
/// `round((sentiment_confidence + trend_confidence) * 50)`, отсутствующие
/// значения считаются нулём. Это единственная формула, используемая во всех
/// представлениях: списке, сравнении и отчётах.
pub fn opportunity_score(sentiment_confidence: f64, trend_confidence: f64) -> u8 {
    let s = if sentiment_confidence.is_finite() { sentiment_confidence } else { 0.0 };
    let t = if trend_confidence.is_finite() { trend_confidence } else { 0.0 };
    ((s + t) * 50.0).round().clamp(0.0, 100.0) as u8
}

pub fn record_opportunity_score(record: &AnalysisRecord) -> u8 {
    opportunity_score(
        record.sentiment.confidence_score,
        record.trend_prediction.confidence,
    )
}

/// Доля 0..1 в целых процентах.
pub fn percent(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    (value * 100.0).round().max(0.0) as u32
}

/// 1_500_000 -> "1.5M", 2_300 -> "2.3K", 999 -> "999".
pub fn format_magnitude(value: u64) -> String {
    if value >= 1_000_000 {
        format!("{:.1}M", value as f64 / 1_000_000.0)
    } else if value >= 1_000 {
        format!("{:.1}K", value as f64 / 1_000.0)
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendIcon {
    Up,
    Down,
    Flat,
}

pub fn trend_icon(trend: TrendDirection) -> TrendIcon {
    match trend {
        TrendDirection::Surge => TrendIcon::Up,
        TrendDirection::Drop => TrendIcon::Down,
        TrendDirection::Stable | TrendDirection::Unknown => TrendIcon::Flat,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreBand {
    High,
    Moderate,
    Low,
}

impl ScoreBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreBand::High => "high",
            ScoreBand::Moderate => "moderate",
            ScoreBand::Low => "low",
        }
    }
}

pub fn score_band(score: u8) -> ScoreBand {
    match score {
        70..=u8::MAX => ScoreBand::High,
        50..=69 => ScoreBand::Moderate,
        _ => ScoreBand::Low,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvestmentRecommendation {
    Buy,
    Hold,
    Monitor,
}

pub fn investment_recommendation(score: u8) -> InvestmentRecommendation {
    match score_band(score) {
        ScoreBand::High => InvestmentRecommendation::Buy,
        ScoreBand::Moderate => InvestmentRecommendation::Hold,
        ScoreBand::Low => InvestmentRecommendation::Monitor,
    }
}
