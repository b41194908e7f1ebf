use serde::Serialize;

use crate::metrics::{format_magnitude, percent, record_opportunity_score, score_band};
use crate::models::{AnalysisRecord, SentimentBreakdown, TrendDirection};

const DEFAULT_TIMELINE: &str = "medium-term";

/// Выводы по одному анализу для страницы результата и JSON отчёта.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisInsights {
    pub key_findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub risk_factors: Vec<String>,
    pub opportunity_score: u8,
    pub market_sentiment: SentimentBreakdown,
}

pub fn analysis_insights(record: &AnalysisRecord) -> AnalysisInsights {
    let sentiment = &record.sentiment;
    let trend = &record.trend_prediction;
    let score = record_opportunity_score(record);

    let sentiment_label = match sentiment.overall_sentiment.as_str() {
        "unknown" => "neutral",
        label => label,
    };
    let trend_label = match trend.predicted_trend {
        TrendDirection::Unknown => "stable",
        other => other.as_str(),
    };

    let key_findings = vec![
        format!(
            "{} shows {} sentiment with {}% confidence",
            record.product,
            sentiment_label,
            percent(sentiment.confidence_score)
        ),
        format!(
            "AI predicts {} trend with {}% probability",
            trend_label,
            percent(trend.confidence)
        ),
        format!(
            "Analysis covers {} data points from {} platforms",
            format_magnitude(sentiment.sample_size),
            record.sources.len()
        ),
        format!(
            "Market confidence score: {}/100 indicating {} investment potential",
            score,
            score_band(score).as_str()
        ),
    ];

    let action = match trend.predicted_trend {
        TrendDirection::Surge => {
            "Strong buy signal - Consider increasing market position and inventory"
        }
        TrendDirection::Drop => "Caution advised - Reduce exposure and monitor closely",
        _ => "Hold position - Maintain current strategy with close monitoring",
    };
    let strengths = if sentiment.key_positive_aspects.is_empty() {
        "Focus on identifying and promoting core value propositions".to_string()
    } else {
        format!("Leverage strengths: {}", top_two(&sentiment.key_positive_aspects))
    };
    let concerns = if sentiment.key_negative_aspects.is_empty() {
        "Monitor emerging market concerns and competitor activities".to_string()
    } else {
        format!("Address concerns: {}", top_two(&sentiment.key_negative_aspects))
    };
    let timeline = if trend.expected_timeline.trim().is_empty() {
        DEFAULT_TIMELINE
    } else {
        trend.expected_timeline.as_str()
    };

    let recommendations = vec![
        action.to_string(),
        strengths,
        concerns,
        format!("Optimal investment window: {} based on trend analysis", timeline),
    ];

    let mut risk_factors = Vec::new();
    if sentiment.confidence_score < 0.7 {
        risk_factors.push("Moderate uncertainty in sentiment analysis".to_string());
    }
    if trend.confidence < 0.6 {
        risk_factors.push("Lower confidence in trend prediction".to_string());
    }
    if sentiment.sample_size < 500 {
        risk_factors.push("Limited data sample may affect accuracy".to_string());
    }
    if sentiment.key_negative_aspects.len() > 3 {
        risk_factors.push("Multiple negative factors identified".to_string());
    }

    AnalysisInsights {
        key_findings,
        recommendations,
        risk_factors,
        opportunity_score: score,
        market_sentiment: sentiment.sentiment_breakdown.clone(),
    }
}

fn top_two(items: &[String]) -> String {
    items.iter().take(2).cloned().collect::<Vec<_>>().join(", ")
}
