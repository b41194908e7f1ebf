//! CSV и JSON выгрузка уже загруженных данных. Без сетевых вызовов; одинаковый вход даёт побайтно одинаковый результат.

use chrono::{DateTime, Utc};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use serde::Serialize;

use crate::comparison::{
    build_insights, build_metric_matrix, build_product_matrix, ComparisonInsights, MetricRow,
    ProductMetrics,
};
use crate::errors::{ClientError, Result};
use crate::insights::{analysis_insights, AnalysisInsights};
use crate::metrics::{investment_recommendation, percent, record_opportunity_score, InvestmentRecommendation};
use crate::models::{AnalysisRecord, SentimentLabel, SentimentSummary, TrendDirection, TrendSummary};

pub const CSV_HEADER: [&str; 8] = [
    "Product",
    "Analysis Date",
    "Sentiment",
    "Confidence",
    "Trend",
    "Trend Confidence",
    "Data Points",
    "Sources",
];

const NOT_AVAILABLE: &str = "N/A";

/// Дата анализа для таблиц: "Jan 2, 2024, 10:30 AM" (UTC) или исходная строка.
pub fn format_analysis_date(record: &AnalysisRecord) -> String {
    match record.created_at {
        Some(dt) => dt.format("%b %-d, %Y, %I:%M %p").to_string(),
        None => record.timestamp.clone(),
    }
}

fn sentiment_cell(label: SentimentLabel) -> &'static str {
    match label {
        SentimentLabel::Unknown => NOT_AVAILABLE,
        other => other.as_str(),
    }
}

fn trend_cell(trend: TrendDirection) -> &'static str {
    match trend {
        TrendDirection::Unknown => NOT_AVAILABLE,
        other => other.as_str(),
    }
}

/// Таблица анализов; все поля в кавычках, строка заголовка плюс строка на запись.
pub fn analyses_to_csv(records: &[AnalysisRecord]) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER)?;
    for record in records {
        writer.write_record([
            record.product.clone(),
            format_analysis_date(record),
            sentiment_cell(record.sentiment.overall_sentiment).to_string(),
            format!("{}%", percent(record.sentiment.confidence_score)),
            trend_cell(record.trend_prediction.predicted_trend).to_string(),
            format!("{}%", percent(record.trend_prediction.confidence)),
            record.sentiment.sample_size.to_string(),
            record.sources.join("; "),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ClientError::Unknown(format!("Не удалось завершить CSV: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| ClientError::Unknown(format!("CSV не в UTF-8: {}", e)))
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport<'a> {
    pub product: &'a str,
    pub analysis_date: String,
    pub opportunity_score: u8,
    pub sentiment: &'a SentimentSummary,
    pub trend_prediction: &'a TrendSummary,
    pub ai_insights: AnalysisInsights,
    pub investment_recommendation: InvestmentRecommendation,
}

pub fn analysis_report(record: &AnalysisRecord) -> AnalysisReport<'_> {
    let score = record_opportunity_score(record);
    AnalysisReport {
        product: &record.product,
        analysis_date: record
            .created_at
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| record.timestamp.clone()),
        opportunity_score: score,
        sentiment: &record.sentiment,
        trend_prediction: &record.trend_prediction,
        ai_insights: analysis_insights(record),
        investment_recommendation: investment_recommendation(score),
    }
}

pub fn analysis_report_json(record: &AnalysisRecord) -> Result<String> {
    Ok(serde_json::to_string_pretty(&analysis_report(record))?)
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport<'a> {
    pub products: Vec<&'a str>,
    pub winner: Option<String>,
    pub metrics: Vec<MetricRow>,
    pub product_metrics: Vec<ProductMetrics>,
    pub insights: ComparisonInsights,
    pub records: &'a [AnalysisRecord],
}

pub fn comparison_report(records: &[AnalysisRecord]) -> ComparisonReport<'_> {
    let insights = build_insights(records);
    ComparisonReport {
        products: records.iter().map(|r| r.product.as_str()).collect(),
        winner: insights.winner.clone(),
        metrics: build_metric_matrix(records),
        product_metrics: build_product_matrix(records),
        insights,
        records,
    }
}

pub fn comparison_report_json(records: &[AnalysisRecord]) -> Result<String> {
    Ok(serde_json::to_string_pretty(&comparison_report(records))?)
}

pub fn csv_file_name(today: DateTime<Utc>) -> String {
    format!("all_analyses_{}.csv", today.format("%Y-%m-%d"))
}

pub fn report_file_name(product: &str) -> String {
    let safe: String = product
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}_investment_report.json", safe)
}
