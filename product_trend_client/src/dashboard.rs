//! Сводка для главной панели: итоговые показатели, лидеры и активность за неделю.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::metrics::{percent, record_opportunity_score, trend_icon, TrendIcon};
use crate::models::{AnalysisRecord, TrendDirection};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardMetrics {
    pub total_analyses: usize,
    pub positive_trends: usize,
    pub avg_confidence: u32,
    pub total_data_points: u64,
    pub growth_rate: i64,
    pub success_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendingProduct {
    pub product: String,
    pub score: u8,
    pub trend: TrendIcon,
    pub change: i64,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyActivity {
    pub day: String,
    pub analyses: usize,
    pub sentiment: f64,
    pub accuracy: f64,
}

fn age_days(record: &AnalysisRecord, now: DateTime<Utc>) -> Option<f64> {
    record
        .created_at
        .map(|created| (now - created).num_milliseconds() as f64 / 86_400_000.0)
}

pub fn dashboard_metrics(records: &[AnalysisRecord], now: DateTime<Utc>) -> DashboardMetrics {
    let total = records.len();
    let positive_trends = records
        .iter()
        .filter(|r| r.trend_prediction.predicted_trend == TrendDirection::Surge)
        .count();
    let avg_confidence = if total > 0 {
        records.iter().map(|r| r.trend_prediction.confidence).sum::<f64>() / total as f64
    } else {
        0.0
    };
    let total_data_points = records.iter().map(|r| r.sentiment.sample_size).sum();

    // рост: последние 7 дней против предыдущих 7
    let recent = records
        .iter()
        .filter(|r| age_days(r, now).map_or(false, |d| d <= 7.0))
        .count();
    let older = records
        .iter()
        .filter(|r| age_days(r, now).map_or(false, |d| d > 7.0 && d <= 14.0))
        .count();
    let growth_rate = if older > 0 {
        ((recent as f64 - older as f64) / older as f64 * 100.0).round() as i64
    } else if recent > 0 {
        100
    } else {
        0
    };

    DashboardMetrics {
        total_analyses: total,
        positive_trends,
        avg_confidence: percent(avg_confidence),
        total_data_points,
        growth_rate,
        success_rate: percent(avg_confidence),
    }
}

pub fn trending_products(records: &[AnalysisRecord], limit: usize) -> Vec<TrendingProduct> {
    let mut trending: Vec<TrendingProduct> = records
        .iter()
        .map(|r| TrendingProduct {
            product: r.product.clone(),
            score: record_opportunity_score(r),
            trend: trend_icon(r.trend_prediction.predicted_trend),
            change: (r.trend_prediction.confidence * 30.0 - 15.0).round() as i64,
            timestamp: r.timestamp.clone(),
        })
        .collect();
    // sort_by стабильна: при равном счёте сохраняется исходный порядок
    trending.sort_by(|a, b| b.score.cmp(&a.score));
    trending.truncate(limit);
    trending
}

/// Семь дневных корзин от самой старой к сегодняшней.
pub fn weekly_activity(records: &[AnalysisRecord], now: DateTime<Utc>) -> Vec<DailyActivity> {
    let mut buckets: Vec<(usize, f64, f64)> = vec![(0, 0.0, 0.0); 7];
    let today = now.date_naive();

    for record in records {
        let Some(created) = record.created_at else { continue };
        let days_ago = (today - created.date_naive()).num_days();
        if (0..7).contains(&days_ago) {
            let bucket = &mut buckets[6 - days_ago as usize];
            bucket.0 += 1;
            bucket.1 += record.sentiment.confidence_score * 100.0;
            bucket.2 += record.trend_prediction.confidence * 100.0;
        }
    }

    buckets
        .into_iter()
        .enumerate()
        .map(|(index, (count, sentiment, accuracy))| {
            let date = now - Duration::days(6 - index as i64);
            let average = |sum: f64| if count > 0 { sum / count as f64 } else { 0.0 };
            DailyActivity {
                day: date.format("%a").to_string(),
                analyses: count,
                sentiment: average(sentiment),
                accuracy: average(accuracy),
            }
        })
        .collect()
}
