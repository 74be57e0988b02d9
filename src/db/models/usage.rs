//! Database models for usage records and aggregation rows.

use crate::providers::ProviderKind;
use crate::types::{KeyId, ProviderId, UsageRecordId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

/// Database request for inserting one usage record. Self-contained: the
/// recorder computes cost from the rates captured at dispatch time.
#[derive(Debug, Clone)]
pub struct UsageRecordCreateDBRequest {
    pub user_id: UserId,
    pub proxy_key_id: KeyId,
    pub provider_id: ProviderId,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub cost: f64,
    pub request_duration_ms: i64,
    pub status_code: i32,
    pub error_message: String,
}

/// Optional filters shared by every aggregation query.
#[derive(Debug, Clone, Default)]
pub struct UsageFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub provider_id: Option<ProviderId>,
    pub key_id: Option<KeyId>,
    pub model: Option<String>,
}

#[derive(Debug, FromRow)]
pub struct UsageSummaryRow {
    pub total_requests: Option<i64>,
    pub successful_requests: Option<i64>,
    pub failed_requests: Option<i64>,
    pub total_input_tokens: Option<i64>,
    pub total_output_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub total_cost: Option<f64>,
    pub total_duration_ms: Option<i64>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
pub struct DailyUsageRow {
    pub date: Option<NaiveDate>,
    pub requests: Option<i64>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub cost: Option<f64>,
    pub total_duration_ms: Option<i64>,
}

#[derive(Debug, FromRow)]
pub struct UsageByKeyRow {
    pub key_id: KeyId,
    pub key_prefix: Option<String>,
    pub key_name: Option<String>,
    pub requests: Option<i64>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub cost: Option<f64>,
    pub total_duration_ms: Option<i64>,
}

#[derive(Debug, FromRow)]
pub struct UsageByProviderRow {
    pub provider_id: ProviderId,
    pub provider_name: Option<String>,
    pub provider_type: Option<ProviderKind>,
    pub requests: Option<i64>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub cost: Option<f64>,
    pub total_duration_ms: Option<i64>,
}

#[derive(Debug, FromRow)]
pub struct UsageByModelRow {
    pub model: String,
    pub requests: Option<i64>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub cost: Option<f64>,
    pub total_duration_ms: Option<i64>,
}

/// One usage record joined with key / provider display fields.
#[derive(Debug, FromRow)]
pub struct UsageRecordDetailRow {
    pub id: UsageRecordId,
    pub user_id: UserId,
    pub proxy_key_id: KeyId,
    pub provider_id: ProviderId,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub cost: f64,
    pub request_duration_ms: i64,
    pub status_code: i32,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
    pub key_prefix: Option<String>,
    pub provider_name: Option<String>,
    pub provider_type: Option<ProviderKind>,
}

/// Average duration for an aggregate bucket: sum/requests, 0 when empty.
pub fn average_duration_ms(total_duration_ms: i64, requests: i64) -> f64 {
    if requests > 0 {
        total_duration_ms as f64 / requests as f64
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_duration_handles_empty_buckets() {
        assert_eq!(average_duration_ms(0, 0), 0.0);
        assert_eq!(average_duration_ms(300, 3), 100.0);
    }
}
