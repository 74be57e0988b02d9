//! API request/response models for usage queries.

use crate::db::models::usage::{
    average_duration_ms, DailyUsageRow, UsageByKeyRow, UsageByModelRow, UsageByProviderRow, UsageFilter,
    UsageRecordDetailRow, UsageSummaryRow,
};
use crate::providers::ProviderKind;
use crate::types::{KeyId, ProviderId, UsageRecordId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_RECENT_LIMIT: i64 = 50;
pub const MAX_RECENT_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct UsageQuery {
    /// Inclusive lower bound on created_at
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on created_at
    pub end_date: Option<DateTime<Utc>>,
    #[param(value_type = Option<String>)]
    #[schema(value_type = Option<String>)]
    pub provider_id: Option<ProviderId>,
    #[param(value_type = Option<String>)]
    #[schema(value_type = Option<String>)]
    pub key_id: Option<KeyId>,
    pub model: Option<String>,
    #[param(default = 50, minimum = 1, maximum = 100)]
    pub limit: Option<i64>,
    #[param(default = 0, minimum = 0)]
    pub offset: Option<i64>,
}

impl UsageQuery {
    pub fn filter(&self) -> UsageFilter {
        UsageFilter {
            start: self.start_date,
            end: self.end_date,
            provider_id: self.provider_id,
            key_id: self.key_id,
            model: self.model.clone(),
        }
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_RECENT_LIMIT).clamp(1, MAX_RECENT_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UsageSummaryResponse {
    pub total_requests: i64,
    pub successful_requests: i64,
    pub failed_requests: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_tokens: i64,
    pub total_cost: f64,
    pub average_duration_ms: f64,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

impl From<UsageSummaryRow> for UsageSummaryResponse {
    fn from(row: UsageSummaryRow) -> Self {
        let total_requests = row.total_requests.unwrap_or(0);
        Self {
            total_requests,
            successful_requests: row.successful_requests.unwrap_or(0),
            failed_requests: row.failed_requests.unwrap_or(0),
            total_input_tokens: row.total_input_tokens.unwrap_or(0),
            total_output_tokens: row.total_output_tokens.unwrap_or(0),
            total_tokens: row.total_tokens.unwrap_or(0),
            total_cost: row.total_cost.unwrap_or(0.0),
            average_duration_ms: average_duration_ms(row.total_duration_ms.unwrap_or(0), total_requests),
            period_start: row.period_start,
            period_end: row.period_end,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DailyUsageResponse {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub requests: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub cost: f64,
    pub average_duration_ms: f64,
}

impl DailyUsageResponse {
    pub fn from_row(row: DailyUsageRow) -> Option<Self> {
        let requests = row.requests.unwrap_or(0);
        row.date.map(|date| Self {
            date,
            requests,
            input_tokens: row.input_tokens.unwrap_or(0),
            output_tokens: row.output_tokens.unwrap_or(0),
            total_tokens: row.total_tokens.unwrap_or(0),
            cost: row.cost.unwrap_or(0.0),
            average_duration_ms: average_duration_ms(row.total_duration_ms.unwrap_or(0), requests),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UsageByKeyResponse {
    #[schema(value_type = String, format = "uuid")]
    pub key_id: KeyId,
    pub key_prefix: String,
    pub key_name: String,
    pub requests: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub cost: f64,
    pub average_duration_ms: f64,
}

impl From<UsageByKeyRow> for UsageByKeyResponse {
    fn from(row: UsageByKeyRow) -> Self {
        let requests = row.requests.unwrap_or(0);
        Self {
            key_id: row.key_id,
            key_prefix: row.key_prefix.unwrap_or_default(),
            key_name: row.key_name.unwrap_or_default(),
            requests,
            input_tokens: row.input_tokens.unwrap_or(0),
            output_tokens: row.output_tokens.unwrap_or(0),
            total_tokens: row.total_tokens.unwrap_or(0),
            cost: row.cost.unwrap_or(0.0),
            average_duration_ms: average_duration_ms(row.total_duration_ms.unwrap_or(0), requests),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UsageByProviderResponse {
    #[schema(value_type = String, format = "uuid")]
    pub provider_id: ProviderId,
    /// Empty when the provider has since been deleted.
    pub provider_name: String,
    pub provider_type: Option<ProviderKind>,
    pub requests: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub cost: f64,
    pub average_duration_ms: f64,
}

impl From<UsageByProviderRow> for UsageByProviderResponse {
    fn from(row: UsageByProviderRow) -> Self {
        let requests = row.requests.unwrap_or(0);
        Self {
            provider_id: row.provider_id,
            provider_name: row.provider_name.unwrap_or_default(),
            provider_type: row.provider_type,
            requests,
            input_tokens: row.input_tokens.unwrap_or(0),
            output_tokens: row.output_tokens.unwrap_or(0),
            total_tokens: row.total_tokens.unwrap_or(0),
            cost: row.cost.unwrap_or(0.0),
            average_duration_ms: average_duration_ms(row.total_duration_ms.unwrap_or(0), requests),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UsageByModelResponse {
    pub model: String,
    pub requests: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub cost: f64,
    pub average_duration_ms: f64,
}

impl From<UsageByModelRow> for UsageByModelResponse {
    fn from(row: UsageByModelRow) -> Self {
        let requests = row.requests.unwrap_or(0);
        Self {
            model: row.model,
            requests,
            input_tokens: row.input_tokens.unwrap_or(0),
            output_tokens: row.output_tokens.unwrap_or(0),
            total_tokens: row.total_tokens.unwrap_or(0),
            cost: row.cost.unwrap_or(0.0),
            average_duration_ms: average_duration_ms(row.total_duration_ms.unwrap_or(0), requests),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UsageRecordResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UsageRecordId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub proxy_key_id: KeyId,
    #[schema(value_type = String, format = "uuid")]
    pub provider_id: ProviderId,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub cost: f64,
    pub request_duration_ms: i64,
    pub status_code: i32,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub error_message: String,
    pub created_at: DateTime<Utc>,
    pub key_prefix: String,
    pub provider_name: String,
    pub provider_type: Option<ProviderKind>,
}

impl From<UsageRecordDetailRow> for UsageRecordResponse {
    fn from(row: UsageRecordDetailRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            proxy_key_id: row.proxy_key_id,
            provider_id: row.provider_id,
            model: row.model,
            input_tokens: row.input_tokens,
            output_tokens: row.output_tokens,
            total_tokens: row.total_tokens,
            cost: row.cost,
            request_duration_ms: row.request_duration_ms,
            status_code: row.status_code,
            error_message: row.error_message,
            created_at: row.created_at,
            key_prefix: row.key_prefix.unwrap_or_default(),
            provider_name: row.provider_name.unwrap_or_default(),
            provider_type: row.provider_type,
        }
    }
}

/// Newest-first page of records plus the total for pagination.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecentUsageResponse {
    pub records: Vec<UsageRecordResponse>,
    pub total_count: i64,
    pub limit: i64,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_caps() {
        let query = UsageQuery::default();
        assert_eq!(query.limit(), DEFAULT_RECENT_LIMIT);

        let query = UsageQuery {
            limit: Some(500),
            ..Default::default()
        };
        assert_eq!(query.limit(), MAX_RECENT_LIMIT);

        let query = UsageQuery {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(query.limit(), 1);
    }

    #[test]
    fn summary_average_from_totals() {
        let response = UsageSummaryResponse::from(UsageSummaryRow {
            total_requests: Some(4),
            successful_requests: Some(3),
            failed_requests: Some(1),
            total_input_tokens: Some(100),
            total_output_tokens: Some(50),
            total_tokens: Some(150),
            total_cost: Some(0.5),
            total_duration_ms: Some(1000),
            period_start: None,
            period_end: None,
        });
        assert_eq!(response.average_duration_ms, 250.0);
    }

    #[test]
    fn empty_summary_is_all_zeroes() {
        let response = UsageSummaryResponse::from(UsageSummaryRow {
            total_requests: Some(0),
            successful_requests: Some(0),
            failed_requests: Some(0),
            total_input_tokens: Some(0),
            total_output_tokens: Some(0),
            total_tokens: Some(0),
            total_cost: Some(0.0),
            total_duration_ms: Some(0),
            period_start: None,
            period_end: None,
        });
        assert_eq!(response.average_duration_ms, 0.0);
        assert_eq!(response.total_requests, 0);
    }
}
