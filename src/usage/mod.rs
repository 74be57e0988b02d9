//! Asynchronous usage recording.
//!
//! Every proxied request that reaches dispatch carries a [`UsageReceipt`].
//! Completion writes the row through a fire-and-forget task so the response
//! path never blocks on the database; dropping an uncompleted receipt (the
//! client hung up mid-flight) records the attempt as cancelled.

use crate::db::handlers::usage as usage_db;
use crate::db::models::usage::UsageRecordCreateDBRequest;
use crate::proxy::sse::TokenUsage;
use crate::types::{KeyId, ProviderId, UserId};
use sqlx::PgPool;
use std::time::Instant;

/// Cost in USD for a token count at per-million rates captured when the
/// request was dispatched.
pub fn compute_cost(input_tokens: i64, output_tokens: i64, input_rate: f64, output_rate: f64) -> f64 {
    input_tokens as f64 / 1_000_000.0 * input_rate + output_tokens as f64 / 1_000_000.0 * output_rate
}

/// Handle for scheduling usage writes off the request path.
#[derive(Clone)]
pub struct UsageRecorder {
    db: PgPool,
}

impl UsageRecorder {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Fire-and-forget persistence. On failure the row is logged and
    /// dropped; there is no retry queue.
    pub fn record_async(&self, request: UsageRecordCreateDBRequest) {
        let db = self.db.clone();
        tokio::spawn(async move {
            if let Err(e) = usage_db::insert_record(&db, &request).await {
                tracing::warn!(error = %e, model = %request.model, "failed to record usage");
            }
        });
    }
}

/// The identity and pricing context for one proxied request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: UserId,
    pub proxy_key_id: KeyId,
    pub provider_id: ProviderId,
    /// Model string exactly as the client sent it, pre-translation.
    pub model: String,
    pub input_cost_per_million: f64,
    pub output_cost_per_million: f64,
}

/// One-shot receipt for a dispatched request. Exactly one usage row comes
/// out of it: either via [`complete`](UsageReceipt::complete) or, if the
/// future is dropped first, via the cancellation path in `Drop`.
pub struct UsageReceipt {
    recorder: UsageRecorder,
    context: Option<RequestContext>,
    started: Instant,
}

impl UsageReceipt {
    pub fn new(recorder: UsageRecorder, context: RequestContext) -> Self {
        Self {
            recorder,
            context: Some(context),
            started: Instant::now(),
        }
    }

    pub fn complete(mut self, status_code: i32, usage: TokenUsage, error_message: String) {
        if let Some(context) = self.context.take() {
            write_record(&self.recorder, context, self.started, status_code, usage, error_message);
        }
    }
}

impl Drop for UsageReceipt {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            write_record(
                &self.recorder,
                context,
                self.started,
                0,
                TokenUsage::default(),
                "client_cancelled".to_string(),
            );
        }
    }
}

fn write_record(
    recorder: &UsageRecorder,
    context: RequestContext,
    started: Instant,
    status_code: i32,
    usage: TokenUsage,
    error_message: String,
) {
    let usage = usage.normalized();
    let cost = compute_cost(
        usage.input_tokens,
        usage.output_tokens,
        context.input_cost_per_million,
        context.output_cost_per_million,
    );

    recorder.record_async(UsageRecordCreateDBRequest {
        user_id: context.user_id,
        proxy_key_id: context.proxy_key_id,
        provider_id: context.provider_id,
        model: context.model,
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        total_tokens: usage.total_tokens,
        cost,
        request_duration_ms: started.elapsed().as_millis() as i64,
        status_code,
        error_message,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_uses_per_million_rates() {
        // 10 input at $5/M plus 5 output at $15/M.
        let cost = compute_cost(10, 5, 5.0, 15.0);
        assert!((cost - 1.25e-4).abs() < 1e-9);
    }

    #[test]
    fn zero_tokens_cost_nothing() {
        assert_eq!(compute_cost(0, 0, 5.0, 15.0), 0.0);
    }

    #[test]
    fn cost_scales_linearly() {
        let one = compute_cost(1_000_000, 0, 3.0, 0.0);
        assert!((one - 3.0).abs() < 1e-9);
        let two = compute_cost(0, 2_000_000, 0.0, 15.0);
        assert!((two - 30.0).abs() < 1e-9);
    }
}
