use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::NotificationConfig;
use crate::domain::order::OrderStatus;
use crate::error::AppError;
use crate::utils::retry::{retry_with_backoff, RetryConfig, RetryResult};

// ============================================================================
// Resolution Notification Client
// ============================================================================
//
// Synchronous downstream callback fired when a reviewer resolves an order.
// The resolve transition blocks on this call: it runs BEFORE the resolution
// is persisted, and a failure (after the bounded retry budget) aborts the
// whole transition with DEPENDENCY_FAILURE, leaving the order Formed.
//
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionNotice {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub resolved_by: Uuid,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct NotificationClient {
    http: reqwest::Client,
    url: Option<String>,
    retry: RetryConfig,
}

impl NotificationClient {
    pub fn new(config: &NotificationConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            http,
            url: config.url.clone(),
            retry: RetryConfig::with_max_attempts(config.max_attempts),
        })
    }

    /// POST the notice to the configured callback. A missing URL disables
    /// the callback and the notice is dropped.
    pub async fn notify_resolved(&self, notice: &ResolutionNotice) -> Result<(), AppError> {
        let Some(url) = &self.url else {
            tracing::debug!(order_id = %notice.order_id, "no notification url configured");
            return Ok(());
        };

        let result = retry_with_backoff(&self.retry, |_attempt| self.send(url, notice)).await;
        match result {
            RetryResult::Success(()) => {
                tracing::info!(order_id = %notice.order_id, status = ?notice.status, "resolution notified");
                Ok(())
            }
            RetryResult::Failed(reason) => Err(AppError::Dependency(format!(
                "resolution notification failed: {reason}"
            ))),
        }
    }

    async fn send(&self, url: &str, notice: &ResolutionNotice) -> Result<(), String> {
        let response = self
            .http
            .post(url)
            .json(notice)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("callback returned {}", response.status()))
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
