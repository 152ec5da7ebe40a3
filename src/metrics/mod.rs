use std::time::Instant;

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::Next;
use actix_web::{web, HttpResponse, Responder};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Request-level metrics are recorded by the `track_http` middleware; the
// order lifecycle counters are incremented by the handlers that drive the
// transitions. Everything is scraped via GET /metrics.
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub http_requests: IntCounterVec,
    pub http_duration: HistogramVec,

    // Lifecycle counters
    pub orders_formed: IntCounter,
    pub orders_resolved: IntCounterVec,
    pub orders_discarded: IntCounter,
    pub notification_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests by route and status class"),
            &["route", "status"],
        )?;
        registry.register(Box::new(http_requests.clone()))?;

        let http_duration = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["route"],
        )?;
        registry.register(Box::new(http_duration.clone()))?;

        let orders_formed =
            IntCounter::new("orders_formed_total", "Orders submitted for review")?;
        registry.register(Box::new(orders_formed.clone()))?;

        let orders_resolved = IntCounterVec::new(
            Opts::new("orders_resolved_total", "Orders resolved by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(orders_resolved.clone()))?;

        let orders_discarded =
            IntCounter::new("orders_discarded_total", "Draft orders discarded")?;
        registry.register(Box::new(orders_discarded.clone()))?;

        let notification_failures = IntCounter::new(
            "notification_failures_total",
            "Resolution callbacks that failed after all retries",
        )?;
        registry.register(Box::new(notification_failures.clone()))?;

        Ok(Self {
            registry,
            http_requests,
            http_duration,
            orders_formed,
            orders_resolved,
            orders_discarded,
            notification_failures,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_resolution(&self, outcome: &str) {
        self.orders_resolved.with_label_values(&[outcome]).inc();
    }
}

/// Per-request counter/duration middleware; labels use the matched route
/// pattern so ids do not explode the cardinality.
pub async fn track_http(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let start = Instant::now();
    let res = next.call(req).await?;

    if let Some(metrics) = res.request().app_data::<web::Data<Metrics>>() {
        let route = res
            .request()
            .match_pattern()
            .unwrap_or_else(|| "unmatched".to_string());
        let status_class = format!("{}xx", res.status().as_u16() / 100);
        metrics
            .http_requests
            .with_label_values(&[&route, &status_class])
            .inc();
        metrics
            .http_duration
            .with_label_values(&[&route])
            .observe(start.elapsed().as_secs_f64());
    }

    Ok(res)
}

pub async fn metrics_handler(metrics: web::Data<Metrics>) -> actix_web::Result<impl Responder> {
    let encoder = TextEncoder::new();
    let metric_families = metrics.registry().gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer))
}

pub async fn health_handler() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "formulab",
    }))
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_lifecycle_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.orders_formed.inc();
        metrics.record_resolution("completed");
        metrics.record_resolution("rejected");
        metrics.record_resolution("rejected");

        let gathered = metrics.registry.gather();
        let formed = gathered
            .iter()
            .find(|m| m.name() == "orders_formed_total")
            .unwrap();
        assert_eq!(formed.metric[0].counter.value, Some(1.0));

        let resolved = gathered
            .iter()
            .find(|m| m.name() == "orders_resolved_total")
            .unwrap();
        assert_eq!(resolved.metric.len(), 2); // two outcome labels
    }

    #[test]
    fn test_http_counter_labels() {
        let metrics = Metrics::new().unwrap();
        metrics
            .http_requests
            .with_label_values(&["/orders/{id}/form", "2xx"])
            .inc();
        let gathered = metrics.registry.gather();
        let requests = gathered
            .iter()
            .find(|m| m.name() == "http_requests_total")
            .unwrap();
        assert_eq!(requests.metric[0].counter.value, Some(1.0));
    }
}
