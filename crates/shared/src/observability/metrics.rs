//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标与健康检查共用一个 HTTP 端口：`/metrics` 供 Prometheus 抓取，
//! `/health` 供编排系统做存活探测。

use anyhow::Result;
use axum::{Json, Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{error, info};

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出并启动 HTTP 服务
pub async fn init(service_name: &str, addr: &str) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(service_name);

    let server_handle = start_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册指标描述，出现在 /metrics 的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "alert_deliveries_total",
        "Total number of queue deliveries by outcome"
    );
    metrics::describe_histogram!(
        "alert_processing_duration_seconds",
        "Time spent handling a single delivery"
    );
    metrics::describe_counter!(
        "alert_notifications_sent_total",
        "Total number of dispatched notifications"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 构建指标与健康检查路由
pub fn router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(health))
}

/// 存活探测
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn start_server(
    addr: &str,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = router(handle);

    let listener = TcpListener::bind(addr).await?;
    info!("Health/metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Health/metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 指标记录函数
// ============================================================================

/// 记录一次投递的处理结果与耗时
#[inline]
pub fn record_delivery(outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "alert_deliveries_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "alert_processing_duration_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration_secs);
}

/// 记录一次成功发出的通知
#[inline]
pub fn record_notification_sent() {
    metrics::counter!("alert_notifications_sent_total").increment(1);
}
