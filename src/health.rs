//! # Health and Process Metrics Endpoints
//!
//! Liveness plus a summary of what the process is doing: request counters,
//! active streaming sessions against the configured limit, and resident
//! memory on platforms that expose it. Per-session optimization metrics are
//! served separately under `/metrics/{client_id}`.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    let active_sessions = state.registry.active_count();
    let max_sessions = config.performance.max_concurrent_sessions;
    let session_usage = active_sessions as f64 / max_sessions as f64;

    let status = if session_usage > 0.9 {
        "high_load"
    } else if session_usage > 0.7 {
        "moderate_load"
    } else {
        "healthy"
    };

    HttpResponse::Ok().json(json!({
        "status": status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": "voice-gateway-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "sessions": {
            "active": active_sessions,
            "max": max_sessions,
            "usage_percent": (session_usage * 100.0).round()
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "active_connections": metrics.active_connections
        },
        "memory": get_memory_info()
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats = Vec::new();
    for (endpoint, metric) in metrics.endpoint_metrics.iter() {
        endpoint_stats.push(json!({
            "endpoint": endpoint,
            "request_count": metric.request_count,
            "error_count": metric.error_count,
            "error_rate": metric.error_rate(),
            "average_duration_ms": metric.average_duration_ms(),
            "total_duration_ms": metric.total_duration_ms
        }));
    }

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "sessions": {
            "active": state.registry.active_count(),
            "max": config.performance.max_concurrent_sessions,
            "active_connections": metrics.active_connections,
            "max_pending_frames": config.performance.max_pending_frames
        },
        "endpoints": endpoint_stats,
        "memory": get_memory_info()
    }))
}

/// Resident memory from /proc on Linux; unavailable elsewhere.
fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        let pid = std::process::id();
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    if let Some(kb_str) = rest.split_whitespace().next() {
                        let rss_bytes = kb_str.parse::<u64>().unwrap_or(0) * 1024;
                        return json!({
                            "resident_memory_bytes": rss_bytes,
                            "available": true
                        });
                    }
                }
            }
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "available": false
    })
}
