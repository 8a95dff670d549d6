//! Liveness and readiness probes.

use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub store: Probe,
    pub queue: Probe,
}

/// Result of pinging one backend.
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Probe {
    Ok {
        latency_ms: u64,
        /// Entries waiting, for the queue probe
        #[serde(skip_serializing_if = "Option::is_none")]
        depth: Option<usize>,
    },
    Error {
        error: String,
    },
}

impl Probe {
    async fn run<T, E: Display>(
        check: impl Future<Output = Result<T, E>>,
        depth: impl FnOnce(T) -> Option<usize>,
    ) -> Self {
        let start = Instant::now();
        match check.await {
            Ok(value) => Probe::Ok {
                latency_ms: start.elapsed().as_millis() as u64,
                depth: depth(value),
            },
            Err(e) => Probe::Error {
                error: e.to_string(),
            },
        }
    }

    fn is_ok(&self) -> bool {
        matches!(self, Probe::Ok { .. })
    }
}

/// GET /ready
///
/// 200 when the job store and the queue both answer, 503 otherwise.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let (store, queue) = tokio::join!(
        Probe::run(state.store.ping(), |()| None),
        Probe::run(state.queue.len(), Some),
    );

    let healthy = store.is_ok() && queue.is_ok();
    let response = ReadinessResponse {
        status: if healthy { "ready" } else { "degraded" },
        checks: ReadinessChecks { store, queue },
    };

    if healthy {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
