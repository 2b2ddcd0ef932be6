use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use kube::Client;
use prometheus::{Encoder, Histogram, IntCounter, Registry, TextEncoder};
use serde::Deserialize;
use tracing::info;

use stargazer::access::{KubeClusterAccess, NamespaceScope};
use stargazer::cache::TtlCache;
use stargazer::clock::{system_clock, SharedClock};
use stargazer::evaluator::{default_evaluator, ConservativeEvaluator};
use stargazer::issues::{self, IssueDetectorConfig};
use stargazer::logging::{tracing_logger, SharedLogger};
use stargazer::topology::{self, BuildParams};
use stargazer::StargazerError;

const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static SCAN_REQUESTS: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("stargazer_scan_requests_total", "Total /snapshot scan requests")
        .expect("metric definition is valid");
    METRICS_REGISTRY
        .register(Box::new(c.clone()))
        .expect("metric not yet registered");
    c
});

static SCAN_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    let h = Histogram::with_opts(prometheus::HistogramOpts::new(
        "stargazer_scan_duration_seconds",
        "Duration of a topology scan triggered via the web surface",
    ))
    .expect("metric definition is valid");
    METRICS_REGISTRY
        .register(Box::new(h.clone()))
        .expect("metric not yet registered");
    h
});

#[derive(Clone)]
struct WebState {
    access: std::sync::Arc<KubeClusterAccess>,
    cache: std::sync::Arc<TtlCache>,
    clock: SharedClock,
    logger: SharedLogger,
    evaluator: std::sync::Arc<ConservativeEvaluator>,
    issue_config: std::sync::Arc<IssueDetectorConfig>,
}

#[derive(Deserialize)]
struct SnapshotQuery {
    #[serde(default)]
    namespace: String,
}

/// Serve the last scan as JSON plus a Prometheus `/metrics` endpoint,
/// `spec.md` §6's `web` command. There is no background refresh loop —
/// `spec.md` §1 is explicit that the engine "does not provide live
/// watches; a query triggers a bounded, time-windowed refresh" — so every
/// `/snapshot` request triggers one fresh `topology::build` bounded by the
/// query deadline, reusing the TTL cache across requests.
pub async fn run(addr: &str) -> Result<(), StargazerError> {
    let client = Client::try_default().await.map_err(|e| StargazerError::PermanentOther {
        context: "connecting to cluster".to_string(),
        source: anyhow::anyhow!(e),
    })?;

    let state = WebState {
        access: std::sync::Arc::new(KubeClusterAccess::new(client)),
        cache: std::sync::Arc::new(TtlCache::new(stargazer::cache::DEFAULT_TTL)),
        clock: system_clock(),
        logger: tracing_logger(),
        evaluator: std::sync::Arc::new(default_evaluator()),
        issue_config: std::sync::Arc::new(IssueDetectorConfig::default()),
    };

    let app = Router::new()
        .route("/healthz", get(|| async { (StatusCode::OK, "OK") }))
        .route("/snapshot", get(snapshot_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind web server address")
        .map_err(to_permanent)?;

    info!(%addr, "web_server_started");
    println!("Stargazer web server listening on http://{addr}");
    println!("  GET /snapshot?namespace=<ns>   latest topology snapshot + issues (JSON)");
    println!("  GET /healthz                  liveness probe");
    println!("  GET /metrics                  Prometheus metrics");

    axum::serve(listener, app)
        .await
        .context("web server exited")
        .map_err(to_permanent)?;

    Ok(())
}

fn to_permanent(err: anyhow::Error) -> StargazerError {
    StargazerError::PermanentOther {
        context: "web server".to_string(),
        source: err,
    }
}

async fn snapshot_handler(
    State(state): State<WebState>,
    Query(query): Query<SnapshotQuery>,
) -> impl IntoResponse {
    SCAN_REQUESTS.inc();
    let timer = SCAN_DURATION.start_timer();

    let scope = NamespaceScope::parse(&query.namespace);
    let params = BuildParams {
        typed: state.access.as_ref(),
        dynamic: state.access.as_ref(),
        cache: state.cache.as_ref(),
        clock: state.clock.as_ref(),
        logger: state.logger.as_ref(),
        evaluator: state.evaluator.as_ref(),
        scope,
        deadline: DEFAULT_DEADLINE,
    };

    let result = topology::build(params).await;
    timer.observe_duration();

    match result {
        Ok(snapshot) => {
            let found = issues::detect(&snapshot, &state.issue_config, snapshot.generated_at);
            let payload = serde_json::json!({
                "snapshot": snapshot,
                "issues": found,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => {
            let status = match err {
                StargazerError::ValidationError(_) => StatusCode::BAD_REQUEST,
                StargazerError::NotAuthorized(_) => StatusCode::FORBIDDEN,
                StargazerError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
                StargazerError::PermanentOther { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, err.to_string()).into_response()
        }
    }
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => match String::from_utf8(buffer) {
            Ok(body) => (StatusCode::OK, body),
            Err(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "metrics encoding error".to_string(),
            ),
        },
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "metrics encoding error".to_string(),
        ),
    }
}
