// src/server/http.rs

//! The node HTTP API: search and pipeline queries, the syslog-style push
//! path, alarm and retention CRUD, cluster control-plane endpoints, SSE
//! real-time streams, and Prometheus metrics.

use crate::core::alarm::Alarm;
use crate::core::cluster::{ClusterStateSnapshot, HeartbeatMessage};
use crate::core::errors::LogLensError;
use crate::core::metrics;
use crate::core::model::LogRecord;
use crate::core::retention::RetentionPolicy;
use crate::core::state::ServerState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

/// Maps domain errors onto HTTP status codes.
struct ApiError(LogLensError);

impl From<LogLensError> for ApiError {
    fn from(e: LogLensError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            LogLensError::Validation(_) | LogLensError::QueryParse(_) => StatusCode::BAD_REQUEST,
            LogLensError::NotFound(_) => StatusCode::NOT_FOUND,
            LogLensError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/logs/search", get(search_logs))
        .route("/api/logs/query", get(run_pipeline_query))
        .route("/api/logs/ingest", post(ingest_push))
        .route("/api/logs/stream", get(stream_logs))
        .route(
            "/api/dashboards/{dashboard_id}/widgets/{widget_id}/stream",
            get(stream_widget),
        )
        .route("/api/alarms", get(list_alarms).post(create_alarm))
        .route(
            "/api/alarms/{id}",
            get(get_alarm).put(update_alarm).delete(delete_alarm),
        )
        .route(
            "/api/retention",
            get(list_retention_policies).post(create_retention_policy),
        )
        .route("/api/retention/{id}", axum::routing::delete(delete_retention_policy))
        .route("/api/archives", get(list_archives))
        .route("/api/archives/{id}/logs", get(extract_archive))
        .route("/api/cache/stats", get(cache_stats))
        .route("/api/realtime/stats", get(realtime_stats))
        .route("/api/cluster/heartbeat", post(cluster_heartbeat))
        .route("/api/cluster/leader-change", post(cluster_leader_change))
        .route("/api/cluster/node-leaving", post(cluster_node_leaving))
        .route("/api/cluster/status", get(cluster_status))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
}

// --- Search ----------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
    #[serde(default)]
    query: String,
    #[serde(default)]
    is_regex: bool,
    start_time: Option<i64>,
    end_time: Option<i64>,
    /// Set on fan-out legs to suppress further fan-out.
    #[serde(default)]
    is_shard_request: bool,
}

async fn search_logs(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<LogRecord>> {
    metrics::SEARCHES_TOTAL.inc();
    let timer = metrics::SEARCH_LATENCY_SECONDS.start_timer();
    let results = if params.is_shard_request {
        state
            .index
            .search(&params.query, params.is_regex, params.start_time, params.end_time)
    } else {
        state
            .router
            .distributed_search(&params.query, params.is_regex, params.start_time, params.end_time)
            .await
    };
    timer.observe_duration();
    Json(results)
}

#[derive(Debug, Deserialize)]
struct PipelineParams {
    q: String,
}

async fn run_pipeline_query(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<PipelineParams>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.query_engine.execute(&params.q)?;
    Ok(Json(result))
}

// --- Ingestion push path ---------------------------------------------------

#[derive(Debug, Deserialize)]
struct IngestParams {
    source: Option<String>,
}

/// The syslog-style push path: newline-delimited raw lines in the body.
async fn ingest_push(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<IngestParams>,
    body: String,
) -> Json<serde_json::Value> {
    let source = params.source.unwrap_or_else(|| "http-push".to_string());
    let mut accepted = 0u64;
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        state.pipeline.ingest_line(line, &source).await;
        accepted += 1;
    }
    metrics::RECORDS_INGESTED_TOTAL.inc_by(accepted as f64);
    Json(json!({ "accepted": accepted, "source": source }))
}

// --- Real-time streams -----------------------------------------------------

async fn stream_logs(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<SearchParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (_id, rx) = state.realtime.subscribe_logs(
        &params.query,
        params.is_regex,
        params.start_time,
        params.end_time,
    );
    metrics::ACTIVE_SUBSCRIPTIONS.set(state.realtime.stats().active_connections as f64);
    Sse::new(event_stream(rx))
}

async fn stream_widget(
    State(state): State<Arc<ServerState>>,
    Path((dashboard_id, widget_id)): Path<(String, String)>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (_id, rx) = state.realtime.subscribe_widget(&dashboard_id, &widget_id);
    metrics::ACTIVE_SUBSCRIPTIONS.set(state.realtime.stats().active_connections as f64);
    Sse::new(event_stream(rx))
}

fn event_stream(
    rx: tokio::sync::mpsc::Receiver<crate::core::realtime::StreamEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    ReceiverStream::new(rx)
        .map(|event| Ok(Event::default().event(event.name()).data(event.data_json())))
}

// --- Alarm CRUD ------------------------------------------------------------

async fn list_alarms(State(state): State<Arc<ServerState>>) -> Json<Vec<Alarm>> {
    Json(state.alarms.list())
}

async fn create_alarm(
    State(state): State<Arc<ServerState>>,
    Json(alarm): Json<Alarm>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.alarms.create(alarm)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_alarm(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Alarm>, ApiError> {
    state
        .alarms
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError(LogLensError::NotFound(format!("alarm '{id}'"))))
}

async fn update_alarm(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(mut alarm): Json<Alarm>,
) -> Result<Json<Alarm>, ApiError> {
    alarm.id = id;
    Ok(Json(state.alarms.update(alarm)?))
}

async fn delete_alarm(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.alarms.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Retention & archives --------------------------------------------------

async fn list_retention_policies(
    State(state): State<Arc<ServerState>>,
) -> Json<Vec<RetentionPolicy>> {
    Json(state.retention.list_policies())
}

async fn create_retention_policy(
    State(state): State<Arc<ServerState>>,
    Json(policy): Json<RetentionPolicy>,
) -> Result<impl IntoResponse, ApiError> {
    state.retention.add_policy(policy.clone())?;
    Ok((StatusCode::CREATED, Json(policy)))
}

async fn delete_retention_policy(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.retention.remove_policy(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_archives(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.archive.list())
}

async fn extract_archive(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<LogRecord>>, ApiError> {
    Ok(Json(state.archive.extract(&id)?))
}

// --- Stats -----------------------------------------------------------------

async fn cache_stats(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.cache.stats())
}

async fn realtime_stats(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.realtime.stats())
}

// --- Cluster control plane -------------------------------------------------

async fn cluster_heartbeat(
    State(state): State<Arc<ServerState>>,
    Json(message): Json<HeartbeatMessage>,
) -> Json<serde_json::Value> {
    // The ingestion coordinator tracks the same peer set for its
    // consistent-hash gate.
    state.coordinator.record_heartbeat(&message.node_id);
    if let Some(cluster) = &state.cluster {
        cluster.handle_heartbeat(&message);
    }
    Json(json!({ "nodeId": state.node_id }))
}

async fn cluster_leader_change(
    State(state): State<Arc<ServerState>>,
    Json(snapshot): Json<ClusterStateSnapshot>,
) -> StatusCode {
    if let Some(cluster) = &state.cluster {
        cluster.handle_leader_change(&snapshot);
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeLeavingRequest {
    node_id: String,
}

async fn cluster_node_leaving(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<NodeLeavingRequest>,
) -> StatusCode {
    if let Some(cluster) = &state.cluster {
        cluster.node_leaving(&request.node_id);
    }
    StatusCode::OK
}

async fn cluster_status(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    match &state.cluster {
        Some(cluster) => Json(json!({
            "nodeId": state.node_id,
            "isLeader": cluster.is_leader(),
            "leaderId": cluster.leader_id(),
            "nodes": cluster.snapshot().nodes,
        })),
        None => Json(json!({
            "nodeId": state.node_id,
            "isLeader": true,
            "leaderId": state.node_id,
            "nodes": [],
        })),
    }
}

// --- Metrics ---------------------------------------------------------------

async fn prometheus_metrics(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    // Refresh the gauges that track live structures before gathering.
    metrics::ACTIVE_PARTITIONS.set(state.index.active_partition_count() as f64);
    metrics::INDEXED_DOCUMENTS.set(state.index.total_doc_count() as f64);
    metrics::BUFFER_SIZE.set(state.buffer.size() as f64);
    metrics::ACTIVE_SUBSCRIPTIONS.set(state.realtime.stats().active_connections as f64);
    metrics::SEARCH_CACHE_HITS.set(state.cache.stats().hits as f64);
    if let Some(cluster) = &state.cluster {
        metrics::CLUSTER_NODES.set(cluster.snapshot().nodes.len() as f64);
        metrics::IS_LEADER.set(if cluster.is_leader() { 1.0 } else { 0.0 });
    } else {
        metrics::CLUSTER_NODES.set(1.0);
        metrics::IS_LEADER.set(1.0);
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

// --- Server loop -----------------------------------------------------------

/// Binds the API listener and serves until the shutdown signal fires.
pub async fn serve(
    state: Arc<ServerState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let (host, port) = {
        let config = state.config.lock().await;
        (config.server.host.clone(), config.server.port)
    };
    let app = router(state);

    let listener = match tokio::net::TcpListener::bind((host.as_str(), port)).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind API server on {}:{}: {}", host, port, e);
            return Err(e.into());
        }
    };
    info!("API server listening on http://{}:{}", host, port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("API server shutting down.");
        })
        .await?;
    Ok(())
}
