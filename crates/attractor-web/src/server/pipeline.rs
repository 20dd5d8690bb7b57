//! Pipeline lifecycle endpoints: submit a DOT graph, poll/answer the
//! Web-interviewer's pending question.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use attractor_pipeline::{
    default_registry_with_interviewer, Answer, PipelineConfig, PipelineExecutor, PipelineGraph, WebInterviewer,
};

use super::{AppState, Session};

#[derive(Deserialize)]
pub struct StartPipelineRequest {
    pub dot: String,
    pub pipeline_id: Option<String>,
    pub logs_root: Option<String>,
}

#[derive(Serialize)]
pub struct StartPipelineResponse {
    pub pipeline_id: String,
    pub status: String,
}

/// `POST /api/pipelines` — parse the DOT graph, start the run in the
/// background, and return immediately with the pipeline id clients use to
/// subscribe to `/events` and answer `/questions`.
pub async fn start_pipeline(
    State(state): State<AppState>,
    Json(req): Json<StartPipelineRequest>,
) -> Result<Json<StartPipelineResponse>, (StatusCode, String)> {
    let parsed = attractor_dot::parse(&req.dot).map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid DOT: {e}")))?;
    let graph = PipelineGraph::from_dot(parsed)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid pipeline graph: {e}")))?;

    let pipeline_id = req.pipeline_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let logs_root = req
        .logs_root
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("attractor-web").join(&pipeline_id));

    let interviewer = Arc::new(WebInterviewer::new());
    state.insert(
        pipeline_id.clone(),
        Arc::new(Session {
            interviewer: interviewer.clone(),
        }),
    );

    let registry = default_registry_with_interviewer(interviewer);
    let executor = PipelineExecutor::new(registry);
    let mut events = executor.events().subscribe();

    let mut config = PipelineConfig::new(logs_root);
    config.pipeline_id = pipeline_id.clone();

    let forward_id = pipeline_id.clone();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                super::stream::publish_event(&forward_id, json);
            }
        }
    });

    let run_id = pipeline_id.clone();
    let run_state = state.clone();
    tokio::spawn(async move {
        match executor.run(&graph, &config).await {
            Ok(result) => tracing::info!(pipeline_id = %run_id, outcome = ?result.outcome.status, "pipeline run finished"),
            Err(e) => tracing::error!(pipeline_id = %run_id, error = %e, "pipeline run errored"),
        }
        run_state.remove(&run_id);
        super::stream::cleanup(&run_id);
    });

    Ok(Json(StartPipelineResponse {
        pipeline_id,
        status: "started".to_string(),
    }))
}

/// `GET /api/pipelines/:id/questions` — the currently pending question for
/// the Web interviewer, or 204 if none is pending.
pub async fn get_pending_question(State(state): State<AppState>, Path(pipeline_id): Path<String>) -> impl IntoResponse {
    let Some(session) = state.get(&pipeline_id) else {
        return (StatusCode::NOT_FOUND, "unknown pipeline id").into_response();
    };
    match session.interviewer.pending_question() {
        Some(question) => Json(question).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// `POST /api/pipelines/:id/answers` — answer the pending question. 409 if
/// no question is currently pending (a contract violation, per the
/// at-most-one-pending-question invariant).
pub async fn submit_answer(
    State(state): State<AppState>,
    Path(pipeline_id): Path<String>,
    Json(answer): Json<Answer>,
) -> impl IntoResponse {
    let Some(session) = state.get(&pipeline_id) else {
        return (StatusCode::NOT_FOUND, "unknown pipeline id").into_response();
    };
    if session.interviewer.submit_answer(answer) {
        StatusCode::OK.into_response()
    } else {
        (StatusCode::CONFLICT, "no question is pending").into_response()
    }
}
