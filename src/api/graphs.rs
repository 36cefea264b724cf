// src/api/graphs.rs

//! Graph and run endpoints.
//!
//! Graphs are saved wholesale (replace-on-save); an invalid document is
//! rejected before anything is committed. Runs are read-only history plus a
//! cancel action.

use serde::Deserialize;
use uuid::Uuid;

use crate::api::{parse_id, respond, ApiResponse, AppState};
use crate::errors::{ProcdagError, Result};
use crate::flow::{ExecutionRun, NodeRunner};
use crate::graph::{validate, Edge, TaskGraph, TaskNode};
use crate::runner::ProcessBackend;

/// Incoming graph document. The id always comes from the URL (or is
/// assigned on create), never from the body.
#[derive(Debug, Deserialize)]
pub struct GraphPayload {
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<TaskNode>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphPayload {
    fn into_graph(self, id: Uuid) -> TaskGraph {
        TaskGraph {
            id,
            name: self.name,
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

fn parse_payload(body: Option<&[u8]>) -> Result<GraphPayload> {
    let body = body.ok_or_else(|| ProcdagError::Validation(vec!["missing request body".to_string()]))?;
    serde_json::from_slice(body)
        .map_err(|e| ProcdagError::Validation(vec![format!("malformed graph body: {e}")]))
}

pub fn list<B: ProcessBackend + 'static, R: NodeRunner + 'static>(
    state: &AppState<B, R>,
) -> Vec<TaskGraph> {
    state.graphs.list()
}

pub fn create<B: ProcessBackend + 'static, R: NodeRunner + 'static>(
    state: &AppState<B, R>,
    body: Option<&[u8]>,
) -> ApiResponse {
    let result = (|| {
        let graph = parse_payload(body)?.into_graph(Uuid::new_v4());
        validate(&graph)?;
        state.graphs.put(graph)
    })();
    respond(201, result)
}

pub fn get<B: ProcessBackend + 'static, R: NodeRunner + 'static>(
    state: &AppState<B, R>,
    id: &str,
) -> ApiResponse {
    let result = parse_id(id).and_then(|id| state.graphs.get(id));
    respond(200, result)
}

pub fn put<B: ProcessBackend + 'static, R: NodeRunner + 'static>(
    state: &AppState<B, R>,
    id: &str,
    body: Option<&[u8]>,
) -> ApiResponse {
    let result = (|| {
        let id = parse_id(id)?;
        let graph = parse_payload(body)?.into_graph(id);
        validate(&graph)?;
        state.graphs.put(graph)
    })();
    respond(200, result)
}

pub fn delete<B: ProcessBackend + 'static, R: NodeRunner + 'static>(
    state: &AppState<B, R>,
    id: &str,
) -> ApiResponse {
    let result = parse_id(id).and_then(|id| state.graphs.delete(id));
    match result {
        Ok(()) => ApiResponse::no_content(),
        Err(err) => ApiResponse::error(&err),
    }
}

/// Trigger execution; answers 202 with the fresh run record.
pub fn run<B: ProcessBackend + 'static, R: NodeRunner + 'static>(
    state: &AppState<B, R>,
    id: &str,
) -> ApiResponse {
    let result = (|| {
        let id = parse_id(id)?;
        let graph = state.graphs.get(id)?;
        state.executor.start_run(&graph)
    })();
    respond(202, result)
}

pub fn list_runs<B: ProcessBackend + 'static, R: NodeRunner + 'static>(
    state: &AppState<B, R>,
    id: &str,
) -> ApiResponse {
    let result: Result<Vec<ExecutionRun>> = (|| {
        let id = parse_id(id)?;
        // 404 for unknown graphs rather than an empty list.
        state.graphs.get(id)?;
        Ok(state.executor.runs_for_graph(id))
    })();
    respond(200, result)
}

pub fn get_run<B: ProcessBackend + 'static, R: NodeRunner + 'static>(
    state: &AppState<B, R>,
    id: &str,
) -> ApiResponse {
    let result = parse_id(id).and_then(|id| state.executor.run(id));
    respond(200, result)
}

pub fn cancel_run<B: ProcessBackend + 'static, R: NodeRunner + 'static>(
    state: &AppState<B, R>,
    id: &str,
) -> ApiResponse {
    let result = parse_id(id).and_then(|id| state.executor.cancel(id));
    respond(202, result)
}
