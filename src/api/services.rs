// src/api/services.rs

//! Service endpoints: CRUD plus lifecycle actions.
//!
//! Responses merge the definition with the last-observed runtime, which is
//! the `Service` shape the admin shell's list/detail views read. Secret
//! environment values are masked before they leave the process.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::api::{parse_id, respond, ApiResponse, AppState};
use crate::errors::{ProcdagError, Result};
use crate::flow::NodeRunner;
use crate::runner::ProcessBackend;
use crate::service::{EnvVar, ServiceDraft, ServiceEntry};
use crate::types::{RestartPolicy, ServiceState, StatePhase, StopSignal};

const SECRET_MASK: &str = "••••••";

/// Merged definition + runtime representation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceView {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub exec_command: String,
    pub pre_exec_command: Option<String>,
    pub post_exec_command: Option<String>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub env: Vec<EnvVar>,
    pub auto_start: bool,
    pub stop_signal: StopSignal,
    pub valid_exit_codes: BTreeSet<i32>,
    pub restart_policy: RestartPolicy,
    pub timeout_seconds: Option<u64>,
    pub enabled: bool,
    pub retries: u32,

    pub state: ServiceState,
    pub phase: StatePhase,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime: Option<String>,
    pub metrics: BTreeMap<String, f64>,
    pub last_exit_code: Option<i32>,
    pub last_error: Option<String>,
    pub restarts_attempted: u32,
}

impl ServiceView {
    pub fn from_entry(entry: &ServiceEntry) -> Self {
        let d = &entry.definition.draft;
        let rt = &entry.runtime;
        Self {
            id: entry.definition.id,
            name: d.name.clone(),
            description: d.description.clone(),
            exec_command: d.exec_command.clone(),
            pre_exec_command: d.pre_exec_command.clone(),
            post_exec_command: d.post_exec_command.clone(),
            working_dir: d.working_dir.clone(),
            user: d.user.clone(),
            group: d.group.clone(),
            env: d
                .env
                .iter()
                .map(|var| EnvVar {
                    key: var.key.clone(),
                    value: if var.secret {
                        SECRET_MASK.to_string()
                    } else {
                        var.value.clone()
                    },
                    secret: var.secret,
                })
                .collect(),
            auto_start: d.auto_start,
            stop_signal: d.stop_signal,
            valid_exit_codes: d.valid_exit_codes.clone(),
            restart_policy: d.restart_policy,
            timeout_seconds: d.timeout_seconds,
            enabled: d.enabled,
            retries: d.retries,
            state: rt.state,
            phase: rt.phase,
            pid: rt.pid,
            started_at: rt.started_at,
            uptime: rt.uptime(),
            metrics: rt.metrics.clone(),
            last_exit_code: rt.last_exit_code,
            last_error: rt.last_error.clone(),
            restarts_attempted: rt.restarts_attempted,
        }
    }
}

fn parse_draft(body: Option<&[u8]>) -> Result<ServiceDraft> {
    let body = body.ok_or_else(|| ProcdagError::Validation(vec!["missing request body".to_string()]))?;
    serde_json::from_slice(body)
        .map_err(|e| ProcdagError::Validation(vec![format!("malformed service body: {e}")]))
}

pub fn list<B: ProcessBackend + 'static, R: NodeRunner + 'static>(
    state: &AppState<B, R>,
) -> Vec<ServiceView> {
    state
        .registry
        .list()
        .iter()
        .map(ServiceView::from_entry)
        .collect()
}

pub async fn create<B: ProcessBackend + 'static, R: NodeRunner + 'static>(
    state: &AppState<B, R>,
    body: Option<&[u8]>,
) -> ApiResponse {
    let result = async {
        let draft = parse_draft(body)?;
        let entry = state.registry.create(draft).await?;
        Ok(ServiceView::from_entry(&entry))
    }
    .await;
    respond(201, result)
}

pub fn get<B: ProcessBackend + 'static, R: NodeRunner + 'static>(
    state: &AppState<B, R>,
    id: &str,
) -> ApiResponse {
    let result = parse_id(id)
        .and_then(|id| state.registry.snapshot(id))
        .map(|entry| ServiceView::from_entry(&entry));
    respond(200, result)
}

pub async fn update<B: ProcessBackend + 'static, R: NodeRunner + 'static>(
    state: &AppState<B, R>,
    id: &str,
    body: Option<&[u8]>,
) -> ApiResponse {
    let result = async {
        let id = parse_id(id)?;
        let draft = parse_draft(body)?;
        let entry = state.registry.update(id, draft).await?;
        Ok(ServiceView::from_entry(&entry))
    }
    .await;
    respond(200, result)
}

pub async fn delete<B: ProcessBackend + 'static, R: NodeRunner + 'static>(
    state: &AppState<B, R>,
    id: &str,
) -> ApiResponse {
    let result = async {
        let id = parse_id(id)?;
        state.registry.delete(id).await
    }
    .await;
    match result {
        Ok(()) => ApiResponse::no_content(),
        Err(err) => ApiResponse::error(&err),
    }
}

pub async fn start<B: ProcessBackend + 'static, R: NodeRunner + 'static>(
    state: &AppState<B, R>,
    id: &str,
) -> ApiResponse {
    let result = async {
        let id = parse_id(id)?;
        let entry = state.registry.start(id).await?;
        Ok(ServiceView::from_entry(&entry))
    }
    .await;
    respond(200, result)
}

pub async fn stop<B: ProcessBackend + 'static, R: NodeRunner + 'static>(
    state: &AppState<B, R>,
    id: &str,
) -> ApiResponse {
    let result = async {
        let id = parse_id(id)?;
        let entry = state.registry.stop(id).await?;
        Ok(ServiceView::from_entry(&entry))
    }
    .await;
    respond(200, result)
}

pub async fn restart<B: ProcessBackend + 'static, R: NodeRunner + 'static>(
    state: &AppState<B, R>,
    id: &str,
) -> ApiResponse {
    let result = async {
        let id = parse_id(id)?;
        let entry = state.registry.restart(id).await?;
        Ok(ServiceView::from_entry(&entry))
    }
    .await;
    respond(200, result)
}

pub async fn set_enabled<B: ProcessBackend + 'static, R: NodeRunner + 'static>(
    state: &AppState<B, R>,
    id: &str,
    enabled: bool,
) -> ApiResponse {
    let result = async {
        let id = parse_id(id)?;
        let entry = state.registry.set_enabled(id, enabled).await?;
        Ok(ServiceView::from_entry(&entry))
    }
    .await;
    respond(200, result)
}
