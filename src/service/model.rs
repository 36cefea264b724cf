// src/service/model.rs

//! Service definitions and their validation.

use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RunnerSection;
use crate::errors::{ProcdagError, Result};
use crate::runner::LaunchSpec;
use crate::types::{RestartPolicy, StopSignal};

/// One environment variable of a service.
///
/// `secret` only affects how the value is rendered to API consumers; the
/// process always receives the real value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub secret: bool,
}

/// Everything that describes a service except its identity.
///
/// This is the create/update payload shape; the registry turns an accepted
/// draft into a [`ServiceDefinition`] by assigning an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDraft {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub exec_command: String,

    #[serde(default)]
    pub pre_exec_command: Option<String>,

    #[serde(default)]
    pub post_exec_command: Option<String>,

    #[serde(default)]
    pub working_dir: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub group: Option<String>,

    /// Ordered environment; order is preserved into the process.
    #[serde(default)]
    pub env: Vec<EnvVar>,

    #[serde(default)]
    pub auto_start: bool,

    #[serde(default)]
    pub stop_signal: StopSignal,

    #[serde(default = "default_valid_exit_codes")]
    pub valid_exit_codes: BTreeSet<i32>,

    #[serde(default)]
    pub restart_policy: RestartPolicy,

    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// A disabled service refuses to start until re-enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Cap on automatic relaunches performed by the restart policy.
    /// Reset by an explicit start/restart.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

fn default_valid_exit_codes() -> BTreeSet<i32> {
    BTreeSet::from([0])
}

fn default_enabled() -> bool {
    true
}

fn default_retries() -> u32 {
    3
}

impl ServiceDraft {
    /// Check every definition invariant, collecting all violations so the
    /// caller can report them together.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("name must not be empty".to_string());
        }

        if self.exec_command.trim().is_empty() {
            problems.push("execCommand must not be empty".to_string());
        }

        let mut seen_keys = BTreeSet::new();
        for var in &self.env {
            if !env_key_re().is_match(&var.key) {
                problems.push(format!(
                    "env key '{}' is invalid (allowed: [A-Za-z0-9_]+)",
                    var.key
                ));
            }
            if !seen_keys.insert(var.key.as_str()) {
                problems.push(format!("duplicate env key '{}'", var.key));
            }
        }

        for code in &self.valid_exit_codes {
            if *code < 0 {
                problems.push(format!("validExitCodes entry {code} is negative"));
            }
        }

        if self.timeout_seconds == Some(0) {
            problems.push("timeoutSeconds must be >= 1 when set".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ProcdagError::Validation(problems))
        }
    }
}

fn env_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[A-Za-z0-9_]+$").expect("static regex"))
}

/// An accepted service definition. `id` is assigned at creation and never
/// changes; everything else is replaced wholesale on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub id: Uuid,

    #[serde(flatten)]
    pub draft: ServiceDraft,
}

impl ServiceDefinition {
    pub fn from_draft(id: Uuid, draft: ServiceDraft) -> Self {
        Self { id, draft }
    }

    pub fn name(&self) -> &str {
        &self.draft.name
    }

    /// Flatten into launch instructions for the process backend.
    pub fn launch_spec(&self, runner: &RunnerSection) -> LaunchSpec {
        LaunchSpec {
            service_id: self.id,
            name: self.draft.name.clone(),
            exec_command: self.draft.exec_command.clone(),
            pre_exec_command: self.draft.pre_exec_command.clone(),
            post_exec_command: self.draft.post_exec_command.clone(),
            working_dir: self.draft.working_dir.clone(),
            user: self.draft.user.clone(),
            group: self.draft.group.clone(),
            env: self
                .draft
                .env
                .iter()
                .map(|v| (v.key.clone(), v.value.clone()))
                .collect(),
            stop_signal: self.draft.stop_signal,
            valid_exit_codes: self.draft.valid_exit_codes.clone(),
            timeout: self.draft.timeout_seconds.map(Duration::from_secs),
            metrics_interval: runner.metrics_interval(),
            kill_grace: runner.kill_grace(),
        }
    }
}
