// src/service/runtime.rs

//! Derived, transient runtime state of a service.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ServiceState, StatePhase};

/// Last-observed runtime state, one per definition.
///
/// Owned exclusively by the registry; mutated only through registry
/// transitions and process-backend events. API consumers read it merged
/// into the service representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRuntime {
    pub state: ServiceState,
    pub phase: StatePhase,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_exit_code: Option<i32>,
    pub last_error: Option<String>,
    pub metrics: BTreeMap<String, f64>,
    pub restarts_attempted: u32,
}

impl ServiceRuntime {
    pub fn stopped() -> Self {
        Self {
            state: ServiceState::Stopped,
            phase: StatePhase::Observed,
            pid: None,
            started_at: None,
            last_exit_code: None,
            last_error: None,
            metrics: BTreeMap::new(),
            restarts_attempted: 0,
        }
    }

    /// Human-readable uptime for a running service, e.g. `"3m 42s"`.
    pub fn uptime(&self) -> Option<String> {
        if self.state != ServiceState::Running {
            return None;
        }
        let started = self.started_at?;
        let secs = (Utc::now() - started).num_seconds().max(0) as u64;
        Some(humantime::format_duration(Duration::from_secs(secs)).to_string())
    }
}
