#![allow(dead_code)]

use std::collections::BTreeSet;

use procdag::graph::{Edge, TaskGraph, TaskNode};
use procdag::service::{EnvVar, ServiceDraft};
use procdag::types::{NodeKind, RestartPolicy, StopSignal};
use uuid::Uuid;

/// Builder for `ServiceDraft` to simplify test setup.
pub struct ServiceDraftBuilder {
    draft: ServiceDraft,
}

impl ServiceDraftBuilder {
    pub fn new(name: &str, exec_command: &str) -> Self {
        Self {
            draft: ServiceDraft {
                name: name.to_string(),
                description: String::new(),
                exec_command: exec_command.to_string(),
                pre_exec_command: None,
                post_exec_command: None,
                working_dir: None,
                user: None,
                group: None,
                env: Vec::new(),
                auto_start: false,
                stop_signal: StopSignal::Term,
                valid_exit_codes: BTreeSet::from([0]),
                restart_policy: RestartPolicy::None,
                timeout_seconds: None,
                enabled: true,
                retries: 3,
            },
        }
    }

    pub fn description(mut self, text: &str) -> Self {
        self.draft.description = text.to_string();
        self
    }

    pub fn pre_exec(mut self, cmd: &str) -> Self {
        self.draft.pre_exec_command = Some(cmd.to_string());
        self
    }

    pub fn post_exec(mut self, cmd: &str) -> Self {
        self.draft.post_exec_command = Some(cmd.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.draft.env.push(EnvVar {
            key: key.to_string(),
            value: value.to_string(),
            secret: false,
        });
        self
    }

    pub fn secret_env(mut self, key: &str, value: &str) -> Self {
        self.draft.env.push(EnvVar {
            key: key.to_string(),
            value: value.to_string(),
            secret: true,
        });
        self
    }

    pub fn auto_start(mut self, val: bool) -> Self {
        self.draft.auto_start = val;
        self
    }

    pub fn stop_signal(mut self, signal: StopSignal) -> Self {
        self.draft.stop_signal = signal;
        self
    }

    pub fn valid_exit_codes(mut self, codes: &[i32]) -> Self {
        self.draft.valid_exit_codes = codes.iter().copied().collect();
        self
    }

    pub fn restart_policy(mut self, policy: RestartPolicy, retries: u32) -> Self {
        self.draft.restart_policy = policy;
        self.draft.retries = retries;
        self
    }

    pub fn timeout_seconds(mut self, secs: u64) -> Self {
        self.draft.timeout_seconds = Some(secs);
        self
    }

    pub fn enabled(mut self, val: bool) -> Self {
        self.draft.enabled = val;
        self
    }

    pub fn build(self) -> ServiceDraft {
        self.draft
    }
}

/// Builder for `TaskGraph`.
pub struct TaskGraphBuilder {
    graph: TaskGraph,
}

impl TaskGraphBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            graph: TaskGraph {
                id: Uuid::new_v4(),
                name: name.to_string(),
                nodes: Vec::new(),
                edges: Vec::new(),
            },
        }
    }

    pub fn id(mut self, id: Uuid) -> Self {
        self.graph.id = id;
        self
    }

    pub fn node(mut self, id: &str, command: &str) -> Self {
        self.graph.nodes.push(TaskNode {
            id: id.to_string(),
            label: id.to_string(),
            kind: NodeKind::Shell,
            command: command.to_string(),
        });
        self
    }

    pub fn typed_node(mut self, id: &str, kind: NodeKind, command: &str) -> Self {
        self.graph.nodes.push(TaskNode {
            id: id.to_string(),
            label: id.to_string(),
            kind,
            command: command.to_string(),
        });
        self
    }

    pub fn edge(mut self, from: &str, to: &str) -> Self {
        self.graph.edges.push(Edge {
            from: from.to_string(),
            to: to.to_string(),
        });
        self
    }

    pub fn build(self) -> TaskGraph {
        self.graph
    }
}
