//! Intercepted-action requests from the host process.
//!
//! Two wire shapes are accepted: the canonical
//! `{action_kind, target_path, command_text}` request, and the hook-event
//! shape `{tool_name, tool_input: {file_path | command, prompt}}` emitted
//! by agent runtimes. Malformed input degrades to `Other`, which the gate
//! allows: a broken host payload must not wedge the whole pipeline.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Write,
    Edit,
    Commit,
    Validate,
    Bash,
    Other,
}

/// A single intercepted action, normalized from either wire shape.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub kind: ActionKind,
    pub target_path: Option<String>,
    pub command_text: Option<String>,
}

impl ActionRequest {
    pub fn other() -> Self {
        ActionRequest {
            kind: ActionKind::Other,
            target_path: None,
            command_text: None,
        }
    }
}

#[derive(Deserialize)]
struct CanonicalRequest {
    action_kind: String,
    #[serde(default)]
    target_path: Option<String>,
    #[serde(default)]
    command_text: Option<String>,
}

#[derive(Deserialize)]
struct HookEvent {
    #[serde(default)]
    tool_name: String,
    #[serde(default)]
    tool_input: HookToolInput,
}

#[derive(Deserialize, Default)]
struct HookToolInput {
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
}

/// `git commit` counts as commit-like; `--amend` rewrites an existing
/// commit and is deliberately left alone.
pub fn is_commit_command(command: &str) -> bool {
    command.contains("git commit") && !command.contains("--amend")
}

pub fn is_validate_command(command: &str, prompt: Option<&str>) -> bool {
    command.contains("/validate") || prompt.is_some_and(|p| p.contains("/validate"))
}

/// Parse an action request from raw host input.
pub fn parse_action(raw: &str) -> ActionRequest {
    if let Ok(req) = serde_json::from_str::<CanonicalRequest>(raw) {
        let kind = match req.action_kind.as_str() {
            "Write" => ActionKind::Write,
            "Edit" => ActionKind::Edit,
            "Commit" => ActionKind::Commit,
            "Validate" => ActionKind::Validate,
            _ => ActionKind::Other,
        };
        return ActionRequest {
            kind,
            target_path: req.target_path,
            command_text: req.command_text,
        };
    }

    if let Ok(event) = serde_json::from_str::<HookEvent>(raw) {
        return from_hook_event(event);
    }

    ActionRequest::other()
}

fn from_hook_event(event: HookEvent) -> ActionRequest {
    match event.tool_name.as_str() {
        "Write" | "Edit" => {
            let kind = if event.tool_name == "Write" {
                ActionKind::Write
            } else {
                ActionKind::Edit
            };
            ActionRequest {
                kind,
                target_path: event.tool_input.file_path,
                command_text: None,
            }
        }
        _ => {
            let command = event.tool_input.command.unwrap_or_default();
            if command.is_empty() {
                return ActionRequest::other();
            }
            let kind = if is_commit_command(&command) {
                ActionKind::Commit
            } else if is_validate_command(&command, event.tool_input.prompt.as_deref()) {
                ActionKind::Validate
            } else {
                ActionKind::Bash
            };
            ActionRequest {
                kind,
                target_path: None,
                command_text: Some(command),
            }
        }
    }
}
