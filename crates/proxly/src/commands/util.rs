//! Shared helpers for command handlers.

use std::future::Future;
use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Map, Value};

use proxly_core::{Cluster, GuestId};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.to_owned(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(prompt_err)?;
    Ok(confirmed)
}

/// Map a dialoguer / interactive I/O failure into CliError.
pub fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// Read a JSON object for `--from-file`.
pub fn read_json_object(path: &Path) -> Result<Map<String, Value>, CliError> {
    let contents = std::fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&contents).map_err(|e| CliError::Validation {
        field: "from-file".into(),
        reason: format!("invalid JSON in {}: {e}", path.display()),
    })? {
        Value::Object(map) => Ok(map),
        other => Err(CliError::Validation {
            field: "from-file".into(),
            reason: format!("expected a JSON object, got {}", json_type(&other)),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A secret flag given as `-` is read from the terminal instead.
pub fn secret_flag(name: &str, value: Option<String>) -> Result<Option<String>, CliError> {
    match value.as_deref() {
        Some("-") => rpassword::prompt_password(format!("{name}: "))
            .map(Some)
            .map_err(prompt_err),
        _ => Ok(value),
    }
}

/// Run `fut` behind a spinner on stderr. Hidden in quiet mode, for
/// structured output, and when stderr is not a terminal.
pub async fn with_spinner<F: Future>(global: &GlobalOpts, message: String, fut: F) -> F::Output {
    let visible = !global.quiet
        && global.output == OutputFormat::Table
        && std::io::stderr().is_terminal();
    let bar = if visible {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg} ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    let out = fut.await;
    bar.finish_and_clear();
    out
}

/// Validate a raw guest id from the command line.
pub fn guest_id(raw: u32) -> Result<GuestId, CliError> {
    Ok(GuestId::new(raw)?)
}

/// Node for commands that must name one up front.
pub fn required_node(cluster: &Cluster) -> Result<String, CliError> {
    cluster
        .default_node()
        .map(str::to_owned)
        .ok_or_else(|| CliError::Validation {
            field: "node".into(),
            reason: "pass --node or set default_node in the profile".into(),
        })
}

/// Node hosting `vmid`: the configured node, else looked up in the
/// cluster inventory.
pub async fn guest_node(cluster: &Cluster, vmid: GuestId) -> Result<String, CliError> {
    if let Some(node) = cluster.default_node() {
        return Ok(node.to_owned());
    }
    Ok(cluster.guest_node(vmid).await?)
}

/// Like [`guest_node`], but an unknown guest falls back to `required_node`
/// so that `set` can create it.
pub async fn guest_node_or_default(cluster: &Cluster, vmid: GuestId) -> Result<String, CliError> {
    match guest_node(cluster, vmid).await {
        Err(CliError::NotFound { .. }) => required_node(cluster),
        other => other,
    }
}
