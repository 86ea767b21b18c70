//! Create / update / set / get / list / delete, shared by every kind.
//!
//! Kind modules turn their flags into `(field, value)` pairs and pick the
//! table columns; everything else happens here.

use serde::Serialize;
use serde_json::{Map, Value};
use tabled::Tabled;

use proxly_core::{
    Applied, AppliedAction, Cluster, DeleteOutcome, DesiredRecord, ResourceKind, ResourceSpec,
    Scope,
};

use crate::cli::{GlobalOpts, OutputFormat, RecordInput};
use crate::error::CliError;
use crate::output::{self, Status};

use super::util;

/// Field flags as given on the command line; `None` means not passed.
pub type FieldFlags = Vec<(&'static str, Option<String>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    Update,
    Set,
}

impl Mode {
    fn verb(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Set => "set",
        }
    }
}

// ── Desired records ──────────────────────────────────────────────────

/// Merge `--from-file`, field flags and `--clear` into a desired record.
///
/// Flags win over the file and `--clear` wins over both. An empty flag
/// value clears the field; an absent one leaves it alone.
pub fn build_record(
    cluster: &Cluster,
    kind: ResourceKind,
    flags: FieldFlags,
    input: &RecordInput,
) -> Result<DesiredRecord, CliError> {
    let mut document = match &input.from_file {
        Some(path) => util::read_json_object(path)?,
        None => Map::new(),
    };
    overlay(&mut document, flags, &input.clear);
    let schema = cluster.registry().descriptor(kind)?.fields;
    Ok(DesiredRecord::from_document(schema, &document)?)
}

fn overlay(document: &mut Map<String, Value>, flags: FieldFlags, clear: &[String]) {
    for (name, value) in flags {
        match value {
            Some(v) if v.is_empty() => {
                document.insert(name.to_owned(), Value::Null);
            }
            Some(v) => {
                document.insert(name.to_owned(), Value::String(v));
            }
            None => {}
        }
    }
    for name in clear {
        document.insert(name.clone(), Value::Null);
    }
}

// ── Mutations ────────────────────────────────────────────────────────

/// Build the typed config for `kind` and apply it.
pub async fn mutate(
    cluster: &Cluster,
    mode: Mode,
    kind: ResourceKind,
    identifier: &str,
    scope: &Scope,
    record: &DesiredRecord,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let spec = ResourceSpec::from_desired(kind, identifier, scope, record)?;
    let applied = apply(cluster, mode, &spec, global).await?;
    report_applied(&applied, global)
}

pub async fn apply(
    cluster: &Cluster,
    mode: Mode,
    spec: &ResourceSpec,
    global: &GlobalOpts,
) -> Result<Applied, CliError> {
    let label = format!("{} '{}'", spec.kind(), spec.identifier());
    tracing::debug!(?mode, %label, "applying");
    let applied = match mode {
        Mode::Create => {
            util::with_spinner(global, format!("Creating {label}"), cluster.create(spec)).await
        }
        Mode::Update => {
            util::with_spinner(global, format!("Updating {label}"), cluster.update(spec)).await
        }
        Mode::Set => {
            util::with_spinner(global, format!("Reconciling {label}"), cluster.set(spec)).await
        }
    };
    applied.map_err(|e| {
        CliError::from(e).during(mode.verb(), spec.kind().as_ref(), &spec.identifier())
    })
}

/// Print the outcome of a create, update or set.
pub fn report_applied(applied: &Applied, global: &GlobalOpts) -> Result<(), CliError> {
    match global.output {
        OutputFormat::Table => {
            let label = format!("{} '{}'", applied.kind, applied.identifier);
            match applied.action {
                AppliedAction::Created => {
                    output::status(global, Status::Done, &format!("{label} created"));
                }
                AppliedAction::Updated => output::status(
                    global,
                    Status::Done,
                    &format!("{label} updated ({})", applied.changed.join(", ")),
                ),
                AppliedAction::Unchanged => {
                    output::status(global, Status::Unchanged, &format!("{label} unchanged"));
                }
            }
            if let Some(task) = &applied.task {
                if task.warnings > 0 {
                    output::status(
                        global,
                        Status::Warning,
                        &format!("task {} finished with {} warning(s)", task.upid, task.warnings),
                    );
                }
            }
            if let Some(secret) = applied
                .response
                .as_ref()
                .and_then(|r| r.get("value"))
                .and_then(Value::as_str)
            {
                // Token secrets are only ever returned by the create call.
                let full = applied
                    .response
                    .as_ref()
                    .and_then(|r| r.get("full-tokenid"))
                    .and_then(Value::as_str)
                    .unwrap_or(&applied.identifier);
                output::print_output(&format!("{full}\n{secret}"), false);
                output::status(global, Status::Warning, "store the token secret now; it is not shown again");
            }
            Ok(())
        }
        format => {
            let out = output::render_single(format, applied, |_| String::new(), |a| {
                a.identifier.clone()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

// ── Reads ────────────────────────────────────────────────────────────

/// Show one resource's current configuration.
pub async fn show(
    cluster: &Cluster,
    kind: ResourceKind,
    identifier: &str,
    scope: &Scope,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let snapshot = cluster.get(kind, identifier, scope).await?;
    let out = output::render_single(
        global.output,
        &snapshot,
        |s| output::detail_lines(&s.fields),
        |s| s.identifier.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// List a collection with kind-specific table columns.
pub async fn list<R: Tabled>(
    cluster: &Cluster,
    kind: ResourceKind,
    scope: &Scope,
    global: &GlobalOpts,
    to_row: impl Fn(&Value) -> R,
) -> Result<(), CliError> {
    let id_field = cluster.registry().descriptor(kind)?.id_field;
    let mut items = cluster.list(kind, scope).await?;
    items.sort_by_key(|v| output::cell(v.get(id_field)));
    let out = output::render_list(global.output, &items, to_row, |v| {
        output::cell(v.get(id_field))
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[derive(Serialize)]
struct Deleted<'a> {
    kind: ResourceKind,
    identifier: &'a str,
    outcome: DeleteOutcome,
}

/// Delete after confirmation. Deleting something already gone succeeds.
pub async fn delete(
    cluster: &Cluster,
    kind: ResourceKind,
    identifier: &str,
    scope: &Scope,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if !util::confirm(&format!("Delete {kind} '{identifier}'?"), global.yes)? {
        return Ok(());
    }
    let outcome = util::with_spinner(
        global,
        format!("Deleting {kind} '{identifier}'"),
        cluster.delete(kind, identifier, scope),
    )
    .await
    .map_err(|e| CliError::from(e).during("delete", kind.as_ref(), identifier))?;
    report_deleted(kind, identifier, outcome, global)
}

/// Print the outcome of a delete.
pub fn report_deleted(
    kind: ResourceKind,
    identifier: &str,
    outcome: DeleteOutcome,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match global.output {
        OutputFormat::Table => match outcome {
            DeleteOutcome::Deleted => {
                output::status(global, Status::Done, &format!("{kind} '{identifier}' deleted"));
            }
            DeleteOutcome::DidNotExist => output::status(
                global,
                Status::Unchanged,
                &format!("{kind} '{identifier}' did not exist"),
            ),
        },
        format => {
            let record = Deleted {
                kind,
                identifier,
                outcome,
            };
            let out = output::render_single(format, &record, |_| String::new(), |d| {
                d.identifier.to_owned()
            })?;
            output::print_output(&out, global.quiet);
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::error::Error as _;

    use clap::Parser;
    use miette::Diagnostic;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use proxly_api::{ApiClient, Credential, TransportConfig};
    use proxly_core::{DesiredField, GroupConfig, ResourceRegistry};

    use super::*;
    use crate::cli::Cli;
    use crate::error::exit_code;

    async fn mock_cluster() -> (MockServer, Cluster) {
        let server = MockServer::start().await;
        let client = ApiClient::new(
            &server.uri(),
            Credential::api_token("ci@pve", "deploy", "secret"),
            &TransportConfig::default(),
        )
        .unwrap();
        (server, Cluster::from_client(client, ResourceRegistry::standard()))
    }

    fn quiet() -> GlobalOpts {
        Cli::try_parse_from(["proxly", "-q", "-y", "cluster", "version"])
            .unwrap()
            .global
    }

    #[tokio::test]
    async fn failed_create_names_operation_and_resource() {
        let (server, cluster) = mock_cluster().await;
        Mock::given(method("POST"))
            .and(path("/api2/json/access/groups"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(json!({ "data": null, "message": "cfs lock timeout\n" })),
            )
            .mount(&server)
            .await;

        let spec: ResourceSpec = GroupConfig {
            groupid: "ops".into(),
            comment: DesiredField::Unset,
        }
        .into();
        let err = apply(&cluster, Mode::Create, &spec, &quiet()).await.unwrap_err();

        assert_eq!(err.to_string(), "Failed to create group 'ops'");
        assert!(err.source().unwrap().to_string().contains("cfs lock timeout"));
        assert_eq!(err.code().unwrap().to_string(), "proxly::operation_failed");
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }

    #[tokio::test]
    async fn failed_delete_names_operation_and_resource() {
        let (server, cluster) = mock_cluster().await;
        Mock::given(method("DELETE"))
            .and(path("/api2/json/access/groups/ops"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(json!({ "data": null, "message": "cfs lock timeout\n" })),
            )
            .mount(&server)
            .await;

        let err = delete(&cluster, ResourceKind::Group, "ops", &Scope::default(), &quiet())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Failed to delete group 'ops'");
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }

    #[test]
    fn flags_override_file_and_clear_overrides_flags() {
        let mut document = json!({ "comment": "from file", "path": "/a", "nodes": "pve1" })
            .as_object()
            .cloned()
            .unwrap_or_default();
        overlay(
            &mut document,
            vec![
                ("comment", Some("from flag".into())),
                ("path", Some(String::new())),
                ("content", None),
                ("nodes", Some("pve2".into())),
            ],
            &["nodes".to_owned()],
        );
        assert_eq!(document.get("comment"), Some(&json!("from flag")));
        assert_eq!(document.get("path"), Some(&Value::Null));
        assert!(!document.contains_key("content"));
        assert_eq!(document.get("nodes"), Some(&Value::Null));
    }
}
