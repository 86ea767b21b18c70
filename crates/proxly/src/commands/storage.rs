//! Storage command handlers.

use serde_json::Value;
use tabled::Tabled;

use proxly_core::{Cluster, ResourceKind, Scope};

use crate::cli::{GlobalOpts, StorageArgs, StorageCommand, StorageMutation};
use crate::error::CliError;
use crate::output::cell;

use super::resource::{self, Mode};

const KIND: ResourceKind = ResourceKind::Storage;

#[derive(Tabled)]
struct StorageRow {
    #[tabled(rename = "Storage")]
    storage: String,
    #[tabled(rename = "Type")]
    storage_type: String,
    #[tabled(rename = "Content")]
    content: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Nodes")]
    nodes: String,
    #[tabled(rename = "Disabled")]
    disable: String,
}

impl From<&Value> for StorageRow {
    fn from(v: &Value) -> Self {
        Self {
            storage: cell(v.get("storage")),
            storage_type: cell(v.get("type")),
            content: cell(v.get("content")),
            path: cell(v.get("path")),
            nodes: match v.get("nodes") {
                None | Some(Value::Null) => "all".into(),
                other => cell(other),
            },
            disable: match v.get("disable").and_then(Value::as_i64) {
                Some(1) => "yes".into(),
                _ => "no".into(),
            },
        }
    }
}

pub async fn handle(
    cluster: &Cluster,
    args: StorageArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let scope = Scope::default();
    match args.command {
        StorageCommand::List => {
            resource::list(cluster, KIND, &scope, global, |v| StorageRow::from(v)).await
        }
        StorageCommand::Get { storage } => {
            resource::show(cluster, KIND, &storage, &scope, global).await
        }
        StorageCommand::Create(m) => mutate(cluster, Mode::Create, m, global).await,
        StorageCommand::Update(m) => mutate(cluster, Mode::Update, m, global).await,
        StorageCommand::Set(m) => mutate(cluster, Mode::Set, m, global).await,
        StorageCommand::Delete { storage } => {
            resource::delete(cluster, KIND, &storage, &scope, global).await
        }
    }
}

async fn mutate(
    cluster: &Cluster,
    mode: Mode,
    m: StorageMutation,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let flags = vec![
        ("type", m.storage_type),
        ("path", m.path),
        ("content", m.content),
        ("nodes", m.nodes),
        ("disable", m.disable),
    ];
    let record = resource::build_record(cluster, KIND, flags, &m.input)?;
    resource::mutate(cluster, mode, KIND, &m.storage, &Scope::default(), &record, global).await
}
