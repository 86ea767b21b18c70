//! Group command handlers.

use serde_json::Value;
use tabled::Tabled;

use proxly_core::{Cluster, ResourceKind, Scope};

use crate::cli::{GlobalOpts, GroupArgs, GroupCommand, GroupMutation};
use crate::error::CliError;
use crate::output::cell;

use super::resource::{self, Mode};

const KIND: ResourceKind = ResourceKind::Group;

#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "Group")]
    groupid: String,
    #[tabled(rename = "Members")]
    users: String,
    #[tabled(rename = "Comment")]
    comment: String,
}

impl From<&Value> for GroupRow {
    fn from(v: &Value) -> Self {
        Self {
            groupid: cell(v.get("groupid")),
            users: cell(v.get("users")),
            comment: cell(v.get("comment")),
        }
    }
}

pub async fn handle(cluster: &Cluster, args: GroupArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let scope = Scope::default();
    match args.command {
        GroupCommand::List => {
            resource::list(cluster, KIND, &scope, global, |v| GroupRow::from(v)).await
        }
        GroupCommand::Get { groupid } => {
            resource::show(cluster, KIND, &groupid, &scope, global).await
        }
        GroupCommand::Create(m) => mutate(cluster, Mode::Create, m, global).await,
        GroupCommand::Update(m) => mutate(cluster, Mode::Update, m, global).await,
        GroupCommand::Set(m) => mutate(cluster, Mode::Set, m, global).await,
        GroupCommand::Delete { groupid } => {
            resource::delete(cluster, KIND, &groupid, &scope, global).await
        }
    }
}

async fn mutate(
    cluster: &Cluster,
    mode: Mode,
    m: GroupMutation,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let record = resource::build_record(cluster, KIND, vec![("comment", m.comment)], &m.input)?;
    resource::mutate(cluster, mode, KIND, &m.groupid, &Scope::default(), &record, global).await
}
