//! Pool command handlers.

use serde_json::Value;
use tabled::Tabled;

use proxly_core::{Cluster, ResourceKind, Scope};

use crate::cli::{GlobalOpts, PoolArgs, PoolCommand, PoolMutation};
use crate::error::CliError;
use crate::output::cell;

use super::resource::{self, Mode};

const KIND: ResourceKind = ResourceKind::Pool;

#[derive(Tabled)]
struct PoolRow {
    #[tabled(rename = "Pool")]
    poolid: String,
    #[tabled(rename = "Comment")]
    comment: String,
}

impl From<&Value> for PoolRow {
    fn from(v: &Value) -> Self {
        Self {
            poolid: cell(v.get("poolid")),
            comment: cell(v.get("comment")),
        }
    }
}

pub async fn handle(cluster: &Cluster, args: PoolArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let scope = Scope::default();
    match args.command {
        PoolCommand::List => {
            resource::list(cluster, KIND, &scope, global, |v| PoolRow::from(v)).await
        }
        PoolCommand::Get { poolid } => resource::show(cluster, KIND, &poolid, &scope, global).await,
        PoolCommand::Create(m) => mutate(cluster, Mode::Create, m, global).await,
        PoolCommand::Update(m) => mutate(cluster, Mode::Update, m, global).await,
        PoolCommand::Set(m) => mutate(cluster, Mode::Set, m, global).await,
        PoolCommand::Delete { poolid } => {
            resource::delete(cluster, KIND, &poolid, &scope, global).await
        }
    }
}

async fn mutate(
    cluster: &Cluster,
    mode: Mode,
    m: PoolMutation,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let record = resource::build_record(cluster, KIND, vec![("comment", m.comment)], &m.input)?;
    resource::mutate(cluster, mode, KIND, &m.poolid, &Scope::default(), &record, global).await
}
