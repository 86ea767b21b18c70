//! API token command handlers. Every command needs `--user`.

use serde_json::Value;
use tabled::Tabled;

use proxly_core::{Cluster, ResourceKind, Scope};

use crate::cli::{GlobalOpts, TokenArgs, TokenCommand, TokenMutation};
use crate::error::CliError;
use crate::output::cell;

use super::resource::{self, Mode};

const KIND: ResourceKind = ResourceKind::Token;

#[derive(Tabled)]
struct TokenRow {
    #[tabled(rename = "Token")]
    tokenid: String,
    #[tabled(rename = "Privsep")]
    privsep: String,
    #[tabled(rename = "Expire")]
    expire: String,
    #[tabled(rename = "Comment")]
    comment: String,
}

impl From<&Value> for TokenRow {
    fn from(v: &Value) -> Self {
        Self {
            tokenid: cell(v.get("tokenid")),
            privsep: cell(v.get("privsep")),
            expire: match v.get("expire").and_then(Value::as_i64) {
                None | Some(0) => "never".into(),
                Some(ts) => ts.to_string(),
            },
            comment: cell(v.get("comment")),
        }
    }
}

fn scope(user: Option<String>) -> Result<Scope, CliError> {
    user.map(Scope::user).ok_or_else(|| CliError::Validation {
        field: "user".into(),
        reason: "token commands need --user <name@realm>".into(),
    })
}

pub async fn handle(cluster: &Cluster, args: TokenArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let scope = scope(args.user)?;
    match args.command {
        TokenCommand::List => {
            resource::list(cluster, KIND, &scope, global, |v| TokenRow::from(v)).await
        }
        TokenCommand::Get { tokenid } => {
            resource::show(cluster, KIND, &tokenid, &scope, global).await
        }
        TokenCommand::Create(m) => mutate(cluster, Mode::Create, &scope, m, global).await,
        TokenCommand::Update(m) => mutate(cluster, Mode::Update, &scope, m, global).await,
        TokenCommand::Set(m) => mutate(cluster, Mode::Set, &scope, m, global).await,
        TokenCommand::Delete { tokenid } => {
            resource::delete(cluster, KIND, &tokenid, &scope, global).await
        }
    }
}

async fn mutate(
    cluster: &Cluster,
    mode: Mode,
    scope: &Scope,
    m: TokenMutation,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let flags = vec![
        ("comment", m.comment),
        ("expire", m.expire),
        ("privsep", m.privsep),
    ];
    let record = resource::build_record(cluster, KIND, flags, &m.input)?;
    resource::mutate(cluster, mode, KIND, &m.tokenid, scope, &record, global).await
}
