//! User command handlers.

use serde_json::Value;
use tabled::Tabled;

use proxly_core::{Cluster, ResourceKind, Scope};

use crate::cli::{GlobalOpts, UserArgs, UserCommand, UserMutation};
use crate::error::CliError;
use crate::output::cell;

use super::resource::{self, Mode};
use super::util;

const KIND: ResourceKind = ResourceKind::User;

#[derive(Tabled)]
struct UserRow {
    #[tabled(rename = "User")]
    userid: String,
    #[tabled(rename = "Enabled")]
    enable: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Groups")]
    groups: String,
    #[tabled(rename = "Expire")]
    expire: String,
}

impl From<&Value> for UserRow {
    fn from(v: &Value) -> Self {
        let name = [v.get("firstname"), v.get("lastname")]
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let enabled = match v.get("enable") {
            Some(Value::Number(n)) => n.as_i64() != Some(0),
            Some(Value::Bool(b)) => *b,
            _ => true,
        };
        Self {
            userid: cell(v.get("userid")),
            enable: if enabled { "yes" } else { "no" }.into(),
            name: if name.is_empty() { "-".into() } else { name },
            email: cell(v.get("email")),
            groups: cell(v.get("groups")),
            expire: match v.get("expire").and_then(Value::as_i64) {
                None | Some(0) => "never".into(),
                Some(ts) => ts.to_string(),
            },
        }
    }
}

pub async fn handle(cluster: &Cluster, args: UserArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let scope = Scope::default();
    match args.command {
        UserCommand::List => {
            resource::list(cluster, KIND, &scope, global, |v| UserRow::from(v)).await
        }
        UserCommand::Get { userid } => resource::show(cluster, KIND, &userid, &scope, global).await,
        UserCommand::Create(m) => mutate(cluster, Mode::Create, m, global).await,
        UserCommand::Update(m) => mutate(cluster, Mode::Update, m, global).await,
        UserCommand::Set(m) => mutate(cluster, Mode::Set, m, global).await,
        UserCommand::Delete { userid } => {
            resource::delete(cluster, KIND, &userid, &scope, global).await
        }
    }
}

async fn mutate(
    cluster: &Cluster,
    mode: Mode,
    m: UserMutation,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let password = util::secret_flag("Password", m.password)?;
    let flags = vec![
        ("email", m.email),
        ("firstname", m.firstname),
        ("lastname", m.lastname),
        ("enable", m.enable),
        ("expire", m.expire),
        ("groups", m.groups),
        ("comment", m.comment),
        ("password", password),
    ];
    let record = resource::build_record(cluster, KIND, flags, &m.input)?;
    resource::mutate(cluster, mode, KIND, &m.userid, &Scope::default(), &record, global).await
}
