//! Guest command handlers: configuration, power actions, cloning and id
//! allocation.
//!
//! Commands naming an existing guest find its node from `--node` (or the
//! profile's default node), falling back to the cluster inventory.

use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use proxly_core::{
    Applied, Cluster, ClusterResource, DeleteOutcome, DesiredRecord, GuestAction, GuestConfig,
    GuestId, ResourceConfig, ResourceKind, Scope, TaskResult,
};

use crate::cli::{GlobalOpts, GuestArgs, GuestCommand, GuestCreate, GuestFields, OutputFormat};
use crate::error::CliError;
use crate::output::{self, bytes, cell};

use super::resource::{self, Mode};
use super::{task, util};

const KIND: ResourceKind = ResourceKind::Guest;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct NodeGuestRow {
    #[tabled(rename = "VMID")]
    vmid: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "CPUs")]
    cpus: String,
    #[tabled(rename = "Memory")]
    memory: String,
}

impl From<&Value> for NodeGuestRow {
    fn from(v: &Value) -> Self {
        Self {
            vmid: cell(v.get("vmid")),
            name: cell(v.get("name")),
            status: cell(v.get("status")),
            cpus: cell(v.get("cpus")),
            memory: v
                .get("maxmem")
                .and_then(Value::as_u64)
                .map_or_else(|| "-".into(), bytes),
        }
    }
}

#[derive(Tabled)]
struct ClusterGuestRow {
    #[tabled(rename = "VMID")]
    vmid: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Pool")]
    pool: String,
}

impl From<&ClusterResource> for ClusterGuestRow {
    fn from(r: &ClusterResource) -> Self {
        let template = r.template == Some(1);
        Self {
            vmid: r.vmid.map_or_else(|| "-".into(), |id| id.to_string()),
            name: r.name.clone().unwrap_or_else(|| "-".into()),
            node: r.node.clone().unwrap_or_else(|| "-".into()),
            status: if template {
                "template".into()
            } else {
                r.status.clone().unwrap_or_else(|| "-".into())
            },
            memory: r.maxmem.map_or_else(|| "-".into(), bytes),
            pool: r.pool.clone().unwrap_or_else(|| "-".into()),
        }
    }
}

#[derive(Serialize)]
struct IdOutput {
    vmid: GuestId,
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(cluster: &Cluster, args: GuestArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        GuestCommand::List => list(cluster, global).await,

        GuestCommand::Get { vmid } => {
            let vmid = util::guest_id(vmid)?;
            let node = util::guest_node(cluster, vmid).await?;
            resource::show(cluster, KIND, &vmid.to_string(), &Scope::node(node), global).await
        }

        GuestCommand::Create(args) => create(cluster, args, global).await,

        GuestCommand::Update(m) => {
            let vmid = util::guest_id(m.vmid)?;
            let node = util::guest_node(cluster, vmid).await?;
            mutate(cluster, Mode::Update, vmid, node, m.fields, global).await
        }

        GuestCommand::Set(m) => {
            let vmid = util::guest_id(m.vmid)?;
            let node = util::guest_node_or_default(cluster, vmid).await?;
            mutate(cluster, Mode::Set, vmid, node, m.fields, global).await
        }

        GuestCommand::Delete { vmid } => {
            let vmid = util::guest_id(vmid)?;
            match util::guest_node(cluster, vmid).await {
                Ok(node) => {
                    resource::delete(cluster, KIND, &vmid.to_string(), &Scope::node(node), global)
                        .await
                }
                Err(CliError::NotFound { .. }) => resource::report_deleted(
                    KIND,
                    &vmid.to_string(),
                    DeleteOutcome::DidNotExist,
                    global,
                ),
                Err(e) => Err(e),
            }
        }

        GuestCommand::Start(t) => action(cluster, t.vmid, GuestAction::Start, global).await,
        GuestCommand::Stop(t) => action(cluster, t.vmid, GuestAction::Stop, global).await,
        GuestCommand::Shutdown(t) => action(cluster, t.vmid, GuestAction::Shutdown, global).await,
        GuestCommand::Reboot(t) => action(cluster, t.vmid, GuestAction::Reboot, global).await,
        GuestCommand::Suspend(t) => action(cluster, t.vmid, GuestAction::Suspend, global).await,
        GuestCommand::Resume(t) => action(cluster, t.vmid, GuestAction::Resume, global).await,

        GuestCommand::Clone {
            vmid,
            newid,
            name,
            full,
        } => {
            let vmid = util::guest_id(vmid)?;
            let node = util::guest_node(cluster, vmid).await?;
            let newid = match newid {
                Some(id) => util::guest_id(id)?,
                None => cluster.next_free_id(GuestId::MIN).await?,
            };
            let result = util::with_spinner(
                global,
                format!("Cloning guest {vmid} to {newid}"),
                cluster.clone_guest(&node, vmid, newid, name.as_deref(), full),
            )
            .await
            .map_err(|e| {
                CliError::from(e).during("clone", KIND.as_ref(), &vmid.to_string())
            })?;
            task::report_task(&result, &format!("guest {vmid} cloned to {newid}"), global)
        }

        GuestCommand::NextId { start } => {
            let vmid = cluster.next_free_id(start).await?;
            print_id(vmid, global)
        }

        GuestCommand::MaxId => {
            let vmid = cluster.max_id().await?;
            print_id(vmid, global)
        }

        GuestCommand::Locate { vmid } => {
            let vmid = util::guest_id(vmid)?;
            let node = cluster.guest_node(vmid).await?;
            output::print_output(&node, global.quiet);
            Ok(())
        }
    }
}

async fn list(cluster: &Cluster, global: &GlobalOpts) -> Result<(), CliError> {
    if let Some(node) = cluster.default_node() {
        return resource::list(cluster, KIND, &Scope::node(node), global, |v| {
            NodeGuestRow::from(v)
        })
        .await;
    }
    let mut guests = cluster.resources(Some("vm")).await?;
    guests.sort_by_key(|r| r.vmid);
    let out = output::render_list(
        global.output,
        &guests,
        |r| ClusterGuestRow::from(r),
        |r| r.vmid.map(|id| id.to_string()).unwrap_or_default(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Configuration ───────────────────────────────────────────────────

fn fields_record(cluster: &Cluster, fields: GuestFields) -> Result<DesiredRecord, CliError> {
    let cipassword = util::secret_flag("Cloud-init password", fields.cipassword)?;
    let sshkeys = fields
        .sshkeys
        .map(std::fs::read_to_string)
        .transpose()?
        .map(|keys| keys.trim().to_owned());
    let flags = vec![
        ("name", fields.name),
        ("memory", fields.memory),
        ("cores", fields.cores),
        ("sockets", fields.sockets),
        ("description", fields.description),
        ("tags", fields.tags),
        ("onboot", fields.onboot),
        ("ciuser", fields.ciuser),
        ("cipassword", cipassword),
        ("sshkeys", sshkeys),
        ("pool", fields.pool),
    ];
    resource::build_record(cluster, KIND, flags, &fields.input)
}

async fn mutate(
    cluster: &Cluster,
    mode: Mode,
    vmid: GuestId,
    node: String,
    fields: GuestFields,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let record = fields_record(cluster, fields)?;
    resource::mutate(cluster, mode, KIND, &vmid.to_string(), &Scope::node(node), &record, global)
        .await
}

async fn create(cluster: &Cluster, args: GuestCreate, global: &GlobalOpts) -> Result<(), CliError> {
    let node = util::required_node(cluster)?;
    if let Some(vmid) = args.vmid {
        let vmid = util::guest_id(vmid)?;
        return mutate(cluster, Mode::Create, vmid, node, args.fields, global).await;
    }

    // The placeholder id is replaced by the allocator before sending.
    let placeholder = util::guest_id(args.start.max(GuestId::MIN))?;
    let record = fields_record(cluster, args.fields)?;
    let config = GuestConfig::from_desired(&placeholder.to_string(), &Scope::node(node), &record)?;
    let applied: Applied = util::with_spinner(
        global,
        "Creating guest".into(),
        cluster.create_guest_auto_id(config, args.start),
    )
    .await
    .map_err(|e| CliError::from(e).during("create", KIND.as_ref(), "(next free id)"))?;
    resource::report_applied(&applied, global)
}

// ── Actions ─────────────────────────────────────────────────────────

async fn action(
    cluster: &Cluster,
    vmid: u32,
    action: GuestAction,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let vmid = util::guest_id(vmid)?;
    let node = util::guest_node(cluster, vmid).await?;
    let result: TaskResult = util::with_spinner(
        global,
        format!("Waiting for {action} of guest {vmid}"),
        cluster.guest_action(&node, vmid, action),
    )
    .await
    .map_err(|e| {
        CliError::from(e).during(action.as_ref(), KIND.as_ref(), &vmid.to_string())
    })?;
    task::report_task(&result, &format!("guest {vmid}: {action} done"), global)
}

fn print_id(vmid: GuestId, global: &GlobalOpts) -> Result<(), CliError> {
    let out = match global.output {
        OutputFormat::Table | OutputFormat::Plain => vmid.to_string(),
        format => output::render_single(format, &IdOutput { vmid }, |_| String::new(), |_| {
            String::new()
        })?,
    };
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn node_rows_format_memory() {
        let row = NodeGuestRow::from(&json!({
            "vmid": 100, "name": "web-01", "status": "running", "cpus": 2,
            "maxmem": 2_147_483_648_u64
        }));
        assert_eq!(row.vmid, "100");
        assert_eq!(row.memory, "2.0 GiB");
        assert_eq!(row.cpus, "2");
    }

    #[test]
    fn templates_show_as_such() {
        let resource: ClusterResource = serde_json::from_value(json!({
            "id": "qemu/9000", "type": "qemu", "node": "pve1", "vmid": 9000,
            "template": 1, "status": "stopped"
        }))
        .unwrap_or_else(|e| panic!("{e}"));
        let row = ClusterGuestRow::from(&resource);
        assert_eq!(row.status, "template");
        assert_eq!(row.node, "pve1");
        assert_eq!(row.pool, "-");
    }
}
