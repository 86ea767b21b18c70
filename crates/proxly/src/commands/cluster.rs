//! Cluster-wide read-only views: nodes, version, resource inventory.

use tabled::Tabled;

use proxly_core::{Cluster, ClusterResource, NodeInfo};

use crate::cli::{ClusterArgs, ClusterCommand, GlobalOpts};
use crate::error::CliError;
use crate::output::{self, bytes};

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Uptime")]
    uptime: String,
}

impl From<&NodeInfo> for NodeRow {
    fn from(n: &NodeInfo) -> Self {
        let cpu = match (n.cpu, n.maxcpu) {
            (Some(load), Some(max)) => format!("{:.1}% of {max}", load * 100.0),
            (Some(load), None) => format!("{:.1}%", load * 100.0),
            _ => "-".into(),
        };
        let memory = match (n.mem, n.maxmem) {
            (Some(used), Some(max)) => format!("{} / {}", bytes(used), bytes(max)),
            _ => "-".into(),
        };
        Self {
            node: n.node.clone(),
            status: n.status.clone().unwrap_or_else(|| "-".into()),
            cpu,
            memory,
            uptime: n.uptime.map_or_else(|| "-".into(), uptime),
        }
    }
}

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl From<&ClusterResource> for ResourceRow {
    fn from(r: &ClusterResource) -> Self {
        let dash = || "-".to_owned();
        Self {
            id: r.id.clone(),
            resource_type: r.resource_type.clone(),
            node: r.node.clone().unwrap_or_else(dash),
            name: r
                .name
                .clone()
                .or_else(|| r.storage.clone())
                .unwrap_or_else(dash),
            status: r.status.clone().unwrap_or_else(dash),
        }
    }
}

fn uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

pub async fn handle(cluster: &Cluster, args: ClusterArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let out = match args.command {
        ClusterCommand::Nodes => {
            let mut nodes = cluster.nodes().await?;
            nodes.sort_by(|a, b| a.node.cmp(&b.node));
            output::render_list(global.output, &nodes, |n| NodeRow::from(n), |n| n.node.clone())?
        }

        ClusterCommand::Version => {
            let version = cluster.version().await?;
            output::render_single(
                global.output,
                &version,
                |v| {
                    let mut lines = vec![format!("version: {}", v.version)];
                    if let Some(release) = &v.release {
                        lines.push(format!("release: {release}"));
                    }
                    if let Some(repoid) = &v.repoid {
                        lines.push(format!("repoid:  {repoid}"));
                    }
                    lines.join("\n")
                },
                |v| v.version.clone(),
            )?
        }

        ClusterCommand::Resources { resource_type } => {
            let mut resources = cluster.resources(resource_type.as_deref()).await?;
            resources.sort_by(|a, b| a.id.cmp(&b.id));
            output::render_list(
                global.output,
                &resources,
                |r| ResourceRow::from(r),
                |r| r.id.clone(),
            )?
        }
    };
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_humanized() {
        assert_eq!(uptime(59), "0m");
        assert_eq!(uptime(3_660), "1h 1m");
        assert_eq!(uptime(90_000), "1d 1h");
    }

    #[test]
    fn node_rows_show_load_and_memory() {
        let row = NodeRow::from(&NodeInfo {
            node: "pve1".into(),
            status: Some("online".into()),
            cpu: Some(0.125),
            maxcpu: Some(8),
            mem: Some(1_073_741_824),
            maxmem: Some(4_294_967_296),
            uptime: None,
        });
        assert_eq!(row.cpu, "12.5% of 8");
        assert_eq!(row.memory, "1.0 GiB / 4.0 GiB");
        assert_eq!(row.uptime, "-");
    }
}
