//! Task command handlers.

use tabled::Tabled;

use proxly_core::{Cluster, CoreError, TaskResult, TaskSummary, Upid};

use crate::cli::{GlobalOpts, OutputFormat, TaskArgs, TaskCommand};
use crate::error::CliError;
use crate::output::{self, Status};

use super::util;

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "Started")]
    started: i64,
    #[tabled(rename = "Type")]
    task_type: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "UPID")]
    upid: String,
}

impl From<&TaskSummary> for TaskRow {
    fn from(t: &TaskSummary) -> Self {
        Self {
            started: t.starttime,
            task_type: t.task_type.clone(),
            id: t.id.clone().filter(|id| !id.is_empty()).unwrap_or_else(|| "-".into()),
            user: t.user.clone(),
            status: t.status.clone().unwrap_or_else(|| "running".into()),
            upid: t.upid.clone(),
        }
    }
}

fn parse_upid(raw: &str) -> Result<Upid, CliError> {
    raw.trim()
        .parse::<Upid>()
        .map_err(|e| CliError::from(CoreError::from(e)))
}

pub async fn handle(cluster: &Cluster, args: TaskArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        TaskCommand::List { vmid, limit } => {
            let node = util::required_node(cluster)?;
            let tasks = cluster.node_tasks(&node, Some(limit), vmid).await?;
            let out = output::render_list(
                global.output,
                &tasks,
                |t| TaskRow::from(t),
                |t| t.upid.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        TaskCommand::Status { upid } => {
            let upid = parse_upid(&upid)?;
            let status = cluster.task_status(&upid).await?;
            let out = output::render_single(
                global.output,
                &status,
                |s| {
                    let fields = serde_json::to_value(s)
                        .ok()
                        .and_then(|v| v.as_object().cloned())
                        .unwrap_or_default();
                    output::detail_lines(&fields)
                },
                |s| s.exitstatus.clone().unwrap_or_else(|| "running".into()),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        TaskCommand::Wait { upid } => {
            let upid = parse_upid(&upid)?;
            let result = util::with_spinner(
                global,
                format!("Waiting for {}", upid.task_type()),
                cluster.wait(&upid),
            )
            .await?;
            report_task(&result, &format!("task {} finished", upid.task_type()), global)
        }

        TaskCommand::Log { upid, start, limit } => {
            let upid = parse_upid(&upid)?;
            let lines = cluster.task_log(&upid, start, limit).await?;
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => lines
                    .iter()
                    .map(|l| l.t.as_str())
                    .collect::<Vec<_>>()
                    .join("\n"),
                format => output::render_single(format, &lines, |_| String::new(), |_| {
                    String::new()
                })?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        TaskCommand::Stop { upid } => {
            let upid = parse_upid(&upid)?;
            if !util::confirm(&format!("Stop task {upid}?"), global.yes)? {
                return Ok(());
            }
            cluster.stop_task(&upid).await?;
            output::status(global, Status::Done, &format!("stop requested for {upid}"));
            Ok(())
        }
    }
}

/// Print a finished task: a status line for tables, the result otherwise.
pub fn report_task(result: &TaskResult, done: &str, global: &GlobalOpts) -> Result<(), CliError> {
    match global.output {
        OutputFormat::Table => {
            if result.warnings > 0 {
                output::status(
                    global,
                    Status::Warning,
                    &format!("{done} with {} warning(s)", result.warnings),
                );
            } else {
                output::status(global, Status::Done, done);
            }
            Ok(())
        }
        format => {
            let out = output::render_single(format, result, |_| String::new(), |r| {
                r.upid.to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
