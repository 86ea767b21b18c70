// Task handles and the tracker that waits on them.
//
// Asynchronous operations answer with a UPID string. Completion is observed
// by polling `GET /nodes/{node}/tasks/{upid}/status` until the task stops.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::client::{ApiClient, segment};
use crate::encode::FormBody;
use crate::error::Error;
use crate::models::TaskLogLine;
use crate::poll::{PollError, Probe, poll_until};

/// Interval between status probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Number of log lines attached to a `TaskFailed` error.
pub const LOG_TAIL_LINES: usize = 20;

const LOG_FETCH_LIMIT: u32 = 5000;

// ── Upid ────────────────────────────────────────────────────────────

/// Unique task identifier: `UPID:node:pid:pstart:starttime:type:id:user:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Upid {
    raw: String,
    node: String,
    task_type: String,
    id: String,
    user: String,
    starttime: i64,
}

impl Upid {
    /// Node the task runs on.
    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    /// Task subject (guest id, storage name), empty for node-wide tasks.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Start time, seconds since the epoch.
    pub fn starttime(&self) -> i64 {
        self.starttime
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Upid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidUpid(s.to_owned());
        let parts: Vec<&str> = s.split(':').collect();
        let [prefix, node, pid, pstart, starttime, task_type, id, user, ..] = parts[..] else {
            return Err(invalid());
        };
        if prefix != "UPID" || node.is_empty() || task_type.is_empty() || user.is_empty() {
            return Err(invalid());
        }
        u32::from_str_radix(pid, 16).map_err(|_| invalid())?;
        u64::from_str_radix(pstart, 16).map_err(|_| invalid())?;
        let starttime = i64::from_str_radix(starttime, 16).map_err(|_| invalid())?;
        Ok(Self {
            raw: s.to_owned(),
            node: node.to_owned(),
            task_type: task_type.to_owned(),
            id: id.to_owned(),
            user: user.to_owned(),
            starttime,
        })
    }
}

impl fmt::Display for Upid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for Upid {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Upid {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(de)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ── Status ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Running,
    Stopped,
}

/// `GET /nodes/{node}/tasks/{upid}/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub status: TaskState,
    #[serde(default)]
    pub exitstatus: Option<String>,
    #[serde(rename = "type", default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub starttime: Option<i64>,
}

/// Successful completion of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskResult {
    pub upid: Upid,
    pub exit_status: String,
    /// Non-zero when the task finished with `WARNINGS: n`.
    pub warnings: u32,
}

/// Classify a stopped task's exit status. `None` means failure.
fn success_warnings(exit_status: &str) -> Option<u32> {
    if exit_status == "OK" {
        return Some(0);
    }
    exit_status
        .strip_prefix("WARNINGS:")
        .map(|n| n.trim().parse().unwrap_or(1))
}

// ── Tracker ─────────────────────────────────────────────────────────

impl ApiClient {
    fn task_path(upid: &Upid) -> String {
        format!("nodes/{}/tasks/{}", segment(upid.node()), segment(upid.as_str()))
    }

    /// Send a request whose `data` is a task handle.
    pub async fn execute_task(
        &self,
        method: Method,
        path: &str,
        params: &FormBody,
    ) -> Result<Upid, Error> {
        let value = self.execute(method, path, params).await?;
        let upid: Upid = self.decode_data(value)?;
        debug!(upid = %upid, "task started");
        Ok(upid)
    }

    /// Current status of a task.
    pub async fn task_status(&self, upid: &Upid) -> Result<TaskStatus, Error> {
        self.get(&format!("{}/status", Self::task_path(upid))).await
    }

    /// Read task log lines starting at line `start`.
    pub async fn task_log(
        &self,
        upid: &Upid,
        start: u32,
        limit: u32,
    ) -> Result<Vec<TaskLogLine>, Error> {
        let query = FormBody::new()
            .with("start", start.to_string())
            .with("limit", limit.to_string());
        self.get_with(&format!("{}/log", Self::task_path(upid)), &query)
            .await
    }

    /// Last `lines` lines of a task's log.
    pub async fn task_log_tail(&self, upid: &Upid, lines: usize) -> Result<Vec<String>, Error> {
        let log = self.task_log(upid, 0, LOG_FETCH_LIMIT).await?;
        let skip = log.len().saturating_sub(lines);
        Ok(log.into_iter().skip(skip).map(|l| l.t).collect())
    }

    /// Ask the server to stop a running task.
    pub async fn stop_task(&self, upid: &Upid) -> Result<(), Error> {
        let _: Option<serde_json::Value> =
            self.delete(&Self::task_path(upid), &FormBody::new()).await?;
        info!(upid = %upid, "task stop requested");
        Ok(())
    }

    /// Wait for a task to stop, polling at [`DEFAULT_POLL_INTERVAL`].
    pub async fn wait_task(&self, upid: &Upid, timeout: Duration) -> Result<TaskResult, Error> {
        self.wait_task_with(upid, timeout, DEFAULT_POLL_INTERVAL)
            .await
    }

    /// Wait for a task to stop.
    ///
    /// `OK` and `WARNINGS: n` are successes. Any other exit status becomes
    /// `TaskFailed` with the tail of the task log. Transient probe failures
    /// are tolerated until `timeout`; anything else aborts the wait.
    pub async fn wait_task_with(
        &self,
        upid: &Upid,
        timeout: Duration,
        interval: Duration,
    ) -> Result<TaskResult, Error> {
        debug!(upid = %upid, timeout_secs = timeout.as_secs(), "waiting for task");
        let polled = poll_until(interval, timeout, || async {
            match self.task_status(upid).await {
                Ok(status) if status.status == TaskState::Stopped => Ok(Probe::Ready(status)),
                Ok(_) => Ok(Probe::Pending),
                Err(e) if e.is_transient() => Ok(Probe::Transient(e)),
                Err(e) => Err(e),
            }
        })
        .await;

        let status = match polled {
            Ok(status) => status,
            Err(PollError::Aborted(e)) => return Err(e),
            Err(PollError::DeadlineExceeded { last_error }) => {
                let suffix = last_error
                    .map(|e| format!(" (last error: {e})"))
                    .unwrap_or_default();
                return Err(Error::Timeout {
                    timeout_secs: timeout.as_secs(),
                    waiting_for: format!("task {upid}{suffix}"),
                });
            }
        };

        let exit_status = status.exitstatus.unwrap_or_else(|| "unknown".into());
        if let Some(warnings) = success_warnings(&exit_status) {
            debug!(upid = %upid, %exit_status, "task finished");
            return Ok(TaskResult {
                upid: upid.clone(),
                exit_status,
                warnings,
            });
        }

        let log_tail = match self.task_log_tail(upid, LOG_TAIL_LINES).await {
            Ok(lines) => lines,
            Err(e) => {
                warn!(upid = %upid, error = %e, "could not fetch log of failed task");
                Vec::new()
            }
        };
        Err(Error::TaskFailed {
            upid: upid.to_string(),
            exit_status,
            log_tail,
        })
    }
}
