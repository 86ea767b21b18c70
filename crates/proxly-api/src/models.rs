// Wire models for read-only endpoints.
//
// The server is loose with numeric types (ids arrive as numbers in some
// listings and as strings in others), so the few fields that vary are
// parsed through `number_or_string`.

use serde::{Deserialize, Deserializer, Serialize};

/// Entry of `GET /cluster/resources`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterResource {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default, deserialize_with = "opt_number_or_string")]
    pub vmid: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub template: Option<u8>,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub storage: Option<String>,
    #[serde(default)]
    pub maxmem: Option<u64>,
    #[serde(default)]
    pub maxcpu: Option<f64>,
}

/// Entry of `GET /nodes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub maxcpu: Option<u32>,
    #[serde(default)]
    pub mem: Option<u64>,
    #[serde(default)]
    pub maxmem: Option<u64>,
    #[serde(default)]
    pub uptime: Option<u64>,
}

/// `GET /version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub repoid: Option<String>,
}

/// Entry of `GET /nodes/{node}/tasks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub upid: String,
    pub node: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub id: Option<String>,
    pub user: String,
    pub starttime: i64,
    #[serde(default)]
    pub endtime: Option<i64>,
    /// Exit status once finished (`OK`, `WARNINGS: n`, or error text).
    #[serde(default)]
    pub status: Option<String>,
}

/// One line of `GET /nodes/{node}/tasks/{upid}/log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLogLine {
    pub n: u64,
    pub t: String,
}

/// Parse a value that is either a JSON number or a numeric string.
pub fn number_or_string<'de, D>(de: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u32),
        Str(String),
    }
    match Raw::deserialize(de)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn opt_number_or_string<'de, D>(de: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrap(#[serde(deserialize_with = "number_or_string")] u32);
    Ok(Option::<Wrap>::deserialize(de)?.map(|w| w.0))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cluster_resource_accepts_string_or_numeric_vmid() {
        let a: ClusterResource = serde_json::from_value(serde_json::json!({
            "id": "qemu/100", "type": "qemu", "node": "pve1", "vmid": 100, "status": "running"
        }))
        .unwrap();
        let b: ClusterResource = serde_json::from_value(serde_json::json!({
            "id": "lxc/101", "type": "lxc", "vmid": "101"
        }))
        .unwrap();
        let c: ClusterResource = serde_json::from_value(serde_json::json!({
            "id": "storage/pve1/local", "type": "storage", "storage": "local"
        }))
        .unwrap();
        assert_eq!(a.vmid, Some(100));
        assert_eq!(b.vmid, Some(101));
        assert_eq!(c.vmid, None);
    }
}
