// Cluster-wide and node-level read endpoints.

use crate::client::{ApiClient, segment};
use crate::encode::FormBody;
use crate::error::Error;
use crate::models::{ClusterResource, NodeInfo, TaskSummary, VersionInfo, number_or_string};

#[derive(serde::Deserialize)]
struct NextId(#[serde(deserialize_with = "number_or_string")] u32);

impl ApiClient {
    /// `GET /cluster/resources`, optionally filtered by type (`vm`, `storage`, `node`).
    pub async fn cluster_resources(
        &self,
        resource_type: Option<&str>,
    ) -> Result<Vec<ClusterResource>, Error> {
        let mut query = FormBody::new();
        if let Some(t) = resource_type {
            query = query.with("type", t);
        }
        self.get_with("cluster/resources", &query).await
    }

    /// `GET /cluster/nextid`. With `vmid`, the server checks that id instead
    /// of proposing one and fails if it is taken.
    pub async fn next_id(&self, vmid: Option<u32>) -> Result<u32, Error> {
        let mut query = FormBody::new();
        if let Some(id) = vmid {
            query = query.with("vmid", id.to_string());
        }
        let NextId(id) = self.get_with("cluster/nextid", &query).await?;
        Ok(id)
    }

    /// `GET /version`.
    pub async fn version(&self) -> Result<VersionInfo, Error> {
        self.get("version").await
    }

    /// `GET /nodes`.
    pub async fn nodes(&self) -> Result<Vec<NodeInfo>, Error> {
        self.get("nodes").await
    }

    /// `GET /nodes/{node}/tasks`, newest first.
    pub async fn node_tasks(
        &self,
        node: &str,
        limit: Option<u32>,
        vmid: Option<u32>,
    ) -> Result<Vec<TaskSummary>, Error> {
        let mut query = FormBody::new();
        if let Some(limit) = limit {
            query = query.with("limit", limit.to_string());
        }
        if let Some(vmid) = vmid {
            query = query.with("vmid", vmid.to_string());
        }
        self.get_with(&format!("nodes/{}/tasks", segment(node)), &query)
            .await
    }
}
