// ── Cluster abstraction ──
//
// One handle per cluster connection. Ties the resource registry, the
// reconciler and the task tracker together: every mutating call reads the
// current state, plans, sends only what differs and waits for any task the
// server starts.

use std::sync::Arc;
use std::time::Duration;

use proxly_api::task::DEFAULT_POLL_INTERVAL;
use proxly_api::{
    ApiClient, ClusterResource, FormBody, Method, NodeInfo, TaskLogLine, TaskResult, TaskStatus,
    TaskSummary, Upid, VersionInfo, WireValue, segment,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::allocator::{GuestId, IdAllocator};
use crate::config::ClusterConfig;
use crate::error::CoreError;
use crate::reconcile::{DeleteOutcome, ReconciliationPlan, Snapshot, plan};
use crate::resource::{
    GuestAction, GuestConfig, ResourceDescriptor, ResourceKind, ResourceRegistry, ResourceSpec,
    Scope,
};

/// How many ids `create_guest_auto_id` tries before giving up.
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 5;

// ── Applied ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppliedAction {
    Created,
    Updated,
    Unchanged,
}

/// Outcome of a create, update or set.
#[derive(Debug, Clone, Serialize)]
pub struct Applied {
    pub kind: ResourceKind,
    pub identifier: String,
    pub action: AppliedAction,
    /// Fields that were sent.
    pub changed: Vec<String>,
    /// Task awaited for asynchronous kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskResult>,
    /// Non-empty response data (a new token's secret, for instance).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

impl Applied {
    fn unchanged(kind: ResourceKind, identifier: String) -> Self {
        Self {
            kind,
            identifier,
            action: AppliedAction::Unchanged,
            changed: Vec::new(),
            task: None,
            response: None,
        }
    }
}

// ── Cluster ──────────────────────────────────────────────────────────

/// Main entry point for consumers. Cheap to clone.
#[derive(Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
    task_timeout: Duration,
    poll_interval: Duration,
}

struct ClusterInner {
    client: ApiClient,
    registry: ResourceRegistry,
    default_node: Option<String>,
}

impl Cluster {
    /// Build a cluster handle. Does NOT log in; call [`connect`](Self::connect).
    pub fn new(config: &ClusterConfig, registry: ResourceRegistry) -> Result<Self, CoreError> {
        let client = ApiClient::new(
            config.url.as_str(),
            config.auth.to_credential(),
            &config.transport(),
        )?;
        Ok(Self::assemble(client, registry, config.default_node.clone()))
    }

    /// Wrap an existing client. The task deadline defaults to the client's
    /// request timeout.
    pub fn from_client(client: ApiClient, registry: ResourceRegistry) -> Self {
        Self::assemble(client, registry, None)
    }

    fn assemble(
        client: ApiClient,
        registry: ResourceRegistry,
        default_node: Option<String>,
    ) -> Self {
        let task_timeout = client.request_timeout();
        Self {
            inner: Arc::new(ClusterInner {
                client,
                registry,
                default_node,
            }),
            task_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn client(&self) -> &ApiClient {
        &self.inner.client
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.inner.registry
    }

    pub fn default_node(&self) -> Option<&str> {
        self.inner.default_node.as_deref()
    }

    pub fn task_timeout(&self) -> Duration {
        self.task_timeout
    }

    fn descriptor(&self, kind: ResourceKind) -> Result<&ResourceDescriptor, CoreError> {
        self.inner.registry.descriptor(kind)
    }

    // ── Session ──────────────────────────────────────────────────────

    /// Log in (password credentials) or check nothing (tokens).
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.inner.client.authenticate().await?;
        info!(url = %self.inner.client.base_url(), "connected");
        Ok(())
    }

    pub fn logout(&self) {
        self.inner.client.logout();
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Current configuration of one resource.
    pub async fn get(
        &self,
        kind: ResourceKind,
        identifier: &str,
        scope: &Scope,
    ) -> Result<Snapshot, CoreError> {
        self.find(kind, identifier, scope)
            .await?
            .ok_or_else(|| not_found(kind, identifier))
    }

    /// Like [`get`](Self::get), with absence as `None`.
    pub async fn find(
        &self,
        kind: ResourceKind,
        identifier: &str,
        scope: &Scope,
    ) -> Result<Option<Snapshot>, CoreError> {
        let path = self.descriptor(kind)?.config_path(identifier, scope)?;
        match self.inner.client.get::<Value>(&path).await {
            Ok(Value::Object(fields)) => Ok(Some(Snapshot::new(identifier, fields))),
            Ok(Value::Null) => Ok(None),
            Ok(other) => Err(CoreError::Internal(format!(
                "unexpected {kind} body for {identifier}: {other}"
            ))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Raw collection listing.
    pub async fn list(&self, kind: ResourceKind, scope: &Scope) -> Result<Vec<Value>, CoreError> {
        let path = self.descriptor(kind)?.collection_path(scope)?;
        Ok(self.inner.client.get(&path).await?)
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Create a resource. Fails if the server already has it.
    pub async fn create(&self, spec: &ResourceSpec) -> Result<Applied, CoreError> {
        spec.validate()?;
        self.create_unchecked(spec).await
    }

    /// Update an existing resource, sending only the fields that differ.
    pub async fn update(&self, spec: &ResourceSpec) -> Result<Applied, CoreError> {
        spec.validate()?;
        let (kind, identifier, scope) = (spec.kind(), spec.identifier(), spec.scope());
        let current = self.get(kind, &identifier, &scope).await?;
        self.update_from(spec, &current).await
    }

    /// Create when absent, update when present.
    pub async fn set(&self, spec: &ResourceSpec) -> Result<Applied, CoreError> {
        spec.validate()?;
        let (kind, identifier, scope) = (spec.kind(), spec.identifier(), spec.scope());
        match self.find(kind, &identifier, &scope).await? {
            Some(current) => self.update_from(spec, &current).await,
            None => self.create_unchecked(spec).await,
        }
    }

    async fn create_unchecked(&self, spec: &ResourceSpec) -> Result<Applied, CoreError> {
        let (kind, identifier, scope) = (spec.kind(), spec.identifier(), spec.scope());
        let desc = self.descriptor(kind)?;
        let desired = spec.to_desired();

        if let Some(missing) = desc
            .required_on_create
            .iter()
            .find(|name| desired.get(name).is_none_or(|e| e.desired.is_unset()))
        {
            return Err(CoreError::ValidationFailed {
                field: Some((*missing).to_owned()),
                message: format!("{missing} is required to create a {kind}"),
            });
        }

        // Bare creates (only the identifier) are legitimate here, so an
        // all-unset record still produces a request.
        let fields = match plan(&desired, None) {
            ReconciliationPlan::Create(body) => body,
            _ => FormBody::new(),
        };
        let changed: Vec<String> = fields.keys().map(str::to_owned).collect();

        let (path, mut body) = if desc.create_at_item {
            (desc.item_path(&identifier, &scope)?, FormBody::new())
        } else {
            let mut body = FormBody::new();
            body.push(desc.id_field, WireValue::generic(identifier.clone()));
            (desc.collection_path(&scope)?, body)
        };
        for (key, value) in fields.iter() {
            body.push(key, value.clone());
        }

        debug!(%kind, %identifier, fields = ?changed, "creating");
        let (task, response) = self
            .send(desc.async_create, Method::POST, &path, &body)
            .await
            .map_err(|e| conflict(kind, &identifier, e))?;
        info!(%kind, %identifier, "created");

        Ok(Applied {
            kind,
            identifier,
            action: AppliedAction::Created,
            changed,
            task,
            response,
        })
    }

    async fn update_from(
        &self,
        spec: &ResourceSpec,
        current: &Snapshot,
    ) -> Result<Applied, CoreError> {
        let (kind, identifier, scope) = (spec.kind(), spec.identifier(), spec.scope());
        let desc = self.descriptor(kind)?;
        let mut desired = spec.to_desired();
        desired.retain(|name, entry| {
            let create_only = desc.field(name).is_some_and(|f| f.create_only);
            if create_only && !entry.desired.is_unset() {
                warn!(%kind, %identifier, field = name, "ignoring create-only field on update");
            }
            !create_only
        });

        let ReconciliationPlan::Update { payload, .. } = plan(&desired, Some(current)) else {
            debug!(%kind, %identifier, "already up to date");
            return Ok(Applied::unchanged(kind, identifier));
        };

        let changed: Vec<String> = payload.keys().map(str::to_owned).collect();
        debug!(%kind, %identifier, fields = ?changed, "updating");
        let path = desc.config_path(&identifier, &scope)?;
        let (task, response) = self
            .send(desc.async_update, desc.update_method(), &path, &payload)
            .await?;
        info!(%kind, %identifier, "updated");

        Ok(Applied {
            kind,
            identifier,
            action: AppliedAction::Updated,
            changed,
            task,
            response,
        })
    }

    /// Delete a resource. Deleting something already gone succeeds with
    /// [`DeleteOutcome::DidNotExist`].
    pub async fn delete(
        &self,
        kind: ResourceKind,
        identifier: &str,
        scope: &Scope,
    ) -> Result<DeleteOutcome, CoreError> {
        let desc = self.descriptor(kind)?;
        let path = desc.item_path(identifier, scope)?;
        match self
            .send(desc.async_delete, Method::DELETE, &path, &FormBody::new())
            .await
        {
            Ok(_) => {
                info!(%kind, %identifier, "deleted");
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) if is_absent(&e) => {
                debug!(%kind, %identifier, "nothing to delete");
                Ok(DeleteOutcome::DidNotExist)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Send a request; for task-returning kinds wait on the task.
    async fn send(
        &self,
        is_async: bool,
        method: Method,
        path: &str,
        body: &FormBody,
    ) -> Result<(Option<TaskResult>, Option<Value>), proxly_api::Error> {
        let client = &self.inner.client;
        if is_async {
            let upid = client.execute_task(method, path, body).await?;
            let result = client
                .wait_task_with(&upid, self.task_timeout, self.poll_interval)
                .await?;
            return Ok((Some(result), None));
        }
        let value = client.execute(method, path, body).await?;
        Ok((None, (!value.is_null()).then_some(value)))
    }

    // ── Guests ───────────────────────────────────────────────────────

    /// Run a power action and wait for it to finish.
    pub async fn guest_action(
        &self,
        node: &str,
        vmid: GuestId,
        action: GuestAction,
    ) -> Result<TaskResult, CoreError> {
        let path = format!(
            "nodes/{}/qemu/{vmid}/status/{}",
            segment(node),
            action.as_ref()
        );
        let upid = self
            .inner
            .client
            .execute_task(Method::POST, &path, &FormBody::new())
            .await
            .map_err(|e| missing_guest(vmid, e))?;
        info!(%vmid, %action, %upid, "guest action started");
        self.wait(&upid).await
    }

    /// Clone `vmid` into `newid`.
    pub async fn clone_guest(
        &self,
        node: &str,
        vmid: GuestId,
        newid: GuestId,
        name: Option<&str>,
        full: bool,
    ) -> Result<TaskResult, CoreError> {
        let mut body = FormBody::new().with("newid", newid.to_string());
        if let Some(name) = name {
            body = body.with("name", name);
        }
        if full {
            body = body.with("full", "1");
        }
        let path = format!("nodes/{}/qemu/{vmid}/clone", segment(node));
        let client = &self.inner.client;
        let upid = client
            .execute_task(Method::POST, &path, &body)
            .await
            .map_err(|e| match e {
                e if e.is_already_exists() => CoreError::GuestIdInUse { id: newid.get() },
                e => missing_guest(vmid, e),
            })?;
        client
            .wait_task_with(&upid, self.task_timeout, self.poll_interval)
            .await
            .map_err(|e| conflict(ResourceKind::Guest, &newid.to_string(), e))
    }

    /// Node currently hosting a guest.
    pub async fn guest_node(&self, vmid: GuestId) -> Result<String, CoreError> {
        self.resources(Some("vm"))
            .await?
            .into_iter()
            .find(|r| r.vmid == Some(vmid.get()))
            .and_then(|r| r.node)
            .ok_or_else(|| not_found(ResourceKind::Guest, &vmid.to_string()))
    }

    /// Fresh inventory of every guest id in the cluster.
    pub async fn allocator(&self) -> Result<IdAllocator, CoreError> {
        let resources = self.resources(Some("vm")).await?;
        Ok(IdAllocator::from_inventory(
            resources.into_iter().filter_map(|r| r.vmid),
        ))
    }

    pub async fn next_free_id(&self, starting_from: u32) -> Result<GuestId, CoreError> {
        self.allocator().await?.next_free(starting_from)
    }

    pub async fn max_id(&self) -> Result<GuestId, CoreError> {
        Ok(self.allocator().await?.max())
    }

    /// Ask the server whether `id` is free.
    pub async fn validate_free(&self, id: GuestId) -> Result<bool, CoreError> {
        match self.inner.client.next_id(Some(id.get())).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_already_exists() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Create a guest under the first free id at or above `starting_from`,
    /// moving on when another client takes the id first.
    pub async fn create_guest_auto_id(
        &self,
        mut config: GuestConfig,
        starting_from: u32,
    ) -> Result<Applied, CoreError> {
        let mut start = starting_from;
        let mut last_conflict = None;
        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            config.vmid = self.next_free_id(start).await?;
            match self.create(&ResourceSpec::Guest(config.clone())).await {
                Err(CoreError::GuestIdInUse { id }) => {
                    warn!(id, attempt, "guest id taken concurrently, allocating again");
                    start = id.saturating_add(1);
                    last_conflict = Some(id);
                }
                other => return other,
            }
        }
        Err(CoreError::GuestIdInUse {
            id: last_conflict.unwrap_or(start),
        })
    }

    // ── Tasks ────────────────────────────────────────────────────────

    /// Wait for a task under this handle's deadline.
    pub async fn wait(&self, upid: &Upid) -> Result<TaskResult, CoreError> {
        Ok(self
            .inner
            .client
            .wait_task_with(upid, self.task_timeout, self.poll_interval)
            .await?)
    }

    pub async fn task_status(&self, upid: &Upid) -> Result<TaskStatus, CoreError> {
        Ok(self.inner.client.task_status(upid).await?)
    }

    pub async fn task_log(
        &self,
        upid: &Upid,
        start: u32,
        limit: u32,
    ) -> Result<Vec<TaskLogLine>, CoreError> {
        Ok(self.inner.client.task_log(upid, start, limit).await?)
    }

    pub async fn stop_task(&self, upid: &Upid) -> Result<(), CoreError> {
        Ok(self.inner.client.stop_task(upid).await?)
    }

    pub async fn node_tasks(
        &self,
        node: &str,
        limit: Option<u32>,
        vmid: Option<u32>,
    ) -> Result<Vec<TaskSummary>, CoreError> {
        Ok(self.inner.client.node_tasks(node, limit, vmid).await?)
    }

    // ── Cluster info ─────────────────────────────────────────────────

    pub async fn nodes(&self) -> Result<Vec<NodeInfo>, CoreError> {
        Ok(self.inner.client.nodes().await?)
    }

    pub async fn version(&self) -> Result<VersionInfo, CoreError> {
        Ok(self.inner.client.version().await?)
    }

    pub async fn resources(
        &self,
        resource_type: Option<&str>,
    ) -> Result<Vec<ClusterResource>, CoreError> {
        Ok(self.inner.client.cluster_resources(resource_type).await?)
    }
}

// ── Error mapping ────────────────────────────────────────────────────

fn not_found(kind: ResourceKind, identifier: &str) -> CoreError {
    CoreError::NotFound {
        kind: kind.to_string(),
        identifier: identifier.to_owned(),
    }
}

/// The target is gone, either reported directly or by a failed task.
fn is_absent(err: &proxly_api::Error) -> bool {
    match err {
        proxly_api::Error::TaskFailed { exit_status, .. } => {
            exit_status.contains("does not exist")
        }
        e => e.is_not_found(),
    }
}

fn is_conflict(err: &proxly_api::Error) -> bool {
    match err {
        proxly_api::Error::TaskFailed { exit_status, .. } => {
            exit_status.contains("already exists")
        }
        e => e.is_already_exists(),
    }
}

/// Guest id collisions become `GuestIdInUse`.
fn conflict(kind: ResourceKind, identifier: &str, err: proxly_api::Error) -> CoreError {
    if kind == ResourceKind::Guest && is_conflict(&err) {
        if let Ok(id) = identifier.parse() {
            return CoreError::GuestIdInUse { id };
        }
    }
    err.into()
}

fn missing_guest(vmid: GuestId, err: proxly_api::Error) -> CoreError {
    if is_absent(&err) {
        not_found(ResourceKind::Guest, &vmid.to_string())
    } else {
        err.into()
    }
}
