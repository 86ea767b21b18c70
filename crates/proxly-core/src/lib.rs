// proxly-core: reconciliation, id allocation and resource kinds on top of proxly-api.

pub mod allocator;
pub mod cluster;
pub mod config;
pub mod error;
pub mod field;
pub mod reconcile;
pub mod resource;

// ── Primary re-exports ──────────────────────────────────────────────
pub use allocator::{GuestId, IdAllocator};
pub use cluster::{Applied, AppliedAction, Cluster, MAX_ALLOCATION_ATTEMPTS};
pub use config::{AuthCredentials, ClusterConfig, TlsVerification};
pub use error::CoreError;
pub use field::{DesiredField, DesiredRecord, FieldKind, FieldSpec, FieldValue};
pub use reconcile::{DeleteOutcome, ReconciliationPlan, Snapshot, plan};
pub use resource::{
    GroupConfig, GuestAction, GuestConfig, PoolConfig, ResourceConfig, ResourceDescriptor,
    ResourceKind, ResourceRegistry, ResourceSpec, Scope, StorageConfig, TokenConfig, UserConfig,
};

// Task and listing types callers see through `Cluster`.
pub use proxly_api::{
    ClusterResource, NodeInfo, TaskLogLine, TaskResult, TaskStatus, TaskSummary, Upid, VersionInfo,
};
