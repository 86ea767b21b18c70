//! Async client for the Proxmox VE REST API.
//!
//! Covers the session layer shared by every endpoint: password and API-token
//! authentication, per-field form encoding, request execution with error
//! classification, and waiting on asynchronous tasks.
//!
//! ```no_run
//! # async fn demo() -> Result<(), proxly_api::Error> {
//! use proxly_api::{ApiClient, Credential, TransportConfig};
//!
//! let client = ApiClient::new(
//!     "https://pve.example.com:8006",
//!     Credential::password("root@pam", "secret"),
//!     &TransportConfig::default(),
//! )?;
//! client.authenticate().await?;
//! for node in client.nodes().await? {
//!     println!("{}", node.node);
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod cluster;
pub mod encode;
pub mod error;
pub mod models;
pub mod poll;
pub mod session;
pub mod task;
pub mod transport;

pub use auth::{AuthStrategy, Credential, TICKET_LIFETIME, Ticket};
pub use client::{ApiClient, segment};
pub use encode::{EncodeProfile, FormBody, WireValue};
pub use error::Error;
pub use models::{ClusterResource, NodeInfo, TaskLogLine, TaskSummary, VersionInfo};
pub use session::Session;
pub use task::{TaskResult, TaskState, TaskStatus, Upid};
pub use transport::{TlsMode, TransportConfig};

pub use reqwest::Method;
