//! Command dispatch: bridges CLI args -> cluster operations -> output.

pub mod cluster;
pub mod config_cmd;
pub mod group;
pub mod guest;
pub mod login;
pub mod pool;
pub mod resource;
pub mod storage;
pub mod task;
pub mod token;
pub mod user;
pub mod util;

use proxly_core::{AuthCredentials, Cluster, ResourceRegistry};

use crate::cli::{Command, GlobalOpts};
use crate::config::build_cluster_config;
use crate::error::CliError;

/// Resolve the active profile and log in. `otp` only applies to password
/// profiles.
pub async fn connect(global: &GlobalOpts, otp: Option<String>) -> Result<(String, Cluster), CliError> {
    let cfg = proxly_config::load_config()?;
    let (profile, mut cluster_config) = build_cluster_config(&cfg, global)?;
    if let (Some(code), AuthCredentials::Password { otp, .. }) = (otp, &mut cluster_config.auth) {
        *otp = Some(code);
    }
    let cluster = Cluster::new(&cluster_config, ResourceRegistry::standard())
        .map_err(|e| CliError::from(e).for_profile(&profile))?;
    cluster
        .connect()
        .await
        .map_err(|e| CliError::from(e).for_profile(&profile))?;
    Ok((profile, cluster))
}

/// Dispatch a cluster-bound command to its handler.
pub async fn dispatch(cmd: Command, cluster: &Cluster, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Group(args) => group::handle(cluster, args, global).await,
        Command::User(args) => user::handle(cluster, args, global).await,
        Command::Pool(args) => pool::handle(cluster, args, global).await,
        Command::Token(args) => token::handle(cluster, args, global).await,
        Command::Storage(args) => storage::handle(cluster, args, global).await,
        Command::Guest(args) => guest::handle(cluster, args, global).await,
        Command::Task(args) => task::handle(cluster, args, global).await,
        Command::Cluster(args) => cluster::handle(cluster, args, global).await,
        // Handled in main before a connection exists
        Command::Login(_) | Command::Config(_) | Command::Completions(_) => Err(CliError::Config {
            message: "command does not take a cluster connection".into(),
        }),
    }
}
