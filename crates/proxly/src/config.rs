//! Flag overrides on top of the profile configuration.
//!
//! `proxly-config` owns the TOML file and the secret chain; this module
//! only decides which profile is active and lets global flags win over it.

use proxly_config::{AuthMode, Config, Profile, SecretSources};
use proxly_core::ClusterConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Apply global flags to a copy of `profile`.
pub fn apply_overrides(mut profile: Profile, global: &GlobalOpts) -> Profile {
    if let Some(url) = &global.url {
        profile.url.clone_from(url);
    }
    if let Some(username) = &global.username {
        profile.username = Some(username.clone());
        profile.auth_mode = AuthMode::Password;
    }
    if let Some(token_id) = &global.token_id {
        profile.token_id = Some(token_id.clone());
        profile.auth_mode = AuthMode::Token;
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    if let Some(proxy) = &global.proxy {
        profile.proxy = Some(proxy.clone());
    }
    if let Some(node) = &global.node {
        profile.default_node = Some(node.clone());
    }
    profile
}

/// Build a `ClusterConfig` from the config file, profile, and CLI overrides.
///
/// Without a matching profile, `--url` plus credentials from the
/// environment are enough.
pub fn build_cluster_config(
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(String, ClusterConfig), CliError> {
    let requested = global.profile.as_deref();
    let (name, base) = match cfg.select_profile(requested) {
        Ok((name, profile)) => (name.to_owned(), profile.clone()),
        Err(err) if requested.is_some() => return Err(err.into()),
        Err(_) if global.url.is_some() => (active_profile_name(global, cfg), Profile::default()),
        Err(_) => {
            return Err(CliError::NoConfig {
                path: proxly_config::config_path().display().to_string(),
            });
        }
    };

    let profile = apply_overrides(base, global);
    if profile.url.is_empty() {
        return Err(CliError::NoConfig {
            path: proxly_config::config_path().display().to_string(),
        });
    }
    let cluster = proxly_config::profile_to_cluster_config(
        &profile,
        &name,
        &cfg.defaults,
        SecretSources::system(),
    )?;
    Ok((name, cluster))
}
