//! Configuration for the proxly CLI.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), and
//! translation to `proxly_core::ClusterConfig`. The CLI layers its
//! `GlobalOpts` overrides on top of what this crate resolves.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

use proxly_core::{AuthCredentials, ClusterConfig, TlsVerification};

/// Keyring service name; entries are `<profile>/<secret kind>`.
pub const KEYRING_SERVICE: &str = "proxly";

/// Prefix of environment overrides (`PROXLY_DEFAULTS__TIMEOUT=60`).
pub const ENV_PREFIX: &str = "PROXLY_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named cluster profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Pick `requested`, else the configured default, else the only profile.
    pub fn select_profile<'a>(
        &'a self,
        requested: Option<&'a str>,
    ) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = requested
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        let found = self.profiles.get_key_value(name).or_else(|| {
            if requested.is_none() && self.profiles.len() == 1 {
                self.profiles.iter().next()
            } else {
                None
            }
        });
        found
            .map(|(k, p)| (k.as_str(), p))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// Request timeout and task deadline, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    300
}

/// How a profile authenticates.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AuthMode {
    /// Username + password, exchanged for a session ticket.
    #[default]
    Password,
    /// Static API token.
    Token,
}

/// A named cluster profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Cluster URL (e.g., "https://pve.example.com:8006").
    pub url: String,

    #[serde(default)]
    pub auth_mode: AuthMode,

    /// User with realm for password auth (e.g., "root@pam").
    pub username: Option<String>,

    /// Password (plaintext -- prefer keyring).
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    /// Token id, `user@realm!name`.
    pub token_id: Option<String>,

    /// Token secret (plaintext -- prefer keyring).
    pub token_secret: Option<String>,

    /// Environment variable holding the token secret.
    pub token_secret_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// HTTP(S) proxy URL.
    pub proxy: Option<String>,

    /// Node used when a guest command does not name one.
    pub default_node: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "proxly", "proxly").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("proxly");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    Ok(figment.extract()?)
}

/// Load config, returning a default if the file doesn't exist or is broken.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Secrets ─────────────────────────────────────────────────────────

/// The two secrets a profile can need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum SecretKind {
    Password,
    TokenSecret,
}

impl SecretKind {
    /// Environment variable consulted when the profile names none.
    pub fn default_env(self) -> &'static str {
        match self {
            Self::Password => "PROXLY_PASSWORD",
            Self::TokenSecret => "PROXLY_TOKEN_SECRET",
        }
    }

    fn keyring_entry(self, profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
        keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/{self}"))
    }
}

/// Where secrets are looked up. Tests swap out the environment and skip
/// the system keyring.
#[derive(Clone, Copy)]
pub struct SecretSources {
    pub env: fn(&str) -> Option<String>,
    pub keyring: bool,
}

impl SecretSources {
    pub fn system() -> Self {
        Self {
            env: |name| std::env::var(name).ok(),
            keyring: true,
        }
    }
}

impl Default for SecretSources {
    fn default() -> Self {
        Self::system()
    }
}

/// Save a secret in the system keyring.
pub fn store_secret(profile_name: &str, kind: SecretKind, secret: &str) -> Result<(), ConfigError> {
    kind.keyring_entry(profile_name)?.set_password(secret)?;
    Ok(())
}

/// Remove a secret from the system keyring. Missing entries are fine.
pub fn delete_secret(profile_name: &str, kind: SecretKind) -> Result<(), ConfigError> {
    match kind.keyring_entry(profile_name)?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ── Credential resolution (without CLI flags) ───────────────────────

/// Resolve one secret: env var, then keyring, then plaintext.
pub fn resolve_secret(
    profile: &Profile,
    profile_name: &str,
    kind: SecretKind,
    sources: SecretSources,
) -> Result<SecretString, ConfigError> {
    let (env_name, plaintext) = match kind {
        SecretKind::Password => (profile.password_env.as_deref(), profile.password.as_ref()),
        SecretKind::TokenSecret => (
            profile.token_secret_env.as_deref(),
            profile.token_secret.as_ref(),
        ),
    };

    // 1. Env var (profile-specific name first)
    for name in env_name.into_iter().chain([kind.default_env()]) {
        if let Some(val) = (sources.env)(name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if sources.keyring {
        if let Ok(secret) = kind
            .keyring_entry(profile_name)
            .and_then(|entry| entry.get_password())
        {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(secret) = plaintext {
        return Ok(SecretString::from(secret.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Resolve `AuthCredentials` from a profile's `auth_mode`.
pub fn resolve_auth(
    profile: &Profile,
    profile_name: &str,
    sources: SecretSources,
) -> Result<AuthCredentials, ConfigError> {
    match profile.auth_mode {
        AuthMode::Password => {
            let username = profile
                .username
                .clone()
                .or_else(|| (sources.env)("PROXLY_USERNAME"))
                .ok_or_else(|| ConfigError::NoCredentials {
                    profile: profile_name.into(),
                })?;
            check_realm(&username)?;
            let password = resolve_secret(profile, profile_name, SecretKind::Password, sources)?;
            Ok(AuthCredentials::Password {
                username,
                password,
                otp: None,
            })
        }
        AuthMode::Token => {
            let token_id = profile
                .token_id
                .clone()
                .or_else(|| (sources.env)("PROXLY_TOKEN_ID"))
                .ok_or_else(|| ConfigError::NoCredentials {
                    profile: profile_name.into(),
                })?;
            let (user_id, token_name) = split_token_id(&token_id)?;
            let secret = resolve_secret(profile, profile_name, SecretKind::TokenSecret, sources)?;
            Ok(AuthCredentials::Token {
                user_id: user_id.into(),
                token_name: token_name.into(),
                secret,
            })
        }
    }
}

fn check_realm(username: &str) -> Result<(), ConfigError> {
    match username.split_once('@') {
        Some((name, realm)) if !name.is_empty() && !realm.is_empty() => Ok(()),
        _ => Err(ConfigError::Validation {
            field: "username".into(),
            reason: format!("'{username}' must include a realm, e.g. root@pam"),
        }),
    }
}

/// Split `user@realm!name` into user id and token name.
pub fn split_token_id(token_id: &str) -> Result<(&str, &str), ConfigError> {
    match token_id.split_once('!') {
        Some((user, name)) if !user.is_empty() && !name.is_empty() && user.contains('@') => {
            Ok((user, name))
        }
        _ => Err(ConfigError::Validation {
            field: "token_id".into(),
            reason: format!("'{token_id}' must look like user@realm!token-name"),
        }),
    }
}

// ── Translation ─────────────────────────────────────────────────────

/// TLS policy from the insecure flag and CA path.
pub fn tls_verification(insecure: bool, ca_cert: Option<&Path>) -> TlsVerification {
    if insecure {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(path) = ca_cert {
        TlsVerification::CustomCa(path.to_path_buf())
    } else {
        TlsVerification::SystemDefaults
    }
}

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })
}

/// Build a `ClusterConfig` from a profile -- no CLI flag overrides.
pub fn profile_to_cluster_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    sources: SecretSources,
) -> Result<ClusterConfig, ConfigError> {
    let url = parse_url("url", &profile.url)?;
    let proxy = profile
        .proxy
        .as_deref()
        .map(|p| parse_url("proxy", p))
        .transpose()?;
    let auth = resolve_auth(profile, profile_name, sources)?;
    let tls = tls_verification(
        profile.insecure.unwrap_or(defaults.insecure),
        profile.ca_cert.as_deref(),
    );
    let timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));

    Ok(ClusterConfig {
        url,
        auth,
        tls,
        timeout,
        proxy,
        default_node: profile.default_node.clone(),
    })
}
