//! Config subcommand handlers.

use dialoguer::{Confirm, Input, Select};

use proxly_config::{AuthMode, Config, Profile, SecretKind};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat, SecretKindArg};
use crate::config::active_profile_name;
use crate::error::{CliError, available_profiles};
use crate::output::{self, Status};

use super::util::prompt_err;

const REDACTED: &str = "********";

// ── Helpers ─────────────────────────────────────────────────────────

fn save(cfg: &Config, global: &GlobalOpts, message: &str) -> Result<(), CliError> {
    let path = proxly_config::save_config(cfg)?;
    tracing::debug!(path = %path.display(), "config written");
    output::status(global, Status::Done, message);
    Ok(())
}

fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.password.is_some() {
            profile.password = Some(REDACTED.into());
        }
        if profile.token_secret.is_some() {
            profile.token_secret = Some(REDACTED.into());
        }
    }
    cfg
}

fn parse_flag<T: std::str::FromStr>(field: &str, value: &str, expected: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: format!("must be {expected}"),
    })
}

/// Empty values unset optional keys.
fn optional(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

fn set_key(profile: &mut Profile, key: &str, value: String) -> Result<(), CliError> {
    match key.replace('-', "_").as_str() {
        "url" => profile.url = value,
        "auth_mode" => profile.auth_mode = parse_flag("auth_mode", &value, "'password' or 'token'")?,
        "username" => profile.username = optional(value),
        "token_id" => profile.token_id = optional(value),
        "password_env" => profile.password_env = optional(value),
        "token_secret_env" => profile.token_secret_env = optional(value),
        "ca_cert" => profile.ca_cert = optional(value).map(Into::into),
        "insecure" => profile.insecure = Some(parse_flag("insecure", &value, "'true' or 'false'")?),
        "timeout" => profile.timeout = Some(parse_flag("timeout", &value, "a number (seconds)")?),
        "proxy" => profile.proxy = optional(value),
        "default_node" => profile.default_node = optional(value),
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!(
                    "unknown config key '{other}'. Valid keys: url, auth_mode, username, \
                     token_id, password_env, token_secret_env, ca_cert, insecure, timeout, \
                     proxy, default_node"
                ),
            });
        }
    }
    Ok(())
}

fn secret_kind(arg: Option<SecretKindArg>, profile: &Profile) -> SecretKind {
    match (arg, profile.auth_mode) {
        (Some(SecretKindArg::Password), _) | (None, AuthMode::Password) => SecretKind::Password,
        (Some(SecretKindArg::TokenSecret), _) | (None, AuthMode::Token) => SecretKind::TokenSecret,
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(global),

        ConfigCommand::Show => {
            let cfg = redacted(&proxly_config::load_config()?);
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => {
                    toml::to_string_pretty(&cfg).map_err(|e| CliError::Render(e.to_string()))?
                }
                format => output::render_single(format, &cfg, |_| String::new(), |_| {
                    "config".into()
                })?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Set { key, value } => {
            let mut cfg = proxly_config::load_config()?;
            let name = active_profile_name(global, &cfg);
            let profile = cfg.profiles.entry(name.clone()).or_default();
            set_key(profile, &key, value)?;
            save(&cfg, global, &format!("set {key} on profile '{name}'"))
        }

        ConfigCommand::Profiles => {
            let cfg = proxly_config::load_config()?;
            if cfg.profiles.is_empty() {
                output::status(global, Status::Warning, "no profiles configured; run: proxly config init");
                return Ok(());
            }
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => cfg
                    .profiles
                    .iter()
                    .map(|(name, p)| {
                        let marker = if name == default { "*" } else { " " };
                        format!("{marker} {name}\t{}\t{}", p.url, p.auth_mode)
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
                format => {
                    let names: Vec<&String> = cfg.profiles.keys().collect();
                    output::render_single(format, &names, |_| String::new(), |_| String::new())?
                }
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = proxly_config::load_config()?;
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    name,
                    available: available_profiles(),
                });
            }
            cfg.default_profile = Some(name.clone());
            save(&cfg, global, &format!("default profile set to '{name}'"))
        }

        ConfigCommand::SetSecret { profile, kind } => {
            let cfg = proxly_config::load_config()?;
            let name = profile.unwrap_or_else(|| active_profile_name(global, &cfg));
            let prof = cfg.profiles.get(&name).ok_or_else(|| CliError::ProfileNotFound {
                name: name.clone(),
                available: available_profiles(),
            })?;
            let kind = secret_kind(kind, prof);
            let secret = rpassword::prompt_password(format!("{kind}: ")).map_err(prompt_err)?;
            if secret.is_empty() {
                return Err(CliError::Validation {
                    field: kind.to_string(),
                    reason: "value cannot be empty".into(),
                });
            }
            proxly_config::store_secret(&name, kind, &secret)?;
            output::status(
                global,
                Status::Done,
                &format!("{kind} stored in the system keyring for profile '{name}'"),
            );
            Ok(())
        }
    }
}

// ── Init wizard ─────────────────────────────────────────────────────

fn init(global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = proxly_config::load_config()?;
    eprintln!("proxly configuration wizard");
    eprintln!("  config path: {}\n", proxly_config::config_path().display());

    let name: String = Input::new()
        .with_prompt("Profile name")
        .default("default".into())
        .interact_text()
        .map_err(prompt_err)?;

    let url: String = Input::new()
        .with_prompt("Cluster URL")
        .default("https://pve.example.com:8006".into())
        .interact_text()
        .map_err(prompt_err)?;

    let auth = Select::new()
        .with_prompt("Authentication method")
        .items(&["API token (recommended)", "Username/password"])
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    let mut profile = Profile {
        url,
        ..Profile::default()
    };

    let (kind, secret) = if auth == 0 {
        let token_id: String = Input::new()
            .with_prompt("Token id (user@realm!name)")
            .interact_text()
            .map_err(prompt_err)?;
        proxly_config::split_token_id(&token_id)?;
        profile.auth_mode = AuthMode::Token;
        profile.token_id = Some(token_id);
        (
            SecretKind::TokenSecret,
            rpassword::prompt_password("Token secret: ").map_err(prompt_err)?,
        )
    } else {
        let username: String = Input::new()
            .with_prompt("Username (user@realm)")
            .default("root@pam".into())
            .interact_text()
            .map_err(prompt_err)?;
        profile.auth_mode = AuthMode::Password;
        profile.username = Some(username);
        (
            SecretKind::Password,
            rpassword::prompt_password("Password: ").map_err(prompt_err)?,
        )
    };
    if secret.is_empty() {
        return Err(CliError::Validation {
            field: kind.to_string(),
            reason: "value cannot be empty".into(),
        });
    }

    let store = Select::new()
        .with_prompt(format!("Where to store the {kind}?"))
        .items(&["System keyring (recommended)", "Config file (plaintext)"])
        .default(0)
        .interact()
        .map_err(prompt_err)?;
    if store == 0 {
        proxly_config::store_secret(&name, kind, &secret)?;
        output::status(global, Status::Done, &format!("{kind} stored in the system keyring"));
    } else {
        match kind {
            SecretKind::Password => profile.password = Some(secret),
            SecretKind::TokenSecret => profile.token_secret = Some(secret),
        }
    }

    let insecure = Confirm::new()
        .with_prompt("Skip TLS verification (self-signed certificate)?")
        .default(false)
        .interact()
        .map_err(prompt_err)?;
    profile.insecure = insecure.then_some(true);

    let node: String = Input::new()
        .with_prompt("Default node (empty for none)")
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_err)?;
    profile.default_node = optional(node);

    cfg.profiles.insert(name.clone(), profile);
    if cfg.default_profile.is_none() || cfg.profiles.len() == 1 {
        cfg.default_profile = Some(name.clone());
    }
    save(&cfg, global, &format!("profile '{name}' written"))?;
    eprintln!("\n  test it: proxly --profile {name} login");
    Ok(())
}
