//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a kind-specific exit code.

use miette::Diagnostic;
use thiserror::Error;

use proxly_config::ConfigError;
use proxly_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 5;
    pub const CONNECTION: i32 = 6;
    pub const TIMEOUT: i32 = 7;
    pub const TASK_FAILED: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to cluster at {url}")]
    #[diagnostic(
        code(proxly::connection_failed),
        help(
            "Check that the API is reachable (default port 8006).\n\
             Reason: {reason}\n\
             Self-signed certificate? Try --insecure or set ca_cert in the profile."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(proxly::auth_failed),
        help(
            "Verify the username (with realm, e.g. root@pam) or token id.\n\
             Store a new secret with: proxly config set-secret --profile {profile}"
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("Profile '{profile}' requires a two-factor code")]
    #[diagnostic(
        code(proxly::two_factor_required),
        help(
            "Log in with a one-time code: proxly --profile {profile} login --otp <code>\n\
             For unattended use, switch the profile to an API token."
        )
    )]
    TwoFactorRequired { profile: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(proxly::no_credentials),
        help(
            "Configure credentials with: proxly config init\n\
             Or set PROXLY_USERNAME + PROXLY_PASSWORD (or PROXLY_TOKEN_ID + PROXLY_TOKEN_SECRET)."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(proxly::not_found),
        help("Run: proxly {list_command} to see what exists")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{resource_type} '{identifier}' already exists")]
    #[diagnostic(
        code(proxly::conflict),
        help("Use `set` to reconcile an existing resource, or pick another id.")
    )]
    Conflict {
        resource_type: String,
        identifier: String,
    },

    // ── Tasks ────────────────────────────────────────────────────────
    #[error("Task {upid} failed: {exit_status}")]
    #[diagnostic(code(proxly::task_failed), help("Last log lines:\n{log_tail}"))]
    TaskFailed {
        upid: String,
        exit_status: String,
        log_tail: String,
    },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error: {message}")]
    #[diagnostic(code(proxly::api_error))]
    ApiError { status: Option<u16>, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(proxly::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(proxly::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: proxly config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No cluster configured")]
    #[diagnostic(
        code(proxly::no_config),
        help(
            "Create a profile with: proxly config init\n\
             Or pass --url. Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(proxly::config))]
    Config { message: String },

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(proxly::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out after {seconds}s waiting for {waiting_for}")]
    #[diagnostic(
        code(proxly::timeout),
        help("Increase the deadline with --timeout or check the task with: proxly task status <upid>")
    )]
    Timeout { seconds: u64, waiting_for: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(proxly::json), help("Check the JSON file contents and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(proxly::render))]
    Render(String),

    // ── Context ──────────────────────────────────────────────────────
    #[error("Failed to {op} {kind} '{identifier}'")]
    #[diagnostic(code(proxly::operation_failed))]
    Operation {
        op: String,
        kind: String,
        identifier: String,
        #[source]
        source: Box<CliError>,
        /// Carried over from `source`, which miette does not walk for help.
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Operation { source, .. } => source.exit_code(),
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. }
            | Self::TwoFactorRequired { .. }
            | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::TaskFailed { .. } => exit_code::TASK_FAILED,
            Self::Validation { .. }
            | Self::NonInteractiveRequiresYes { .. }
            | Self::NoConfig { .. }
            | Self::ProfileNotFound { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Name the profile in authentication errors raised below the CLI.
    #[must_use]
    pub fn for_profile(self, name: &str) -> Self {
        match self {
            Self::AuthFailed { message, .. } => Self::AuthFailed {
                profile: name.to_owned(),
                message,
            },
            Self::TwoFactorRequired { .. } => Self::TwoFactorRequired {
                profile: name.to_owned(),
            },
            Self::Operation {
                op,
                kind,
                identifier,
                source,
                ..
            } => source.for_profile(name).during(&op, &kind, &identifier),
            other => other,
        }
    }

    /// Name the operation and resource a failure happened on.
    ///
    /// Errors that already name their resource pass through unchanged, as
    /// do errors raised before any resource was touched.
    #[must_use]
    pub fn during(self, op: &str, kind: &str, identifier: &str) -> Self {
        match self {
            Self::NotFound { .. }
            | Self::Conflict { .. }
            | Self::Operation { .. }
            | Self::NonInteractiveRequiresYes { .. } => self,
            source => Self::Operation {
                op: op.to_owned(),
                kind: kind.to_owned(),
                identifier: identifier.to_owned(),
                help: source.help().map(|h| format!("{h}")),
                source: Box::new(source),
            },
        }
    }
}

fn list_command(kind: &str) -> String {
    match kind {
        "token" => "token list --user <user>".into(),
        other => format!("{other} list"),
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed {
                profile: "<name>".into(),
                message,
            },

            CoreError::TwoFactorRequired => CliError::TwoFactorRequired {
                profile: "<name>".into(),
            },

            CoreError::SessionExpired => CliError::AuthFailed {
                profile: "<name>".into(),
                message: "session expired".into(),
            },

            CoreError::Timeout {
                timeout_secs,
                waiting_for,
            } => CliError::Timeout {
                seconds: timeout_secs,
                waiting_for,
            },

            CoreError::ValidationFailed { field, message } => CliError::Validation {
                field: field.unwrap_or_else(|| "input".into()),
                reason: message,
            },

            CoreError::TaskFailed {
                upid,
                exit_status,
                log_tail,
            } => CliError::TaskFailed {
                upid,
                exit_status,
                log_tail: if log_tail.is_empty() {
                    "(no log output)".into()
                } else {
                    log_tail.join("\n")
                },
            },

            CoreError::GuestIdInUse { id } => CliError::Conflict {
                resource_type: "guest".into(),
                identifier: id.to_string(),
            },

            CoreError::NotFound { kind, identifier } => CliError::NotFound {
                list_command: list_command(&kind),
                resource_type: kind,
                identifier,
            },

            CoreError::Api { message, status } => CliError::ApiError { status, message },

            CoreError::Config { message } => CliError::Config { message },

            CoreError::Internal(message) => CliError::ApiError {
                status: None,
                message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: available_profiles(),
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}

/// Comma-separated profile names from the config file, for help text.
pub fn available_profiles() -> String {
    let cfg = proxly_config::load_config_or_default();
    if cfg.profiles.is_empty() {
        "(none)".into()
    } else {
        cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn core_kinds_pick_exit_codes() {
        let not_found: CliError = CoreError::NotFound {
            kind: "group".into(),
            identifier: "ops".into(),
        }
        .into();
        assert_eq!(not_found.exit_code(), exit_code::NOT_FOUND);

        let conflict: CliError = CoreError::GuestIdInUse { id: 100 }.into();
        assert_eq!(conflict.exit_code(), exit_code::CONFLICT);

        let task: CliError = CoreError::TaskFailed {
            upid: "UPID:pve1:1:2:3:qmstart:100:root@pam:".into(),
            exit_status: "boom".into(),
            log_tail: vec!["line".into()],
        }
        .into();
        assert_eq!(task.exit_code(), exit_code::TASK_FAILED);

        let auth: CliError = CoreError::AuthenticationFailed {
            message: "bad".into(),
        }
        .into();
        assert_eq!(auth.exit_code(), exit_code::AUTH);

        let otp: CliError = CoreError::TwoFactorRequired.into();
        assert_eq!(otp.exit_code(), exit_code::AUTH);
    }

    #[test]
    fn two_factor_help_names_the_profile() {
        let err = CliError::from(CoreError::TwoFactorRequired).for_profile("lab");
        assert!(matches!(err, CliError::TwoFactorRequired { ref profile } if profile == "lab"));
        assert!(err.help().unwrap().to_string().contains("--profile lab login --otp"));
    }

    #[test]
    fn validation_keeps_field_name() {
        let err: CliError = CoreError::ValidationFailed {
            field: Some("memory".into()),
            message: "too small".into(),
        }
        .into();
        match err {
            CliError::Validation { field, .. } => assert_eq!(field, "memory"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn token_not_found_suggests_user_flag() {
        let err: CliError = CoreError::NotFound {
            kind: "token".into(),
            identifier: "deploy".into(),
        }
        .into();
        assert!(err.to_string().contains("deploy"));
        match err {
            CliError::NotFound { list_command, .. } => {
                assert_eq!(list_command, "token list --user <user>");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn operation_context_keeps_exit_code_and_help() {
        let task: CliError = CoreError::TaskFailed {
            upid: "UPID:pve1:1:2:3:qmstart:100:root@pam:".into(),
            exit_status: "start failed: QEMU exited with code 1".into(),
            log_tail: vec!["kvm: -drive: Could not open".into()],
        }
        .into();
        let err = task.during("start", "guest", "100");

        assert_eq!(err.to_string(), "Failed to start guest '100'");
        assert_eq!(err.exit_code(), exit_code::TASK_FAILED);
        assert!(err.help().unwrap().to_string().contains("Could not open"));
        assert!(
            std::error::Error::source(&err)
                .unwrap()
                .to_string()
                .contains("QEMU exited")
        );
    }

    #[test]
    fn errors_naming_their_resource_are_not_wrapped() {
        let conflict: CliError = CoreError::GuestIdInUse { id: 100 }.into();
        let err = conflict.during("create", "guest", "100");
        assert!(matches!(err, CliError::Conflict { .. }));

        let api: CliError = CoreError::Api {
            message: "cfs lock timeout".into(),
            status: Some(500),
        }
        .into();
        let twice = api.during("set", "pool", "lab").during("set", "pool", "lab");
        match twice {
            CliError::Operation { source, .. } => {
                assert!(matches!(*source, CliError::ApiError { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn profile_reaches_wrapped_auth_errors() {
        let expired: CliError = CoreError::SessionExpired.into();
        let err = expired.during("delete", "user", "ci@pve").for_profile("lab");
        assert_eq!(err.exit_code(), exit_code::AUTH);
        assert!(err.help().unwrap().to_string().contains("--profile lab"));
    }
}
