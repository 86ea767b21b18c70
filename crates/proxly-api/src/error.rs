use std::collections::BTreeMap;

use thiserror::Error;

/// Top-level error type for the `proxly-api` crate.
///
/// Every variant corresponds to one failure kind the caller is expected to
/// match on: transport, authentication, server-side validation, server
/// faults, task failures and deadlines. `proxly-core` maps these into
/// user-facing diagnostics without losing the kind.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login failed or a static API token was rejected.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The account has a second factor configured and no one-time code was supplied.
    #[error("Two-factor authentication code required")]
    TwoFactorRequired,

    /// A previously issued ticket was rejected (or is past its lifetime).
    /// The stored ticket has been cleared; log in again before the next call.
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A request or a task wait ran past its deadline.
    #[error("Timed out after {timeout_secs}s waiting for {waiting_for}")]
    Timeout { timeout_secs: u64, waiting_for: String },

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Server responses ────────────────────────────────────────────
    /// The server rejected the request parameters (4xx other than 401/403).
    ///
    /// `errors` carries the per-field messages when the server supplies them.
    #[error("Validation failed (HTTP {status}): {message}")]
    Validation {
        status: u16,
        message: String,
        errors: BTreeMap<String, String>,
    },

    /// The server failed while handling the request (5xx).
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    // ── Tasks ───────────────────────────────────────────────────────
    /// An asynchronous task finished with an error exit status.
    #[error("Task {upid} failed: {exit_status}")]
    TaskFailed {
        upid: String,
        exit_status: String,
        log_tail: Vec<String>,
    },

    /// A string could not be parsed as a task identifier.
    #[error("Invalid task identifier: {0}")]
    InvalidUpid(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying at the caller level.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } | Self::Server { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if the server reported the target as missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Validation { status: 404, .. } | Self::Server { status: 404, .. } => true,
            Self::Validation { message, .. } | Self::Server { message, .. } => {
                let lower = message.to_ascii_lowercase();
                lower.contains("does not exist") || lower.contains("no such")
            }
            _ => false,
        }
    }

    /// Returns `true` if the server reported that the identifier is already taken.
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::Validation { message, errors, .. } => {
                message.contains("already exists")
                    || errors.values().any(|m| m.contains("already exists"))
            }
            Self::Server { message, .. } => message.contains("already exists"),
            _ => false,
        }
    }

    /// The first offending field name from a validation failure, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { errors, .. } => errors.keys().next().map(String::as_str),
            _ => None,
        }
    }

    /// HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Validation { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validation(message: &str, errors: &[(&str, &str)]) -> Error {
        Error::Validation {
            status: 400,
            message: message.into(),
            errors: errors
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        }
    }

    #[test]
    fn field_returns_first_offending_key() {
        let err = validation(
            "Parameter verification failed.",
            &[("vmid", "invalid format"), ("name", "too long")],
        );
        assert_eq!(err.field(), Some("name"));
    }

    #[test]
    fn already_exists_detected_in_field_errors() {
        let err = validation("Parameter verification failed.", &[("vmid", "VM 100 already exists")]);
        assert!(err.is_already_exists());
        assert!(!err.is_transient());
    }

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Server {
            status: 503,
            message: "service unavailable".into(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn missing_config_is_not_found() {
        let err = Error::Server {
            status: 500,
            message: "Configuration file 'nodes/pve1/qemu-server/104.conf' does not exist".into(),
        };
        assert!(err.is_not_found());
    }
}
