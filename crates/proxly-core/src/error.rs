// ── Core error types ──
//
// Errors surfaced by proxly-core. The API layer's variants are folded into
// domain kinds here without losing which kind of failure occurred, so the
// CLI can pick an exit code and tests can match on the kind.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to cluster at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Two-factor authentication code required")]
    TwoFactorRequired,

    #[error("Session expired -- log in again")]
    SessionExpired,

    #[error("Timed out after {timeout_secs}s waiting for {waiting_for}")]
    Timeout { timeout_secs: u64, waiting_for: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed {
        /// Offending field, when the server or local validation names one.
        field: Option<String>,
        message: String,
    },

    #[error("Task {upid} failed: {exit_status}")]
    TaskFailed {
        upid: String,
        exit_status: String,
        log_tail: Vec<String>,
    },

    #[error("Guest id {id} is already in use")]
    GuestIdInUse { id: u32 },

    #[error("{kind} not found: {identifier}")]
    NotFound { kind: String, identifier: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the same call may succeed if repeated later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Timeout { .. } => true,
            Self::Api { status, .. } => status.is_some_and(|s| s >= 500),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<proxly_api::Error> for CoreError {
    fn from(err: proxly_api::Error) -> Self {
        use proxly_api::Error as E;

        match err {
            E::Authentication { message } => CoreError::AuthenticationFailed { message },
            E::TwoFactorRequired => CoreError::TwoFactorRequired,
            E::SessionExpired => CoreError::SessionExpired,
            E::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout {
                        timeout_secs: 0,
                        waiting_for: "response".into(),
                    }
                } else if e.is_connect() || e.is_request() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(|u| u.origin().ascii_serialization())
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            E::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            E::Timeout {
                timeout_secs,
                waiting_for,
            } => CoreError::Timeout {
                timeout_secs,
                waiting_for,
            },
            E::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            E::Validation {
                message, errors, ..
            } => {
                let first = errors.iter().next();
                let field = first.map(|(f, _)| f.clone());
                let message = match first {
                    Some((f, detail)) => format!("{message}: {f}: {detail}"),
                    None => message,
                };
                CoreError::ValidationFailed { field, message }
            }
            E::Server { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            E::TaskFailed {
                upid,
                exit_status,
                log_tail,
            } => CoreError::TaskFailed {
                upid,
                exit_status,
                log_tail,
            },
            E::InvalidUpid(raw) => {
                CoreError::Internal(format!("server returned an invalid task id: {raw}"))
            }
            E::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
