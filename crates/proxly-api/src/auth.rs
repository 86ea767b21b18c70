// Credential types and the login flow.
//
// Password credentials are exchanged for a ticket + CSRF token at
// `POST /access/ticket`; API tokens are self-contained and attached per
// request. The login methods live here as inherent methods on
// `ApiClient` so the executor module stays focused on transport.

use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::client::ApiClient;
use crate::encode::{FormBody, WireValue};
use crate::error::Error;

/// How long the server honours a ticket after issuance.
pub const TICKET_LIFETIME: chrono::TimeDelta = chrono::TimeDelta::hours(2);

/// Which authentication strategy a credential uses.
///
/// Marker enum (no data) for branching on the auth flow without carrying
/// secret material around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Ticket cookie + CSRF header obtained by password login.
    Ticket,
    /// Static `PVEAPIToken` authorization header.
    ApiToken,
}

/// Credentials for authenticating with a cluster.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Username (with realm, e.g. `root@pam`), password, optional one-time code.
    Password {
        username: String,
        password: SecretString,
        otp: Option<String>,
    },
    /// API token: `user-id!token-name=secret`.
    ApiToken {
        user_id: String,
        token_name: String,
        secret: SecretString,
    },
}

impl Credential {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Password {
            username: username.into(),
            password: SecretString::from(password.into()),
            otp: None,
        }
    }

    pub fn api_token(
        user_id: impl Into<String>,
        token_name: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self::ApiToken {
            user_id: user_id.into(),
            token_name: token_name.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    /// Attach a one-time code to a password credential. No-op for tokens.
    #[must_use]
    pub fn with_otp(self, code: impl Into<String>) -> Self {
        match self {
            Self::Password {
                username, password, ..
            } => Self::Password {
                username,
                password,
                otp: Some(code.into()),
            },
            token @ Self::ApiToken { .. } => token,
        }
    }

    /// Parse the composite `user@realm!token-name=secret` form.
    pub fn parse_api_token(composite: &str) -> Result<Self, Error> {
        let invalid = || Error::Authentication {
            message: "API token must look like user@realm!token-name=secret".into(),
        };
        let (token_id, secret) = composite.split_once('=').ok_or_else(invalid)?;
        let (user_id, token_name) = token_id.split_once('!').ok_or_else(invalid)?;
        if user_id.is_empty() || token_name.is_empty() || secret.is_empty() {
            return Err(invalid());
        }
        Ok(Self::api_token(user_id, token_name, secret))
    }

    pub fn strategy(&self) -> AuthStrategy {
        match self {
            Self::Password { .. } => AuthStrategy::Ticket,
            Self::ApiToken { .. } => AuthStrategy::ApiToken,
        }
    }

    /// The user this credential authenticates as.
    pub fn user(&self) -> &str {
        match self {
            Self::Password { username, .. } => username,
            Self::ApiToken { user_id, .. } => user_id,
        }
    }

    /// The `Authorization` header value for token credentials.
    pub(crate) fn token_header(&self) -> Option<String> {
        match self {
            Self::ApiToken {
                user_id,
                token_name,
                secret,
            } => Some(format!(
                "PVEAPIToken={user_id}!{token_name}={}",
                secret.expose_secret()
            )),
            Self::Password { .. } => None,
        }
    }
}

// ── Ticket ──────────────────────────────────────────────────────────

/// Session ticket and anti-forgery token issued by a successful login.
#[derive(Clone)]
pub struct Ticket {
    pub(crate) ticket: SecretString,
    pub(crate) csrf_token: SecretString,
    pub username: String,
    pub issued_at: DateTime<Utc>,
}

impl Ticket {
    pub fn new(
        ticket: impl Into<String>,
        csrf_token: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            ticket: SecretString::from(ticket.into()),
            csrf_token: SecretString::from(csrf_token.into()),
            username: username.into(),
            issued_at: Utc::now(),
        }
    }

    /// Whether the server would already have stopped honouring this ticket.
    pub fn is_expired(&self) -> bool {
        Utc::now() - self.issued_at >= TICKET_LIFETIME
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("username", &self.username)
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

// ── Login ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TicketResponse {
    ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    csrf_token: Option<String>,
    username: String,
    #[serde(rename = "NeedTFA", default)]
    need_tfa: Option<u8>,
}

impl ApiClient {
    /// Authenticate the session.
    ///
    /// Password credentials log in and store the issued ticket; API tokens
    /// need no network call.
    pub async fn authenticate(&self) -> Result<(), Error> {
        let (username, password, otp) = match self.session().credential() {
            Credential::ApiToken { .. } => {
                debug!("API token credential, no login needed");
                return Ok(());
            }
            Credential::Password {
                username,
                password,
                otp,
            } => (username.clone(), password.clone(), otp.clone()),
        };

        let mut form = FormBody::new()
            .with("username", username.as_str())
            .with_value("password", WireValue::secret(password.expose_secret()));
        if let Some(ref code) = otp {
            form = form.with_value("otp", WireValue::secret(code.as_str()));
        }

        debug!(user = %username, "logging in");
        let resp: TicketResponse = self.login_request(&form).await?;

        let resp = if resp.need_tfa.unwrap_or(0) == 1 {
            let Some(code) = otp else {
                return Err(Error::TwoFactorRequired);
            };
            debug!("submitting second factor");
            let challenge = FormBody::new()
                .with("username", username.as_str())
                .with_value("tfa-challenge", WireValue::secret(resp.ticket))
                .with_value("password", WireValue::secret(format!("totp:{code}")));
            self.login_request::<TicketResponse>(&challenge).await?
        } else {
            resp
        };

        let csrf = resp.csrf_token.ok_or_else(|| Error::Authentication {
            message: "login response carried no CSRF token".into(),
        })?;
        self.session()
            .store_ticket(Ticket::new(resp.ticket, csrf, resp.username));
        debug!("login successful");
        Ok(())
    }

    /// End the session locally. The server keeps no session state to revoke.
    pub fn logout(&self) {
        self.session().invalidate();
        debug!("logged out");
    }

    async fn login_request<T: serde::de::DeserializeOwned>(
        &self,
        form: &FormBody,
    ) -> Result<T, Error> {
        let value = self
            .execute_unauthenticated(Method::POST, "access/ticket", form)
            .await?;
        self.decode_data(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_composite_token() {
        let cred = Credential::parse_api_token("automation@pve!ci=0d3c1b7e-secret").unwrap();
        assert_eq!(cred.strategy(), AuthStrategy::ApiToken);
        assert_eq!(cred.user(), "automation@pve");
        assert_eq!(
            cred.token_header().as_deref(),
            Some("PVEAPIToken=automation@pve!ci=0d3c1b7e-secret")
        );
    }

    #[test]
    fn rejects_malformed_tokens() {
        for bad in ["", "user@pve", "user@pve!ci", "!ci=secret", "user@pve!=secret"] {
            assert!(Credential::parse_api_token(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn otp_only_applies_to_passwords() {
        let cred = Credential::password("root@pam", "pw").with_otp("123456");
        assert!(matches!(cred, Credential::Password { otp: Some(ref c), .. } if c == "123456"));

        let token = Credential::api_token("u@pve", "t", "s").with_otp("123456");
        assert_eq!(token.strategy(), AuthStrategy::ApiToken);
    }

    #[test]
    fn fresh_ticket_is_not_expired() {
        let mut ticket = Ticket::new("PVE:root@pam:ABC", "csrf", "root@pam");
        assert!(!ticket.is_expired());
        ticket.issued_at -= TICKET_LIFETIME;
        assert!(ticket.is_expired());
    }

    #[test]
    fn debug_output_hides_ticket_material() {
        let ticket = Ticket::new("PVE:root@pam:SECRET", "CSRFSECRET", "root@pam");
        let debug = format!("{ticket:?}");
        assert!(!debug.contains("SECRET"));
        assert!(debug.contains("root@pam"));
    }
}
