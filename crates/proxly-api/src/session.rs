// Session state shared by every request on one client.
//
// The ticket and its CSRF token are swapped as one unit under a single
// RwLock so concurrent readers never observe a mixed pair.

use std::sync::{PoisonError, RwLock};

use reqwest::{Method, RequestBuilder, header};
use secrecy::ExposeSecret;
use tracing::{debug, trace};

use crate::auth::{AuthStrategy, Credential, Ticket};
use crate::encode::{EncodeProfile, encode_str};
use crate::error::Error;

const TICKET_COOKIE: &str = "PVEAuthCookie";
const CSRF_HEADER: &str = "CSRFPreventionToken";

/// Active credential plus the ticket issued for it, if any.
pub struct Session {
    credential: Credential,
    ticket: RwLock<Option<Ticket>>,
}

impl Session {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            ticket: RwLock::new(None),
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn strategy(&self) -> AuthStrategy {
        self.credential.strategy()
    }

    /// Snapshot of the stored ticket.
    pub fn ticket(&self) -> Option<Ticket> {
        self.ticket
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a request could be authenticated right now.
    pub fn is_authenticated(&self) -> bool {
        match self.strategy() {
            AuthStrategy::ApiToken => true,
            AuthStrategy::Ticket => self.ticket().is_some_and(|t| !t.is_expired()),
        }
    }

    pub(crate) fn store_ticket(&self, ticket: Ticket) {
        trace!(user = %ticket.username, "storing ticket");
        *self.ticket.write().unwrap_or_else(PoisonError::into_inner) = Some(ticket);
    }

    /// Drop the stored ticket so the next request requires a fresh login.
    pub fn invalidate(&self) {
        let mut guard = self.ticket.write().unwrap_or_else(PoisonError::into_inner);
        if guard.take().is_some() {
            debug!("session ticket cleared");
        }
    }

    /// Add authentication to an outgoing request.
    ///
    /// Tickets go in a cookie on every request; the CSRF header is only
    /// sent with state-changing methods.
    pub(crate) fn attach(
        &self,
        builder: RequestBuilder,
        method: &Method,
    ) -> Result<RequestBuilder, Error> {
        if let Some(value) = self.credential.token_header() {
            return Ok(builder.header(header::AUTHORIZATION, value));
        }

        let guard = self.ticket.read().unwrap_or_else(PoisonError::into_inner);
        let Some(ticket) = guard.as_ref().filter(|t| !t.is_expired()) else {
            return Err(Error::SessionExpired);
        };

        let cookie = format!(
            "{TICKET_COOKIE}={}",
            encode_str(ticket.ticket.expose_secret(), EncodeProfile::Generic)
        );
        let builder = builder.header(header::COOKIE, cookie);
        if is_state_changing(method) {
            Ok(builder.header(CSRF_HEADER, ticket.csrf_token.expose_secret()))
        } else {
            Ok(builder)
        }
    }

    /// Translate a 401/403 into the error the caller sees, applying the
    /// re-authentication policy. Never retries.
    pub(crate) fn rejected(&self, message: String) -> Error {
        match self.strategy() {
            AuthStrategy::Ticket => {
                self.invalidate();
                Error::SessionExpired
            }
            AuthStrategy::ApiToken => Error::Authentication { message },
        }
    }
}

fn is_state_changing(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::DELETE)
}
