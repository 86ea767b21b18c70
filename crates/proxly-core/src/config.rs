// ── Runtime connection configuration ──
//
// Describes how to reach and authenticate with one cluster. Built by the
// CLI from a profile plus flags; core never reads config files.

use std::path::PathBuf;
use std::time::Duration;

use proxly_api::{Credential, TlsMode, TransportConfig};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

/// How to authenticate with a cluster.
///
/// Carries the credential data; `proxly_api::AuthStrategy` is the
/// zero-data marker for the same choice.
#[derive(Debug, Clone)]
pub enum AuthCredentials {
    /// Username with realm (`root@pam`) and password, optional one-time code.
    Password {
        username: String,
        password: SecretString,
        otp: Option<String>,
    },
    /// API token `user@realm!name` plus its secret.
    Token {
        user_id: String,
        token_name: String,
        secret: SecretString,
    },
}

impl AuthCredentials {
    pub fn to_credential(&self) -> Credential {
        match self {
            Self::Password {
                username,
                password,
                otp,
            } => {
                let cred = Credential::password(username.clone(), password.expose_secret());
                match otp {
                    Some(code) => cred.with_otp(code.clone()),
                    None => cred,
                }
            }
            Self::Token {
                user_id,
                token_name,
                secret,
            } => Credential::api_token(user_id.clone(), token_name.clone(), secret.expose_secret()),
        }
    }
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed cluster certificates).
    DangerAcceptInvalid,
}

/// Configuration for connecting to a single cluster.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Cluster URL (e.g., `https://pve.example.com:8006`).
    pub url: Url,
    pub auth: AuthCredentials,
    pub tls: TlsVerification,
    /// Per-request timeout; also the default deadline for task waits.
    pub timeout: Duration,
    pub proxy: Option<Url>,
    /// Node used when a guest operation does not name one.
    pub default_node: Option<String>,
}

impl ClusterConfig {
    pub fn transport(&self) -> TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        let transport = TransportConfig::default()
            .with_tls(tls)
            .with_timeout(self.timeout);
        match &self.proxy {
            Some(proxy) => transport.with_proxy(proxy.clone()),
            None => transport,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proxly_api::AuthStrategy;

    use super::*;

    #[test]
    fn transport_reflects_tls_timeout_and_proxy() {
        let config = ClusterConfig {
            url: Url::parse("https://pve:8006").unwrap(),
            auth: AuthCredentials::Password {
                username: "root@pam".into(),
                password: SecretString::from("pw".to_owned()),
                otp: None,
            },
            tls: TlsVerification::DangerAcceptInvalid,
            timeout: Duration::from_secs(45),
            proxy: Some(Url::parse("http://proxy:3128").unwrap()),
            default_node: None,
        };
        let transport = config.transport();
        assert_eq!(transport.tls, TlsMode::DangerAcceptInvalid);
        assert_eq!(transport.timeout, Duration::from_secs(45));
        assert_eq!(transport.proxy.unwrap().as_str(), "http://proxy:3128/");
    }

    #[test]
    fn token_credentials_map_to_token_strategy() {
        let auth = AuthCredentials::Token {
            user_id: "ci@pve".into(),
            token_name: "deploy".into(),
            secret: SecretString::from("s".to_owned()),
        };
        assert_eq!(auth.to_credential().strategy(), AuthStrategy::ApiToken);
    }
}
