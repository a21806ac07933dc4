//! Account model types.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use mailrelay_smtp::ConnectOptions;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Host used when an account does not name one.
pub const DEFAULT_HOST: &str = "localhost";

/// Security/encryption mode for the SMTP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// No encryption; plain SMTP.
    #[default]
    None,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
    /// Implicit TLS (connect directly with TLS).
    Tls,
}

impl From<Security> for mailrelay_smtp::Security {
    fn from(security: Security) -> Self {
        match security {
            Security::None => Self::None,
            Security::StartTls => Self::StartTls,
            Security::Tls => Self::Tls,
        }
    }
}

/// Local address to bind before connecting.
///
/// Written either as `"ip:port"`, a bare `"ip"` (any port), or a
/// `["ip", port]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SourceAddressRepr", into = "String")]
pub struct SourceAddress(pub SocketAddr);

#[derive(Deserialize)]
#[serde(untagged)]
enum SourceAddressRepr {
    Text(String),
    Pair(String, u16),
}

impl TryFrom<SourceAddressRepr> for SourceAddress {
    type Error = String;

    fn try_from(repr: SourceAddressRepr) -> std::result::Result<Self, Self::Error> {
        let parse_ip = |ip: &str| {
            ip.parse::<IpAddr>()
                .map_err(|_| format!("source_address {ip:?} is not an IP address"))
        };
        match repr {
            SourceAddressRepr::Text(text) => text
                .parse::<SocketAddr>()
                .or_else(|_| parse_ip(&text).map(|ip| SocketAddr::new(ip, 0)))
                .map(Self),
            SourceAddressRepr::Pair(ip, port) => Ok(Self(SocketAddr::new(parse_ip(&ip)?, port))),
        }
    }
}

impl From<SourceAddress> for String {
    fn from(addr: SourceAddress) -> Self {
        addr.0.to_string()
    }
}

/// One SMTP sender identity, as written in an account file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Registry key and AUTH user name.
    pub login: String,
    /// AUTH password; without it the session stays unauthenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// SMTP server host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// SMTP server port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Name announced with EHLO/HELO.
    #[serde(
        default,
        alias = "localHostname",
        skip_serializing_if = "Option::is_none"
    )]
    pub local_hostname: Option<String>,
    /// Connection timeout in seconds.
    #[serde(
        default,
        alias = "timeout_seconds",
        alias = "timeoutSeconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<f64>,
    /// Local bind address.
    #[serde(
        default,
        alias = "sourceAddress",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_address: Option<SourceAddress>,
    /// Wire trace level.
    #[serde(
        default,
        alias = "debug_level",
        alias = "debugLevel",
        skip_serializing_if = "Option::is_none"
    )]
    pub debug: Option<u8>,
    /// Address for the `From` header; the login is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Human-readable sender name for the `From` header.
    #[serde(
        default,
        rename = "name",
        alias = "display_name",
        alias = "displayName",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
    /// Transport security.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Security>,
}

impl AccountConfig {
    /// Creates an account with only a login set.
    #[must_use]
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            ..Self::default()
        }
    }

    /// Checks the invariants the registry relies on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the login is blank or the timeout is not
    /// a finite, non-negative number of seconds.
    pub fn validate(&self) -> Result<()> {
        if self.login.trim().is_empty() {
            return Err(Error::Config("account login cannot be empty".into()));
        }
        if let Some(secs) = self.timeout
            && Duration::try_from_secs_f64(secs).is_err()
        {
            return Err(Error::Config(format!(
                "account {:?}: timeout {secs} is not a valid number of seconds",
                self.login
            )));
        }
        Ok(())
    }

    /// Address used in the `From` header.
    #[must_use]
    pub fn from_address(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.login)
    }

    /// Value of the `From` header: `Name <address>` when a display name is
    /// configured, the bare address otherwise.
    #[must_use]
    pub fn from_header(&self) -> String {
        match &self.display_name {
            Some(name) => format!("{name} <{}>", self.from_address()),
            None => self.from_address().to_string(),
        }
    }

    /// Login and password, when both are configured.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.password
            .as_deref()
            .map(|password| (self.login.as_str(), password))
    }

    /// Connection parameters for this account.
    #[must_use]
    pub fn connect_options(&self) -> ConnectOptions {
        let mut opts =
            ConnectOptions::new(self.host.as_deref().unwrap_or(DEFAULT_HOST))
                .security(self.security.unwrap_or_default().into());
        opts.port = self.port;
        opts.local_hostname.clone_from(&self.local_hostname);
        opts.timeout = self
            .timeout
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        opts.source_address = self.source_address.map(|addr| addr.0);
        opts.debug = self.debug.unwrap_or(0);
        opts
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> AccountConfig {
        serde_json::from_value(value).unwrap()
    }

    mod from_header_tests {
        use super::*;

        #[test]
        fn login_only() {
            let config = AccountConfig::new("a@x.com");
            assert_eq!(config.from_header(), "a@x.com");
        }

        #[test]
        fn display_name_wraps_login() {
            let config = parse(json!({"login": "a@x.com", "name": "Bot"}));
            assert_eq!(config.from_header(), "Bot <a@x.com>");
        }

        #[test]
        fn explicit_from_overrides_login() {
            let config = parse(json!({
                "login": "user123",
                "from": "noreply@x.com",
                "displayName": "Alerts"
            }));
            assert_eq!(config.from_address(), "noreply@x.com");
            assert_eq!(config.from_header(), "Alerts <noreply@x.com>");
        }
    }

    mod serde_tests {
        use super::*;

        #[test]
        fn full_account_file() {
            let config = parse(json!({
                "login": "a@x.com",
                "password": "p",
                "host": "smtp.test",
                "port": 587,
                "local_hostname": "relay.local",
                "timeout": 2.5,
                "source_address": ["127.0.0.1", 0],
                "debug": 1,
                "security": "starttls"
            }));
            assert_eq!(config.host.as_deref(), Some("smtp.test"));
            assert_eq!(config.port, Some(587));
            assert_eq!(config.security, Some(Security::StartTls));
            assert_eq!(
                config.source_address.unwrap().0,
                "127.0.0.1:0".parse::<SocketAddr>().unwrap()
            );
        }

        #[test]
        fn source_address_forms() {
            let text = parse(json!({"login": "a", "source_address": "10.0.0.1:2500"}));
            let bare = parse(json!({"login": "a", "source_address": "10.0.0.1"}));
            assert_eq!(text.source_address.unwrap().0.port(), 2500);
            assert_eq!(bare.source_address.unwrap().0.port(), 0);

            let bad = serde_json::from_value::<AccountConfig>(
                json!({"login": "a", "source_address": "mail.example.com"}),
            );
            assert!(bad.is_err());
        }

        #[test]
        fn aliases_accepted() {
            let config = parse(json!({
                "login": "a",
                "timeoutSeconds": 3,
                "debugLevel": 2,
                "display_name": "Bot"
            }));
            assert_eq!(config.timeout, Some(3.0));
            assert_eq!(config.debug, Some(2));
            assert_eq!(config.display_name.as_deref(), Some("Bot"));
        }

        #[test]
        fn serializes_with_file_keys() {
            let mut config = AccountConfig::new("a@x.com");
            config.display_name = Some("Bot".into());
            let value = serde_json::to_value(&config).unwrap();
            assert_eq!(value, json!({"login": "a@x.com", "name": "Bot"}));
        }
    }

    mod connect_options_tests {
        use super::*;

        #[test]
        fn defaults() {
            let opts = AccountConfig::new("a@x.com").connect_options();
            assert_eq!(opts.host, DEFAULT_HOST);
            assert_eq!(opts.effective_port(), 25);
            assert!(opts.timeout.is_none());
            assert_eq!(opts.debug, 0);
        }

        #[test]
        fn all_knobs_applied() {
            let config = parse(json!({
                "login": "a@x.com",
                "host": "smtp.test",
                "port": 2525,
                "local_hostname": "relay.local",
                "timeout": 1.5,
                "source_address": "127.0.0.1:0",
                "debug": 1,
                "security": "tls"
            }));
            let opts = config.connect_options();
            assert_eq!(opts.host, "smtp.test");
            assert_eq!(opts.effective_port(), 2525);
            assert_eq!(opts.local_hostname.as_deref(), Some("relay.local"));
            assert_eq!(opts.timeout, Some(Duration::from_millis(1500)));
            assert!(opts.source_address.is_some());
            assert_eq!(opts.debug, 1);
            assert_eq!(opts.security, mailrelay_smtp::Security::Tls);
        }

        #[test]
        fn credentials_need_password() {
            let mut config = AccountConfig::new("a@x.com");
            assert!(config.credentials().is_none());
            config.password = Some("p".into());
            assert_eq!(config.credentials(), Some(("a@x.com", "p")));
        }
    }

    mod validate_tests {
        use super::*;

        #[test]
        fn blank_login_rejected() {
            assert!(AccountConfig::new("  ").validate().is_err());
            assert!(AccountConfig::new("a@x.com").validate().is_ok());
        }

        #[test]
        fn negative_timeout_rejected() {
            let mut config = AccountConfig::new("a@x.com");
            config.timeout = Some(-1.0);
            assert!(matches!(config.validate(), Err(Error::Config(_))));
        }
    }
}
