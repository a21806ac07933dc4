//! Connection parameters.

use std::net::SocketAddr;
use std::time::Duration;

/// Security/encryption mode for the SMTP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Plain SMTP, no encryption.
    #[default]
    None,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
    /// Implicit TLS (connect directly with TLS).
    Tls,
}

impl Security {
    /// Get default port for the security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None => 25,
            Self::StartTls => 587,
            Self::Tls => 465,
        }
    }
}

/// Everything needed to open an SMTP session.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Server hostname.
    pub host: String,
    /// Server port; falls back to [`Security::default_port`] when `None`.
    pub port: Option<u16>,
    /// Name sent with EHLO/HELO. Defaults to the local address literal.
    pub local_hostname: Option<String>,
    /// Applied to the TCP connect and to every command round-trip.
    pub timeout: Option<Duration>,
    /// Local address to bind before connecting.
    pub source_address: Option<SocketAddr>,
    /// Transport security.
    pub security: Security,
    /// Wire trace level; anything above zero logs each line at debug level.
    pub debug: u8,
}

impl ConnectOptions {
    /// Options for `host` with every knob at its default.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            local_hostname: None,
            timeout: None,
            source_address: None,
            security: Security::None,
            debug: 0,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Port that will actually be dialled.
    #[must_use]
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.security.default_port())
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::new("localhost")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ports() {
        assert_eq!(ConnectOptions::new("h").effective_port(), 25);
        assert_eq!(
            ConnectOptions::new("h")
                .security(Security::Tls)
                .effective_port(),
            465
        );
        assert_eq!(
            ConnectOptions::new("h")
                .security(Security::StartTls)
                .effective_port(),
            587
        );
    }

    #[test]
    fn explicit_port_wins() {
        let opts = ConnectOptions::new("h").security(Security::Tls).port(2525);
        assert_eq!(opts.effective_port(), 2525);
    }

    #[test]
    fn default_is_plain_localhost() {
        let opts = ConnectOptions::default();
        assert_eq!(opts.host, "localhost");
        assert_eq!(opts.security, Security::None);
        assert_eq!(opts.debug, 0);
    }
}
