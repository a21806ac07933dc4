//! Transport seam between the dispatcher and the SMTP client.
//!
//! [`Connector`] opens one ready-to-send [`Session`] per request. The SMTP
//! implementation is [`SmtpConnector`]; tests substitute their own.

use std::future::Future;

use mailrelay_smtp::{Authenticated, Client, Connected, SendReport};
use tracing::debug;

use crate::account::AccountConfig;

/// An established, possibly authenticated, transport session.
pub trait Session: Send {
    /// Runs one mail transaction.
    fn send_mail(
        &mut self,
        from: &str,
        to: &[String],
        message: &str,
    ) -> impl Future<Output = mailrelay_smtp::Result<SendReport>> + Send;

    /// Releases the session.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Opens sessions for accounts.
pub trait Connector: Send + Sync {
    /// Session type produced by [`open`](Self::open).
    type Session: Session;

    /// Connects with the account's settings, then authenticates when the
    /// account has both a login and a password.
    fn open(
        &self,
        account: &AccountConfig,
    ) -> impl Future<Output = mailrelay_smtp::Result<Self::Session>> + Send;
}

/// Connector speaking SMTP through [`mailrelay_smtp::Client`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpConnector;

/// Session held by [`SmtpConnector`].
#[derive(Debug)]
pub enum SmtpSession {
    /// Account without a password.
    Anonymous(Client<Connected>),
    /// Logged-in account.
    Authenticated(Client<Authenticated>),
}

impl Connector for SmtpConnector {
    type Session = SmtpSession;

    async fn open(&self, account: &AccountConfig) -> mailrelay_smtp::Result<SmtpSession> {
        let opts = account.connect_options();
        debug!(
            login = %account.login,
            host = %opts.host,
            port = opts.effective_port(),
            "opening smtp session"
        );

        let client = Client::connect(&opts).await?;
        match account.credentials() {
            Some((user, password)) => Ok(SmtpSession::Authenticated(
                client.login(user, password).await?,
            )),
            None => Ok(SmtpSession::Anonymous(client)),
        }
    }
}

impl Session for SmtpSession {
    async fn send_mail(
        &mut self,
        from: &str,
        to: &[String],
        message: &str,
    ) -> mailrelay_smtp::Result<SendReport> {
        match self {
            Self::Anonymous(client) => client.send_mail(from, to, message.as_bytes()).await,
            Self::Authenticated(client) => client.send_mail(from, to, message.as_bytes()).await,
        }
    }

    async fn close(self) {
        match self {
            Self::Anonymous(client) => client.close().await,
            Self::Authenticated(client) => client.close().await,
        }
    }
}
