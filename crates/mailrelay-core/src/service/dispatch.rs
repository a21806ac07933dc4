//! Send-request orchestration.
//!
//! A request walks `resolve account -> connect -> authenticate -> build
//! message -> send -> close`. Failures before the send are logged and end
//! the request quietly; the routine send failures are logged as well, and
//! anything else is returned to the caller. The session is closed on every
//! path once a send was attempted.

use std::fmt;
use std::sync::Arc;

use mailrelay_smtp::RefusedRecipient;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::message::{OutgoingMessage, Recipients};
use super::transport::{Connector, Session, SmtpConnector};
use crate::Result;
use crate::account::AccountRegistry;

/// Arguments of a `send_mail` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMailRequest {
    /// Subject line.
    #[serde(default)]
    pub subject: String,
    /// Recipients.
    #[serde(default)]
    pub to: Recipients,
    /// Plain text body.
    #[serde(default, rename = "msg", alias = "body")]
    pub body: String,
    /// Account to send from; empty selects the default account.
    #[serde(default)]
    pub account: String,
}

impl SendMailRequest {
    /// Creates a request for the default account.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        to: impl Into<Recipients>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            to: to.into(),
            body: body.into(),
            account: String::new(),
        }
    }

    /// Selects the sending account.
    #[must_use]
    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }
}

/// Why a session could not be established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstablishFailure {
    /// The server rejected both EHLO and HELO.
    Hello,
    /// The server rejected the credentials.
    Authentication,
    /// Anything else: connect, TLS, greeting, timeout, missing AUTH.
    Generic,
}

impl EstablishFailure {
    /// Classifies a connect-and-login error.
    #[must_use]
    pub const fn of(err: &mailrelay_smtp::Error) -> Self {
        match err {
            mailrelay_smtp::Error::Hello(_) => Self::Hello,
            mailrelay_smtp::Error::Authentication(_) => Self::Authentication,
            _ => Self::Generic,
        }
    }
}

impl fmt::Display for EstablishFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hello => "smtp hello error",
            Self::Authentication => "smtp authentication error",
            Self::Generic => "smtp exception",
        })
    }
}

/// Send failures that are logged rather than returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// Every recipient was refused.
    RecipientsRefused,
    /// The server refused the greeting exchange.
    Hello,
    /// The envelope sender was refused.
    SenderRefused,
    /// The message content was refused.
    Data,
}

impl SendFailure {
    /// Classifies a send error; `None` for errors outside the routine kinds.
    #[must_use]
    pub const fn of(err: &mailrelay_smtp::Error) -> Option<Self> {
        match err {
            mailrelay_smtp::Error::RecipientsRefused(_) => Some(Self::RecipientsRefused),
            mailrelay_smtp::Error::Hello(_) => Some(Self::Hello),
            mailrelay_smtp::Error::SenderRefused { .. } => Some(Self::SenderRefused),
            mailrelay_smtp::Error::Data(_) => Some(Self::Data),
            _ => None,
        }
    }
}

impl fmt::Display for SendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RecipientsRefused => "smtp recipients refused",
            Self::Hello => "smtp hello error",
            Self::SenderRefused => "smtp sender refused",
            Self::Data => "smtp data error",
        })
    }
}

/// Outcome of a send request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// No session could be opened; nothing was sent.
    Skipped,
    /// The server accepted the message.
    Sent {
        /// Recipients refused while others were accepted.
        refused: Vec<RefusedRecipient>,
    },
    /// The transaction failed in a routine way.
    Failed(SendFailure),
}

/// Sends mail on behalf of the registered accounts.
#[derive(Debug, Clone)]
pub struct Mailer<C = SmtpConnector> {
    registry: Arc<AccountRegistry>,
    connector: C,
}

impl Mailer {
    /// Creates a mailer speaking SMTP.
    #[must_use]
    pub const fn smtp(registry: Arc<AccountRegistry>) -> Self {
        Self::new(registry, SmtpConnector)
    }
}

impl<C: Connector> Mailer<C> {
    /// Creates a mailer using `connector` for sessions.
    #[must_use]
    pub const fn new(registry: Arc<AccountRegistry>, connector: C) -> Self {
        Self {
            registry,
            connector,
        }
    }

    /// Accounts this mailer sends from.
    #[must_use]
    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    /// Opens a session for `account` (the default account when empty).
    ///
    /// Returns `None` when the account is unknown or the session cannot be
    /// established; the reason is logged at error level.
    pub async fn login(&self, account: &str) -> Option<C::Session> {
        let config = self.registry.get_config(account)?;
        match self.connector.open(config).await {
            Ok(session) => Some(session),
            Err(e) => {
                let failure = EstablishFailure::of(&e);
                error!(login = %config.login, "{failure}: {e}");
                None
            }
        }
    }

    /// Handles one `send_mail` event.
    ///
    /// # Errors
    ///
    /// Returns transport errors outside the routine send failures (I/O,
    /// timeouts, disconnects, protocol violations, invalid addresses).
    pub async fn handle_send_mail(
        &self,
        subject: String,
        to: Recipients,
        msg: String,
        account: String,
    ) -> Result<Delivery> {
        let request = SendMailRequest {
            subject,
            to,
            body: msg,
            account,
        };
        self.send_mail(&request).await
    }

    /// Sends `request` through a fresh session.
    ///
    /// # Errors
    ///
    /// Returns transport errors outside the routine send failures (I/O,
    /// timeouts, disconnects, protocol violations, invalid addresses).
    pub async fn send_mail(&self, request: &SendMailRequest) -> Result<Delivery> {
        let Some(mut session) = self.login(&request.account).await else {
            return Ok(Delivery::Skipped);
        };

        let result = self.transmit(&mut session, request).await;
        session.close().await;
        result
    }

    async fn transmit(&self, session: &mut C::Session, request: &SendMailRequest) -> Result<Delivery> {
        let config = self.registry.resolve(&request.account)?;
        let sender = self.registry.resolve_name(&request.account);
        let recipients = request.to.normalize();

        let message = OutgoingMessage::from_account(config, &request.subject, &request.body)
            .recipients(recipients.clone())
            .to_rfc5322();

        debug!(%sender, recipients = recipients.len(), "sending message");
        match session.send_mail(sender, &recipients, &message).await {
            Ok(report) => {
                if report.refused.is_empty() {
                    info!(%sender, "message sent");
                } else {
                    let refused: Vec<&str> =
                        report.refused.iter().map(|r| r.address.as_str()).collect();
                    warn!(%sender, ?refused, "message sent, some recipients refused");
                }
                Ok(Delivery::Sent {
                    refused: report.refused,
                })
            }
            Err(e) => match SendFailure::of(&e) {
                Some(failure) => {
                    error!(%sender, "{failure}: {e}");
                    Ok(Delivery::Failed(failure))
                }
                None => Err(e.into()),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::account::AccountConfig;
    use mailrelay_smtp::{Reply, ReplyCode, SendReport};
    use serde_json::json;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Open {
            host: String,
            port: u16,
            credentials: Option<(String, String)>,
        },
        Send {
            from: String,
            to: Vec<String>,
            message: String,
        },
        Close,
    }

    type Calls = Arc<Mutex<Vec<Call>>>;

    #[derive(Default)]
    struct MockConnector {
        calls: Calls,
        open_error: Option<fn() -> mailrelay_smtp::Error>,
        send_error: Option<fn() -> mailrelay_smtp::Error>,
    }

    struct MockSession {
        calls: Calls,
        send_error: Option<fn() -> mailrelay_smtp::Error>,
    }

    impl Connector for MockConnector {
        type Session = MockSession;

        async fn open(&self, account: &AccountConfig) -> mailrelay_smtp::Result<MockSession> {
            let opts = account.connect_options();
            self.calls.lock().unwrap().push(Call::Open {
                host: opts.host.clone(),
                port: opts.effective_port(),
                credentials: account
                    .credentials()
                    .map(|(u, p)| (u.to_string(), p.to_string())),
            });
            if let Some(make) = self.open_error {
                return Err(make());
            }
            Ok(MockSession {
                calls: Arc::clone(&self.calls),
                send_error: self.send_error,
            })
        }
    }

    impl Session for MockSession {
        async fn send_mail(
            &mut self,
            from: &str,
            to: &[String],
            message: &str,
        ) -> mailrelay_smtp::Result<SendReport> {
            self.calls.lock().unwrap().push(Call::Send {
                from: from.to_string(),
                to: to.to_vec(),
                message: message.to_string(),
            });
            match self.send_error {
                Some(make) => Err(make()),
                None => Ok(SendReport::default()),
            }
        }

        async fn close(self) {
            self.calls.lock().unwrap().push(Call::Close);
        }
    }

    fn reply(code: u16, text: &str) -> Reply {
        Reply::new(ReplyCode::new(code), vec![text.to_string()])
    }

    fn registry() -> Arc<AccountRegistry> {
        let mut registry = AccountRegistry::new();
        registry.add_account(json!({
            "login": "a@x.com",
            "password": "p",
            "host": "smtp.test",
            "port": 587
        }));
        registry.add_account(json!({
            "login": "b@y.com",
            "from": "noreply@y.com",
            "name": "Bot"
        }));
        Arc::new(registry)
    }

    fn build(connector: MockConnector) -> (Mailer<MockConnector>, Calls) {
        let calls = Arc::clone(&connector.calls);
        (Mailer::new(registry(), connector), calls)
    }

    fn recorded(calls: &Calls) -> Vec<Call> {
        calls.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_default_account_end_to_end() {
        let (mailer, calls) = build(MockConnector::default());
        let request = SendMailRequest::new("Hi", "b@y.com", "Hello");

        let delivery = mailer.send_mail(&request).await.unwrap();
        assert_eq!(delivery, Delivery::Sent { refused: vec![] });

        let calls = recorded(&calls);
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0],
            Call::Open {
                host: "smtp.test".into(),
                port: 587,
                credentials: Some(("a@x.com".into(), "p".into())),
            }
        );
        match &calls[1] {
            Call::Send { from, to, message } => {
                assert_eq!(from, "a@x.com");
                assert_eq!(to, &["b@y.com"]);
                assert!(message.contains("Subject: Hi\r\n"));
                assert!(message.contains("From: a@x.com\r\n"));
                assert!(message.contains("To: b@y.com\r\n"));
            }
            other => panic!("expected send, got {other:?}"),
        }
        assert_eq!(calls[2], Call::Close);
    }

    #[tokio::test]
    async fn test_named_account_without_password() {
        let (mailer, calls) = build(MockConnector::default());
        let request =
            SendMailRequest::new("Hi", "c@z.com, d@z.com", "Hello").account("b@y.com");

        mailer.send_mail(&request).await.unwrap();

        let calls = recorded(&calls);
        assert!(matches!(
            &calls[0],
            Call::Open { host, port: 25, credentials: None } if host == "localhost"
        ));
        match &calls[1] {
            Call::Send { from, to, message } => {
                assert_eq!(from, "b@y.com");
                assert_eq!(to, &["c@z.com", "d@z.com"]);
                assert!(message.contains("From: Bot <noreply@y.com>\r\n"));
                assert!(message.contains("To: c@z.com, d@z.com\r\n"));
            }
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unknown_account_sends_nothing() {
        let (mailer, calls) = build(MockConnector::default());
        let request = SendMailRequest::new("Hi", "b@y.com", "Hello").account("ghost@x.com");

        let delivery = mailer.send_mail(&request).await.unwrap();
        assert_eq!(delivery, Delivery::Skipped);
        assert!(recorded(&calls).is_empty());
        assert!(logs_contain("smtp account \"ghost@x.com\" unknown"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_authentication_failure_aborts() {
        let (mailer, calls) = build(MockConnector {
            open_error: Some(|| mailrelay_smtp::Error::Authentication(reply(535, "bad credentials"))),
            ..MockConnector::default()
        });

        let delivery = mailer
            .send_mail(&SendMailRequest::new("Hi", "b@y.com", "Hello"))
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Skipped);

        let calls = recorded(&calls);
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], Call::Open { .. }));
        assert!(logs_contain("smtp authentication error"));
        assert!(!logs_contain("smtp exception"));
        assert!(!logs_contain("smtp hello error"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_establishment_errors_are_classified() {
        let (mailer, _) = build(MockConnector {
            open_error: Some(|| mailrelay_smtp::Error::Hello(reply(550, "go away"))),
            ..MockConnector::default()
        });
        assert!(mailer.login("").await.is_none());
        assert!(logs_contain("smtp hello error: (550, go away)"));

        let (mailer, _) = build(MockConnector {
            open_error: Some(|| mailrelay_smtp::Error::Greeting(reply(554, "no service"))),
            ..MockConnector::default()
        });
        assert!(mailer.login("").await.is_none());
        assert!(logs_contain("smtp exception"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_routine_send_failure_is_logged_and_closed() {
        let (mailer, calls) = build(MockConnector {
            send_error: Some(|| {
                mailrelay_smtp::Error::RecipientsRefused(vec![RefusedRecipient {
                    address: "b@y.com".into(),
                    reply: reply(550, "no such user"),
                }])
            }),
            ..MockConnector::default()
        });

        let delivery = mailer
            .send_mail(&SendMailRequest::new("Hi", "b@y.com", "Hello"))
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Failed(SendFailure::RecipientsRefused));
        assert_eq!(recorded(&calls).last(), Some(&Call::Close));
        assert!(logs_contain("smtp recipients refused"));
        assert!(logs_contain("b@y.com"));
    }

    #[tokio::test]
    async fn test_unhandled_send_failure_propagates_after_close() {
        let (mailer, calls) = build(MockConnector {
            send_error: Some(|| mailrelay_smtp::Error::Disconnected),
            ..MockConnector::default()
        });

        let err = mailer
            .send_mail(&SendMailRequest::new("Hi", "b@y.com", "Hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Smtp(mailrelay_smtp::Error::Disconnected)));
        assert_eq!(recorded(&calls).last(), Some(&Call::Close));
    }

    #[tokio::test]
    async fn test_handle_send_mail_uses_event_arguments() {
        let (mailer, calls) = build(MockConnector::default());
        let delivery = mailer
            .handle_send_mail(
                "Hi".into(),
                Recipients::Many(vec!["b@y.com".into()]),
                "Hello".into(),
                String::new(),
            )
            .await
            .unwrap();
        assert!(matches!(delivery, Delivery::Sent { .. }));
        assert_eq!(recorded(&calls).len(), 3);
    }

    #[test]
    fn send_failures_classified() {
        let sender = mailrelay_smtp::Error::SenderRefused {
            sender: "a@x.com".into(),
            reply: reply(553, "nope"),
        };
        assert_eq!(SendFailure::of(&sender), Some(SendFailure::SenderRefused));
        assert_eq!(
            SendFailure::of(&mailrelay_smtp::Error::Data(reply(554, "spam"))),
            Some(SendFailure::Data)
        );
        assert_eq!(SendFailure::of(&mailrelay_smtp::Error::Disconnected), None);
        assert_eq!(
            EstablishFailure::of(&mailrelay_smtp::Error::Disconnected),
            EstablishFailure::Generic
        );
    }

    #[test]
    fn request_accepts_msg_and_body_keys() {
        let request: SendMailRequest =
            serde_json::from_value(json!({"subject": "s", "to": "a@x.com", "msg": "m"})).unwrap();
        assert_eq!(request.body, "m");
        assert_eq!(request.account, "");

        let request: SendMailRequest = serde_json::from_value(
            json!({"subject": "s", "to": ["a@x.com"], "body": "b", "account": "a@x.com"}),
        )
        .unwrap();
        assert_eq!(request.body, "b");
        assert_eq!(request.account, "a@x.com");
    }
}
