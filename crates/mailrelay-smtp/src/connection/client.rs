//! Type-state SMTP client.

use std::marker::PhantomData;
use std::net::IpAddr;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use super::stream::with_timeout;
use super::{ConnectOptions, Security, ServerInfo, SmtpStream};
use crate::command::Command;
use crate::error::{Error, RefusedRecipient, Result};
use crate::types::{Address, AuthMechanism, Reply, ReplyCode};

/// Type-state marker: greeted, not authenticated.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker: authenticated.
#[derive(Debug)]
pub struct Authenticated;

/// SMTP client with type-state pattern.
///
/// Mail can be sent in either state; only `Client::<Connected>::login`
/// moves between them.
#[derive(Debug)]
pub struct Client<State> {
    stream: SmtpStream,
    server_info: ServerInfo,
    hello_name: String,
    timeout: Option<Duration>,
    debug: u8,
    _state: PhantomData<State>,
}

/// Outcome of an accepted mail transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Recipients the server refused while accepting others.
    pub refused: Vec<RefusedRecipient>,
}

/// Connection trait for all states.
pub trait SmtpConnection {
    /// Returns the server information.
    fn server_info(&self) -> &ServerInfo;
}

impl<S> SmtpConnection for Client<S> {
    fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }
}

impl Client<Connected> {
    /// Connects, reads the greeting and introduces the client.
    ///
    /// Sends EHLO and falls back to HELO if the server rejects it. With
    /// [`Security::StartTls`] the connection is upgraded and EHLO repeated.
    ///
    /// # Errors
    ///
    /// - [`Error::Connect`] / [`Error::Timeout`] if the server is unreachable
    /// - [`Error::Greeting`] if the server's banner is not a 220 reply
    /// - [`Error::Hello`] if neither EHLO nor HELO is accepted
    /// - [`Error::NotSupported`] if STARTTLS was requested but not offered
    pub async fn connect(opts: &ConnectOptions) -> Result<Self> {
        let stream = SmtpStream::open(opts).await?;
        let hello_name = match &opts.local_hostname {
            Some(name) => name.clone(),
            None => address_literal(stream.local_addr()?.ip()),
        };

        let mut client = Self {
            stream,
            server_info: ServerInfo::default(),
            hello_name,
            timeout: opts.timeout,
            debug: opts.debug,
            _state: PhantomData,
        };

        let greeting = client.receive().await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(Error::Greeting(greeting));
        }
        client.server_info.hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();

        client.hello().await?;

        if opts.security == Security::StartTls {
            client = client.starttls(&opts.host).await?;
        }

        Ok(client)
    }

    /// Upgrades the connection to TLS using STARTTLS and repeats EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not supported or if the upgrade fails.
    pub async fn starttls(mut self, hostname: &str) -> Result<Self> {
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        let reply = self.command(&Command::StartTls).await?;
        if reply.code != ReplyCode::SERVICE_READY {
            return Err(Error::from_reply(&reply));
        }

        self.stream = with_timeout(self.timeout, self.stream.upgrade_to_tls(hostname)).await?;
        self.hello().await?;
        Ok(self)
    }

    /// Authenticates with the first mechanism from
    /// [`AuthMechanism::PREFERRED`] that the server advertised.
    ///
    /// # Errors
    ///
    /// - [`Error::NotSupported`] if the server offers no usable mechanism
    /// - [`Error::Authentication`] if the credentials are rejected
    pub async fn login(mut self, username: &str, password: &str) -> Result<Client<Authenticated>> {
        let offered = self.server_info.auth_mechanisms();
        let mechanism = AuthMechanism::PREFERRED
            .into_iter()
            .find(|m| offered.contains(m))
            .ok_or_else(|| Error::NotSupported("AUTH extension".into()))?;

        let reply = match mechanism {
            AuthMechanism::Plain => {
                let credentials = format!("\0{username}\0{password}");
                self.command(&Command::Auth {
                    mechanism,
                    initial_response: Some(STANDARD.encode(credentials)),
                })
                .await?
            }
            AuthMechanism::Login => {
                let reply = self
                    .command(&Command::Auth {
                        mechanism,
                        initial_response: None,
                    })
                    .await?;
                if reply.code != ReplyCode::AUTH_CONTINUE {
                    return Err(Error::Authentication(reply));
                }
                let reply = self
                    .command(&Command::AuthResponse(STANDARD.encode(username)))
                    .await?;
                if reply.code != ReplyCode::AUTH_CONTINUE {
                    return Err(Error::Authentication(reply));
                }
                self.command(&Command::AuthResponse(STANDARD.encode(password)))
                    .await?
            }
        };

        if reply.code != ReplyCode::AUTH_SUCCEEDED {
            return Err(Error::Authentication(reply));
        }

        debug!(mechanism = mechanism.as_str(), "SMTP authentication succeeded");
        Ok(Client {
            stream: self.stream,
            server_info: self.server_info,
            hello_name: self.hello_name,
            timeout: self.timeout,
            debug: self.debug,
            _state: PhantomData,
        })
    }

    async fn hello(&mut self) -> Result<()> {
        let reply = self
            .command(&Command::Ehlo {
                hostname: self.hello_name.clone(),
            })
            .await?;

        if reply.code == ReplyCode::OK {
            self.server_info.esmtp = true;
            self.server_info.set_extensions(reply.extension_lines());
            return Ok(());
        }

        let reply = self
            .command(&Command::Helo {
                hostname: self.hello_name.clone(),
            })
            .await?;
        if reply.code != ReplyCode::OK {
            return Err(Error::Hello(reply));
        }

        self.server_info.esmtp = false;
        self.server_info.extensions.clear();
        Ok(())
    }
}

// Common implementation for all states
impl<S> Client<S> {
    /// Runs one mail transaction: `MAIL FROM`, `RCPT TO` for every
    /// recipient, then `DATA` with the dot-stuffed message.
    ///
    /// Recipients refused while others were accepted are listed in the
    /// returned [`SendReport`]. After a classified failure the transaction is
    /// reset so the connection stays usable.
    ///
    /// # Errors
    ///
    /// - [`Error::SenderRefused`] if `MAIL FROM` is rejected
    /// - [`Error::RecipientsRefused`] if every recipient is rejected
    /// - [`Error::Data`] if `DATA` or the message content is rejected
    /// - [`Error::InvalidAddress`] if the sender would break the command line;
    ///   such recipients are refused locally instead
    /// - I/O, timeout and disconnect errors as they happen
    pub async fn send_mail(
        &mut self,
        from: &str,
        recipients: &[String],
        message: &[u8],
    ) -> Result<SendReport> {
        let sender = Address::new(from)?;

        let body = (!message.is_ascii() && self.server_info.supports_8bitmime()).then_some("8BITMIME");
        let reply = self.command(&Command::MailFrom { from: sender, body }).await?;
        if !reply.is_success() {
            self.abort_transaction(&reply).await;
            return Err(Error::SenderRefused {
                sender: from.to_string(),
                reply,
            });
        }

        let mut refused = Vec::new();
        for original in recipients {
            // Never put a recipient that would break the command line on the wire.
            let address = match Address::new(original.as_str()) {
                Ok(address) => address,
                Err(e) => {
                    debug!(recipient = %original, "refusing recipient locally: {e}");
                    refused.push(RefusedRecipient {
                        address: original.clone(),
                        reply: Reply::new(ReplyCode::SYNTAX_ERROR, vec![e.to_string()]),
                    });
                    continue;
                }
            };
            let reply = self.command(&Command::RcptTo { to: address }).await?;
            if reply.code != ReplyCode::OK && reply.code != ReplyCode::FORWARD {
                let closing = reply.code == ReplyCode::SERVICE_UNAVAILABLE;
                refused.push(RefusedRecipient {
                    address: original.clone(),
                    reply,
                });
                if closing {
                    return Err(Error::RecipientsRefused(refused));
                }
            }
        }

        if refused.len() == recipients.len() {
            self.reset().await;
            return Err(Error::RecipientsRefused(refused));
        }

        let reply = self.command(&Command::Data).await?;
        if reply.code != ReplyCode::START_DATA {
            self.abort_transaction(&reply).await;
            return Err(Error::Data(reply));
        }

        self.write_data(message).await?;
        let reply = self.receive().await?;
        if reply.code != ReplyCode::OK {
            self.abort_transaction(&reply).await;
            return Err(Error::Data(reply));
        }

        Ok(SendReport { refused })
    }

    /// Sends QUIT and closes the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails.
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.command(&Command::Quit).await;
        self.stream.shutdown().await;

        let reply = reply?;
        if reply.code != ReplyCode::CLOSING && !reply.is_success() {
            return Err(Error::from_reply(&reply));
        }
        Ok(())
    }

    /// Closes the connection without a QUIT exchange.
    pub async fn close(self) {
        self.stream.shutdown().await;
    }

    /// Name this client introduced itself with.
    #[must_use]
    pub fn hello_name(&self) -> &str {
        &self.hello_name
    }

    async fn command(&mut self, cmd: &Command) -> Result<Reply> {
        if self.debug > 0 {
            debug!(target: "mailrelay_smtp::wire", "send: {}", cmd.trace_text());
        }
        let data = cmd.serialize();
        with_timeout(self.timeout, self.stream.write_all(&data)).await?;
        self.receive().await
    }

    async fn receive(&mut self) -> Result<Reply> {
        let reply = with_timeout(self.timeout, self.stream.read_reply()).await?;
        if self.debug > 0 {
            debug!(target: "mailrelay_smtp::wire", "reply: {} {}", reply.code, reply.message_text());
        }
        Ok(reply)
    }

    /// Resets after a refusal unless the server announced it is closing.
    async fn abort_transaction(&mut self, reply: &Reply) {
        if reply.code != ReplyCode::SERVICE_UNAVAILABLE {
            self.reset().await;
        }
    }

    async fn reset(&mut self) {
        if let Err(e) = self.command(&Command::Rset).await {
            debug!(?e, "RSET failed");
        }
    }

    async fn write_data(&mut self, message: &[u8]) -> Result<()> {
        let mut buf = Vec::with_capacity(message.len() + 64);
        let mut lines = message.split(|&b| b == b'\n').peekable();
        while let Some(line) = lines.next() {
            // A trailing newline leaves one empty slice behind; skip it.
            if line.is_empty() && lines.peek().is_none() {
                break;
            }
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                buf.push(b'.');
            }
            buf.extend_from_slice(line);
            buf.extend_from_slice(b"\r\n");
        }
        buf.extend_from_slice(b".\r\n");

        with_timeout(self.timeout, self.stream.write_all(&buf)).await
    }
}

/// RFC 5321 address literal for the local end, used as the default EHLO name.
fn address_literal(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => format!("[{v4}]"),
        IpAddr::V6(v6) => format!("[IPv6:{v6}]"),
    }
}
